//! The lexer layer: tie-breaks, content matchers, discard handling and
//! runtime lexer failures.

use braid_parser::{Grammar, ParseError, ParserConfig, Value};
use pretty_assertions::assert_eq;

#[test]
fn keyword_ident_tie_break_is_grammar_driven() {
    // KEYWORD = "if" and IDENT = "[a-z]+" both accept "if"; the lexeme
    // carries both ids and the grammar picks.
    let g = Grammar::new();
    let keyword = g.token("if");
    let ident = g.token("[a-z]+");

    let as_keyword = (keyword.matcher() | ident.lit("zzz"))
        .parser(ParserConfig::new())
        .expect("grammar compiles");
    assert_eq!(
        as_keyword.parse("if").expect("keyword view parses"),
        vec![Value::from("if")]
    );

    let as_ident = ident
        .matcher()
        .parser(ParserConfig::new())
        .expect("grammar compiles");
    assert_eq!(
        as_ident.parse("if").expect("ident view parses"),
        vec![Value::from("if")]
    );
}

#[test]
fn both_views_in_one_grammar() {
    let g = Grammar::new();
    let keyword = g.token("if");
    let ident = g.token("[a-z]+");
    // statement = "if" IDENT
    let statement = keyword.matcher() & ident.matcher();
    let p = statement
        .parser(ParserConfig::new())
        .expect("grammar compiles");
    assert_eq!(
        p.parse("if ready").expect("input parses"),
        vec![Value::from("if"), Value::from("ready")]
    );
    // "if if": the second lexeme also carries the IDENT id, so the
    // grammar can still use it as a name
    assert_eq!(
        p.parse("if if").expect("input parses"),
        vec![Value::from("if"), Value::from("if")]
    );
}

#[test]
fn content_matchers_specialize_tokens() {
    let g = Grammar::new();
    let symbol = g.token(r"[+*()-]");
    let number = g.token("[0-9]+");
    let sum = number.matcher() & symbol.lit("+") & number.matcher();
    let p = sum.parser(ParserConfig::new()).expect("grammar compiles");
    assert_eq!(
        p.parse("1 + 2").expect("input parses"),
        vec![Value::from("1"), Value::from("+"), Value::from("2")]
    );
    // the same token id with different content commits elsewhere
    assert!(p.parse("1 * 2").is_err());
}

#[test]
fn token_content_must_consume_the_lexeme() {
    let g = Grammar::new();
    let word = g.token("[a-z]+");
    let prefix = g.lit("ab");
    let exact = word.with(&prefix);
    let p = exact.parser(ParserConfig::new()).expect("grammar compiles");
    assert!(p.parse("ab").is_ok());
    // "abc" lexes as one word; the content matcher stops after "ab"
    assert!(p.parse("abc").is_err());

    let g = Grammar::new();
    let word = g.token("[a-z]+");
    let prefix = g.lit("ab");
    let loose = word.with_prefix(&prefix);
    let p = loose.parser(ParserConfig::new()).expect("grammar compiles");
    assert!(p.parse("abc").is_ok());
}

#[test]
fn untokenizable_input_reports_position() {
    let g = Grammar::new();
    let word = g.token("[a-z]+");
    let p = word
        .matcher()
        .parser(ParserConfig::new())
        .expect("grammar compiles");
    match p.parse("ab !") {
        Err(ParseError::RuntimeLexer { position }) => {
            assert_eq!((position.line, position.column), (1, 4));
        }
        other => panic!("expected a runtime lexer error, got {other:?}"),
    }
}

#[test]
fn custom_discard_pattern() {
    let g = Grammar::new();
    let word = g.token("[a-z]+");
    let two = word.matcher() & word.matcher();
    let p = two
        .parser(ParserConfig::new().discard(r"(\s|#[^\n]*)+"))
        .expect("grammar compiles");
    assert_eq!(
        p.parse("one # comment\ntwo").expect("input parses"),
        vec![Value::from("one"), Value::from("two")]
    );
}

#[test]
fn tokens_and_characters_do_not_mix() {
    let g = Grammar::new();
    let word = g.token("[a-z]+");
    // a character-level literal next to tokens would have to match the
    // token stream, which is a structural error
    let broken = word.matcher() & g.lit("x");
    let p = broken
        .parser(ParserConfig::new())
        .expect("grammar compiles");
    match p.parse("ab x") {
        Err(ParseError::MatcherType { .. }) => {}
        other => panic!("expected a matcher type error, got {other:?}"),
    }
}
