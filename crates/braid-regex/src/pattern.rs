use crate::alphabet::{Alphabet, Sym};
use crate::interval::CharSet;
use crate::PatternError;

/// The abstract syntax of a regular expression over some alphabet.
///
/// This is the input to Thompson construction. Surface syntax is parsed by
/// [`Pattern::parse`]; patterns can also be assembled directly, which is
/// what the regexp rewriter in `braid-parser` does when it collapses
/// matcher subgraphs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Matches the empty string.
    Empty,
    /// One symbol from a set.
    Chars(CharSet),
    /// Concatenation, in order.
    Seq(Vec<Pattern>),
    /// Alternation, in declaration order.
    Alt(Vec<Pattern>),
    /// Repetition. `high = None` means unbounded.
    Rep {
        pat: Box<Pattern>,
        low: u32,
        high: Option<u32>,
    },
}

impl Pattern {
    /// A pattern matching the literal text, character by character.
    pub fn literal(text: &str, alphabet: &dyn Alphabet) -> Result<Pattern, PatternError> {
        let mut syms = Vec::new();
        for c in text.chars() {
            let s = alphabet
                .encode(c)
                .ok_or(PatternError::OutsideAlphabet { c })?;
            syms.push(Pattern::Chars(CharSet::single(s)));
        }
        Ok(match syms.len() {
            0 => Pattern::Empty,
            1 => syms.pop().expect("one element"),
            _ => Pattern::Seq(syms),
        })
    }

    pub fn seq(mut pats: Vec<Pattern>) -> Pattern {
        match pats.len() {
            0 => Pattern::Empty,
            1 => pats.pop().expect("one element"),
            _ => Pattern::Seq(pats),
        }
    }

    pub fn alt(mut pats: Vec<Pattern>) -> Pattern {
        match pats.len() {
            0 => Pattern::Empty,
            1 => pats.pop().expect("one element"),
            _ => Pattern::Alt(pats),
        }
    }

    pub fn repeat(self, low: u32, high: Option<u32>) -> Pattern {
        Pattern::Rep {
            pat: Box::new(self),
            low,
            high,
        }
    }

    /// Parse the surface syntax: literal characters, classes `[...]` with
    /// ranges and `^` negation, grouping `(...)`, alternation `|`,
    /// quantifiers `? * + {m,n}`, escapes, and `(*NAME)` alphabet
    /// extensions. No backreferences.
    pub fn parse(text: &str, alphabet: &dyn Alphabet) -> Result<Pattern, PatternError> {
        let mut parser = PatternParser {
            chars: text.chars().collect(),
            pos: 0,
            alphabet,
        };
        let pattern = parser.alternation()?;
        match parser.peek() {
            None => Ok(pattern),
            Some(c) => Err(PatternError::Unexpected {
                c,
                at: parser.pos,
            }),
        }
    }
}

struct PatternParser<'a> {
    chars: Vec<char>,
    pos: usize,
    alphabet: &'a dyn Alphabet,
}

impl<'a> PatternParser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_second(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> Result<(), PatternError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(PatternError::Unexpected { c, at: self.pos - 1 }),
            None => Err(PatternError::UnexpectedEnd),
        }
    }

    fn encode(&self, c: char) -> Result<Sym, PatternError> {
        self.alphabet
            .encode(c)
            .ok_or(PatternError::OutsideAlphabet { c })
    }

    fn alternation(&mut self) -> Result<Pattern, PatternError> {
        let mut branches = vec![self.sequence()?];
        while self.peek() == Some('|') {
            self.bump();
            branches.push(self.sequence()?);
        }
        Ok(Pattern::alt(branches))
    }

    fn sequence(&mut self) -> Result<Pattern, PatternError> {
        let mut items = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            items.push(self.repetition()?);
        }
        Ok(Pattern::seq(items))
    }

    fn repetition(&mut self) -> Result<Pattern, PatternError> {
        let atom = self.atom()?;
        match self.peek() {
            Some('?') => {
                self.bump();
                Ok(atom.repeat(0, Some(1)))
            }
            Some('*') => {
                self.bump();
                Ok(atom.repeat(0, None))
            }
            Some('+') => {
                self.bump();
                Ok(atom.repeat(1, None))
            }
            Some('{') => {
                self.bump();
                let (low, high) = self.counts()?;
                Ok(atom.repeat(low, high))
            }
            _ => Ok(atom),
        }
    }

    /// The inside of `{m}`, `{m,}` or `{m,n}`, including the closing brace.
    fn counts(&mut self) -> Result<(u32, Option<u32>), PatternError> {
        let low = self.number()?;
        match self.bump() {
            Some('}') => Ok((low, Some(low))),
            Some(',') => {
                if self.peek() == Some('}') {
                    self.bump();
                    return Ok((low, None));
                }
                let high = self.number()?;
                self.eat('}')?;
                if high < low {
                    return Err(PatternError::BadRepeat { low, high });
                }
                Ok((low, Some(high)))
            }
            Some(c) => Err(PatternError::Unexpected { c, at: self.pos - 1 }),
            None => Err(PatternError::UnexpectedEnd),
        }
    }

    fn number(&mut self) -> Result<u32, PatternError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == start {
            return match self.peek() {
                Some(c) => Err(PatternError::Unexpected { c, at: self.pos }),
                None => Err(PatternError::UnexpectedEnd),
            };
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| PatternError::CountOverflow { text })
    }

    fn atom(&mut self) -> Result<Pattern, PatternError> {
        match self.peek() {
            Some('(') if self.peek_second() == Some('*') => self.extension(),
            Some('(') => {
                self.bump();
                let inner = self.alternation()?;
                self.eat(')')?;
                Ok(inner)
            }
            Some('[') => {
                self.bump();
                let set = self.class()?;
                Ok(Pattern::Chars(set))
            }
            Some('.') => {
                self.bump();
                Ok(Pattern::Chars(CharSet::range(
                    self.alphabet.min(),
                    self.alphabet.max(),
                )))
            }
            Some('\\') => {
                self.bump();
                let set = self.escape()?;
                Ok(Pattern::Chars(set))
            }
            Some(c) if !matches!(c, '?' | '*' | '+' | '{' | '}' | ']') => {
                self.bump();
                Ok(Pattern::Chars(CharSet::single(self.encode(c)?)))
            }
            Some(c) => Err(PatternError::Unexpected { c, at: self.pos }),
            None => Err(PatternError::UnexpectedEnd),
        }
    }

    /// A `(*NAME)` marker resolved through the alphabet.
    fn extension(&mut self) -> Result<Pattern, PatternError> {
        self.eat('(')?;
        self.eat('*')?;
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        self.eat(')')?;
        match self.alphabet.extension(&name) {
            Some(sym) => Ok(Pattern::Chars(CharSet::single(sym))),
            None => Err(PatternError::UnknownExtension { name }),
        }
    }

    /// The inside of a `[...]` class, including the closing bracket.
    fn class(&mut self) -> Result<CharSet, PatternError> {
        let negated = if self.peek() == Some('^') {
            self.bump();
            true
        } else {
            false
        };
        let mut set = CharSet::empty();
        loop {
            match self.peek() {
                None => return Err(PatternError::UnexpectedEnd),
                Some(']') => {
                    self.bump();
                    break;
                }
                _ => {
                    let item = self.class_item()?;
                    set = set.union(&item);
                }
            }
        }
        if set.is_empty() {
            return Err(PatternError::EmptyClass);
        }
        if negated {
            set = set.negate(self.alphabet);
        }
        Ok(set)
    }

    fn class_item(&mut self) -> Result<CharSet, PatternError> {
        let first = match self.bump() {
            Some('\\') => return self.escape(),
            Some(c) => self.encode(c)?,
            None => return Err(PatternError::UnexpectedEnd),
        };
        // a trailing '-' is a literal dash, not a range
        if self.peek() == Some('-') && self.peek_second() != Some(']') {
            self.bump();
            let second = match self.bump() {
                Some('\\') => {
                    let set = self.escape()?;
                    let ranges = set.ranges();
                    if ranges.len() != 1 || ranges[0].0 != ranges[0].1 {
                        return Err(PatternError::BadRange);
                    }
                    ranges[0].0
                }
                Some(c) => self.encode(c)?,
                None => return Err(PatternError::UnexpectedEnd),
            };
            if second < first {
                return Err(PatternError::BadRange);
            }
            return Ok(CharSet::range(first, second));
        }
        Ok(CharSet::single(first))
    }

    /// The character after a backslash. Shorthand classes expand to their
    /// ASCII sets; anything else is the literal character.
    fn escape(&mut self) -> Result<CharSet, PatternError> {
        let c = self.bump().ok_or(PatternError::UnexpectedEnd)?;
        let lit = |p: &Self, c: char| p.encode(c).map(CharSet::single);
        match c {
            'n' => lit(self, '\n'),
            'r' => lit(self, '\r'),
            't' => lit(self, '\t'),
            'd' => self.ascii_set(&[('0', '9')]),
            's' => self.ascii_set(&[(' ', ' '), ('\t', '\t'), ('\n', '\n'), ('\r', '\r')]),
            'w' => self.ascii_set(&[('a', 'z'), ('A', 'Z'), ('0', '9'), ('_', '_')]),
            other => lit(self, other),
        }
    }

    fn ascii_set(&self, ranges: &[(char, char)]) -> Result<CharSet, PatternError> {
        let mut out = Vec::new();
        for &(lo, hi) in ranges {
            out.push((self.encode(lo)?, self.encode(hi)?));
        }
        Ok(CharSet::from_ranges(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::{LineAware, Unicode};
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Pattern {
        Pattern::parse(text, &Unicode).expect("pattern parses")
    }

    fn sym(c: char) -> Pattern {
        Pattern::Chars(CharSet::single(c as Sym))
    }

    #[test]
    fn literal_sequence() {
        assert_eq!(parse("ab"), Pattern::Seq(vec![sym('a'), sym('b')]));
    }

    #[test]
    fn alternation_groups_and_quantifiers() {
        assert_eq!(
            parse("(a|b)*"),
            Pattern::Alt(vec![sym('a'), sym('b')]).repeat(0, None),
        );
        assert_eq!(parse("a?"), sym('a').repeat(0, Some(1)));
        assert_eq!(parse("a+"), sym('a').repeat(1, None));
    }

    #[test]
    fn counted_repeats() {
        assert_eq!(parse("a{3}"), sym('a').repeat(3, Some(3)));
        assert_eq!(parse("a{2,}"), sym('a').repeat(2, None));
        assert_eq!(parse("a{2,5}"), sym('a').repeat(2, Some(5)));
        assert!(Pattern::parse("a{5,2}", &Unicode).is_err());
    }

    #[test]
    fn classes() {
        assert_eq!(
            parse("[a-cx]"),
            Pattern::Chars(CharSet::from_ranges([
                ('a' as Sym, 'c' as Sym),
                ('x' as Sym, 'x' as Sym)
            ])),
        );
        let negated = parse("[^a]");
        if let Pattern::Chars(set) = negated {
            assert!(!set.contains('a' as Sym));
            assert!(set.contains('b' as Sym));
        } else {
            panic!("expected a class, got {negated:?}");
        }
    }

    #[test]
    fn trailing_dash_is_literal() {
        assert_eq!(
            parse("[a-]"),
            Pattern::Chars(CharSet::from_ranges([
                ('-' as Sym, '-' as Sym),
                ('a' as Sym, 'a' as Sym)
            ])),
        );
    }

    #[test]
    fn escapes() {
        assert_eq!(parse(r"\."), sym('.'));
        assert_eq!(parse(r"\n"), sym('\n'));
        if let Pattern::Chars(set) = parse(r"\d") {
            assert!(set.contains('5' as Sym));
            assert!(!set.contains('a' as Sym));
        } else {
            panic!("expected a class");
        }
    }

    #[test]
    fn line_aware_extensions() {
        let alphabet = LineAware::new(Unicode);
        let p = Pattern::parse(r"(*SOL)a(*EOL)", &alphabet).expect("pattern parses");
        assert_eq!(
            p,
            Pattern::Seq(vec![
                Pattern::Chars(CharSet::single(alphabet.sol())),
                Pattern::Chars(CharSet::single(alphabet.encode('a').unwrap())),
                Pattern::Chars(CharSet::single(alphabet.eol())),
            ]),
        );
        assert!(Pattern::parse(r"(*NOPE)", &alphabet).is_err());
    }

    #[test]
    fn reports_trailing_garbage() {
        assert!(Pattern::parse("a)", &Unicode).is_err());
        assert!(Pattern::parse("(a", &Unicode).is_err());
        assert!(Pattern::parse("*", &Unicode).is_err());
    }

    #[test]
    fn parsed_shapes_snapshot() {
        use expect_test::expect;

        let shape = expect![[
            r#"Seq([Chars(CharSet[(97, 99)]), Rep { pat: Chars(CharSet[(120, 120)]), low: 0, high: Some(1) }])"#
        ]];
        shape.assert_eq(&format!("{:?}", parse("[a-c]x?")));

        let shape = expect![[
            r#"Seq([Rep { pat: Alt([Chars(CharSet[(97, 97)]), Chars(CharSet[(98, 98)])]), low: 0, high: None }, Chars(CharSet[(97, 97)]), Chars(CharSet[(98, 98)]), Chars(CharSet[(98, 98)])])"#
        ]];
        shape.assert_eq(&format!("{:?}", parse("(a|b)*abb")));
    }
}
