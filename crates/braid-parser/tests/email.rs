//! An RFC 3696 email validator subset: character-level matching with
//! joins, length limits and post-condition filters.

use braid_parser::{Grammar, Parser, ParserConfig, Value};

const LETTERS_DIGITS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LOCAL_SPECIALS: &str = "!#$%&'*+-/=?^_`.{|}~";

fn joined(vs: &[Value]) -> &str {
    vs[0].as_str().expect("a joined string")
}

/// The preferred fully-qualified DNS name: dot-separated LDH labels, a
/// length limit per label and overall, and a non-numeric TLD.
fn dns_name(g: &Grammar) -> braid_parser::M {
    let ld = g.any(LETTERS_DIGITS);
    let ldh = ld.clone() | g.any("-");
    // a label starts and ends with a letter or digit
    let label = (ld.clone() + (ldh.many() + ld).opt().join()).join();
    let short_label = label.filter(|vs| joined(vs).chars().count() <= 63);
    let tld = short_label
        .clone()
        .filter(|vs| !joined(vs).chars().all(|c| c.is_ascii_digit()));
    let any_name = (short_label.separated_by(&g.lit("."), 1, None).join() + "." + tld).join();
    let non_numeric =
        any_name.filter(|vs| !joined(vs).chars().all(|c| c.is_ascii_digit() || c == '.'));
    non_numeric.filter(|vs| joined(vs).chars().count() <= 255)
}

/// The local part: quoted or unquoted, no leading/trailing/consecutive
/// dots, at most 64 characters.
fn local_part(g: &Grammar) -> braid_parser::M {
    let unescaped: String = format!("{LETTERS_DIGITS}{LOCAL_SPECIALS}");
    let escapable: String = format!("{unescaped}@\\\",[] ");
    let quotable: String = format!("{unescaped}@\\,[] ");

    let escaped = (g.lit("\\") + g.any(&escapable)).join();
    let unquoted = (escaped | g.any(&unescaped)).repeat(1, None).join();
    let quoted = (g.lit("\"") + g.any(&quotable).repeat(1, None).join() + "\"").join();
    let local = quoted | unquoted;

    let no_extreme_dot = local.filter(|vs| {
        let bare = joined(vs).trim_matches('"');
        !bare.starts_with('.') && !bare.ends_with('.')
    });
    // two dots separated only by quote characters
    let no_double_dot = no_extreme_dot.filter(|vs| {
        let mut since_dot: Option<bool> = None;
        for c in joined(vs).chars() {
            match c {
                '.' => {
                    if since_dot == Some(true) {
                        return false;
                    }
                    since_dot = Some(true);
                }
                '"' => {}
                _ => since_dot = Some(false),
            }
        }
        true
    });
    no_double_dot.filter(|vs| joined(vs).chars().count() <= 64)
}

fn email_validator() -> Parser {
    let g = Grammar::new();
    let email = local_part(&g) + "@" + dns_name(&g);
    email
        .parser(ParserConfig::new())
        .expect("grammar compiles")
}

#[test]
fn plain_addresses_validate() {
    let p = email_validator();
    for ok in [
        "local@example.com",
        "a.b.c@example.com",
        "x_y-z@sub.example.org",
        "1a@example23.com",
    ] {
        assert!(p.parse(ok).is_ok(), "{ok} should validate");
    }
}

#[test]
fn quoted_local_parts_validate() {
    let p = email_validator();
    assert!(p.parse("\"a b\"@example.com").is_ok());
    assert!(p.parse("\"odd,name\"@example.com").is_ok());
}

#[test]
fn consecutive_dots_are_rejected() {
    let p = email_validator();
    assert!(p.parse("a..b@example.com").is_err());
    assert!(p.parse(".a@example.com").is_err());
    assert!(p.parse("a.@example.com").is_err());
}

#[test]
fn local_part_length_limit() {
    let p = email_validator();
    let at_limit = format!("{}@example.com", "a".repeat(64));
    let over = format!("{}@example.com", "a".repeat(65));
    assert!(p.parse(&at_limit).is_ok());
    assert!(p.parse(&over).is_err());
}

#[test]
fn numeric_tld_is_rejected() {
    let p = email_validator();
    assert!(p.parse("a@all-numeric.123").is_err());
    assert!(p.parse("a@example.c0m").is_ok(), "mixed TLDs are fine");
}

#[test]
fn missing_structure_is_rejected() {
    let p = email_validator();
    assert!(p.parse("no-at-sign.example.com").is_err());
    assert!(p.parse("a@no-dot").is_err());
}
