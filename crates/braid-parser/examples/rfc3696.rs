//! A practical email validator (the RFC 3696 subset): character-level
//! matching with joins and post-condition filters.
//!
//! ```text
//! cargo run --example rfc3696 -- someone@example.com "a b"@example.com
//! ```

use braid_parser::{Grammar, ParseError, Parser, ParserConfig, Value, M};

const LETTERS_DIGITS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn joined(vs: &[Value]) -> &str {
    vs[0].as_str().expect("a joined string")
}

fn dns_name(g: &Grammar) -> M {
    let ld = g.any(LETTERS_DIGITS);
    let ldh = ld.clone() | g.any("-");
    let label = (ld.clone() + (ldh.many() + ld).opt().join()).join();
    let short_label = label.filter(|vs| joined(vs).chars().count() <= 63);
    let tld = short_label
        .clone()
        .filter(|vs| !joined(vs).chars().all(|c| c.is_ascii_digit()));
    let name = (short_label.separated_by(&g.lit("."), 1, None).join() + "." + tld).join();
    name.filter(|vs| joined(vs).chars().count() <= 255)
}

fn local_part(g: &Grammar) -> M {
    let unescaped = format!("{LETTERS_DIGITS}!#$%&'*+-/=?^_`.{{|}}~");
    let escapable = format!("{unescaped}@\\\",[] ");
    let quotable = format!("{unescaped}@\\,[] ");

    let escaped = (g.lit("\\") + g.any(&escapable)).join();
    let unquoted = (escaped | g.any(&unescaped)).repeat(1, None).join();
    let quoted = (g.lit("\"") + g.any(&quotable).repeat(1, None).join() + "\"").join();
    let local = quoted | unquoted;

    let dotted_sanely = local.filter(|vs| {
        let bare = joined(vs).trim_matches('"');
        !bare.starts_with('.') && !bare.ends_with('.') && !bare.contains("..")
    });
    dotted_sanely.filter(|vs| joined(vs).chars().count() <= 64)
}

fn validator() -> Result<Parser, ParseError> {
    let g = Grammar::new();
    let email = local_part(&g) + "@" + dns_name(&g);
    email.parser(ParserConfig::new())
}

fn main() -> Result<(), ParseError> {
    let parser = validator()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: rfc3696 <address>...");
        return Ok(());
    }
    for address in args {
        let verdict = if parser.parse(&address).is_ok() {
            "valid"
        } else {
            "invalid"
        };
        println!("{address}: {verdict}");
    }
    Ok(())
}
