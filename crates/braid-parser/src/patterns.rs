//! Pattern fragments for common token shapes, ready to pass to
//! [`Grammar::token`](crate::Grammar::token) or
//! [`Grammar::regexp`](crate::Grammar::regexp).

/// One or more decimal digits.
pub const UNSIGNED_INTEGER: &str = "[0-9]+";

/// An optionally signed integer.
pub const SIGNED_INTEGER: &str = "[+-]?[0-9]+";

/// A decimal number with optional fraction and exponent: `42`, `1.5`,
/// `.5`, `1.23e4`.
pub const UNSIGNED_REAL: &str = r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?";

/// A signed decimal number.
pub const SIGNED_REAL: &str = r"[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?";

/// An identifier-shaped word.
pub const WORD: &str = "[a-zA-Z_][a-zA-Z0-9_]*";

/// Whitespace, the default discard pattern.
pub const WHITESPACE: &str = r"\s+";

#[cfg(test)]
mod tests {
    use super::*;
    use braid_regex::{Compiled, Unicode};

    fn accepts(pattern: &str, text: &str) -> bool {
        let compiled = Compiled::parse(pattern, &Unicode).expect("pattern compiles");
        compiled.dfa.matches(text.chars().map(|c| c as u32))
    }

    #[test]
    fn reals() {
        for ok in ["0", "42", "1.5", ".5", "1.23e4", "2.34E-5", "1e9"] {
            assert!(accepts(UNSIGNED_REAL, ok), "{ok}");
        }
        for bad in ["", ".", "e9", "1.2.3", "+1"] {
            assert!(!accepts(UNSIGNED_REAL, bad), "{bad}");
        }
        assert!(accepts(SIGNED_REAL, "-1.5"));
        assert!(accepts(SIGNED_REAL, "+.5e2"));
    }

    #[test]
    fn words_and_integers() {
        assert!(accepts(WORD, "snake_case_2"));
        assert!(!accepts(WORD, "2fast"));
        assert!(accepts(SIGNED_INTEGER, "-12"));
        assert!(!accepts(UNSIGNED_INTEGER, "1.5"));
    }
}
