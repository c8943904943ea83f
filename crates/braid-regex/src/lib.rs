#![doc = include_str!("../README.md")]

pub mod alphabet;
mod dfa;
mod interval;
mod nfa;
mod pattern;

pub use crate::alphabet::{Alphabet, Binary, LineAware, Sym, Unicode};
pub use crate::dfa::{Dfa, NfaWalk, NfaWalkState};
pub use crate::interval::CharSet;
pub use crate::nfa::{Label, Nfa};
pub use crate::pattern::Pattern;

/// A labelled pattern compiled to both automata: the NFA for enumerating
/// scanners and the DFA for longest-match scanning. The parsed pattern is
/// kept so callers can recombine compiled expressions into larger ones.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// The surface text (or a reconstruction) for describe strings.
    pub source: String,
    pub pattern: Pattern,
    pub nfa: Nfa,
    pub dfa: Dfa,
}

impl Compiled {
    pub fn from_pattern(source: String, pattern: &Pattern) -> Compiled {
        let nfa = Nfa::single(pattern);
        let dfa = Dfa::from_nfa(&nfa);
        Compiled {
            source,
            pattern: pattern.clone(),
            nfa,
            dfa,
        }
    }

    /// Compile a surface-syntax pattern under the given alphabet.
    pub fn parse(source: &str, alphabet: &dyn Alphabet) -> Result<Compiled, PatternError> {
        let pattern = Pattern::parse(source, alphabet)?;
        Ok(Compiled::from_pattern(source.to_string(), &pattern))
    }

    /// Compile several labelled patterns into one automaton pair, as the
    /// lexer does for its token set.
    pub fn parse_many(
        labelled: &[(Label, String)],
        alphabet: &dyn Alphabet,
    ) -> Result<Compiled, PatternError> {
        let mut patterns = Vec::with_capacity(labelled.len());
        for (label, source) in labelled {
            patterns.push((*label, Pattern::parse(source, alphabet)?));
        }
        let nfa = Nfa::compile(&patterns);
        let dfa = Dfa::from_nfa(&nfa);
        let source = labelled
            .iter()
            .map(|(_, s)| s.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Pattern::alt(patterns.into_iter().map(|(_, p)| p).collect());
        Ok(Compiled {
            source,
            pattern,
            nfa,
            dfa,
        })
    }
}

/// Errors raised while parsing a pattern's surface syntax.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("unexpected end of pattern")]
    UnexpectedEnd,
    #[error("unexpected `{c}` at offset {at}")]
    Unexpected { c: char, at: usize },
    #[error("character `{c}` is outside the alphabet")]
    OutsideAlphabet { c: char },
    #[error("invalid range in character class")]
    BadRange,
    #[error("empty character class")]
    EmptyClass,
    #[error("bad repeat bounds {{{low},{high}}}")]
    BadRepeat { low: u32, high: u32 },
    #[error("repeat count `{text}` is out of range")]
    CountOverflow { text: String },
    #[error("unknown extension `(*{name})`")]
    UnknownExtension { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_scans_with_both_automata() {
        let compiled = Compiled::parse("[0-9]+", &Unicode).expect("pattern compiles");
        let syms: Vec<Sym> = "123x".chars().map(|c| c as Sym).collect();
        assert_eq!(compiled.dfa.scan(syms.iter().copied()), Some((3, &[0][..])));
        let first = NfaWalk::new(&compiled.nfa, syms).next();
        assert_eq!(first, Some((3, vec![0])));
    }

    #[test]
    fn parse_many_unions_labels() {
        let compiled = Compiled::parse_many(
            &[(0, "if".to_string()), (1, "[a-z]+".to_string())],
            &Unicode,
        )
        .expect("patterns compile");
        let syms: Vec<Sym> = "if".chars().map(|c| c as Sym).collect();
        assert_eq!(compiled.dfa.scan(syms), Some((2, &[0, 1][..])));
    }

    #[test]
    fn pattern_errors_surface() {
        assert!(Compiled::parse("[", &Unicode).is_err());
        assert!(Compiled::parse("a{2,1}", &Unicode).is_err());
    }

    #[test]
    fn binary_patterns_compile_and_scan() {
        // even parity over the binary alphabet
        let compiled = Compiled::parse("(0*10*1)*0*", &Binary).expect("pattern compiles");
        let encode = |text: &str| -> Vec<Sym> {
            text.chars().filter_map(|c| Binary.encode(c)).collect()
        };
        for even in ["", "11", "0110", "1010", "00"] {
            assert!(compiled.dfa.matches(encode(even)), "{even}");
        }
        for odd in ["1", "10", "0111"] {
            assert!(!compiled.dfa.matches(encode(odd)), "{odd}");
        }
        // characters outside the alphabet are rejected at parse time
        assert!(Compiled::parse("012", &Binary).is_err());
    }
}
