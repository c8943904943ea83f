use std::fmt;

/// A symbol is an index into an alphabet's space.
///
/// Alphabets map characters (and extension markers like SOL/EOL) into a
/// contiguous `0..=max` range so that interval arithmetic and DFA
/// construction never need to know what the symbols mean.
pub type Sym = u32;

/// A totally ordered, finite symbol set.
///
/// `before` and `after` are only called away from the respective endpoint,
/// and implementations must be closed under them within `min..=max`.
pub trait Alphabet: fmt::Debug {
    fn min(&self) -> Sym;
    fn max(&self) -> Sym;

    /// The symbol immediately before `s`. Never called with `min`.
    fn before(&self, s: Sym) -> Sym {
        s - 1
    }

    /// The symbol immediately after `s`. Never called with `max`.
    fn after(&self, s: Sym) -> Sym {
        s + 1
    }

    /// Map a character literal from a pattern into the symbol space.
    /// Returns `None` when the character is outside the alphabet.
    fn encode(&self, c: char) -> Option<Sym>;

    /// Render a symbol for describe strings and error messages.
    fn display(&self, s: Sym) -> String;

    /// Resolve a named `(*NAME)` pattern extension, such as SOL or EOL for
    /// line-aware alphabets.
    fn extension(&self, name: &str) -> Option<Sym> {
        let _ = name;
        None
    }
}

/// The default alphabet: symbols are Unicode code points.
///
/// The symbol space is the full `0..=0x10FFFF` range. The surrogate gap is
/// included so that `before`/`after` stay simple interval arithmetic;
/// surrogate symbols cannot be produced by `encode` and never match input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unicode;

impl Alphabet for Unicode {
    fn min(&self) -> Sym {
        0
    }

    fn max(&self) -> Sym {
        char::MAX as Sym
    }

    fn encode(&self, c: char) -> Option<Sym> {
        Some(c as Sym)
    }

    fn display(&self, s: Sym) -> String {
        match char::from_u32(s) {
            Some(c) if !c.is_control() => c.to_string(),
            _ => format!("\\u{{{s:x}}}"),
        }
    }
}

/// An alphabet for binary strings: the only characters are `0` and `1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binary;

impl Alphabet for Binary {
    fn min(&self) -> Sym {
        0
    }

    fn max(&self) -> Sym {
        1
    }

    fn encode(&self, c: char) -> Option<Sym> {
        match c {
            '0' => Some(0),
            '1' => Some(1),
            _ => None,
        }
    }

    fn display(&self, s: Sym) -> String {
        s.to_string()
    }
}

/// Name of the start-of-line extension marker.
pub const START: &str = "SOL";
/// Name of the end-of-line extension marker.
pub const END: &str = "EOL";

/// Extend a base alphabet with disjoint start-of-line and end-of-line
/// markers.
///
/// SOL is ordered before every base symbol and EOL after, so patterns can
/// anchor on line boundaries with `(*SOL)` and `(*EOL)` without stealing
/// any character from the base set. Base symbols shift up by one.
#[derive(Debug, Clone, Copy)]
pub struct LineAware<A> {
    base: A,
}

impl<A: Alphabet> LineAware<A> {
    pub fn new(base: A) -> Self {
        LineAware { base }
    }

    pub fn sol(&self) -> Sym {
        0
    }

    pub fn eol(&self) -> Sym {
        self.base.max() + 2
    }
}

impl<A: Alphabet> Alphabet for LineAware<A> {
    fn min(&self) -> Sym {
        0
    }

    fn max(&self) -> Sym {
        self.base.max() + 2
    }

    fn encode(&self, c: char) -> Option<Sym> {
        self.base.encode(c).map(|s| s + 1)
    }

    fn display(&self, s: Sym) -> String {
        if s == self.sol() {
            format!("(*{START})")
        } else if s == self.eol() {
            format!("(*{END})")
        } else {
            self.base.display(s - 1)
        }
    }

    fn extension(&self, name: &str) -> Option<Sym> {
        match name {
            START => Some(self.sol()),
            END => Some(self.eol()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicode_round_trip() {
        let a = Unicode;
        assert_eq!(a.encode('a'), Some(97));
        assert_eq!(a.after(a.encode('a').unwrap()), a.encode('b').unwrap());
        assert_eq!(a.display(97), "a");
    }

    #[test]
    fn binary_rejects_other_chars() {
        let a = Binary;
        assert_eq!(a.encode('0'), Some(0));
        assert_eq!(a.encode('1'), Some(1));
        assert_eq!(a.encode('2'), None);
        assert_eq!(a.max(), 1);
    }

    #[test]
    fn line_aware_markers_sit_outside_base() {
        let a = LineAware::new(Binary);
        assert_eq!(a.sol(), 0);
        assert_eq!(a.encode('0'), Some(1));
        assert_eq!(a.encode('1'), Some(2));
        assert_eq!(a.eol(), 3);
        assert_eq!(a.extension("SOL"), Some(0));
        assert_eq!(a.extension("EOL"), Some(3));
        assert_eq!(a.extension("BOF"), None);
        assert_eq!(a.display(0), "(*SOL)");
    }
}
