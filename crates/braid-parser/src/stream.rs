use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use braid_regex::Label;

use crate::error::Position;

/// The decoded text behind a character cursor, shared by every cursor
/// derived from it. Carries the helper data positions are computed from.
#[derive(Debug)]
pub struct CharSeq {
    chars: Vec<char>,
    /// Char offsets at which lines start; always begins with 0.
    line_starts: Vec<usize>,
    name: Option<String>,
}

impl CharSeq {
    pub fn new(text: &str, name: Option<String>) -> Rc<CharSeq> {
        let chars: Vec<char> = text.chars().collect();
        let mut line_starts = vec![0];
        for (i, &c) in chars.iter().enumerate() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Rc::new(CharSeq {
            chars,
            line_starts,
            name,
        })
    }

    fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Position {
            offset,
            line: line + 1,
            column: offset - self.line_starts[line] + 1,
            source: self.name.clone(),
        }
    }
}

/// One tuple of the lexed stream: the matching token ids (in declaration
/// order), the matched text, and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub ids: Vec<Label>,
    pub text: String,
    pub start: Position,
}

/// The lexed token sequence behind a token cursor.
#[derive(Debug)]
pub struct TokenSeq {
    pub lexemes: Vec<Lexeme>,
    /// Position just past the last lexeme, for end-of-stream reporting.
    pub end: Position,
}

/// An immutable position in an input stream.
///
/// Advancing produces a new cursor and leaves the old one valid, so
/// matchers can backtrack by simply keeping older cursors around.
/// Equality and hashing use the identity of the shared sequence plus the
/// offset, which is what memo tables key on.
#[derive(Clone)]
pub struct Cursor {
    seq: Seq,
    offset: usize,
}

#[derive(Clone)]
enum Seq {
    Chars(Rc<CharSeq>),
    Tokens(Rc<TokenSeq>),
}

impl Cursor {
    pub fn from_text(text: &str, name: Option<String>) -> Cursor {
        Cursor {
            seq: Seq::Chars(CharSeq::new(text, name)),
            offset: 0,
        }
    }

    pub(crate) fn from_tokens(tokens: Rc<TokenSeq>) -> Cursor {
        Cursor {
            seq: Seq::Tokens(tokens),
            offset: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_chars(&self) -> bool {
        matches!(self.seq, Seq::Chars(_))
    }

    pub fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Symbols left between this cursor and the end of the stream.
    pub fn remaining(&self) -> usize {
        match &self.seq {
            Seq::Chars(seq) => seq.chars.len() - self.offset,
            Seq::Tokens(seq) => seq.lexemes.len() - self.offset,
        }
    }

    pub fn peek_char(&self) -> Option<char> {
        match &self.seq {
            Seq::Chars(seq) => seq.chars.get(self.offset).copied(),
            Seq::Tokens(_) => None,
        }
    }

    pub(crate) fn peek_lexeme(&self) -> Option<&Lexeme> {
        match &self.seq {
            Seq::Chars(_) => None,
            Seq::Tokens(seq) => seq.lexemes.get(self.offset),
        }
    }

    /// The characters from this cursor to the end of the stream. Empty for
    /// token cursors.
    pub(crate) fn chars_to_end(&self) -> &[char] {
        match &self.seq {
            Seq::Chars(seq) => &seq.chars[self.offset..],
            Seq::Tokens(_) => &[],
        }
    }

    pub fn advance(&self, n: usize) -> Cursor {
        Cursor {
            seq: self.seq.clone(),
            offset: self.offset + n,
        }
    }

    /// The next `n` symbols, rendered as text (clamped at end of stream).
    pub fn slice(&self, n: usize) -> String {
        match &self.seq {
            Seq::Chars(seq) => {
                let end = (self.offset + n).min(seq.chars.len());
                seq.chars[self.offset..end].iter().collect()
            }
            Seq::Tokens(seq) => {
                let end = (self.offset + n).min(seq.lexemes.len());
                seq.lexemes[self.offset..end]
                    .iter()
                    .map(|l| l.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
    }

    /// Render the remainder of the stream for error messages.
    pub fn slice_to_end(&self) -> String {
        match &self.seq {
            Seq::Chars(seq) => seq.chars[self.offset..].iter().collect(),
            Seq::Tokens(seq) => seq.lexemes[self.offset..]
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn position(&self) -> Position {
        match &self.seq {
            Seq::Chars(seq) => seq.position(self.offset),
            Seq::Tokens(seq) => match seq.lexemes.get(self.offset) {
                Some(lexeme) => {
                    let mut p = lexeme.start.clone();
                    p.offset = self.offset;
                    p
                }
                None => {
                    let mut p = seq.end.clone();
                    p.offset = self.offset;
                    p
                }
            },
        }
    }

    fn seq_ptr(&self) -> usize {
        match &self.seq {
            Seq::Chars(seq) => Rc::as_ptr(seq) as usize,
            Seq::Tokens(seq) => Rc::as_ptr(seq) as usize,
        }
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.seq_ptr() == other.seq_ptr()
    }
}

impl Eq for Cursor {}

impl Hash for Cursor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.seq_ptr().hash(state);
        self.offset.hash(state);
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.slice_to_end();
        if rest.chars().count() > 16 {
            rest = rest.chars().take(13).collect::<String>() + "...";
        }
        write!(f, "{:?}[{}]", rest, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_keeps_the_old_cursor_valid() {
        let start = Cursor::from_text("abc", None);
        let next = start.advance(1);
        assert_eq!(start.peek_char(), Some('a'));
        assert_eq!(next.peek_char(), Some('b'));
        assert_eq!(start.remaining(), 3);
        assert_eq!(next.remaining(), 2);
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let cursor = Cursor::from_text("ab\ncd", Some("demo".to_string()));
        let p = cursor.advance(3).position();
        assert_eq!((p.line, p.column), (2, 1));
        assert_eq!(p.to_string(), "demo:2:1");
        let p = cursor.advance(4).position();
        assert_eq!((p.line, p.column), (2, 2));
    }

    #[test]
    fn equality_is_sequence_identity_plus_offset() {
        let a = Cursor::from_text("abc", None);
        let b = Cursor::from_text("abc", None);
        assert_ne!(a, b);
        assert_eq!(a.advance(2), a.advance(1).advance(1));
    }

    #[test]
    fn at_end() {
        let cursor = Cursor::from_text("x", None);
        assert!(!cursor.at_end());
        assert!(cursor.advance(1).at_end());
    }
}
