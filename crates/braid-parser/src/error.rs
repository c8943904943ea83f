use std::fmt;

/// A source position derived from a cursor's helper data.
///
/// `offset` counts symbols (characters for text streams, tokens for lexed
/// streams); `line` and `column` are 1-based and refer to the underlying
/// text in both cases.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub source: Option<String>,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Position {
            offset,
            line,
            column,
            source: None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(name) => write!(f, "{}:{}:{}", name, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}@{}", self.offset)
    }
}

/// Fatal failures surfaced at the parser boundary.
///
/// Plain parse failure is *not* an error: matchers report it as an empty
/// result sequence, and only `parse`'s full-match requirement converts it
/// into [`ParseError::FullFirstMatch`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// `parse` requires the first match to consume all input and it did not.
    #[error("the match failed at {position}, remaining input {remaining:?}")]
    FullFirstMatch { position: Position, remaining: String },

    /// The token set itself is broken (bad pattern, token outside a lexer).
    #[error("lexer error: {0}")]
    Lexer(String),

    /// Input that neither tokenizes nor matches the discard pattern.
    #[error("no token matches the input at {position}")]
    RuntimeLexer { position: Position },

    /// Unmemoized left recursion exhausted the evaluation stack.
    #[error("left recursion detected in {matcher}")]
    LeftRecursion { matcher: String },

    /// Structural misuse of the matcher graph.
    #[error("matcher misuse: {node}")]
    MatcherType { node: String },

    /// A `raise` transform converted a match into a failure.
    #[error("{kind} at {position}")]
    Raised { kind: String, position: Position },

    /// A monitor aborted the parse (pool limit, timeout, user cancel).
    #[error("parse cancelled: {reason}")]
    Cancelled { reason: String },

    /// The input itself could not be read (file inputs).
    #[error("cannot read input: {0}")]
    Io(String),
}

impl From<braid_regex::PatternError> for ParseError {
    fn from(err: braid_regex::PatternError) -> ParseError {
        ParseError::Lexer(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_renders_with_and_without_source() {
        let mut p = Position::new(12, 2, 5);
        assert_eq!(p.to_string(), "2:5");
        p.source = Some("grammar.txt".to_string());
        assert_eq!(p.to_string(), "grammar.txt:2:5");
    }

    #[test]
    fn errors_carry_positions() {
        let err = ParseError::RuntimeLexer {
            position: Position::new(3, 1, 4),
        };
        assert_eq!(err.to_string(), "no token matches the input at 1:4");
    }
}
