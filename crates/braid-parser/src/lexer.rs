use std::rc::Rc;

use braid_regex::{Alphabet, Compiled, Sym};

use crate::error::ParseError;
use crate::stream::{Cursor, Lexeme, TokenSeq};

/// Run the combined token DFA over the remaining input, producing the
/// whole token sequence up front.
///
/// At each position the token automaton is tried first in longest-match
/// mode; every label that accepted the winning length is kept, in token
/// declaration order, and the grammar chooses between them later. When no
/// token matches, a non-empty discard match skips silently; anything else
/// is a fatal lexing error carrying the position.
pub(crate) fn tokenize(
    tokens: &Compiled,
    skip: &Compiled,
    cursor: &Cursor,
    alphabet: &dyn Alphabet,
) -> Result<Rc<TokenSeq>, ParseError> {
    let chars = cursor.chars_to_end();
    let syms: Vec<Sym> = chars
        .iter()
        .map_while(|&c| alphabet.encode(c))
        .collect();
    let mut lexemes = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if pos >= syms.len() {
            // a character outside the alphabet can never tokenize
            return Err(ParseError::RuntimeLexer {
                position: cursor.advance(pos).position(),
            });
        }
        let rest = || syms[pos..].iter().copied();
        match tokens.dfa.scan(rest()) {
            Some((len, labels)) if len > 0 => {
                lexemes.push(Lexeme {
                    ids: labels.to_vec(),
                    text: chars[pos..pos + len].iter().collect(),
                    start: cursor.advance(pos).position(),
                });
                pos += len;
            }
            _ => match skip.dfa.scan(rest()) {
                Some((len, _)) if len > 0 => pos += len,
                _ => {
                    return Err(ParseError::RuntimeLexer {
                        position: cursor.advance(pos).position(),
                    });
                }
            },
        }
    }

    Ok(Rc::new(TokenSeq {
        lexemes,
        end: cursor.advance(chars.len()).position(),
    }))
}
