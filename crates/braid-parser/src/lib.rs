#![doc = include_str!("../README.md")]

mod coroutine;
mod error;
mod graph;
mod lexer;
mod limit;
mod memo;
mod monitor;
mod parser;
pub mod patterns;
mod rewrite;
mod stream;
mod trampoline;
mod transform;
mod value;

pub use crate::error::{ParseError, Position};
pub use crate::graph::{Delayed, Grammar, IntoM, MemoKind, TokenHandle, M};
pub use crate::limit::LimitTracker;
pub use crate::monitor::{Monitor, Profile, Timeout};
pub use crate::parser::{MonitorFactory, ParseAll, Parser, ParserConfig};
pub use crate::rewrite::{NodeArg, Rewriter};
pub use crate::stream::{Cursor, Lexeme};
pub use crate::trampoline::Matches;
pub use crate::transform::KArgs;
pub use crate::value::Value;

pub use braid_regex::{Alphabet, Binary, Label, LineAware, Unicode};
