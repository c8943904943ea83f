use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use triomphe::Arc;

use crate::error::ParseError;
use crate::graph::{CompiledGraph, MemoKind, M};
use crate::monitor::{Monitor, Timeout};
use crate::rewrite::{self, Rewriter};
use crate::stream::Cursor;
use crate::trampoline::{Matches, Trampoline};
use crate::value::Value;

/// Builds a fresh monitor for each parse invocation.
pub type MonitorFactory = Rc<dyn Fn() -> Box<dyn Monitor>>;

/// Chosen so that deeply ambiguous grammars fail with a useful
/// left-recursion error well before native memory is at risk; the
/// evaluation stack is heap-allocated, so this is about diagnosis, not
/// stack overflow.
const DEFAULT_STACK_LIMIT: usize = 4_096;

/// How a grammar is rewritten and evaluated.
///
/// The rewriter list is ordered; convenience methods append to it using
/// the current flag values, so set `full_memoize`/`conservative_loops`
/// before calling [`ParserConfig::auto_memoize`].
#[derive(Clone)]
pub struct ParserConfig {
    rewriters: Vec<Rewriter>,
    monitors: Vec<MonitorFactory>,
    discard: String,
    full_memoize: bool,
    conservative_loops: bool,
    full_match: bool,
    stack_limit: usize,
    pool_limit: Option<usize>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            rewriters: vec![Rewriter::Flatten, Rewriter::ComposeTransforms],
            monitors: Vec::new(),
            discard: r"\s+".to_string(),
            full_memoize: false,
            conservative_loops: false,
            full_match: true,
            stack_limit: DEFAULT_STACK_LIMIT,
            pool_limit: None,
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rewriter to the pipeline.
    pub fn rewriter(mut self, rewriter: Rewriter) -> Self {
        self.rewriters.push(rewriter);
        self
    }

    /// Replace the whole pipeline (the implicit separator desugaring,
    /// lexer compilation and final compaction still run).
    pub fn rewriters(mut self, rewriters: Vec<Rewriter>) -> Self {
        self.rewriters = rewriters;
        self
    }

    /// Reorder alternatives and memoize so left-recursive grammars
    /// terminate.
    pub fn auto_memoize(self) -> Self {
        let (conservative, full) = (self.conservative_loops, self.full_memoize);
        self.rewriter(Rewriter::AutoMemoize { conservative, full })
    }

    /// Wrap every matcher in the given memoizer.
    pub fn memoize(self, kind: MemoKind) -> Self {
        self.rewriter(Rewriter::Memoize(kind))
    }

    /// Collapse regular subgraphs into DFA scanners (longest match).
    pub fn compile_to_dfa(self) -> Self {
        self.rewriter(Rewriter::Regexp { use_dfa: true })
    }

    /// Collapse regular subgraphs into NFA scanners (all matches).
    pub fn compile_to_nfa(self) -> Self {
        self.rewriter(Rewriter::Regexp { use_dfa: false })
    }

    /// Memoize everything, not just left-recursive cycles, in
    /// [`ParserConfig::auto_memoize`].
    pub fn full_memoize(mut self) -> Self {
        self.full_memoize = true;
        self
    }

    /// Use the exhaustive loop detector instead of the leftmost-path
    /// estimate.
    pub fn conservative_loops(mut self) -> Self {
        self.conservative_loops = true;
        self
    }

    /// Let [`Parser::parse`] return the first match even when input
    /// remains.
    pub fn no_full_match(mut self) -> Self {
        self.full_match = false;
        self
    }

    /// The pattern silently skipped between tokens (whitespace by
    /// default). Only relevant for grammars with tokens.
    pub fn discard(mut self, pattern: &str) -> Self {
        self.discard = pattern.to_string();
        self
    }

    /// Observe every scheduling step with a monitor built per invocation.
    pub fn monitor(mut self, factory: MonitorFactory) -> Self {
        self.monitors.push(factory);
        self
    }

    /// Abort any single parse after the given wall-clock budget.
    pub fn timeout(self, budget: Duration) -> Self {
        self.monitor(Rc::new(move || Box::new(Timeout::after(budget))))
    }

    /// Bound the evaluation stack depth (exceeding it reports left
    /// recursion).
    pub fn stack_limit(mut self, limit: usize) -> Self {
        self.stack_limit = limit;
        self
    }

    /// Bound the number of live coroutines; the oldest off-path one is
    /// closed when the pool overflows.
    pub fn pool_limit(mut self, limit: usize) -> Self {
        self.pool_limit = Some(limit);
        self
    }
}

/// A compiled grammar bound to its configuration: apply the rewriters
/// once, then parse any number of inputs. Cloning shares the compiled
/// graph.
#[derive(Clone)]
pub struct Parser {
    graph: Arc<CompiledGraph>,
    monitors: Vec<MonitorFactory>,
    full_match: bool,
    stack_limit: usize,
    pool_limit: Option<usize>,
}

impl Parser {
    /// Rewrite the grammar reachable from `root` and bind it to the
    /// configuration.
    pub fn new(root: &M, config: ParserConfig) -> Result<Parser, ParseError> {
        let (nodes, root_id, alphabet) = root.export();
        let (nodes, root_id) = rewrite::desugar_separators(nodes, root_id);
        let (mut nodes, mut root_id) =
            Rewriter::Lexer.apply(nodes, root_id, &alphabet, &config.discard)?;
        for rewriter in &config.rewriters {
            let rewritten = rewriter.apply(nodes, root_id, &alphabet, &config.discard)?;
            nodes = rewritten.0;
            root_id = rewritten.1;
        }
        let (nodes, root_id) = rewrite::compact(nodes, root_id);
        Ok(Parser {
            graph: Arc::new(CompiledGraph {
                nodes,
                root: root_id,
                alphabet,
            }),
            monitors: config.monitors,
            full_match: config.full_match,
            stack_limit: config.stack_limit,
            pool_limit: config.pool_limit,
        })
    }

    fn run(&self, cursor: Cursor) -> Matches {
        let monitors = self.monitors.iter().map(|factory| factory()).collect();
        Matches::new(Trampoline::new(
            self.graph.clone(),
            cursor,
            monitors,
            self.stack_limit,
            self.pool_limit,
        ))
    }

    /// Every match of the input, lazily, as `(values, remaining-cursor)`
    /// pairs in the deterministic backtracking order.
    pub fn match_all(&self, input: &str) -> Matches {
        self.run(Cursor::from_text(input, None))
    }

    /// Every parse of the input, lazily, as result lists.
    pub fn parse_all(&self, input: &str) -> ParseAll {
        ParseAll {
            inner: self.match_all(input),
        }
    }

    /// The first parse. Unless [`ParserConfig::no_full_match`] was set,
    /// the match must consume the whole input.
    pub fn parse(&self, input: &str) -> Result<Vec<Value>, ParseError> {
        self.first(self.match_all(input), || Cursor::from_text(input, None))
    }

    /// Parse the contents of a file, naming it in positions.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Vec<Value>, ParseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ParseError::Io(format!("{}: {e}", path.display())))?;
        let name = Some(path.display().to_string());
        let make = || Cursor::from_text(&text, name.clone());
        self.first(self.run(make()), make)
    }

    /// Parse raw bytes, decoded as UTF-8 with replacement characters.
    pub fn parse_bytes(&self, input: &[u8]) -> Result<Vec<Value>, ParseError> {
        let text = String::from_utf8_lossy(input);
        self.first(self.run(Cursor::from_text(&text, None)), || {
            Cursor::from_text(&text, None)
        })
    }

    fn first(
        &self,
        mut matches: Matches,
        start: impl Fn() -> Cursor,
    ) -> Result<Vec<Value>, ParseError> {
        match matches.next() {
            Some(Ok((values, cursor))) => {
                if self.full_match && !cursor.at_end() {
                    Err(ParseError::FullFirstMatch {
                        position: cursor.position(),
                        remaining: cursor.slice_to_end(),
                    })
                } else {
                    Ok(values)
                }
            }
            Some(Err(error)) => Err(error),
            None => {
                let cursor = start();
                Err(ParseError::FullFirstMatch {
                    position: cursor.position(),
                    remaining: cursor.slice_to_end(),
                })
            }
        }
    }

    /// Node count of the rewritten graph (after compaction).
    pub fn graph_size(&self) -> usize {
        self.graph.nodes.len()
    }
}

impl M {
    /// Shorthand: compile this matcher into a parser.
    pub fn parser(&self, config: ParserConfig) -> Result<Parser, ParseError> {
        Parser::new(self, config)
    }
}

/// Iterator over whole-parse result lists; see [`Parser::parse_all`].
pub struct ParseAll {
    inner: Matches,
}

impl Iterator for ParseAll {
    type Item = Result<Vec<Value>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|item| item.map(|(values, _)| values))
    }
}
