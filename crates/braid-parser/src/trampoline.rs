use triomphe::Arc;

use crate::coroutine::{Co, Resume, Step};
use crate::error::ParseError;
use crate::graph::CompiledGraph;
use crate::limit::LimitTracker;
use crate::memo::MemoTables;
use crate::monitor::{GeneratorPool, Monitor};
use crate::stream::Cursor;
use crate::transform::Transformed;
use crate::value::Value;

/// Per-invocation mutable state shared by every coroutine of one parse:
/// the memo tables and the coroutine pool. Dropped when the parse ends.
pub(crate) struct Ctx {
    pub(crate) memo: MemoTables,
    pub(crate) pool: GeneratorPool,
}

/// The single-threaded cooperative scheduler.
///
/// The stack holds the path of coroutines currently executing; suspended
/// alternatives live inside their parents' states. Each epoch either
/// pushes a called child, delivers a child's yield to its parent, or pops
/// an exhausted child. When the stack empties after a yield, that yield
/// is one complete parse.
pub(crate) struct Trampoline {
    graph: Arc<CompiledGraph>,
    ctx: Ctx,
    stack: Vec<Box<Co>>,
    /// The root coroutine, parked here between pulls.
    root: Option<Box<Co>>,
    monitors: Vec<Box<dyn Monitor>>,
    depth: LimitTracker,
    epoch: u64,
    finished: bool,
}

impl Trampoline {
    pub(crate) fn new(
        graph: Arc<CompiledGraph>,
        cursor: Cursor,
        monitors: Vec<Box<dyn Monitor>>,
        stack_limit: usize,
        pool_limit: Option<usize>,
    ) -> Trampoline {
        let mut ctx = Ctx {
            memo: MemoTables::default(),
            pool: GeneratorPool::new(pool_limit),
        };
        let root = Co::new(&graph, graph.root, cursor, &mut ctx);
        Trampoline {
            graph,
            ctx,
            stack: Vec::new(),
            root: Some(root),
            monitors,
            depth: LimitTracker::new(stack_limit),
            epoch: 0,
            finished: false,
        }
    }

    /// Stack a coroutine, or report the left recursion that an
    /// over-ceiling stack almost always means.
    fn push(&mut self, co: Box<Co>) -> Result<(), ParseError> {
        if !self.depth.raise() {
            return Err(ParseError::LeftRecursion {
                matcher: self.graph.describe(co.node),
            });
        }
        co.flags.set_on_stack(true);
        for m in &mut self.monitors {
            m.push(&self.graph.describe(co.node));
        }
        self.stack.push(co);
        Ok(())
    }

    fn pop(&mut self) -> Box<Co> {
        let co = self.stack.pop().expect("pop on an empty evaluation stack");
        co.flags.set_on_stack(false);
        self.depth.lower();
        for m in &mut self.monitors {
            m.pop(&self.graph.describe(co.node));
        }
        co
    }

    fn fail(&mut self, error: ParseError) -> Option<Result<(Vec<Value>, Cursor), ParseError>> {
        while !self.stack.is_empty() {
            drop(self.pop());
        }
        self.finished = true;
        Some(Err(error))
    }

    /// Drive the stack until the root yields one parse, is exhausted, or
    /// something fails.
    pub(crate) fn pull(&mut self) -> Option<Result<(Vec<Value>, Cursor), ParseError>> {
        if self.finished {
            return None;
        }
        debug_assert!(self.stack.is_empty(), "pull with work still stacked");
        match self.root.take() {
            Some(root) => {
                if let Err(error) = self.push(root) {
                    return self.fail(error);
                }
            }
            None => {
                self.finished = true;
                return None;
            }
        }
        let mut resume = Resume::Pull;
        loop {
            self.epoch += 1;
            let (epoch, depth) = (self.epoch, self.stack.len());
            let aborted = self
                .monitors
                .iter_mut()
                .find_map(|m| m.next_iteration(epoch, depth).err());
            if let Some(error) = aborted {
                return self.fail(error);
            }
            self.ctx.pool.enforce();

            let top = self
                .stack
                .last_mut()
                .expect("evaluation stack cannot empty mid-pull");
            let step = if top.flags.is_closed() {
                Step::Done
            } else {
                top.step(&self.graph, &mut self.ctx, resume)
            };

            match step {
                Step::Call(child) => {
                    if let Err(error) = self.push(child) {
                        return self.fail(error);
                    }
                    resume = Resume::Pull;
                }
                Step::Yield(values, cursor) => {
                    let co = self.pop();
                    let chain = &self.graph.nodes[co.node].transform;
                    let delivered = if chain.is_empty() {
                        Some(values)
                    } else {
                        let start = co.origin.position();
                        let end = cursor.position();
                        match chain.apply(values, &start, &end) {
                            Ok(Transformed::Values(values)) => Some(values),
                            Ok(Transformed::Suppressed) => None,
                            Err(error) => return self.fail(error),
                        }
                    };
                    match delivered {
                        None => {
                            // a filter rejected the result; ask the same
                            // coroutine for its next one
                            if let Err(error) = self.push(co) {
                                return self.fail(error);
                            }
                            resume = Resume::Pull;
                        }
                        Some(values) => {
                            if self.stack.is_empty() {
                                self.root = Some(co);
                                for m in &mut self.monitors {
                                    m.result();
                                }
                                return Some(Ok((values, cursor)));
                            }
                            resume = Resume::Child(co, values, cursor);
                        }
                    }
                }
                Step::Done => {
                    drop(self.pop());
                    if self.stack.is_empty() {
                        self.finished = true;
                        return None;
                    }
                    resume = Resume::ChildDone;
                }
                Step::Fail(error) => return self.fail(error),
            }
        }
    }

    pub(crate) fn pool_high_water(&self) -> usize {
        self.ctx.pool.high_water()
    }

    pub(crate) fn depth_high_water(&self) -> usize {
        self.depth.high
    }
}

/// The lazy sequence of matches: each item is a result list plus the
/// cursor where that parse stopped. Dropping the iterator cancels the
/// parse and tears every suspended coroutine down.
pub struct Matches {
    inner: Trampoline,
}

impl Matches {
    pub(crate) fn new(inner: Trampoline) -> Matches {
        Matches { inner }
    }

    /// High-water mark of the live-coroutine pool, when a limit was set.
    pub fn pool_high_water(&self) -> usize {
        self.inner.pool_high_water()
    }

    /// High-water mark of the evaluation stack depth.
    pub fn depth_high_water(&self) -> usize {
        self.inner.depth_high_water()
    }
}

impl Iterator for Matches {
    type Item = Result<(Vec<Value>, Cursor), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.pull()
    }
}
