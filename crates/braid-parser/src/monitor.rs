use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::error::ParseError;
use crate::limit::LimitTracker;

/// Observes every trampoline transition and may abort the search.
///
/// Monitors are created fresh per parse invocation from the factories the
/// configuration holds, so they can keep mutable per-parse state.
pub trait Monitor {
    /// Called once per scheduling epoch. Returning an error cancels the
    /// parse.
    fn next_iteration(&mut self, epoch: u64, depth: usize) -> Result<(), ParseError> {
        let _ = (epoch, depth);
        Ok(())
    }

    /// A coroutine was pushed onto the evaluation stack.
    fn push(&mut self, describe: &str) {
        let _ = describe;
    }

    /// A coroutine was popped from the evaluation stack.
    fn pop(&mut self, describe: &str) {
        let _ = describe;
    }

    /// A complete parse was emitted to the caller.
    fn result(&mut self) {}
}

/// Cancels the parse when a wall-clock deadline passes.
pub struct Timeout {
    deadline: Instant,
    budget: Duration,
}

impl Timeout {
    pub fn after(budget: Duration) -> Timeout {
        Timeout {
            deadline: Instant::now() + budget,
            budget,
        }
    }
}

impl Monitor for Timeout {
    fn next_iteration(&mut self, _epoch: u64, _depth: usize) -> Result<(), ParseError> {
        if Instant::now() > self.deadline {
            Err(ParseError::Cancelled {
                reason: format!("timeout after {:?}", self.budget),
            })
        } else {
            Ok(())
        }
    }
}

/// Counts epochs and stack movement; useful in tests and when tuning
/// grammars.
#[derive(Default)]
pub struct Profile {
    pub epochs: u64,
    pub pushes: u64,
    pub max_depth: usize,
    pub results: u64,
}

impl Monitor for Profile {
    fn next_iteration(&mut self, epoch: u64, depth: usize) -> Result<(), ParseError> {
        self.epochs = epoch;
        self.max_depth = self.max_depth.max(depth);
        Ok(())
    }

    fn push(&mut self, _describe: &str) {
        self.pushes += 1;
    }

    fn result(&mut self) {
        self.results += 1;
    }
}

/// Liveness flags shared between a coroutine and the pool that may decide
/// to close it.
#[derive(Default)]
pub(crate) struct CoFlags {
    closed: Cell<bool>,
    on_stack: Cell<bool>,
}

pub(crate) type Slot = Rc<CoFlags>;

impl CoFlags {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub(crate) fn set_on_stack(&self, on: bool) {
        self.on_stack.set(on);
    }
}

/// Bounds the number of live coroutines, the way the original's generator
/// manager bounds its queue: when the pool overflows, the oldest coroutine
/// not on the current evaluation path is closed. A closed coroutine
/// produces no further results, trading completeness of the search for
/// bounded memory.
pub(crate) struct GeneratorPool {
    queue: VecDeque<Weak<CoFlags>>,
    tracker: Option<LimitTracker>,
}

impl GeneratorPool {
    pub(crate) fn new(limit: Option<usize>) -> GeneratorPool {
        GeneratorPool {
            queue: VecDeque::new(),
            tracker: limit.map(LimitTracker::new),
        }
    }

    pub(crate) fn register(&mut self) -> Slot {
        let slot: Slot = Rc::new(CoFlags::default());
        if self.tracker.is_some() {
            self.queue.push_back(Rc::downgrade(&slot));
        }
        slot
    }

    /// Drop dead entries, take a census of the live pool, and close the
    /// oldest off-path coroutines until the pool fits its ceiling again.
    pub(crate) fn enforce(&mut self) {
        let Some(tracker) = &mut self.tracker else {
            return;
        };
        self.queue.retain(|w| w.strong_count() > 0);
        if tracker.measure(self.queue.len()) {
            return;
        }
        let mut excess = tracker.excess();
        for weak in self.queue.iter() {
            if excess == 0 {
                break;
            }
            if let Some(flags) = weak.upgrade() {
                if !flags.on_stack.get() && !flags.closed.get() {
                    flags.closed.set(true);
                    excess -= 1;
                }
            }
        }
    }

    pub(crate) fn high_water(&self) -> usize {
        self.tracker.map(|t| t.high).unwrap_or(0)
    }
}
