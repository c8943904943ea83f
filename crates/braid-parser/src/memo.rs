use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::coroutine::Co;
use crate::graph::NodeId;
use crate::stream::Cursor;
use crate::value::Value;

/// Memo tables are keyed by matcher identity and cursor position, which is
/// exactly what makes a repeated call "the same call".
pub(crate) type MemoKey = (NodeId, Cursor);

/// The shared state of one memoized (matcher, position) pair.
///
/// Both memoizers replay `results` first and extend by driving `src`
/// further only when the cache runs dry. At most one consumer extends at a
/// time; a re-entrant consumer (the left-recursive case) replays what is
/// cached and stops, which is the curtailment that makes left recursion
/// terminate.
#[derive(Default)]
pub(crate) struct MemoEntry {
    pub(crate) results: Vec<(Vec<Value>, Cursor)>,
    /// The suspended producing coroutine, when not exhausted and not
    /// currently being driven.
    pub(crate) src: Option<Box<Co>>,
    pub(crate) started: bool,
    pub(crate) exhausted: bool,
    /// A consumer is currently driving `src` somewhere below us.
    pub(crate) driving: bool,
    /// A re-entrant consumer ran out of cache while we were driving; the
    /// cached set may be incomplete and deserves a regrow pass.
    pub(crate) reentered: bool,
    /// `results.len()` when the current drive (or regrow) session began.
    pub(crate) len_at_drive: usize,
    /// Set while a regrow pass re-runs the child from scratch; already
    /// cached results coming out of the re-run are skipped instead of
    /// yielded twice.
    pub(crate) regrowing: bool,
}

/// Per-invocation evaluation state: memo tables and the left-recursion
/// depth counters. Owned by one trampoline and dropped with it.
#[derive(Default)]
pub(crate) struct MemoTables {
    pub(crate) entries: HashMap<MemoKey, MemoEntry>,
    depths: HashMap<MemoKey, Rc<Cell<usize>>>,
}

impl MemoTables {
    pub(crate) fn depth_cell(&mut self, key: &MemoKey) -> Rc<Cell<usize>> {
        self.depths
            .entry(key.clone())
            .or_insert_with(|| Rc::new(Cell::new(0)))
            .clone()
    }
}

/// RAII depth counter for LMemo curtailment: alive while a consumer
/// coroutine for the key is alive, including coroutines abandoned during
/// backtracking.
pub(crate) struct DepthGuard {
    cell: Rc<Cell<usize>>,
}

impl DepthGuard {
    pub(crate) fn acquire(cell: Rc<Cell<usize>>) -> DepthGuard {
        cell.set(cell.get() + 1);
        DepthGuard { cell }
    }

    pub(crate) fn depth(&self) -> usize {
        self.cell.get()
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.cell.set(self.cell.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_guard_counts_nesting() {
        let mut tables = MemoTables::default();
        let key: MemoKey = (0, Cursor::from_text("ab", None));
        let g1 = DepthGuard::acquire(tables.depth_cell(&key));
        let g2 = DepthGuard::acquire(tables.depth_cell(&key));
        assert_eq!(g2.depth(), 2);
        drop(g1);
        assert_eq!(g2.depth(), 1);
        drop(g2);
        assert_eq!(tables.depth_cell(&key).get(), 0);
    }

    #[test]
    fn keys_distinguish_positions() {
        let cursor = Cursor::from_text("ab", None);
        let a: MemoKey = (1, cursor.clone());
        let b: MemoKey = (1, cursor.advance(1));
        assert_ne!(a, b);
    }
}
