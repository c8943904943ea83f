use std::collections::HashMap;

use crate::alphabet::Sym;
use crate::interval::CharSet;
use crate::nfa::{Label, Nfa, StateId};

/// A deterministic automaton produced by subset construction.
///
/// Transitions are total: a missing edge is the (implicit) dead state.
/// Accept sets preserve label declaration order so that longest-match ties
/// break in favour of the earliest declared pattern.
#[derive(Debug, Clone)]
pub struct Dfa {
    /// Per state: sorted, disjoint `(lo, hi, target)` edges.
    transitions: Vec<Vec<(Sym, Sym, usize)>>,
    accepts: Vec<Vec<Label>>,
    start: usize,
}

impl Dfa {
    pub fn from_nfa(nfa: &Nfa) -> Dfa {
        let mut dfa = Dfa {
            transitions: Vec::new(),
            accepts: Vec::new(),
            start: 0,
        };
        // subset states are identified by their sorted epsilon closure
        let mut index: HashMap<Vec<StateId>, usize> = HashMap::new();
        let mut pending: Vec<Vec<StateId>> = Vec::new();

        let start_set = closure(nfa, &[nfa.start]);
        index.insert(start_set.clone(), 0);
        dfa.transitions.push(Vec::new());
        dfa.accepts.push(accepts_of(nfa, &start_set));
        pending.push(start_set);

        while let Some(set) = pending.pop() {
            let from = index[&set];
            for (lo, hi, targets) in split_edges(nfa, &set) {
                let target_set = closure(nfa, &targets);
                let to = match index.get(&target_set) {
                    Some(&id) => id,
                    None => {
                        let id = dfa.transitions.len();
                        index.insert(target_set.clone(), id);
                        dfa.transitions.push(Vec::new());
                        dfa.accepts.push(accepts_of(nfa, &target_set));
                        pending.push(target_set);
                        id
                    }
                };
                dfa.transitions[from].push((lo, hi, to));
            }
            dfa.transitions[from].sort_unstable();
            merge_adjacent(&mut dfa.transitions[from]);
        }
        dfa
    }

    fn step(&self, state: usize, sym: Sym) -> Option<usize> {
        let edges = &self.transitions[state];
        edges
            .binary_search_by(|&(lo, hi, _)| {
                if sym < lo {
                    std::cmp::Ordering::Greater
                } else if sym > hi {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
            .map(|i| edges[i].2)
    }

    /// Longest-match scan from the start of `syms`: step while a transition
    /// exists, remembering the last accepting position. Returns the length
    /// of the longest accepting prefix and its labels, or `None`.
    pub fn scan(&self, syms: impl IntoIterator<Item = Sym>) -> Option<(usize, &[Label])> {
        let mut state = self.start;
        let mut best: Option<(usize, usize)> = if self.accepts[state].is_empty() {
            None
        } else {
            Some((0, state))
        };
        for (i, sym) in syms.into_iter().enumerate() {
            match self.step(state, sym) {
                Some(next) => {
                    state = next;
                    if !self.accepts[state].is_empty() {
                        best = Some((i + 1, state));
                    }
                }
                None => break,
            }
        }
        best.map(|(len, state)| (len, self.accepts[state].as_slice()))
    }

    /// Whether the automaton accepts exactly `syms` (a full-input match).
    pub fn matches(&self, syms: impl IntoIterator<Item = Sym>) -> bool {
        let syms: Vec<Sym> = syms.into_iter().collect();
        matches!(self.scan(syms.iter().copied()), Some((len, _)) if len == syms.len())
    }

    pub fn state_count(&self) -> usize {
        self.transitions.len()
    }
}

/// The epsilon closure of a set of NFA states, sorted and deduplicated.
fn closure(nfa: &Nfa, seed: &[StateId]) -> Vec<StateId> {
    let mut out: Vec<StateId> = seed.to_vec();
    let mut stack: Vec<StateId> = seed.to_vec();
    while let Some(s) = stack.pop() {
        for &t in &nfa.states[s].epsilons {
            if !out.contains(&t) {
                out.push(t);
                stack.push(t);
            }
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Accept labels of a subset state, in declaration order.
fn accepts_of(nfa: &Nfa, set: &[StateId]) -> Vec<Label> {
    let mut labels: Vec<Label> = set
        .iter()
        .flat_map(|&s| nfa.states[s].accepts.iter().copied())
        .collect();
    labels.sort_unstable();
    labels.dedup();
    labels
}

/// Split the union of the subset's outgoing intervals at every breakpoint,
/// producing elementary ranges with a consistent target set each.
fn split_edges(nfa: &Nfa, set: &[StateId]) -> Vec<(Sym, Sym, Vec<StateId>)> {
    let mut edges: Vec<(Sym, Sym, StateId)> = Vec::new();
    for &s in set {
        for (chars, target) in &nfa.states[s].edges {
            for &(lo, hi) in chars.ranges() {
                edges.push((lo, hi, *target));
            }
        }
    }
    if edges.is_empty() {
        return Vec::new();
    }
    // breakpoints: every interval start, and every position just past an end
    let mut points: Vec<Sym> = Vec::with_capacity(edges.len() * 2);
    for &(lo, hi, _) in &edges {
        points.push(lo);
        if hi < Sym::MAX {
            points.push(hi + 1);
        }
    }
    points.sort_unstable();
    points.dedup();

    let mut out: Vec<(Sym, Sym, Vec<StateId>)> = Vec::new();
    for (i, &lo) in points.iter().enumerate() {
        let hi = match points.get(i + 1) {
            Some(&next) => next - 1,
            None => edges.iter().map(|&(_, hi, _)| hi).max().expect("nonempty"),
        };
        if hi < lo {
            continue;
        }
        let mut targets: Vec<StateId> = edges
            .iter()
            .filter(|&&(elo, ehi, _)| elo <= lo && hi <= ehi)
            .map(|&(_, _, t)| t)
            .collect();
        if targets.is_empty() {
            continue;
        }
        targets.sort_unstable();
        targets.dedup();
        out.push((lo, hi, targets));
    }
    out
}

/// Collapse runs of adjacent edges that share a target.
fn merge_adjacent(edges: &mut Vec<(Sym, Sym, usize)>) {
    let mut merged: Vec<(Sym, Sym, usize)> = Vec::with_capacity(edges.len());
    for &(lo, hi, t) in edges.iter() {
        match merged.last_mut() {
            Some((_, prev_hi, prev_t)) if *prev_t == t && *prev_hi + 1 == lo => {
                *prev_hi = hi;
            }
            _ => merged.push((lo, hi, t)),
        }
    }
    *edges = merged;
}

/// Resumable state for a direct NFA simulation, kept apart from the
/// automaton so callers can own the state while sharing the NFA.
pub struct NfaWalkState {
    /// DFS frames: (state, input position, next move index).
    stack: Vec<(StateId, usize, usize)>,
    /// (position, state) pairs on the current path since the last symbol
    /// was consumed, to cut epsilon cycles.
    path: Vec<(usize, StateId)>,
}

impl NfaWalkState {
    pub fn new(nfa: &Nfa) -> NfaWalkState {
        NfaWalkState {
            stack: vec![(nfa.start, 0, 0)],
            path: vec![(0, nfa.start)],
        }
    }

    /// The next accepting prefix as `(consumed, labels)`, in the priority
    /// order encoded in the automaton (greedy repeats first). `nfa` and
    /// `syms` must be the same on every call.
    pub fn next(&mut self, nfa: &Nfa, syms: &[Sym]) -> Option<(usize, Vec<Label>)> {
        while let Some(&mut (state, pos, ref mut move_ix)) = self.stack.last_mut() {
            let st = &nfa.states[state];
            // report an accept the first time this frame is visited
            if *move_ix == 0 && !st.accepts.is_empty() {
                *move_ix += 1;
                return Some((pos, st.accepts.clone()));
            }
            let ix = if st.accepts.is_empty() {
                *move_ix
            } else {
                *move_ix - 1
            };
            *move_ix += 1;
            if ix < st.epsilons.len() {
                let target = st.epsilons[ix];
                if self.path.contains(&(pos, target)) {
                    continue;
                }
                self.path.push((pos, target));
                self.stack.push((target, pos, 0));
                continue;
            }
            let edge = ix - st.epsilons.len();
            if edge < st.edges.len() {
                let (set, target) = &st.edges[edge];
                if pos < syms.len() && set.contains(syms[pos]) {
                    self.path.push((pos + 1, *target));
                    self.stack.push((*target, pos + 1, 0));
                }
                continue;
            }
            self.stack.pop();
            self.path.pop();
        }
        None
    }
}

/// Iterator convenience over [`NfaWalkState`]: every accepting prefix of
/// `syms`, used when the DFA path is disabled and alternative match
/// lengths feed backtracking.
pub struct NfaWalk<'a> {
    nfa: &'a Nfa,
    syms: Vec<Sym>,
    state: NfaWalkState,
}

impl<'a> NfaWalk<'a> {
    pub fn new(nfa: &'a Nfa, syms: Vec<Sym>) -> NfaWalk<'a> {
        NfaWalk {
            state: NfaWalkState::new(nfa),
            nfa,
            syms,
        }
    }
}

impl<'a> Iterator for NfaWalk<'a> {
    /// `(consumed, labels)` for each accepting path end.
    type Item = (usize, Vec<Label>);

    fn next(&mut self) -> Option<Self::Item> {
        self.state.next(self.nfa, &self.syms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Unicode;
    use crate::pattern::Pattern;

    fn syms(text: &str) -> Vec<Sym> {
        text.chars().map(|c| c as Sym).collect()
    }

    fn dfa(pattern: &str) -> Dfa {
        Dfa::from_nfa(&Nfa::single(
            &Pattern::parse(pattern, &Unicode).expect("pattern parses"),
        ))
    }

    #[test]
    fn longest_match_wins() {
        let d = dfa("a+");
        assert_eq!(d.scan(syms("aaab")), Some((3, &[0][..])));
        assert_eq!(d.scan(syms("b")), None);
    }

    #[test]
    fn empty_prefix_accepts() {
        let d = dfa("a*");
        assert_eq!(d.scan(syms("bbb")), Some((0, &[0][..])));
    }

    #[test]
    fn classic_ends_in_abb() {
        let d = dfa("(a|b)*abb");
        for accepted in ["abb", "aabb", "babb", "abababb", "bbabb"] {
            let got = d.scan(syms(accepted));
            assert_eq!(got.map(|(len, _)| len), Some(accepted.len()), "{accepted}");
        }
        for rejected in ["", "a", "ab", "ba", "abba"] {
            assert!(!d.matches(syms(rejected)), "{rejected}");
        }
    }

    #[test]
    fn label_tie_break_is_declaration_order() {
        let keyword = Pattern::parse("if", &Unicode).unwrap();
        let ident = Pattern::parse("[a-z]+", &Unicode).unwrap();
        let d = Dfa::from_nfa(&Nfa::compile(&[(0, keyword), (1, ident)]));
        assert_eq!(d.scan(syms("if")), Some((2, &[0, 1][..])));
        assert_eq!(d.scan(syms("iffy")), Some((4, &[1][..])));
        assert_eq!(d.scan(syms("other")), Some((5, &[1][..])));
    }

    #[test]
    fn breakpoint_splitting_keeps_targets_apart() {
        // [a-m] and [h-z] overlap on [h-m]
        let a = Pattern::Chars(CharSet::range('a' as Sym, 'm' as Sym));
        let b = Pattern::Chars(CharSet::range('h' as Sym, 'z' as Sym));
        let d = Dfa::from_nfa(&Nfa::compile(&[
            (0, Pattern::seq(vec![a, Pattern::parse("1", &Unicode).unwrap()])),
            (1, Pattern::seq(vec![b, Pattern::parse("2", &Unicode).unwrap()])),
        ]));
        assert_eq!(d.scan(syms("a1")), Some((2, &[0][..])));
        assert_eq!(d.scan(syms("z2")), Some((2, &[1][..])));
        assert_eq!(d.scan(syms("h1")), Some((2, &[0][..])));
        assert_eq!(d.scan(syms("h2")), Some((2, &[1][..])));
    }

    #[test]
    fn nfa_walk_yields_greedy_order() {
        let nfa = Nfa::single(&Pattern::parse("a*", &Unicode).unwrap());
        let walk = NfaWalk::new(&nfa, syms("aa"));
        let lengths: Vec<usize> = walk.map(|(len, _)| len).collect();
        assert_eq!(lengths, vec![2, 1, 0]);
    }

    #[test]
    fn nfa_walk_survives_empty_loops() {
        // the inner body can match empty; the walk must still terminate
        let nfa = Nfa::single(&Pattern::parse("(a?)*b", &Unicode).unwrap());
        let walk = NfaWalk::new(&nfa, syms("ab"));
        let lengths: Vec<usize> = walk.map(|(len, _)| len).collect();
        assert!(lengths.contains(&2));
    }
}
