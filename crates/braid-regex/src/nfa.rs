use crate::interval::CharSet;
use crate::pattern::Pattern;

/// Identifies which of the compiled patterns accepted. For the lexer this
/// is the token id; for a single regexp matcher it is 0.
pub type Label = u32;

pub(crate) type StateId = usize;

#[derive(Debug, Default, Clone)]
pub(crate) struct State {
    /// Symbol transitions. Order is irrelevant to the DFA but defines
    /// priority for direct NFA simulation, so construction keeps
    /// declaration order.
    pub(crate) edges: Vec<(CharSet, StateId)>,
    /// Epsilon transitions in priority order: for greedy repetition the
    /// continue-edge precedes the exit-edge.
    pub(crate) epsilons: Vec<StateId>,
    /// Labels accepted in this state, in declaration order.
    pub(crate) accepts: Vec<Label>,
}

/// A Thompson NFA built from one or more labelled patterns sharing a
/// single start state.
#[derive(Debug, Clone)]
pub struct Nfa {
    pub(crate) states: Vec<State>,
    pub(crate) start: StateId,
}

struct Fragment {
    start: StateId,
    end: StateId,
}

impl Nfa {
    /// Compile labelled patterns into one NFA: a fresh start state with an
    /// epsilon edge to each pattern's fragment, whose end state accepts the
    /// pattern's label.
    pub fn compile(labelled: &[(Label, Pattern)]) -> Nfa {
        let mut nfa = Nfa {
            states: Vec::new(),
            start: 0,
        };
        let start = nfa.state();
        nfa.start = start;
        for (label, pattern) in labelled {
            let fragment = nfa.fragment(pattern);
            nfa.states[start].epsilons.push(fragment.start);
            nfa.states[fragment.end].accepts.push(*label);
        }
        nfa
    }

    /// Compile a single unlabelled pattern (label 0).
    pub fn single(pattern: &Pattern) -> Nfa {
        Nfa::compile(&[(0, pattern.clone())])
    }

    pub(crate) fn state(&mut self) -> StateId {
        self.states.push(State::default());
        self.states.len() - 1
    }

    fn fragment(&mut self, pattern: &Pattern) -> Fragment {
        match pattern {
            Pattern::Empty => {
                let s = self.state();
                Fragment { start: s, end: s }
            }
            Pattern::Chars(set) => {
                let start = self.state();
                let end = self.state();
                self.states[start].edges.push((set.clone(), end));
                Fragment { start, end }
            }
            Pattern::Seq(items) => {
                let mut fragment: Option<Fragment> = None;
                for item in items {
                    let next = self.fragment(item);
                    fragment = Some(match fragment {
                        None => next,
                        Some(prev) => {
                            self.states[prev.end].epsilons.push(next.start);
                            Fragment {
                                start: prev.start,
                                end: next.end,
                            }
                        }
                    });
                }
                fragment.unwrap_or_else(|| {
                    let s = self.state();
                    Fragment { start: s, end: s }
                })
            }
            Pattern::Alt(branches) => {
                let start = self.state();
                let end = self.state();
                for branch in branches {
                    let f = self.fragment(branch);
                    self.states[start].epsilons.push(f.start);
                    self.states[f.end].epsilons.push(end);
                }
                Fragment { start, end }
            }
            Pattern::Rep { pat, low, high } => self.repetition(pat, *low, *high),
        }
    }

    /// `low` mandatory copies followed by either `high - low` optional
    /// copies or a greedy epsilon loop when unbounded.
    fn repetition(&mut self, pat: &Pattern, low: u32, high: Option<u32>) -> Fragment {
        let start = self.state();
        let mut tail = start;
        for _ in 0..low {
            let f = self.fragment(pat);
            self.states[tail].epsilons.push(f.start);
            tail = f.end;
        }
        match high {
            None => {
                let end = self.state();
                let body = self.fragment(pat);
                // greedy: enter the loop before leaving it
                self.states[tail].epsilons.push(body.start);
                self.states[tail].epsilons.push(end);
                self.states[body.end].epsilons.push(body.start);
                self.states[body.end].epsilons.push(end);
                Fragment { start, end }
            }
            Some(high) => {
                let end = self.state();
                for _ in low..high {
                    let f = self.fragment(pat);
                    self.states[tail].epsilons.push(f.start);
                    self.states[tail].epsilons.push(end);
                    tail = f.end;
                }
                self.states[tail].epsilons.push(end);
                Fragment { start, end }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Unicode;

    fn nfa(text: &str) -> Nfa {
        Nfa::single(&Pattern::parse(text, &Unicode).expect("pattern parses"))
    }

    #[test]
    fn literal_chain() {
        let n = nfa("ab");
        // start, plus two states per character
        assert_eq!(n.len(), 5);
        assert_eq!(n.states[n.start].epsilons.len(), 1);
    }

    #[test]
    fn alternation_fans_out() {
        let n = nfa("a|b");
        let alt_start = n.states[n.start].epsilons[0];
        assert_eq!(n.states[alt_start].epsilons.len(), 2);
    }

    #[test]
    fn greedy_loop_prefers_continuing() {
        let n = nfa("a*");
        let rep_start = n.states[n.start].epsilons[0];
        // continue-edge first, exit-edge second
        assert_eq!(n.states[rep_start].epsilons.len(), 2);
    }

    #[test]
    fn labels_attach_to_ends() {
        let patterns = [
            (7, Pattern::parse("if", &Unicode).unwrap()),
            (9, Pattern::parse("[a-z]+", &Unicode).unwrap()),
        ];
        let n = Nfa::compile(&patterns);
        let accepting: Vec<_> = n
            .states
            .iter()
            .flat_map(|s| s.accepts.iter().copied())
            .collect();
        assert_eq!(accepting, vec![7, 9]);
    }
}
