use braid_regex::{NfaWalkState, Sym};

use crate::error::ParseError;
use crate::graph::{CompiledGraph, MemoKind, NodeId, NodeKind, RegexpMode};
use crate::memo::{DepthGuard, MemoKey};
use crate::monitor::Slot;
use crate::stream::Cursor;
use crate::trampoline::Ctx;
use crate::value::Value;

/// What a coroutine asks of the trampoline after one step.
pub(crate) enum Step {
    /// Deliver one result to the parent (or the caller, at the root).
    Yield(Vec<Value>, Cursor),
    /// Push this coroutine and run it for its next result. Both fresh
    /// children and suspended ones being resumed go through here.
    Call(Box<Co>),
    /// No more results.
    Done,
    /// Fatal; unwinds the whole parse.
    Fail(ParseError),
}

/// What the trampoline feeds a coroutine when it resumes it.
pub(crate) enum Resume {
    /// Produce your next result.
    Pull,
    /// The child you called yielded; here it is back, with its result.
    Child(Box<Co>, Vec<Value>, Cursor),
    /// The child you called is exhausted.
    ChildDone,
}

/// One suspended match in progress: a matched child's coroutine (for
/// later backtracking), the values it produced and the cursor after it.
struct Frame {
    co: Box<Co>,
    values: Vec<Value>,
    cursor: Cursor,
}

fn concat(frames: &[Frame]) -> Vec<Value> {
    frames.iter().flat_map(|f| f.values.iter().cloned()).collect()
}

enum State {
    Literal {
        done: bool,
    },
    Any {
        done: bool,
    },
    RegexpDfa {
        done: bool,
    },
    RegexpNfa {
        walk: NfaWalkState,
        syms: Vec<Sym>,
    },
    /// `And`: depth-first cartesian product, rightmost child advances
    /// first on re-entry.
    Sequence {
        frames: Vec<Frame>,
        started: bool,
        done: bool,
    },
    /// `Or` and `First` share a shape; `First` commits to the first
    /// branch that yields.
    Alternatives {
        index: usize,
        active: Option<Box<Co>>,
        started: bool,
        committed: bool,
    },
    /// Greedy repetition: extend as deep as allowed, yield on the way
    /// back.
    Repeat {
        frames: Vec<Frame>,
        await_cursor: Cursor,
        started: bool,
        done: bool,
    },
    /// Non-greedy repetition: breadth-first over match counts.
    RepeatLazy {
        gen: Vec<(Vec<Value>, Cursor)>,
        next_gen: Vec<(Vec<Value>, Cursor)>,
        count: u32,
        emit: usize,
        expand: usize,
        started: bool,
    },
    Lookahead {
        resolved: bool,
    },
    /// `Delayed`, `Transform` and the post-tokenize phase of `Lexer`:
    /// forward the child's results one to one.
    Delegate {
        target: NodeId,
        active: Option<Box<Co>>,
        started: bool,
    },
    Memo {
        key: MemoKey,
        child: NodeId,
        kind: MemoKind,
        index: usize,
        phase: MemoPhase,
        guard: Option<DepthGuard>,
    },
    Token {
        active: Option<Box<Co>>,
        started: bool,
        done: bool,
    },
    Lexer {
        active: Option<Box<Co>>,
        started: bool,
    },
    Eos {
        done: bool,
    },
    /// Structural misuse discovered at match time; fails once.
    Broken {
        error: Option<ParseError>,
    },
}

enum MemoPhase {
    Init,
    Ready,
    Curtailed,
}

/// A matcher coroutine: the explicit continuation object the trampoline
/// schedules. Suspended children are owned by their parent's state, so
/// the native stack never grows with grammar depth.
pub(crate) struct Co {
    pub(crate) node: NodeId,
    pub(crate) flags: Slot,
    /// The cursor this coroutine started at; transform context and memo
    /// keys derive from it.
    pub(crate) origin: Cursor,
    state: State,
}

impl Co {
    pub(crate) fn new(
        graph: &CompiledGraph,
        node: NodeId,
        cursor: Cursor,
        ctx: &mut Ctx,
    ) -> Box<Co> {
        let state = match &graph.nodes[node].kind {
            NodeKind::Literal(_) => State::Literal { done: false },
            NodeKind::Any(_) => State::Any { done: false },
            NodeKind::Regexp(_, RegexpMode::Dfa) => State::RegexpDfa { done: false },
            NodeKind::Regexp(compiled, RegexpMode::Nfa) => State::RegexpNfa {
                walk: NfaWalkState::new(&compiled.nfa),
                syms: encode(graph, &cursor),
            },
            NodeKind::And(_) => State::Sequence {
                frames: Vec::new(),
                started: false,
                done: false,
            },
            NodeKind::Or(_) | NodeKind::First(_) => State::Alternatives {
                index: 0,
                active: None,
                started: false,
                committed: false,
            },
            NodeKind::Repeat {
                separator: Some(_), ..
            } => State::Broken {
                error: Some(ParseError::MatcherType {
                    node: format!(
                        "{}: separator was not desugared before evaluation",
                        graph.describe(node)
                    ),
                }),
            },
            NodeKind::Repeat { greedy: true, .. } => State::Repeat {
                frames: Vec::new(),
                await_cursor: cursor.clone(),
                started: false,
                done: false,
            },
            NodeKind::Repeat { greedy: false, .. } => State::RepeatLazy {
                gen: Vec::new(),
                next_gen: Vec::new(),
                count: 0,
                emit: 0,
                expand: 0,
                started: false,
            },
            NodeKind::Lookahead { .. } => State::Lookahead { resolved: false },
            NodeKind::Delayed(Some(target)) => State::Delegate {
                target: *target,
                active: None,
                started: false,
            },
            NodeKind::Delayed(None) => State::Broken {
                error: Some(ParseError::MatcherType {
                    node: format!("unbound Delayed: {}", graph.describe(node)),
                }),
            },
            NodeKind::Transform(child) => State::Delegate {
                target: *child,
                active: None,
                started: false,
            },
            NodeKind::Memo { child, kind } => State::Memo {
                key: (node, cursor.clone()),
                child: *child,
                kind: *kind,
                index: 0,
                phase: MemoPhase::Init,
                guard: None,
            },
            NodeKind::Token { .. } => State::Token {
                active: None,
                started: false,
                done: false,
            },
            NodeKind::Lexer { .. } => State::Lexer {
                active: None,
                started: false,
            },
            NodeKind::Eos => State::Eos { done: false },
        };
        Box::new(Co {
            node,
            flags: ctx.pool.register(),
            origin: cursor,
            state,
        })
    }

    pub(crate) fn step(&mut self, graph: &CompiledGraph, ctx: &mut Ctx, resume: Resume) -> Step {
        let node = &graph.nodes[self.node];
        match (&node.kind, &mut self.state) {
            (NodeKind::Literal(text), State::Literal { done }) => {
                if std::mem::replace(done, true) {
                    return Step::Done;
                }
                if !self.origin.is_chars() {
                    return type_error(graph, self.node);
                }
                let rest = self.origin.chars_to_end();
                let mut len = 0;
                for c in text.chars() {
                    if rest.get(len) != Some(&c) {
                        return Step::Done;
                    }
                    len += 1;
                }
                Step::Yield(
                    vec![Value::Str(text.clone())],
                    self.origin.advance(len),
                )
            }
            (NodeKind::Any(set), State::Any { done }) => {
                if std::mem::replace(done, true) {
                    return Step::Done;
                }
                if !self.origin.is_chars() {
                    return type_error(graph, self.node);
                }
                match self.origin.peek_char() {
                    Some(c) if graph.alphabet.encode(c).is_some_and(|s| set.contains(s)) => {
                        Step::Yield(vec![Value::Str(c.to_string())], self.origin.advance(1))
                    }
                    _ => Step::Done,
                }
            }
            (NodeKind::Regexp(compiled, _), State::RegexpDfa { done }) => {
                if std::mem::replace(done, true) {
                    return Step::Done;
                }
                if !self.origin.is_chars() {
                    return type_error(graph, self.node);
                }
                let syms = encode(graph, &self.origin);
                match compiled.dfa.scan(syms) {
                    Some((len, _)) => Step::Yield(
                        vec![Value::Str(take_text(&self.origin, len))],
                        self.origin.advance(len),
                    ),
                    None => Step::Done,
                }
            }
            (NodeKind::Regexp(compiled, _), State::RegexpNfa { walk, syms }) => {
                if !self.origin.is_chars() {
                    return type_error(graph, self.node);
                }
                match walk.next(&compiled.nfa, syms) {
                    Some((len, _)) => Step::Yield(
                        vec![Value::Str(take_text(&self.origin, len))],
                        self.origin.advance(len),
                    ),
                    None => Step::Done,
                }
            }
            (NodeKind::Eos, State::Eos { done }) => {
                if std::mem::replace(done, true) {
                    return Step::Done;
                }
                if self.origin.at_end() {
                    Step::Yield(Vec::new(), self.origin.clone())
                } else {
                    Step::Done
                }
            }
            (NodeKind::And(children), State::Sequence {
                frames,
                started,
                done,
            }) => match resume {
                Resume::Pull => {
                    if *done {
                        return Step::Done;
                    }
                    if !*started {
                        *started = true;
                        if children.is_empty() {
                            *done = true;
                            return Step::Yield(Vec::new(), self.origin.clone());
                        }
                        return Step::Call(Co::new(graph, children[0], self.origin.clone(), ctx));
                    }
                    // re-entry after a yield: advance the rightmost child
                    match frames.pop() {
                        Some(frame) => Step::Call(frame.co),
                        None => Step::Done,
                    }
                }
                Resume::Child(co, values, cursor) => {
                    frames.push(Frame {
                        co,
                        values,
                        cursor: cursor.clone(),
                    });
                    if frames.len() == children.len() {
                        Step::Yield(concat(frames), cursor)
                    } else {
                        Step::Call(Co::new(graph, children[frames.len()], cursor, ctx))
                    }
                }
                Resume::ChildDone => match frames.pop() {
                    Some(frame) => Step::Call(frame.co),
                    None => Step::Done,
                },
            },
            (kind @ (NodeKind::Or(_) | NodeKind::First(_)), State::Alternatives {
                index,
                active,
                started,
                committed,
            }) => {
                let children = match kind {
                    NodeKind::Or(cs) | NodeKind::First(cs) => cs,
                    _ => unreachable!("guarded by the outer match"),
                };
                let first_only = matches!(kind, NodeKind::First(_));
                match resume {
                    Resume::Pull => {
                        if !*started {
                            *started = true;
                            if children.is_empty() {
                                return Step::Done;
                            }
                            return Step::Call(Co::new(
                                graph,
                                children[0],
                                self.origin.clone(),
                                ctx,
                            ));
                        }
                        match active.take() {
                            Some(co) => Step::Call(co),
                            None => Step::Done,
                        }
                    }
                    Resume::Child(co, values, cursor) => {
                        if first_only {
                            *committed = true;
                        }
                        *active = Some(co);
                        Step::Yield(values, cursor)
                    }
                    Resume::ChildDone => {
                        if first_only && *committed {
                            return Step::Done;
                        }
                        *index += 1;
                        if *index < children.len() {
                            Step::Call(Co::new(
                                graph,
                                children[*index],
                                self.origin.clone(),
                                ctx,
                            ))
                        } else {
                            Step::Done
                        }
                    }
                }
            }
            (NodeKind::Repeat {
                child,
                low,
                high,
                greedy: true,
                ..
            }, State::Repeat {
                frames,
                await_cursor,
                started,
                done,
            }) => {
                let (child, low, high) = (*child, *low, *high);
                match resume {
                    Resume::Pull => {
                        if *done {
                            return Step::Done;
                        }
                        if !*started {
                            *started = true;
                            if high.is_some_and(|h| h < low) {
                                *done = true;
                                return Step::Done;
                            }
                            if high == Some(0) {
                                *done = true;
                                return Step::Yield(Vec::new(), self.origin.clone());
                            }
                            *await_cursor = self.origin.clone();
                            return Step::Call(Co::new(graph, child, self.origin.clone(), ctx));
                        }
                        // backtrack after a yield
                        match frames.pop() {
                            Some(frame) => {
                                *await_cursor = frames
                                    .last()
                                    .map(|f| f.cursor.clone())
                                    .unwrap_or_else(|| self.origin.clone());
                                Step::Call(frame.co)
                            }
                            None => {
                                *done = true;
                                Step::Done
                            }
                        }
                    }
                    Resume::Child(co, values, cursor) => {
                        if high.is_none() && cursor == *await_cursor {
                            // an unbounded repeat must make progress each
                            // iteration; skip the empty match
                            return Step::Call(co);
                        }
                        frames.push(Frame {
                            co,
                            values,
                            cursor: cursor.clone(),
                        });
                        if high.is_some_and(|h| frames.len() as u32 == h) {
                            return Step::Yield(concat(frames), cursor);
                        }
                        *await_cursor = cursor.clone();
                        Step::Call(Co::new(graph, child, cursor, ctx))
                    }
                    Resume::ChildDone => {
                        // cannot extend further: yield the current prefix
                        let count = frames.len() as u32;
                        if count >= low {
                            let cursor = frames
                                .last()
                                .map(|f| f.cursor.clone())
                                .unwrap_or_else(|| self.origin.clone());
                            return Step::Yield(concat(frames), cursor);
                        }
                        match frames.pop() {
                            Some(frame) => {
                                *await_cursor = frames
                                    .last()
                                    .map(|f| f.cursor.clone())
                                    .unwrap_or_else(|| self.origin.clone());
                                Step::Call(frame.co)
                            }
                            None => {
                                *done = true;
                                Step::Done
                            }
                        }
                    }
                }
            }
            (NodeKind::Repeat {
                child,
                low,
                high,
                greedy: false,
                ..
            }, State::RepeatLazy {
                gen,
                next_gen,
                count,
                emit,
                expand,
                started,
            }) => {
                let (child, low, high) = (*child, *low, *high);
                if !*started {
                    *started = true;
                    gen.push((Vec::new(), self.origin.clone()));
                }
                match resume {
                    Resume::Child(co, values, cursor) => {
                        let (base_values, base_cursor) = &gen[*expand];
                        if high.is_none() && cursor == *base_cursor {
                            return Step::Call(co);
                        }
                        let mut combined = base_values.clone();
                        combined.extend(values);
                        next_gen.push((combined, cursor));
                        return Step::Call(co);
                    }
                    Resume::ChildDone => {
                        *expand += 1;
                        if *expand < gen.len() {
                            let at = gen[*expand].1.clone();
                            return Step::Call(Co::new(graph, child, at, ctx));
                        }
                        *gen = std::mem::take(next_gen);
                        *count += 1;
                        *emit = 0;
                        // fall through to the emit loop below
                    }
                    Resume::Pull => {}
                }
                loop {
                    if gen.is_empty() {
                        return Step::Done;
                    }
                    if *count >= low && *emit < gen.len() {
                        let (values, cursor) = gen[*emit].clone();
                        *emit += 1;
                        return Step::Yield(values, cursor);
                    }
                    if high.is_some_and(|h| *count >= h) {
                        return Step::Done;
                    }
                    if *count < low || *emit >= gen.len() {
                        // grow the next generation
                        *expand = 0;
                        next_gen.clear();
                        let at = gen[0].1.clone();
                        return Step::Call(Co::new(graph, child, at, ctx));
                    }
                }
            }
            (NodeKind::Lookahead { child, positive }, State::Lookahead { resolved }) => {
                match resume {
                    Resume::Pull => {
                        if *resolved {
                            return Step::Done;
                        }
                        Step::Call(Co::new(graph, *child, self.origin.clone(), ctx))
                    }
                    Resume::Child(_, _, _) => {
                        *resolved = true;
                        if *positive {
                            Step::Yield(Vec::new(), self.origin.clone())
                        } else {
                            Step::Done
                        }
                    }
                    Resume::ChildDone => {
                        *resolved = true;
                        if *positive {
                            Step::Done
                        } else {
                            Step::Yield(Vec::new(), self.origin.clone())
                        }
                    }
                }
            }
            (
                NodeKind::Delayed(_) | NodeKind::Transform(_),
                State::Delegate {
                    target,
                    active,
                    started,
                },
            ) => match resume {
                Resume::Pull => {
                    if !*started {
                        *started = true;
                        return Step::Call(Co::new(graph, *target, self.origin.clone(), ctx));
                    }
                    match active.take() {
                        Some(co) => Step::Call(co),
                        None => Step::Done,
                    }
                }
                Resume::Child(co, values, cursor) => {
                    *active = Some(co);
                    Step::Yield(values, cursor)
                }
                Resume::ChildDone => Step::Done,
            },
            (NodeKind::Memo { .. }, State::Memo {
                key,
                child,
                kind,
                index,
                phase,
                guard,
            }) => {
                let child = *child;
                match resume {
                    Resume::Pull => {
                        if let MemoPhase::Init = phase {
                            if let MemoKind::Left = kind {
                                let cell = ctx.memo.depth_cell(key);
                                let g = DepthGuard::acquire(cell);
                                // no useful parse can recurse deeper than
                                // the remaining input is long
                                if g.depth() > self.origin.remaining() + 1 {
                                    *guard = Some(g);
                                    *phase = MemoPhase::Curtailed;
                                    return Step::Done;
                                }
                                *guard = Some(g);
                            }
                            *phase = MemoPhase::Ready;
                        }
                        if let MemoPhase::Curtailed = phase {
                            return Step::Done;
                        }
                        let entry = ctx.memo.entries.entry(key.clone()).or_default();
                        if *index < entry.results.len() {
                            let (values, cursor) = entry.results[*index].clone();
                            *index += 1;
                            return Step::Yield(values, cursor);
                        }
                        if entry.exhausted {
                            return Step::Done;
                        }
                        if entry.driving {
                            // re-entrant call: replayed the cache, stop
                            entry.reentered = true;
                            return Step::Done;
                        }
                        entry.driving = true;
                        entry.len_at_drive = entry.results.len();
                        if let Some(src) = entry.src.take() {
                            return Step::Call(src);
                        }
                        if !entry.started {
                            entry.started = true;
                            return Step::Call(Co::new(graph, child, self.origin.clone(), ctx));
                        }
                        // started, not driving, no source: a closed pool
                        // coroutine dropped the producer
                        entry.driving = false;
                        entry.exhausted = true;
                        Step::Done
                    }
                    Resume::Child(co, values, cursor) => {
                        let entry = ctx.memo.entries.entry(key.clone()).or_default();
                        if entry.regrowing
                            && entry
                                .results
                                .iter()
                                .any(|(v, c)| *v == values && *c == cursor)
                        {
                            // the regrow pass replays known results
                            return Step::Call(co);
                        }
                        entry.results.push((values.clone(), cursor.clone()));
                        entry.src = Some(co);
                        entry.driving = false;
                        *index = entry.results.len();
                        Step::Yield(values, cursor)
                    }
                    Resume::ChildDone => {
                        let entry = ctx.memo.entries.entry(key.clone()).or_default();
                        entry.driving = false;
                        if entry.reentered && entry.results.len() > entry.len_at_drive {
                            // the cache grew while a re-entrant call was
                            // curtailed: grow to the fixpoint
                            entry.reentered = false;
                            entry.regrowing = true;
                            entry.driving = true;
                            entry.len_at_drive = entry.results.len();
                            return Step::Call(Co::new(graph, child, self.origin.clone(), ctx));
                        }
                        entry.regrowing = false;
                        entry.exhausted = true;
                        entry.src = None;
                        Step::Done
                    }
                }
            }
            (NodeKind::Token {
                id,
                content,
                complete,
                ..
            }, State::Token {
                active,
                started,
                done,
            }) => match resume {
                Resume::Pull => {
                    if *done {
                        return Step::Done;
                    }
                    if !*started {
                        *started = true;
                        if self.origin.is_chars() {
                            return Step::Fail(ParseError::Lexer(format!(
                                "{} used outside a lexed stream; the lexer rewriter \
                                 must compile the token set first",
                                graph.describe(self.node)
                            )));
                        }
                        let lexeme = match self.origin.peek_lexeme() {
                            Some(lexeme) => lexeme,
                            None => return Step::Done,
                        };
                        if !lexeme.ids.contains(id) {
                            return Step::Done;
                        }
                        return match content {
                            None => {
                                *done = true;
                                Step::Yield(
                                    vec![Value::Str(lexeme.text.clone())],
                                    self.origin.advance(1),
                                )
                            }
                            Some(inner) => {
                                let text = lexeme.text.clone();
                                let inner_cursor = Cursor::from_text(&text, None);
                                Step::Call(Co::new(graph, *inner, inner_cursor, ctx))
                            }
                        };
                    }
                    match active.take() {
                        Some(co) => Step::Call(co),
                        None => Step::Done,
                    }
                }
                Resume::Child(co, values, cursor) => {
                    if cursor.at_end() || !*complete {
                        *active = Some(co);
                        Step::Yield(values, self.origin.advance(1))
                    } else {
                        // the content matcher must consume the whole lexeme
                        Step::Call(co)
                    }
                }
                Resume::ChildDone => Step::Done,
            },
            (NodeKind::Lexer {
                child,
                tokens,
                skip,
            }, State::Lexer { active, started }) => match resume {
                Resume::Pull => {
                    if !*started {
                        *started = true;
                        let stream = match crate::lexer::tokenize(
                            tokens,
                            skip,
                            &self.origin,
                            graph.alphabet.as_ref(),
                        ) {
                            Ok(stream) => stream,
                            Err(err) => return Step::Fail(err),
                        };
                        return Step::Call(Co::new(
                            graph,
                            *child,
                            Cursor::from_tokens(stream),
                            ctx,
                        ));
                    }
                    match active.take() {
                        Some(co) => Step::Call(co),
                        None => Step::Done,
                    }
                }
                Resume::Child(co, values, cursor) => {
                    *active = Some(co);
                    Step::Yield(values, cursor)
                }
                Resume::ChildDone => Step::Done,
            },
            (_, State::Broken { error }) => match error.take() {
                Some(error) => Step::Fail(error),
                None => Step::Done,
            },
            _ => Step::Fail(ParseError::MatcherType {
                node: graph.describe(self.node),
            }),
        }
    }
}

fn type_error(graph: &CompiledGraph, node: NodeId) -> Step {
    Step::Fail(ParseError::MatcherType {
        node: format!(
            "{} cannot match a token stream; put it inside a Token",
            graph.describe(node)
        ),
    })
}

/// Encode the remaining characters into the alphabet's symbol space,
/// stopping at the first character outside the alphabet (nothing past it
/// can match).
fn encode(graph: &CompiledGraph, cursor: &Cursor) -> Vec<Sym> {
    cursor
        .chars_to_end()
        .iter()
        .map_while(|&c| graph.alphabet.encode(c))
        .collect()
}

fn take_text(cursor: &Cursor, len: usize) -> String {
    cursor.chars_to_end()[..len].iter().collect()
}
