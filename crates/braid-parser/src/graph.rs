use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc as StdArc;

use braid_regex::{Alphabet, CharSet, Compiled, Label, Unicode};
use triomphe::Arc;

use crate::error::ParseError;
use crate::transform::{KArgs, TransformChain, TransformOp};
use crate::value::Value;

/// Index of a node in its grammar's arena.
///
/// The original implementation threads object references through a cyclic
/// heap graph; here the graph is an arena and cycles are just indices, so
/// rewriters can clone and patch without chasing proxies.
pub(crate) type NodeId = usize;

/// Whether a compiled `Regexp` node scans with the DFA (longest match,
/// one result) or simulates the NFA (all matches, greedy order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegexpMode {
    Dfa,
    Nfa,
}

/// Which memoizer wraps a `Memo` node's child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoKind {
    /// Left-recursion safe: adds curtailment on top of result sharing.
    Left,
    /// Plain result sharing keyed by position.
    Right,
}

#[derive(Clone)]
pub(crate) enum NodeKind {
    /// A fixed symbol sequence.
    Literal(String),
    /// One symbol from a set.
    Any(CharSet),
    /// A compiled regular expression scanned at the cursor.
    Regexp(Arc<Compiled>, RegexpMode),
    /// Sequence: the cartesian product of child results, in order.
    And(Vec<NodeId>),
    /// Ordered alternation: every branch is tried.
    Or(Vec<NodeId>),
    /// Committed alternation: the first branch to yield wins outright.
    First(Vec<NodeId>),
    Repeat {
        child: NodeId,
        low: u32,
        high: Option<u32>,
        greedy: bool,
        separator: Option<NodeId>,
    },
    /// Zero-width assertion.
    Lookahead { child: NodeId, positive: bool },
    /// Forward reference; bound at most once. Unbound at match time is a
    /// structural error.
    Delayed(Option<NodeId>),
    /// Result post-processing; the chain lives in the node's `transform`.
    Transform(NodeId),
    Memo {
        child: NodeId,
        kind: MemoKind,
    },
    /// Lexer-level matcher: selects by token id, optionally reparsing the
    /// lexeme with a content matcher.
    Token {
        id: Label,
        pattern: String,
        content: Option<NodeId>,
        complete: bool,
    },
    /// Installed by the lexer rewriter: tokenizes the stream and runs the
    /// inner graph over the tokens.
    Lexer {
        child: NodeId,
        tokens: Arc<Compiled>,
        skip: Arc<Compiled>,
    },
    /// Matches only at end of stream.
    Eos,
}

#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) transform: TransformChain,
    pub(crate) describe: Option<String>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Node {
        Node {
            kind,
            transform: TransformChain::new(),
            describe: None,
        }
    }
}

impl NodeKind {
    pub(crate) fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Literal(_)
            | NodeKind::Any(_)
            | NodeKind::Regexp(..)
            | NodeKind::Eos => Vec::new(),
            NodeKind::And(cs) | NodeKind::Or(cs) | NodeKind::First(cs) => cs.clone(),
            NodeKind::Repeat {
                child, separator, ..
            } => match separator {
                Some(sep) => vec![*child, *sep],
                None => vec![*child],
            },
            NodeKind::Lookahead { child, .. }
            | NodeKind::Transform(child)
            | NodeKind::Memo { child, .. }
            | NodeKind::Lexer { child, .. } => vec![*child],
            NodeKind::Delayed(target) => target.iter().copied().collect(),
            NodeKind::Token { content, .. } => content.iter().copied().collect(),
        }
    }

    /// The same kind with children renumbered, used by graph cloning.
    pub(crate) fn map_children(&self, mut f: impl FnMut(NodeId) -> NodeId) -> NodeKind {
        match self {
            NodeKind::Literal(_)
            | NodeKind::Any(_)
            | NodeKind::Regexp(..)
            | NodeKind::Eos => self.clone(),
            NodeKind::And(cs) => NodeKind::And(cs.iter().map(|&c| f(c)).collect()),
            NodeKind::Or(cs) => NodeKind::Or(cs.iter().map(|&c| f(c)).collect()),
            NodeKind::First(cs) => NodeKind::First(cs.iter().map(|&c| f(c)).collect()),
            NodeKind::Repeat {
                child,
                low,
                high,
                greedy,
                separator,
            } => NodeKind::Repeat {
                child: f(*child),
                low: *low,
                high: *high,
                greedy: *greedy,
                separator: separator.map(&mut f),
            },
            NodeKind::Lookahead { child, positive } => NodeKind::Lookahead {
                child: f(*child),
                positive: *positive,
            },
            NodeKind::Transform(child) => NodeKind::Transform(f(*child)),
            NodeKind::Memo { child, kind } => NodeKind::Memo {
                child: f(*child),
                kind: *kind,
            },
            NodeKind::Delayed(target) => NodeKind::Delayed(target.map(&mut f)),
            NodeKind::Token {
                id,
                pattern,
                content,
                complete,
            } => NodeKind::Token {
                id: *id,
                pattern: pattern.clone(),
                content: content.map(&mut f),
                complete: *complete,
            },
            NodeKind::Lexer {
                child,
                tokens,
                skip,
            } => NodeKind::Lexer {
                child: f(*child),
                tokens: tokens.clone(),
                skip: skip.clone(),
            },
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            NodeKind::Literal(_) => "Literal",
            NodeKind::Any(_) => "Any",
            NodeKind::Regexp(..) => "Regexp",
            NodeKind::And(_) => "And",
            NodeKind::Or(_) => "Or",
            NodeKind::First(_) => "First",
            NodeKind::Repeat { .. } => "Repeat",
            NodeKind::Lookahead { .. } => "Lookahead",
            NodeKind::Delayed(_) => "Delayed",
            NodeKind::Transform(_) => "Transform",
            NodeKind::Memo { .. } => "Memo",
            NodeKind::Token { .. } => "Token",
            NodeKind::Lexer { .. } => "Lexer",
            NodeKind::Eos => "Eos",
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        let children = self.children();
        if !children.is_empty() {
            write!(f, "{children:?}")?;
        }
        Ok(())
    }
}

/// The rewritten, immutable evaluation graph handed to the trampoline.
/// Shared between parser clones and across invocations.
pub(crate) struct CompiledGraph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) alphabet: StdArc<dyn Alphabet>,
}

impl CompiledGraph {
    pub(crate) fn describe(&self, id: NodeId) -> String {
        describe(&self.nodes, id)
    }
}

pub(crate) fn describe(nodes: &[Node], id: NodeId) -> String {
    let node = &nodes[id];
    if let Some(label) = &node.describe {
        return label.clone();
    }
    match &node.kind {
        NodeKind::Literal(text) => format!("Literal({text:?})"),
        NodeKind::Any(_) => "Any(...)".to_string(),
        NodeKind::Regexp(compiled, _) => format!("Regexp({})", compiled.source),
        NodeKind::Token { id, pattern, .. } => format!("Token({id}:{pattern})"),
        other => other.name().to_string(),
    }
}

struct GrammarInner {
    nodes: Vec<Node>,
    alphabet: StdArc<dyn Alphabet>,
    next_token: Label,
}

impl GrammarInner {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// The grammar under construction: an arena of matcher nodes plus the
/// token-id allocator.
///
/// This is the explicit builder that replaces the original's per-thread
/// operator namespace; handles ([`M`]) stay tied to the grammar that made
/// them and combining handles from different grammars is a programming
/// error.
#[derive(Clone)]
pub struct Grammar {
    inner: Rc<RefCell<GrammarInner>>,
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::new()
    }
}

impl Grammar {
    /// A grammar over the Unicode alphabet.
    pub fn new() -> Grammar {
        Grammar::with_alphabet(StdArc::new(Unicode))
    }

    pub fn with_alphabet(alphabet: StdArc<dyn Alphabet>) -> Grammar {
        Grammar {
            inner: Rc::new(RefCell::new(GrammarInner {
                nodes: Vec::new(),
                alphabet,
                next_token: 0,
            })),
        }
    }

    fn push(&self, node: Node) -> M {
        let id = self.inner.borrow_mut().push(node);
        M {
            inner: self.inner.clone(),
            id,
        }
    }

    /// Matches the literal text, yielding it as one value.
    pub fn lit(&self, text: &str) -> M {
        self.push(Node::new(NodeKind::Literal(text.to_string())))
    }

    /// Matches one character drawn from `chars`.
    pub fn any(&self, chars: &str) -> M {
        let alphabet = self.inner.borrow().alphabet.clone();
        let set = CharSet::from_ranges(
            chars
                .chars()
                .filter_map(|c| alphabet.encode(c))
                .map(|s| (s, s)),
        );
        self.push(Node::new(NodeKind::Any(set)))
    }

    /// Matches one character in the inclusive range.
    pub fn char_range(&self, lo: char, hi: char) -> M {
        let alphabet = self.inner.borrow().alphabet.clone();
        let set = match (alphabet.encode(lo), alphabet.encode(hi)) {
            (Some(lo), Some(hi)) => CharSet::range(lo, hi),
            _ => CharSet::empty(),
        };
        self.push(Node::new(NodeKind::Any(set)))
    }

    /// Compiles a regular expression matcher. With full backtracking the
    /// NFA scanner is used; the regexp rewriter switches subgraphs to DFA
    /// scanning when configured to.
    pub fn regexp(&self, pattern: &str) -> Result<M, ParseError> {
        let alphabet = self.inner.borrow().alphabet.clone();
        let compiled = Compiled::parse(pattern, alphabet.as_ref())?;
        Ok(self.push(Node::new(NodeKind::Regexp(
            Arc::new(compiled),
            RegexpMode::Nfa,
        ))))
    }

    /// Sequence of several matchers.
    pub fn all(&self, children: &[M]) -> M {
        let ids = children.iter().map(|m| self.claim(m)).collect();
        self.push(Node::new(NodeKind::And(ids)))
    }

    /// Ordered alternation over several matchers.
    pub fn one_of(&self, children: &[M]) -> M {
        let ids = children.iter().map(|m| self.claim(m)).collect();
        self.push(Node::new(NodeKind::Or(ids)))
    }

    /// Committed alternation: only the first successful branch's results.
    pub fn first_of(&self, children: &[M]) -> M {
        let ids = children.iter().map(|m| self.claim(m)).collect();
        self.push(Node::new(NodeKind::First(ids)))
    }

    /// Matches only at end of stream.
    pub fn eos(&self) -> M {
        self.push(Node::new(NodeKind::Eos))
    }

    /// A forward reference, for recursive grammars.
    pub fn delayed(&self) -> Delayed {
        let m = self.push(Node::new(NodeKind::Delayed(None)));
        Delayed { m }
    }

    /// Declare a token recognized by the lexer. Ids are allocated in
    /// declaration order, which is also the tie-break order when several
    /// tokens match the same lexeme.
    pub fn token(&self, pattern: &str) -> TokenHandle {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_token;
            inner.next_token += 1;
            id
        };
        TokenHandle {
            grammar: self.clone(),
            id,
            pattern: pattern.to_string(),
        }
    }

    fn claim(&self, m: &M) -> NodeId {
        assert!(
            Rc::ptr_eq(&self.inner, &m.inner),
            "matchers belong to different grammars"
        );
        m.id
    }

    pub(crate) fn alphabet(&self) -> StdArc<dyn Alphabet> {
        self.inner.borrow().alphabet.clone()
    }

    /// Snapshot the arena for the rewrite pipeline.
    pub(crate) fn export(&self) -> Vec<Node> {
        self.inner.borrow().nodes.clone()
    }
}

/// A handle to one matcher node. Cheap to clone; all structural operators
/// and combinator methods live here.
#[derive(Clone)]
pub struct M {
    inner: Rc<RefCell<GrammarInner>>,
    pub(crate) id: NodeId,
}

impl M {
    fn grammar(&self) -> Grammar {
        Grammar {
            inner: self.inner.clone(),
        }
    }

    fn push(&self, node: Node) -> M {
        let id = self.inner.borrow_mut().push(node);
        M {
            inner: self.inner.clone(),
            id,
        }
    }

    fn same_grammar(&self, other: &M) {
        assert!(
            Rc::ptr_eq(&self.inner, &other.inner),
            "matchers belong to different grammars"
        );
    }

    fn wrap(&self, op: TransformOp) -> M {
        let mut node = Node::new(NodeKind::Transform(self.id));
        node.transform = TransformChain::of(op);
        self.push(node)
    }

    /// Apply `f` to each value of each result.
    pub fn map(&self, f: impl Fn(Value) -> Value + 'static) -> M {
        self.wrap(TransformOp::Map(Rc::new(f)))
    }

    /// Replace each result list with a single value built from it.
    pub fn apply(&self, f: impl Fn(Vec<Value>) -> Value + 'static) -> M {
        self.wrap(TransformOp::Apply(Rc::new(f)))
    }

    /// Replace each result list wholesale.
    pub fn apply_raw(&self, f: impl Fn(Vec<Value>) -> Vec<Value> + 'static) -> M {
        self.wrap(TransformOp::ApplyRaw(Rc::new(f)))
    }

    /// Apply with named context (results and span positions).
    pub fn kapply(
        &self,
        f: impl Fn(KArgs<'_>) -> Result<Vec<Value>, ParseError> + 'static,
    ) -> M {
        self.wrap(TransformOp::KApply(Rc::new(f)))
    }

    /// Match and then discard the results (the `~` of the original).
    pub fn drop_value(&self) -> M {
        self.wrap(TransformOp::Drop)
    }

    /// Suppress results the predicate rejects; backtracking continues.
    pub fn filter(&self, pred: impl Fn(&[Value]) -> bool + 'static) -> M {
        self.wrap(TransformOp::Filter(Rc::new(pred)))
    }

    /// Turn a successful match into a fatal error of the given kind.
    pub fn raise(&self, kind: &str) -> M {
        self.wrap(TransformOp::Raise(kind.to_string()))
    }

    /// Fold each result list with `+` (string/list concatenation).
    pub fn join(&self) -> M {
        self.wrap(TransformOp::Add)
    }

    /// Greedy repetition between `low` and `high` matches (`None` for
    /// unbounded): longer matches are tried first.
    pub fn repeat(&self, low: u32, high: impl Into<Option<u32>>) -> M {
        self.push(Node::new(NodeKind::Repeat {
            child: self.id,
            low,
            high: high.into(),
            greedy: true,
            separator: None,
        }))
    }

    /// Non-greedy repetition: shorter matches first.
    pub fn repeat_nongreedy(&self, low: u32, high: impl Into<Option<u32>>) -> M {
        self.push(Node::new(NodeKind::Repeat {
            child: self.id,
            low,
            high: high.into(),
            greedy: false,
            separator: None,
        }))
    }

    /// Greedy repetition with a separator woven between matches. The
    /// separator's values are kept; drop them on the separator itself.
    pub fn separated_by(&self, sep: &M, low: u32, high: impl Into<Option<u32>>) -> M {
        self.same_grammar(sep);
        self.push(Node::new(NodeKind::Repeat {
            child: self.id,
            low,
            high: high.into(),
            greedy: true,
            separator: Some(sep.id),
        }))
    }

    /// Zero or more matches.
    pub fn many(&self) -> M {
        self.repeat(0, None)
    }

    /// One or more matches.
    pub fn many1(&self) -> M {
        self.repeat(1, None)
    }

    /// Zero or one match (longer first).
    pub fn opt(&self) -> M {
        self.repeat(0, 1)
    }

    /// Positive zero-width assertion.
    pub fn lookahead(&self) -> M {
        self.push(Node::new(NodeKind::Lookahead {
            child: self.id,
            positive: true,
        }))
    }

    /// Negative zero-width assertion.
    pub fn not_lookahead(&self) -> M {
        self.push(Node::new(NodeKind::Lookahead {
            child: self.id,
            positive: false,
        }))
    }

    /// Wrap in a memoizer.
    pub fn mem(&self, kind: MemoKind) -> M {
        self.push(Node::new(NodeKind::Memo {
            child: self.id,
            kind,
        }))
    }

    /// Snapshot the arena for the rewrite pipeline.
    pub(crate) fn export(&self) -> (Vec<Node>, NodeId, StdArc<dyn Alphabet>) {
        let inner = self.inner.borrow();
        (inner.nodes.clone(), self.id, inner.alphabet.clone())
    }

    /// Attach a describe label, used in error messages and debug output.
    pub fn named(&self, label: &str) -> M {
        let mut inner = self.inner.borrow_mut();
        inner.nodes[self.id].describe = Some(label.to_string());
        drop(inner);
        self.clone()
    }
}

impl fmt::Debug for M {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        write!(f, "M({})", describe(&inner.nodes, self.id))
    }
}

/// A forward reference returned by [`Grammar::delayed`]. Bind it exactly
/// once with [`Delayed::define`]; cycles in the grammar must pass through
/// one of these.
#[derive(Clone)]
pub struct Delayed {
    m: M,
}

impl Delayed {
    /// The matcher handle for use inside the recursive definition.
    pub fn matcher(&self) -> M {
        self.m.clone()
    }

    /// Bind the reference. Binding twice is a programming error.
    pub fn define(&self, target: &M) {
        self.m.same_grammar(target);
        let mut inner = self.m.inner.borrow_mut();
        match &mut inner.nodes[self.m.id].kind {
            NodeKind::Delayed(slot @ None) => *slot = Some(target.id),
            NodeKind::Delayed(Some(_)) => panic!("Delayed already defined"),
            _ => unreachable!("Delayed handle points at a Delayed node"),
        }
    }
}

/// A token declaration: an id plus the pattern the lexer will compile.
/// Call [`TokenHandle::matcher`] for the bare token or specialize the
/// content with [`TokenHandle::with`]/[`TokenHandle::lit`]; every
/// specialization shares the same id, mirroring the original's cloneable
/// Token instances.
#[derive(Clone)]
pub struct TokenHandle {
    grammar: Grammar,
    id: Label,
    pattern: String,
}

impl TokenHandle {
    pub fn id(&self) -> Label {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Matches any lexeme carrying this token's id, yielding the text.
    pub fn matcher(&self) -> M {
        self.grammar.push(Node::new(NodeKind::Token {
            id: self.id,
            pattern: self.pattern.clone(),
            content: None,
            complete: true,
        }))
    }

    /// Matches a lexeme with this id whose text the content matcher
    /// accepts completely.
    pub fn with(&self, content: &M) -> M {
        let id = self.grammar.claim(content);
        self.grammar.push(Node::new(NodeKind::Token {
            id: self.id,
            pattern: self.pattern.clone(),
            content: Some(id),
            complete: true,
        }))
    }

    /// Like [`TokenHandle::with`] but the content may stop early.
    pub fn with_prefix(&self, content: &M) -> M {
        let id = self.grammar.claim(content);
        self.grammar.push(Node::new(NodeKind::Token {
            id: self.id,
            pattern: self.pattern.clone(),
            content: Some(id),
            complete: false,
        }))
    }

    /// Shorthand for a content matcher that is a literal.
    pub fn lit(&self, text: &str) -> M {
        let content = self.grammar.lit(text);
        self.with(&content)
    }
}

/// Anything that can stand on the right of a matcher operator: handles,
/// references to handles, and literal text.
pub trait IntoM {
    fn into_m(self, grammar: &Grammar) -> M;
}

impl IntoM for M {
    fn into_m(self, _grammar: &Grammar) -> M {
        self
    }
}

impl IntoM for &M {
    fn into_m(self, _grammar: &Grammar) -> M {
        self.clone()
    }
}

impl IntoM for &Delayed {
    fn into_m(self, _grammar: &Grammar) -> M {
        self.matcher()
    }
}

impl IntoM for &str {
    fn into_m(self, grammar: &Grammar) -> M {
        grammar.lit(self)
    }
}

impl IntoM for char {
    fn into_m(self, grammar: &Grammar) -> M {
        grammar.lit(&self.to_string())
    }
}

macro_rules! binary_operator {
    ($trait_:ident, $method:ident, $build:ident) => {
        impl<R: IntoM> std::ops::$trait_<R> for M {
            type Output = M;
            fn $method(self, rhs: R) -> M {
                let grammar = self.grammar();
                let rhs = rhs.into_m(&grammar);
                self.same_grammar(&rhs);
                grammar.$build(&[self, rhs])
            }
        }

        impl<R: IntoM> std::ops::$trait_<R> for &M {
            type Output = M;
            fn $method(self, rhs: R) -> M {
                let grammar = self.grammar();
                let rhs = rhs.into_m(&grammar);
                self.same_grammar(&rhs);
                grammar.$build(&[self.clone(), rhs])
            }
        }
    };
}

// `a & b` sequences, `a | b` alternates.
binary_operator!(BitAnd, bitand, all);
binary_operator!(BitOr, bitor, one_of);

macro_rules! delayed_operator {
    ($trait_:ident, $method:ident) => {
        impl<R: IntoM> std::ops::$trait_<R> for &Delayed {
            type Output = M;
            fn $method(self, rhs: R) -> M {
                std::ops::$trait_::$method(self.matcher(), rhs)
            }
        }
    };
}

// forward references compose like any other matcher
delayed_operator!(BitAnd, bitand);
delayed_operator!(BitOr, bitor);
delayed_operator!(Add, add);

// `a + b` sequences and joins the matched text into one value.
impl<R: IntoM> std::ops::Add<R> for M {
    type Output = M;
    fn add(self, rhs: R) -> M {
        let grammar = self.grammar();
        let rhs = rhs.into_m(&grammar);
        self.same_grammar(&rhs);
        grammar.all(&[self, rhs]).join()
    }
}

impl<R: IntoM> std::ops::Add<R> for &M {
    type Output = M;
    fn add(self, rhs: R) -> M {
        let grammar = self.grammar();
        let rhs = rhs.into_m(&grammar);
        self.same_grammar(&rhs);
        grammar.all(&[self.clone(), rhs]).join()
    }
}
