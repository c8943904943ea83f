use std::collections::{HashMap, HashSet};
use std::sync::Arc as StdArc;

use braid_regex::{Alphabet, Compiled, Label, Pattern};
use indexmap::IndexMap;
use triomphe::Arc;

use crate::error::ParseError;
use crate::graph::{MemoKind, Node, NodeId, NodeKind, RegexpMode};

/// A graph-to-graph transform applied before parsing begins.
///
/// Rewriters run in the order the configuration lists them; each consumes
/// an arena and produces a new one (except `OptimizeOr`, which reorders
/// alternatives in place, as the original does).
#[derive(Debug, Clone)]
pub enum Rewriter {
    /// Merge nested `And`/`And` and `Or`/`Or` where no transform
    /// intervenes, reducing trampoline depth.
    Flatten,
    /// Push `Transform` wrappers into their children so one coroutine does
    /// the work of two.
    ComposeTransforms,
    /// Reorder `Or` alternatives so left-recursive cycle edges come last.
    OptimizeOr { conservative: bool },
    /// Wrap nodes on left-recursive cycles in LMemo; everything else in
    /// RMemo when `full` is set.
    ContextMemoize { conservative: bool, full: bool },
    /// `OptimizeOr` followed by `ContextMemoize`.
    AutoMemoize { conservative: bool, full: bool },
    /// Wrap every node in the given memoizer.
    Memoize(MemoKind),
    /// Collapse regular subgraphs into single compiled `Regexp` nodes.
    Regexp { use_dfa: bool },
    /// Compile the token set and install the `Lexer` wrapper. A no-op for
    /// grammars without tokens.
    Lexer,
    /// Override one constructor argument on every node it applies to,
    /// e.g. to swap repetition order or relax token completion globally.
    SetArguments(NodeArg),
}

/// The node arguments [`Rewriter::SetArguments`] can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeArg {
    /// Force every repetition greedy or non-greedy.
    RepeatGreedy(bool),
    /// Require (or stop requiring) token content matchers to consume the
    /// whole lexeme.
    TokenComplete(bool),
}

impl Rewriter {
    pub(crate) fn apply(
        &self,
        nodes: Vec<Node>,
        root: NodeId,
        alphabet: &StdArc<dyn Alphabet>,
        discard: &str,
    ) -> Result<(Vec<Node>, NodeId), ParseError> {
        match self {
            Rewriter::Flatten => Ok(flatten(nodes, root)),
            Rewriter::ComposeTransforms => Ok(compose_transforms(nodes, root)),
            Rewriter::OptimizeOr { conservative } => Ok(optimize_or(nodes, root, *conservative)),
            Rewriter::ContextMemoize { conservative, full } => {
                Ok(context_memoize(nodes, root, *conservative, *full))
            }
            Rewriter::AutoMemoize { conservative, full } => {
                let (nodes, root) = optimize_or(nodes, root, *conservative);
                Ok(context_memoize(nodes, root, *conservative, *full))
            }
            Rewriter::Memoize(kind) => Ok(memoize(nodes, root, *kind)),
            Rewriter::Regexp { use_dfa } => Ok(regexp_rewrite(nodes, root, alphabet, *use_dfa)),
            Rewriter::Lexer => lexer_rewrite(nodes, root, alphabet, discard),
            Rewriter::SetArguments(arg) => Ok(set_arguments(nodes, root, *arg)),
        }
    }
}

/// Clone the graph with one constructor argument overridden wherever it
/// applies.
fn set_arguments(nodes: Vec<Node>, root: NodeId, arg: NodeArg) -> (Vec<Node>, NodeId) {
    clone_graph(&nodes, root, |dst, node, kind, _| {
        let kind = match (arg, kind) {
            (
                NodeArg::RepeatGreedy(greedy),
                NodeKind::Repeat {
                    child,
                    low,
                    high,
                    separator,
                    ..
                },
            ) => NodeKind::Repeat {
                child,
                low,
                high,
                greedy,
                separator,
            },
            (
                NodeArg::TokenComplete(complete),
                NodeKind::Token {
                    id,
                    pattern,
                    content,
                    ..
                },
            ) => NodeKind::Token {
                id,
                pattern,
                content,
                complete,
            },
            (_, kind) => kind,
        };
        plain(dst, node, kind)
    })
}

/// The shared delayed-clone primitive: copy the graph in postorder,
/// reproducing each node through `mapper`, inserting fresh `Delayed`
/// placeholders for cycle back-edges and patching them once the true
/// clone exists. Pass-through `Delayed` nodes (bound, no transform) are
/// collapsed so repeated rewriting does not stack them up.
///
/// The mapper receives the destination arena, the source node, its kind
/// with children renumbered into the destination, and the source id (for
/// decisions driven by source-side analysis).
pub(crate) fn clone_graph<F>(src: &[Node], root: NodeId, mut mapper: F) -> (Vec<Node>, NodeId)
where
    F: FnMut(&mut Vec<Node>, &Node, NodeKind, NodeId) -> NodeId,
{
    let mut dst: Vec<Node> = Vec::new();
    let mut done: HashMap<NodeId, NodeId> = HashMap::new();
    let mut placeholder: HashMap<NodeId, NodeId> = HashMap::new();
    let mut in_progress: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
    in_progress.insert(root);

    while let Some(&mut (n, ref mut next_child)) = stack.last_mut() {
        let children = src[n].kind.children();
        if *next_child < children.len() {
            let c = children[*next_child];
            *next_child += 1;
            if !done.contains_key(&c) && !in_progress.contains(&c) {
                in_progress.insert(c);
                stack.push((c, 0));
            }
            continue;
        }
        stack.pop();
        in_progress.remove(&n);

        let kind = src[n].kind.map_children(|c| match done.get(&c) {
            Some(&id) => id,
            // a back edge into a node still being cloned
            None => *placeholder.entry(c).or_insert_with(|| {
                dst.push(Node::new(NodeKind::Delayed(None)));
                dst.len() - 1
            }),
        });

        let new_id = match kind {
            // collapse a bound pass-through reference
            NodeKind::Delayed(Some(target)) if src[n].transform.is_empty() => target,
            kind => mapper(&mut dst, &src[n], kind, n),
        };
        done.insert(n, new_id);
        if let Some(&p) = placeholder.get(&n) {
            if let NodeKind::Delayed(slot @ None) = &mut dst[p].kind {
                *slot = Some(new_id);
            }
        }
    }
    (dst, done[&root])
}

/// Rewrite `Repeat` nodes with separators into the woven form
/// `item (sep item){n}` built from plain nodes, so evaluation only ever
/// sees separator-free repetition. Runs unconditionally before the
/// configured rewriters.
pub(crate) fn desugar_separators(nodes: Vec<Node>, root: NodeId) -> (Vec<Node>, NodeId) {
    clone_graph(&nodes, root, |dst, node, kind, _| {
        let (child, low, high, greedy, sep) = match kind {
            NodeKind::Repeat {
                child,
                low,
                high,
                greedy,
                separator: Some(sep),
            } => (child, low, high, greedy, sep),
            other => return plain(dst, node, other),
        };
        let push = |dst: &mut Vec<Node>, kind: NodeKind| -> NodeId {
            dst.push(Node::new(kind));
            dst.len() - 1
        };
        let woven = if high == Some(0) {
            push(dst, NodeKind::And(Vec::new()))
        } else {
            let pair = push(dst, NodeKind::And(vec![sep, child]));
            let rest = push(
                dst,
                NodeKind::Repeat {
                    child: pair,
                    low: low.saturating_sub(1),
                    high: high.map(|h| h - 1),
                    greedy,
                    separator: None,
                },
            );
            let seq = push(dst, NodeKind::And(vec![child, rest]));
            if low >= 1 {
                seq
            } else {
                let empty = push(dst, NodeKind::And(Vec::new()));
                // greedy repetition tries the longer branch first
                let branches = if greedy { vec![seq, empty] } else { vec![empty, seq] };
                push(dst, NodeKind::Or(branches))
            }
        };
        dst[woven].transform = node.transform.clone();
        dst[woven].describe = node.describe.clone();
        woven
    })
}

/// Plain cloning: reproduce the node with its transform and describe data.
fn plain(dst: &mut Vec<Node>, node: &Node, kind: NodeKind) -> NodeId {
    dst.push(Node {
        kind,
        transform: node.transform.clone(),
        describe: node.describe.clone(),
    });
    dst.len() - 1
}

/// Drop nodes that became unreachable during rewriting and renumber the
/// survivors. Run once after the whole pipeline.
pub(crate) fn compact(nodes: Vec<Node>, root: NodeId) -> (Vec<Node>, NodeId) {
    clone_graph(&nodes, root, |dst, node, kind, _| plain(dst, node, kind))
}

fn flatten(nodes: Vec<Node>, root: NodeId) -> (Vec<Node>, NodeId) {
    fn splice(
        dst: &[Node],
        parent_plain: bool,
        children: &[NodeId],
        same: fn(&NodeKind) -> Option<&Vec<NodeId>>,
    ) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(children.len());
        for &c in children {
            match same(&dst[c].kind) {
                Some(inner) if parent_plain && dst[c].transform.is_empty() => {
                    out.extend(inner.iter().copied());
                }
                _ => out.push(c),
            }
        }
        out
    }

    clone_graph(&nodes, root, |dst, node, kind, _| {
        let parent_plain = node.transform.is_empty();
        let kind = match kind {
            NodeKind::And(children) => NodeKind::And(splice(
                dst,
                parent_plain,
                &children,
                |k| match k {
                    NodeKind::And(cs) => Some(cs),
                    _ => None,
                },
            )),
            NodeKind::Or(children) => NodeKind::Or(splice(
                dst,
                parent_plain,
                &children,
                |k| match k {
                    NodeKind::Or(cs) => Some(cs),
                    _ => None,
                },
            )),
            other => other,
        };
        plain(dst, node, kind)
    })
}

/// Whether a transform chain can be pushed into a node of this kind.
/// `Delayed` is a proxy, `Memo` must stay transparent for memo keys, and
/// token/lexer nodes run their children over a different stream.
fn composable(kind: &NodeKind) -> bool {
    !matches!(
        kind,
        NodeKind::Delayed(_)
            | NodeKind::Memo { .. }
            | NodeKind::Token { .. }
            | NodeKind::Lexer { .. }
    )
}

fn compose_transforms(nodes: Vec<Node>, root: NodeId) -> (Vec<Node>, NodeId) {
    clone_graph(&nodes, root, |dst, node, kind, _| {
        if let NodeKind::Transform(child) = kind {
            if composable(&dst[child].kind) {
                // fold into a private copy of the child; the shared
                // original (if any other parent uses it) is untouched
                let mut merged = dst[child].clone();
                merged.transform = merged.transform.compose(node.transform.clone());
                if merged.describe.is_none() {
                    merged.describe = node.describe.clone();
                }
                dst.push(merged);
                return dst.len() - 1;
            }
        }
        plain(dst, node, kind)
    })
}

fn memoize(nodes: Vec<Node>, root: NodeId, kind: MemoKind) -> (Vec<Node>, NodeId) {
    clone_graph(&nodes, root, |dst, node, new_kind, _| {
        let id = plain(dst, node, new_kind);
        if matches!(dst[id].kind, NodeKind::Delayed(_)) {
            // memoizing the proxy would hide it from later rewriters
            return id;
        }
        dst.push(Node::new(NodeKind::Memo { child: id, kind }));
        dst.len() - 1
    })
}

/// All nodes reachable from `root`, in depth-first preorder.
pub(crate) fn preorder(nodes: &[Node], root: NodeId) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        if !seen.insert(n) {
            continue;
        }
        order.push(n);
        let children = nodes[n].kind.children();
        for &c in children.iter().rev() {
            stack.push(c);
        }
    }
    order
}

/// All simple cycles from `origin` back to itself, as paths that start and
/// end with `origin`.
fn loops(nodes: &[Node], origin: NodeId) -> Vec<Vec<NodeId>> {
    let mut found = Vec::new();
    let mut stack: Vec<Vec<NodeId>> = vec![vec![origin]];
    while let Some(path) = stack.pop() {
        let parent = *path.last().expect("paths are never empty");
        for c in nodes[parent].kind.children() {
            if c == origin {
                let mut cycle = path.clone();
                cycle.push(c);
                found.push(cycle);
            } else if !path.contains(&c) {
                let mut longer = path.clone();
                longer.push(c);
                stack.push(longer);
            }
        }
    }
    found
}

/// An estimate of the left-recursive cycles from `origin`: walk leftmost
/// paths only, except that every branch of an alternation is leftmost and
/// a `Lookahead` child consumes nothing, so its right sibling is still
/// leftmost.
fn left_loops(nodes: &[Node], origin: NodeId) -> Vec<Vec<NodeId>> {
    let mut found = Vec::new();
    let mut known: HashSet<NodeId> = HashSet::from([origin]);
    let mut stack: Vec<Vec<NodeId>> = vec![vec![origin]];
    while let Some(path) = stack.pop() {
        let parent = *path.last().expect("paths are never empty");
        let branches = matches!(nodes[parent].kind, NodeKind::Or(_) | NodeKind::First(_));
        for c in nodes[parent].kind.children() {
            let mut family = path.clone();
            family.push(c);
            if c == origin {
                found.push(family);
            } else if known.insert(c) {
                stack.push(family);
            }
            let lookahead = matches!(nodes[c].kind, NodeKind::Lookahead { .. });
            if !branches && !lookahead {
                break;
            }
        }
    }
    found
}

fn either_loops(nodes: &[Node], origin: NodeId, conservative: bool) -> Vec<Vec<NodeId>> {
    if conservative {
        loops(nodes, origin)
    } else {
        left_loops(nodes, origin)
    }
}

/// Move the cycle edge of each left-recursive loop to the end of any `Or`
/// it passes through, so terminating alternatives are tried before the
/// memo limit curtails the recursion.
fn optimize_or(mut nodes: Vec<Node>, root: NodeId, conservative: bool) -> (Vec<Node>, NodeId) {
    let delayed: Vec<NodeId> = preorder(&nodes, root)
        .into_iter()
        .filter(|&n| matches!(nodes[n].kind, NodeKind::Delayed(_)))
        .collect();
    for d in delayed {
        for cycle in either_loops(&nodes, d, conservative) {
            for i in 0..cycle.len() - 1 {
                let target = cycle[i + 1];
                if let NodeKind::Or(children) = &mut nodes[cycle[i]].kind {
                    if let Some(pos) = children.iter().position(|&c| c == target) {
                        let moved = children.remove(pos);
                        children.push(moved);
                    }
                }
            }
        }
    }
    (nodes, root)
}

/// Wrap the nodes involved in (estimated) left-recursive cycles in LMemo;
/// the rest get RMemo when `full` is set and stay bare otherwise.
fn context_memoize(
    nodes: Vec<Node>,
    root: NodeId,
    conservative: bool,
    full: bool,
) -> (Vec<Node>, NodeId) {
    let mut dangerous: HashSet<NodeId> = HashSet::new();
    for n in preorder(&nodes, root) {
        if matches!(nodes[n].kind, NodeKind::Delayed(_)) {
            for cycle in either_loops(&nodes, n, conservative) {
                dangerous.extend(cycle);
            }
        }
    }
    clone_graph(&nodes, root, |dst, node, new_kind, src_id| {
        let id = plain(dst, node, new_kind);
        if matches!(dst[id].kind, NodeKind::Delayed(_)) {
            return id;
        }
        let kind = if dangerous.contains(&src_id) {
            Some(MemoKind::Left)
        } else if full {
            Some(MemoKind::Right)
        } else {
            None
        };
        match kind {
            Some(kind) => {
                dst.push(Node::new(NodeKind::Memo { child: id, kind }));
                dst.len() - 1
            }
            None => id,
        }
    })
}

/// Bottom-up regular-pattern extraction: a node has a pattern when its
/// whole subgraph is regular and transform-free (a bare join is allowed; a
/// DFA scan yields joined text anyway). Cycles never qualify because every
/// cycle passes through a `Delayed`.
fn patterns_of(
    nodes: &[Node],
    root: NodeId,
    alphabet: &StdArc<dyn Alphabet>,
) -> HashMap<NodeId, Pattern> {
    let mut patterns: HashMap<NodeId, Pattern> = HashMap::new();
    let mut order = preorder(nodes, root);
    // reversed preorder puts descendants before ancestors
    order.reverse();
    for n in order {
        let node = &nodes[n];
        if !(node.transform.is_empty() || node.transform.is_add_only()) {
            continue;
        }
        let pattern = match &node.kind {
            NodeKind::Literal(text) => Pattern::literal(text, alphabet.as_ref()).ok(),
            NodeKind::Any(set) => Some(Pattern::Chars(set.clone())),
            NodeKind::Regexp(compiled, _) => Some(compiled.pattern.clone()),
            NodeKind::And(cs) => collect(&patterns, cs).map(Pattern::seq),
            NodeKind::Or(cs) => collect(&patterns, cs).map(Pattern::alt),
            NodeKind::Repeat {
                child,
                low,
                high,
                greedy: true,
                separator,
            } => {
                let item = patterns.get(child).cloned();
                let sep = match separator {
                    // no separator composes; an uncompiled separator blocks
                    Some(s) => patterns.get(s).cloned().map(Some),
                    None => Some(None),
                };
                match (item, sep) {
                    (Some(item), Some(sep)) => Some(woven_repeat(item, sep, *low, *high)),
                    _ => None,
                }
            }
            NodeKind::Transform(child) => patterns.get(child).cloned(),
            _ => None,
        };
        if let Some(p) = pattern {
            patterns.insert(n, p);
        }
    }
    patterns
}

fn collect(patterns: &HashMap<NodeId, Pattern>, children: &[NodeId]) -> Option<Vec<Pattern>> {
    children.iter().map(|c| patterns.get(c).cloned()).collect()
}

/// Weave an optional separator into a repetition pattern.
fn woven_repeat(item: Pattern, sep: Option<Pattern>, low: u32, high: Option<u32>) -> Pattern {
    match sep {
        None => item.repeat(low, high),
        Some(sep) => {
            let rest = Pattern::seq(vec![sep, item.clone()]);
            match low {
                0 => match high {
                    Some(0) => Pattern::Empty,
                    _ => Pattern::alt(vec![
                        Pattern::Empty,
                        Pattern::seq(vec![item, rest.repeat(0, high.map(|h| h - 1))]),
                    ]),
                },
                low => Pattern::seq(vec![item, rest.repeat(low - 1, high.map(|h| h - 1))]),
            }
        }
    }
}

/// Replace every regular composite subgraph with a single compiled
/// `Regexp` node. With `use_dfa` the replacement scans longest-match
/// only; shorter alternatives are no longer enumerated.
fn regexp_rewrite(
    nodes: Vec<Node>,
    root: NodeId,
    alphabet: &StdArc<dyn Alphabet>,
    use_dfa: bool,
) -> (Vec<Node>, NodeId) {
    let patterns = patterns_of(&nodes, root, alphabet);
    let mode = if use_dfa {
        RegexpMode::Dfa
    } else {
        RegexpMode::Nfa
    };
    clone_graph(&nodes, root, |dst, node, kind, src_id| {
        let composite = matches!(
            node.kind,
            NodeKind::And(_) | NodeKind::Or(_) | NodeKind::Repeat { .. } | NodeKind::Transform(_)
        );
        if composite {
            if let Some(pattern) = patterns.get(&src_id) {
                let compiled =
                    Compiled::from_pattern(render_pattern(pattern, alphabet), pattern);
                let mut replacement = Node::new(NodeKind::Regexp(Arc::new(compiled), mode));
                if !node.transform.is_add_only() {
                    replacement.transform = node.transform.clone();
                }
                replacement.describe = node.describe.clone();
                dst.push(replacement);
                return dst.len() - 1;
            }
        }
        plain(dst, node, kind)
    })
}

fn render_pattern(pattern: &Pattern, alphabet: &StdArc<dyn Alphabet>) -> String {
    match pattern {
        Pattern::Empty => String::new(),
        Pattern::Chars(set) => set.display(alphabet.as_ref()),
        Pattern::Seq(items) => items
            .iter()
            .map(|p| render_pattern(p, alphabet))
            .collect::<String>(),
        Pattern::Alt(items) => format!(
            "({})",
            items
                .iter()
                .map(|p| render_pattern(p, alphabet))
                .collect::<Vec<_>>()
                .join("|")
        ),
        Pattern::Rep { pat, low, high } => {
            let inner = render_pattern(pat, alphabet);
            match (low, high) {
                (0, None) => format!("({inner})*"),
                (1, None) => format!("({inner})+"),
                (0, Some(1)) => format!("({inner})?"),
                (low, None) => format!("({inner}){{{low},}}"),
                (low, Some(high)) => format!("({inner}){{{low},{high}}}"),
            }
        }
    }
}

/// Compile the grammar's token set into a combined DFA and wrap the root
/// in a `Lexer` node. Grammars without tokens pass through unchanged.
fn lexer_rewrite(
    nodes: Vec<Node>,
    root: NodeId,
    alphabet: &StdArc<dyn Alphabet>,
    discard: &str,
) -> Result<(Vec<Node>, NodeId), ParseError> {
    let mut tokens: IndexMap<Label, String> = IndexMap::new();
    for n in preorder(&nodes, root) {
        if let NodeKind::Token { id, pattern, .. } = &nodes[n].kind {
            tokens.entry(*id).or_insert_with(|| pattern.clone());
        }
    }
    if tokens.is_empty() {
        return Ok((nodes, root));
    }
    let mut labelled: Vec<(Label, String)> = tokens.into_iter().collect();
    // ids are allocated in declaration order; sorting restores it even if
    // the graph is traversed in another order
    labelled.sort_by_key(|&(id, _)| id);
    let compiled = Compiled::parse_many(&labelled, alphabet.as_ref())
        .map_err(|e| ParseError::Lexer(format!("bad token pattern: {e}")))?;
    let skip = Compiled::parse(discard, alphabet.as_ref())
        .map_err(|e| ParseError::Lexer(format!("bad discard pattern: {e}")))?;

    let mut nodes = nodes;
    nodes.push(Node::new(NodeKind::Lexer {
        child: root,
        tokens: Arc::new(compiled),
        skip: Arc::new(skip),
    }));
    let new_root = nodes.len() - 1;
    Ok((nodes, new_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{describe, Grammar, M};

    fn export(m: &M, g: &Grammar) -> (Vec<Node>, NodeId) {
        (g.export(), m.id)
    }

    #[test]
    fn flatten_merges_nested_sequences() {
        let g = Grammar::new();
        let m = (g.lit("a") & g.lit("b")) & g.lit("c");
        let (nodes, root) = export(&m, &g);
        let (nodes, root) = flatten(nodes, root);
        match &nodes[root].kind {
            NodeKind::And(cs) => assert_eq!(cs.len(), 3),
            other => panic!("expected flattened And, got {other:?}"),
        }
    }

    #[test]
    fn flatten_respects_transforms() {
        let g = Grammar::new();
        let inner = (g.lit("a") & g.lit("b")).join();
        let m = inner & g.lit("c");
        let (nodes, root) = export(&m, &g);
        let (nodes, root) = flatten(nodes, root);
        match &nodes[root].kind {
            // the joined pair must stay its own node
            NodeKind::And(cs) => assert_eq!(cs.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn compose_pushes_transforms_down() {
        let g = Grammar::new();
        let m = g.lit("a").join().join();
        let (nodes, root) = export(&m, &g);
        let (nodes, root) = compose_transforms(nodes, root);
        // both Transform wrappers collapse into the literal
        assert!(matches!(nodes[root].kind, NodeKind::Literal(_)));
        assert!(!nodes[root].transform.is_empty());
    }

    #[test]
    fn clone_preserves_cycles() {
        let g = Grammar::new();
        let d = g.delayed();
        let body = g.lit("x") & &d;
        d.define(&body);
        let (nodes, root) = export(&body, &g);
        let (nodes, root) = compact(nodes, root);
        // the cycle must still pass through a Delayed node
        let order = preorder(&nodes, root);
        assert!(order
            .iter()
            .any(|&n| matches!(nodes[n].kind, NodeKind::Delayed(Some(_)))));
        assert!(matches!(nodes[root].kind, NodeKind::And(_)));
    }

    #[test]
    fn memoize_wraps_everything_but_delayed() {
        let g = Grammar::new();
        let m = g.lit("a") & g.lit("b");
        let (nodes, root) = export(&m, &g);
        let (nodes, root) = memoize(nodes, root, MemoKind::Right);
        assert!(matches!(nodes[root].kind, NodeKind::Memo { .. }));
    }

    #[test]
    fn left_loops_sees_through_or_branches() {
        let g = Grammar::new();
        let d = g.delayed();
        // a := a 'x' | 'y'  -- left recursive through the first Or branch
        let rec = d.matcher() & g.lit("x");
        let body = rec | g.lit("y");
        d.define(&body);
        let (nodes, _) = export(&body, &g);
        let cycles = left_loops(&nodes, d.matcher().id);
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn left_loops_ignores_right_recursion() {
        let g = Grammar::new();
        let d = g.delayed();
        // a := 'x' a | 'y'  -- right recursive only
        let rec = g.lit("x") & &d;
        let body = rec | g.lit("y");
        d.define(&body);
        let (nodes, _) = export(&body, &g);
        let cycles = left_loops(&nodes, d.matcher().id);
        assert!(cycles.is_empty());
        // the conservative walk still finds the cycle
        let cycles = loops(&nodes, d.matcher().id);
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn optimize_or_moves_cycle_edges_last() {
        let g = Grammar::new();
        let d = g.delayed();
        let rec = d.matcher() & g.lit("x");
        let rec_id = rec.id;
        let body = rec | g.lit("y");
        d.define(&body);
        let (nodes, root) = export(&body, &g);
        let (nodes, root) = optimize_or(nodes, root, false);
        match &nodes[root].kind {
            NodeKind::Or(cs) => assert_eq!(cs.last(), Some(&rec_id)),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn context_memoize_targets_the_cycle() {
        let g = Grammar::new();
        let d = g.delayed();
        let rec = d.matcher() & g.lit("x");
        let body = rec | g.lit("y");
        d.define(&body);
        let safe = g.lit("z");
        let m = body & safe;
        let (nodes, root) = export(&m, &g);
        let (nodes, root) = context_memoize(nodes, root, false, false);
        let order = preorder(&nodes, root);
        let lmemos = order
            .iter()
            .filter(|&&n| {
                matches!(
                    nodes[n].kind,
                    NodeKind::Memo {
                        kind: MemoKind::Left,
                        ..
                    }
                )
            })
            .count();
        assert!(lmemos > 0, "cycle nodes must be LMemo-wrapped");
        // the unrelated literal stays bare in partial mode
        let bare_z = order.iter().any(|&n| {
            matches!(nodes[n].kind, NodeKind::Literal(ref t) if t == "z")
                && !order.iter().any(|&p| {
                    matches!(nodes[p].kind, NodeKind::Memo { child, .. } if child == n)
                })
        });
        assert!(bare_z);
    }

    #[test]
    fn regexp_rewrite_collapses_regular_subgraphs() {
        let g = Grammar::new();
        let m = (g.any("ab").many().named("prefix") & g.lit("abb")).named("tail");
        let (nodes, root) = export(&m, &g);
        let alphabet = g.alphabet();
        let (nodes, root) = regexp_rewrite(nodes, root, &alphabet, true);
        match &nodes[root].kind {
            NodeKind::Regexp(compiled, RegexpMode::Dfa) => {
                let syms: Vec<_> = "ababb".chars().map(|c| c as u32).collect();
                assert_eq!(compiled.dfa.scan(syms).map(|(len, _)| len), Some(5));
            }
            other => panic!("expected a compiled Regexp, got {other:?}"),
        }
    }

    #[test]
    fn regexp_rewrite_stops_at_transforms() {
        let g = Grammar::new();
        let mapped = g.lit("a").map(|v| v);
        let m = mapped & g.lit("b");
        let (nodes, root) = export(&m, &g);
        let alphabet = g.alphabet();
        let (nodes, root) = regexp_rewrite(nodes, root, &alphabet, true);
        assert!(
            matches!(nodes[root].kind, NodeKind::And(_)),
            "a mapped child blocks composition: {}",
            describe(&nodes, root)
        );
    }

    #[test]
    fn lexer_rewrite_is_a_noop_without_tokens() {
        let g = Grammar::new();
        let m = g.lit("a");
        let (nodes, root) = export(&m, &g);
        let alphabet = g.alphabet();
        let before = nodes.len();
        let (nodes, new_root) = lexer_rewrite(nodes, root, &alphabet, r"\s+").unwrap();
        assert_eq!(nodes.len(), before);
        assert_eq!(new_root, root);
    }

    #[test]
    fn set_arguments_overrides_repetition_order() {
        let g = Grammar::new();
        let m = g.lit("a").many();
        let (nodes, root) = export(&m, &g);
        let (nodes, root) = set_arguments(nodes, root, NodeArg::RepeatGreedy(false));
        assert!(matches!(
            nodes[root].kind,
            NodeKind::Repeat { greedy: false, .. }
        ));
    }

    #[test]
    fn desugar_weaves_separators() {
        let g = Grammar::new();
        let item = g.lit("a");
        let sep = g.lit(",");
        let m = item.separated_by(&sep, 1, None);
        let (nodes, root) = export(&m, &g);
        let (nodes, root) = desugar_separators(nodes, root);
        // low >= 1 becomes And(item, (sep item)*)
        match &nodes[root].kind {
            NodeKind::And(cs) => {
                assert_eq!(cs.len(), 2);
                assert!(matches!(
                    nodes[cs[1]].kind,
                    NodeKind::Repeat {
                        separator: None,
                        low: 0,
                        ..
                    }
                ));
            }
            other => panic!("expected the woven form, got {other:?}"),
        }
        let order = preorder(&nodes, root);
        assert!(
            order
                .iter()
                .all(|&n| !matches!(
                    nodes[n].kind,
                    NodeKind::Repeat {
                        separator: Some(_),
                        ..
                    }
                )),
            "no separator survives desugaring"
        );
    }

    #[test]
    fn lexer_rewrite_installs_the_wrapper() {
        let g = Grammar::new();
        let num = g.token("[0-9]+");
        let m = num.matcher();
        let (nodes, root) = export(&m, &g);
        let alphabet = g.alphabet();
        let (nodes, root) = lexer_rewrite(nodes, root, &alphabet, r"\s+").unwrap();
        assert!(matches!(nodes[root].kind, NodeKind::Lexer { .. }));
    }
}
