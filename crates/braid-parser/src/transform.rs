use std::fmt;
use std::rc::Rc;

use crate::error::{ParseError, Position};
use crate::value::Value;

/// The named-argument view handed to `kapply` functions: the result list
/// plus where the match started and ended. Everything else a transform
/// could want is derivable from these; the cursor itself is deliberately
/// out of reach.
pub struct KArgs<'a> {
    pub results: &'a [Value],
    pub start: &'a Position,
    pub end: &'a Position,
}

pub type MapFn = Rc<dyn Fn(Value) -> Value>;
pub type ApplyFn = Rc<dyn Fn(Vec<Value>) -> Value>;
pub type ApplyRawFn = Rc<dyn Fn(Vec<Value>) -> Vec<Value>>;
pub type KApplyFn = Rc<dyn Fn(KArgs<'_>) -> Result<Vec<Value>, ParseError>>;
pub type FilterFn = Rc<dyn Fn(&[Value]) -> bool>;

/// One post-processing step applied to a result list.
#[derive(Clone)]
pub enum TransformOp {
    /// Apply the function to each element.
    Map(MapFn),
    /// Replace the list with a single element built from all of it.
    Apply(ApplyFn),
    /// Replace the list wholesale.
    ApplyRaw(ApplyRawFn),
    /// Replace the list with nothing.
    Drop,
    /// Apply with named context; may fail the parse.
    KApply(KApplyFn),
    /// Convert a successful match into a fatal error of the given kind.
    Raise(String),
    /// Fold the list with `+` (string/list concatenation), the join mode
    /// of repetition.
    Add,
    /// Suppress this result if the predicate rejects it; backtracking
    /// continues as if the child had not matched.
    Filter(FilterFn),
}

impl fmt::Debug for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformOp::Map(_) => "Map",
            TransformOp::Apply(_) => "Apply",
            TransformOp::ApplyRaw(_) => "ApplyRaw",
            TransformOp::Drop => "Drop",
            TransformOp::KApply(_) => "KApply",
            TransformOp::Raise(_) => "Raise",
            TransformOp::Add => "Add",
            TransformOp::Filter(_) => "Filter",
        };
        write!(f, "{name}")
    }
}

/// A composed sequence of transform ops, applied left to right.
///
/// After the `compose_transforms` rewriter runs, every node carries at
/// most one of these and no `Transform` node wraps another.
#[derive(Clone, Default, Debug)]
pub struct TransformChain {
    ops: Vec<TransformOp>,
}

/// What applying a chain did to a result.
#[derive(Debug)]
pub enum Transformed {
    /// The (possibly reshaped) result stands.
    Values(Vec<Value>),
    /// A `filter` rejected the result; the match is suppressed.
    Suppressed,
}

impl TransformChain {
    pub fn new() -> Self {
        TransformChain { ops: Vec::new() }
    }

    pub fn of(op: TransformOp) -> Self {
        TransformChain { ops: vec![op] }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// True when the chain is exactly a join, which the regexp rewriter
    /// can absorb (a DFA scan already yields joined text).
    pub fn is_add_only(&self) -> bool {
        matches!(self.ops.as_slice(), [TransformOp::Add])
    }

    pub fn push(&mut self, op: TransformOp) {
        self.ops.push(op);
    }

    /// `self` runs first, then `later`.
    pub fn compose(mut self, later: TransformChain) -> TransformChain {
        self.ops.extend(later.ops);
        self
    }

    pub fn apply(
        &self,
        mut values: Vec<Value>,
        start: &Position,
        end: &Position,
    ) -> Result<Transformed, ParseError> {
        for op in &self.ops {
            values = match op {
                TransformOp::Map(f) => values.into_iter().map(|v| f(v)).collect(),
                TransformOp::Apply(f) => vec![f(values)],
                TransformOp::ApplyRaw(f) => f(values),
                TransformOp::Drop => Vec::new(),
                TransformOp::KApply(f) => f(KArgs {
                    results: &values,
                    start,
                    end,
                })?,
                TransformOp::Raise(kind) => {
                    return Err(ParseError::Raised {
                        kind: kind.clone(),
                        position: start.clone(),
                    });
                }
                TransformOp::Add => Value::join(values),
                TransformOp::Filter(pred) => {
                    if pred(&values) {
                        values
                    } else {
                        return Ok(Transformed::Suppressed);
                    }
                }
            };
        }
        Ok(Transformed::Values(values))
    }
}
