use std::fmt;

use ordered_float::OrderedFloat;

/// One element of a matcher's result list.
///
/// Leaf matchers yield `Str` values holding the matched text; transforms
/// reshape lists into whatever structure the grammar author wants. Floats
/// are wrapped in [`OrderedFloat`] so results are `Eq`/`Hash` end to end
/// (memo tables and tests compare whole results).
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(OrderedFloat<f64>),
    List(Vec<Value>),
    /// A named node, the usual shape for syntax trees built with `apply`.
    Tree {
        label: String,
        children: Vec<Value>,
    },
}

impl Value {
    pub fn float(f: f64) -> Value {
        Value::Float(OrderedFloat(f))
    }

    pub fn tree(label: impl Into<String>, children: Vec<Value>) -> Value {
        Value::Tree {
            label: label.into(),
            children,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The `+` used by join (`...` in the original surface syntax): string
    /// concatenation, numeric addition, list append. Mixed kinds fall back
    /// to string concatenation of their rendered forms.
    pub fn add(self, other: Value) -> Value {
        match (self, other) {
            (Value::Str(mut a), Value::Str(b)) => {
                a.push_str(&b);
                Value::Str(a)
            }
            (Value::Int(a), Value::Int(b)) => Value::Int(a + b),
            (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            (Value::Int(a), Value::Float(b)) => Value::Float(OrderedFloat(a as f64) + b),
            (Value::Float(a), Value::Int(b)) => Value::Float(a + OrderedFloat(b as f64)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Value::List(a)
            }
            (Value::List(mut a), b) => {
                a.push(b);
                Value::List(a)
            }
            (a, b) => Value::Str(format!("{a}{b}")),
        }
    }

    /// Fold a whole result list with [`Value::add`]. An empty list joins
    /// to an empty list, not to a zero of any particular kind.
    pub fn join(values: Vec<Value>) -> Vec<Value> {
        let mut iter = values.into_iter();
        match iter.next() {
            None => Vec::new(),
            Some(first) => vec![iter.fold(first, Value::add)],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Tree { label, children } => {
                write!(f, "{label}(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::float(n)
    }
}
