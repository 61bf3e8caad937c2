use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::tree::NodeId;

/// A dynamically typed node value.
///
/// Every tree node carries one of these in its value slot. Comparison is
/// typed: `Int(5)` does not equal `String("5")`; the expression language
/// converts tokens through its conversion callback before comparing, so
/// `=5:int` matches `Int(5)` while plain `=5` matches `String("5")`.
///
/// `Node` is a reference to another node in the same tree; the `#` iterator
/// dereferences it. Cloning a value never clones the referenced subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,

    Bool(bool),

    Int(i64),

    Float(f64),

    /// High-precision decimal, for comparisons where floats would drift.
    Decimal(Decimal),

    Date(NaiveDate),

    String(String),

    /// Reference to another node in the same tree.
    Node(NodeId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human-readable type name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Date(_) => "date",
            Value::String(_) => "string",
            Value::Node(_) => "node",
        }
    }

    /// The value as an expression source string, when it holds one.
    pub fn as_expression(&self) -> Option<&str> {
        match self {
            Value::String(s) if crate::evaluator::is_expression(s) => Some(s),
            _ => None,
        }
    }
}

/// The string form used by substring ("like") matching, distinct-value
/// de-duplication and renames. `Null` renders as the empty string.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::String(s) => write!(f, "{}", s),
            Value::Node(id) => write!(f, "[node {}]", id),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
