use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// A single cell value flowing through alignment and resolution.
///
/// Variant order is the cross-kind sort order: Numbers < Text < Bool < Empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(OrderedFloat<f64>),
    Text(String),
    Bool(bool),
    #[default]
    Empty,
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(OrderedFloat(n))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Infer a value from a raw CSV cell.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Value::Empty;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        match trimmed.parse::<f64>() {
            // "nan" / "inf" parse as floats but are names, not numbers
            Ok(n) if n.is_finite() => Value::number(n),
            _ => Value::Text(input.to_string()),
        }
    }

    /// Empty cells and NaN numbers are skipped by every built-in strategy.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Value::Empty => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Length of the rendered value in characters.
    pub fn display_len(&self) -> usize {
        match self {
            Value::Text(s) => s.chars().count(),
            Value::Empty => 0,
            other => other.to_string().chars().count(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", n.0 as i64)
                } else {
                    write!(f, "{}", n.0)
                }
            }
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
