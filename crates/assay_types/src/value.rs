//! Argument Values
//!
//! Plugin defaults and submitted arguments are carried as a small tagged
//! value type. Anything that is not a number or a boolean falls back to
//! `Text`, so there is no untyped "any" branch.

use serde::{Deserialize, Serialize};

use crate::schema::ParamKind;

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A concrete parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Boolean flag
    Boolean(bool),
    /// UTF-8 text (also used for path-like parameters)
    Text(String),
}

impl Value {
    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Text(_) => "text",
        }
    }

    /// Get as i64 (also converts from an integral float that fits)
    pub fn as_i64(&self) -> Option<i64> {
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        const BOUNDS: std::ops::Range<f64> = i64::MIN as f64..i64::MAX as f64;
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && BOUNDS.contains(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as f64 (also converts from integer)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse operator-entered text as a value of the given kind.
    ///
    /// Booleans accept `true/false`, `yes/no`, `on/off` and `1/0`.
    pub fn parse(kind: ParamKind, raw: &str) -> Result<Self, ParseValueError> {
        let trimmed = raw.trim();
        match kind {
            ParamKind::Integer => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| ParseValueError::new(kind, raw)),
            ParamKind::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(|| ParseValueError::new(kind, raw)),
            ParamKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Boolean(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Boolean(false)),
                _ => Err(ParseValueError::new(kind, raw)),
            },
            ParamKind::Text | ParamKind::PathLike => Ok(Value::Text(raw.to_string())),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Text could not be read as a value of the requested kind
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot parse {raw:?} as {kind}")]
pub struct ParseValueError {
    pub kind: ParamKind,
    pub raw: String,
}

impl ParseValueError {
    fn new(kind: ParamKind, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Integer(10).to_string(), "10");
        assert_eq!(Value::Float(0.45).to_string(), "0.45");
        assert_eq!(Value::Boolean(false).to_string(), "false");
        assert_eq!(Value::from("Success").to_string(), "Success");
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Float(1e20).as_i64(), None);
        assert_eq!(Value::Float(-1e20).as_i64(), None);
        assert_eq!(Value::Float(i64::MAX as f64).as_i64(), None);
        assert_eq!(Value::Float(i64::MIN as f64).as_i64(), Some(i64::MIN));
        assert_eq!(Value::Float(f64::INFINITY).as_i64(), None);
        assert_eq!(Value::Integer(2).as_f64(), Some(2.0));
        assert_eq!(Value::Text("2".into()).as_f64(), None);
    }

    #[test]
    fn test_parse_per_kind() {
        assert_eq!(Value::parse(ParamKind::Integer, " 42 ").unwrap(), Value::Integer(42));
        assert_eq!(Value::parse(ParamKind::Float, "0.5").unwrap(), Value::Float(0.5));
        assert_eq!(Value::parse(ParamKind::Boolean, "Yes").unwrap(), Value::Boolean(true));
        assert_eq!(
            Value::parse(ParamKind::PathLike, " out/dir ").unwrap(),
            Value::Text(" out/dir ".into())
        );

        assert!(Value::parse(ParamKind::Integer, "4.2").is_err());
        assert!(Value::parse(ParamKind::Float, "NaN").is_err());
        assert!(Value::parse(ParamKind::Boolean, "maybe").is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Value::Float(0.45)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "Float", "value": 0.45}));

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::Float(0.45));
    }
}
