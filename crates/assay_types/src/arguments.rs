//! Execution Arguments
//!
//! Concrete values bound to a plugin's schema parameters by name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{CapabilitySchema, ParamKind, ReservedParam};
use crate::value::{ParseValueError, Value};

/// Errors raised when arguments do not match a schema
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing argument: {0}")]
    Missing(String),

    #[error("Unknown argument: {0}")]
    Unknown(String),

    #[error("Argument {0} is reserved and supplied by the host")]
    Reserved(String),

    #[error("Argument {name} expects {expected}, got {found}")]
    KindMismatch {
        name: String,
        expected: ParamKind,
        found: &'static str,
    },

    #[error("Argument {name} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Argument {0} must be a finite number")]
    NotFinite(String),

    #[error("Argument {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: ParseValueError,
    },
}

/// Argument values keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per schema parameter, set to its default or zero value
    pub fn from_schema(schema: &CapabilitySchema) -> Self {
        let values = schema
            .parameters()
            .iter()
            .map(|p| (p.name.clone(), p.initial_value()))
            .collect();
        Self { values }
    }

    /// Set a value, returning the previous one
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Parse `raw` according to the schema kind of `name` and store it
    pub fn set_text(
        &mut self,
        schema: &CapabilitySchema,
        name: &str,
        raw: &str,
    ) -> Result<(), ValidationError> {
        if ReservedParam::from_name(name).is_some() {
            return Err(ValidationError::Reserved(name.to_string()));
        }
        let spec = schema
            .get(name)
            .ok_or_else(|| ValidationError::Unknown(name.to_string()))?;
        let value = Value::parse(spec.kind, raw).map_err(|source| ValidationError::Parse {
            name: name.to_string(),
            source,
        })?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check these arguments against a schema.
    ///
    /// Every non-reserved schema parameter must be present and no other name
    /// may appear. Integers are widened to floats for float parameters; the
    /// returned arguments carry the normalized values.
    pub fn validate(&self, schema: &CapabilitySchema) -> Result<Arguments, ValidationError> {
        for name in self.values.keys() {
            if ReservedParam::from_name(name).is_some() {
                return Err(ValidationError::Reserved(name.clone()));
            }
            if schema.get(name).is_none() {
                return Err(ValidationError::Unknown(name.clone()));
            }
        }

        let mut normalized = BTreeMap::new();
        for spec in schema.parameters() {
            let value = self
                .values
                .get(&spec.name)
                .ok_or_else(|| ValidationError::Missing(spec.name.clone()))?;

            let mismatch = || ValidationError::KindMismatch {
                name: spec.name.clone(),
                expected: spec.kind,
                found: value.type_name(),
            };

            let checked = match (spec.kind, value) {
                (ParamKind::Integer, Value::Integer(i)) => {
                    if let Some(range) = spec.range {
                        if !range.contains(*i) {
                            return Err(ValidationError::OutOfRange {
                                name: spec.name.clone(),
                                value: *i,
                                min: range.min,
                                max: range.max,
                            });
                        }
                    }
                    Value::Integer(*i)
                }
                (ParamKind::Float, Value::Float(_) | Value::Integer(_)) => {
                    let f = value.as_f64().ok_or_else(mismatch)?;
                    if !f.is_finite() {
                        return Err(ValidationError::NotFinite(spec.name.clone()));
                    }
                    Value::Float(f)
                }
                (ParamKind::Boolean, Value::Boolean(b)) => Value::Boolean(*b),
                (kind, Value::Text(s)) if kind.is_textual() => Value::Text(s.clone()),
                _ => return Err(mismatch()),
            };
            normalized.insert(spec.name.clone(), checked);
        }

        Ok(Arguments { values: normalized })
    }
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
