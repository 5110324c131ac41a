//! Capability Schema
//!
//! A plugin's configurable surface is derived from the formal parameter list
//! of its entry point. The two reserved parameters are bound by the host and
//! never appear as form fields:
//!
//! - `data_path` - the active data root chosen by the controller
//! - `progress_callback` - the progress sink bound at execution time

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Reserved name for the data root argument
pub const DATA_PATH: &str = "data_path";

/// Reserved name for the progress sink argument
pub const PROGRESS_CALLBACK: &str = "progress_callback";

/// Name fragments that mark a text parameter as a filesystem path
pub const PATH_HINTS: [&str; 3] = ["path", "directory", "csv_name"];

// ─────────────────────────────────────────────────────────────────────────────
// Schema Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while deriving a schema from a signature
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Parameter #{0} has an empty name")]
    EmptyName(usize),

    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),

    #[error("Default for {name} is {found}, which does not fit {expected}")]
    DefaultMismatch {
        name: String,
        expected: ParamKind,
        found: &'static str,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a user-configurable parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Integer,
    Float,
    Boolean,
    Text,
    /// Text that names a file or directory; renderers offer a picker
    PathLike,
}

impl ParamKind {
    /// Value a consumer applies when a parameter has no default
    pub fn zero_value(&self) -> Value {
        match self {
            ParamKind::Integer => Value::Integer(0),
            ParamKind::Float => Value::Float(0.0),
            ParamKind::Boolean => Value::Boolean(false),
            ParamKind::Text | ParamKind::PathLike => Value::Text(String::new()),
        }
    }

    /// Whether values of this kind travel as `Value::Text`
    pub fn is_textual(&self) -> bool {
        matches!(self, ParamKind::Text | ParamKind::PathLike)
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Integer => write!(f, "integer"),
            ParamKind::Float => write!(f, "float"),
            ParamKind::Boolean => write!(f, "boolean"),
            ParamKind::Text => write!(f, "text"),
            ParamKind::PathLike => write!(f, "path"),
        }
    }
}

/// Host-bound parameters recognized by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservedParam {
    DataPath,
    ProgressCallback,
}

impl ReservedParam {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            DATA_PATH => Some(Self::DataPath),
            PROGRESS_CALLBACK => Some(Self::ProgressCallback),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DataPath => DATA_PATH,
            Self::ProgressCallback => PROGRESS_CALLBACK,
        }
    }
}

/// Inclusive bounds accepted for an integer parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerRange {
    pub min: i64,
    pub max: i64,
}

impl IntegerRange {
    /// Bounds used when nothing wider is implied by the default
    pub const DEFAULT: IntegerRange = IntegerRange {
        min: 0,
        max: 1_000_000,
    };

    pub fn contains(&self, value: i64) -> bool {
        self.min <= value && value <= self.max
    }

    fn widened_to(self, value: i64) -> Self {
        Self {
            min: self.min.min(value),
            max: self.max.max(value),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature
// ─────────────────────────────────────────────────────────────────────────────

/// Type a parameter declares in its plugin's language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredType {
    Integer,
    Float,
    Boolean,
    Text,
    /// Any annotation the schema does not model; treated as text
    Other(String),
}

/// One formal parameter of an entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormalParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared: Option<DeclaredType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FormalParameter {
    /// An untyped parameter without default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared: None,
            default: None,
        }
    }

    /// Set the declared type
    pub fn typed(mut self, declared: DeclaredType) -> Self {
        self.declared = Some(declared);
        self
    }

    /// Set the default value
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered formal parameter list of an entry point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub parameters: Vec<FormalParameter>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter
    pub fn param(mut self, parameter: FormalParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormalParameter> {
        self.parameters.iter()
    }

    /// Check whether a parameter with this name is declared
    pub fn declares(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Spec & Capability Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Description of one schema parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// True for `data_path` / `progress_callback`
    #[serde(default)]
    pub reserved: bool,
    /// Accepted bounds, integer parameters only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<IntegerRange>,
}

impl ParameterSpec {
    /// Kind-specific zero value
    pub fn zero_value(&self) -> Value {
        self.kind.zero_value()
    }

    /// Default if declared, otherwise the zero value
    pub fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.zero_value())
    }

    /// Form label, e.g. `threshold_pct` -> `Threshold Pct`
    pub fn label(&self) -> String {
        self.name
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The user-configurable surface of a plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySchema {
    /// Non-reserved parameters in declaration order
    pub parameters: Vec<ParameterSpec>,
    /// Reserved parameters the entry point declared, in declaration order
    #[serde(default)]
    pub reserved: Vec<ReservedParam>,
}

impl CapabilitySchema {
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Whether the entry point declared the given reserved parameter
    pub fn declares(&self, reserved: ReservedParam) -> bool {
        self.reserved.contains(&reserved)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Derive the capability schema of an entry point from its signature.
///
/// Reserved parameters are skipped wherever they occur. Parameters without a
/// declared type take the type of their default; without either they are text.
pub fn extract_schema(signature: &Signature) -> Result<CapabilitySchema, SchemaError> {
    let mut schema = CapabilitySchema::default();
    let mut seen = std::collections::HashSet::new();

    for (index, param) in signature.parameters.iter().enumerate() {
        if param.name.trim().is_empty() {
            return Err(SchemaError::EmptyName(index));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(SchemaError::DuplicateParameter(param.name.clone()));
        }

        if let Some(reserved) = ReservedParam::from_name(&param.name) {
            schema.reserved.push(reserved);
            continue;
        }

        schema.parameters.push(build_spec(param)?);
    }

    Ok(schema)
}

fn build_spec(param: &FormalParameter) -> Result<ParameterSpec, SchemaError> {
    // Only the declaration decides the kind; an untyped default stays text
    let base = match &param.declared {
        Some(DeclaredType::Integer) => ParamKind::Integer,
        Some(DeclaredType::Float) => ParamKind::Float,
        Some(DeclaredType::Boolean) => ParamKind::Boolean,
        Some(DeclaredType::Text) | Some(DeclaredType::Other(_)) | None => ParamKind::Text,
    };

    let default = match &param.default {
        Some(value) => Some(coerce_default(&param.name, base, value)?),
        None => None,
    };

    let kind = if base == ParamKind::Text && is_path_hint(&param.name) {
        ParamKind::PathLike
    } else {
        base
    };

    let range = (kind == ParamKind::Integer).then(|| {
        let range = IntegerRange::DEFAULT;
        match default.as_ref().and_then(Value::as_i64) {
            Some(d) => range.widened_to(d),
            None => range,
        }
    });

    Ok(ParameterSpec {
        name: param.name.clone(),
        kind,
        default,
        reserved: false,
        range,
    })
}

fn coerce_default(name: &str, kind: ParamKind, value: &Value) -> Result<Value, SchemaError> {
    let coerced = match kind {
        ParamKind::Integer => value.as_i64().map(Value::Integer),
        ParamKind::Float => value.as_f64().map(Value::Float),
        ParamKind::Boolean => value.as_bool().map(Value::Boolean),
        // Text is the fallback branch: any literal keeps its textual form
        ParamKind::Text | ParamKind::PathLike => Some(Value::Text(value.to_string())),
    };

    coerced.ok_or_else(|| SchemaError::DefaultMismatch {
        name: name.to_string(),
        expected: kind,
        found: value.type_name(),
    })
}

/// Whether a parameter name carries one of the path-hint tokens
pub fn is_path_hint(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PATH_HINTS.iter().any(|hint| lower.contains(hint))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
