//! Value domain for plant items.
//!
//! Every catalog item declares a data type; live payloads and command
//! candidates are coerced into that type before they enter the pipeline.

use serde::{Deserialize, Serialize};

/// Data type declared for a plant item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    /// Enumerated type with a fixed set of string options.
    ///
    /// An empty options list means the catalog declared an enumeration
    /// without listing its states; membership is then not enforced.
    Enum { options: Vec<String> },
    Text,
}

impl DataType {
    /// Whether values of this type participate in median reduction.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Enum { .. } => "enum",
            Self::Text => "text",
        }
    }

    /// Coerce a decoded JSON value to this data type.
    pub fn coerce_json(&self, value: &serde_json::Value) -> Result<PlantValue, CoerceError> {
        use serde_json::Value;

        let mismatch = || CoerceError {
            expected: self.type_name(),
            found: describe_json(value),
        };

        match self {
            Self::Boolean => match value {
                Value::Bool(b) => Ok(PlantValue::Boolean(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(PlantValue::Boolean(false)),
                    Some(1) => Ok(PlantValue::Boolean(true)),
                    _ => Err(mismatch()),
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(PlantValue::Boolean(true)),
                    "false" | "0" => Ok(PlantValue::Boolean(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            Self::Integer => match value {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(PlantValue::Integer(i))
                    } else {
                        match n.as_f64() {
                            Some(f) if f.fract() == 0.0 => Ok(PlantValue::Integer(f as i64)),
                            _ => Err(mismatch()),
                        }
                    }
                }
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(PlantValue::Integer)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Float => match value {
                Value::Number(n) => n.as_f64().map(PlantValue::Float).ok_or_else(mismatch),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(PlantValue::Float)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Enum { options } => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return Err(mismatch()),
                };
                if !options.is_empty() && !options.iter().any(|o| o == &text) {
                    return Err(CoerceError {
                        expected: self.type_name(),
                        found: "value outside the declared options",
                    });
                }
                Ok(PlantValue::Text(text))
            }
            Self::Text => match value {
                Value::String(s) => Ok(PlantValue::Text(s.clone())),
                Value::Number(n) => Ok(PlantValue::Text(n.to_string())),
                Value::Bool(b) => Ok(PlantValue::Text(b.to_string())),
                _ => Err(mismatch()),
            },
        }
    }

    /// Coerce a raw wire payload to this data type.
    ///
    /// Payloads are JSON on the wire, except for bare enumeration states
    /// which the plant publishes as plain text. Anything that does not parse
    /// as JSON is retried as a UTF-8 string.
    pub fn coerce_payload(&self, payload: &[u8]) -> Result<PlantValue, CoerceError> {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
            return self.coerce_json(&value);
        }
        let text = std::str::from_utf8(payload).map_err(|_| CoerceError {
            expected: self.type_name(),
            found: "non-UTF-8 payload",
        })?;
        self.coerce_json(&serde_json::Value::String(text.to_string()))
    }
}

/// A value carried by a plant item, after coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlantValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PlantValue {
    /// Numeric view of the value, used for reduction and limit checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

impl std::fmt::Display for PlantValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PlantValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for PlantValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for PlantValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PlantValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// A payload or candidate value that cannot be coerced to the declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct CoerceError {
    pub expected: &'static str,
    pub found: &'static str,
}

fn describe_json(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
