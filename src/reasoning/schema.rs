//! Extraction schemas and conformance of backend output

use super::{Extraction, ReasoningError};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
        }
    }
}

impl FromStr for FieldType {
    type Err = ReasoningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Ok(FieldType::String),
            "number" | "float" | "double" => Ok(FieldType::Number),
            "integer" | "int" => Ok(FieldType::Integer),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            other => Err(ReasoningError::InvalidContent(format!(
                "unsupported schema field type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Declared fields, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    fields: Vec<SchemaField>,
}

impl ExtractionSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        let mut unique: Vec<SchemaField> = Vec::with_capacity(fields.len());
        for field in fields {
            if !unique.iter().any(|f| f.name == field.name) {
                unique.push(field);
            }
        }
        Self { fields: unique }
    }

    /// String-typed fields from names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| SchemaField {
                    name: name.into(),
                    field_type: FieldType::String,
                })
                .collect(),
        )
    }

    /// Parse a schema given as JSON
    ///
    /// Accepts `["a", "b"]`, `{"a": "integer", "b": "string"}` or a JSON-Schema
    /// object with `properties`.
    pub fn from_value(value: &Value) -> Result<Self, ReasoningError> {
        let fields = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(name) => Ok(SchemaField {
                        name: name.clone(),
                        field_type: FieldType::String,
                    }),
                    other => Err(ReasoningError::InvalidContent(format!(
                        "schema field names must be strings, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::Object(map) => {
                if let Some(Value::Object(properties)) = map.get("properties") {
                    properties
                        .iter()
                        .map(|(name, spec)| {
                            let field_type = match spec.get("type").and_then(Value::as_str) {
                                Some(t) => t.parse()?,
                                None => FieldType::String,
                            };
                            Ok(SchemaField {
                                name: name.clone(),
                                field_type,
                            })
                        })
                        .collect::<Result<Vec<_>, ReasoningError>>()?
                } else {
                    map.iter()
                        .map(|(name, spec)| {
                            let field_type = match spec {
                                Value::String(t) => t.parse()?,
                                Value::Null => FieldType::String,
                                other => {
                                    return Err(ReasoningError::InvalidContent(format!(
                                        "field '{}' has invalid type {}",
                                        name, other
                                    )))
                                }
                            };
                            Ok(SchemaField {
                                name: name.clone(),
                                field_type,
                            })
                        })
                        .collect::<Result<Vec<_>, ReasoningError>>()?
                }
            }
            other => {
                return Err(ReasoningError::InvalidContent(format!(
                    "schema must be an array or object, got {}",
                    other
                )))
            }
        };

        if fields.is_empty() {
            return Err(ReasoningError::InvalidContent(
                "schema declares no fields".to_string(),
            ));
        }
        Ok(Self::new(fields))
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Exactly the declared fields, coerced to their types
    ///
    /// Keys are matched exactly, then ignoring case and `_`/space/`-`. Fields
    /// that are missing or fail coercion are `null`; keys outside the schema
    /// are dropped.
    pub fn conform(&self, raw: &Extraction) -> Extraction {
        let mut out = Extraction::new();

        for field in &self.fields {
            let value = raw.get(&field.name).or_else(|| {
                let wanted = field_key(&field.name);
                raw.iter()
                    .find(|(key, _)| field_key(key) == wanted)
                    .map(|(_, value)| value)
            });

            let coerced = value
                .and_then(|v| coerce(v, field.field_type))
                .unwrap_or(Value::Null);
            out.insert(field.name.clone(), coerced);
        }

        out
    }
}

fn field_key(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | ' ' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn coerce(value: &Value, field_type: FieldType) -> Option<Value> {
    match field_type {
        FieldType::String => match value {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| Value::String(s.to_string()))
            }
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        FieldType::Number => match value {
            Value::Number(n) => Some(Value::Number(n.clone())),
            Value::String(s) => parse_number(s)
                .and_then(Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        FieldType::Integer => {
            let n = match value {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
                Value::String(s) => parse_number(s).and_then(whole),
                _ => None,
            }?;
            Some(Value::Number(n.into()))
        }
        FieldType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "n" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(Value::Bool(true)),
                Some(0) => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
    }
}

/// Lenient number parse: thousands separators, currency prefixes and a
/// trailing percent sign are ignored
fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_start_matches(['$', '€', '£'])
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn whole(v: f64) -> Option<i64> {
    (v.fract() == 0.0 && v.abs() < i64::MAX as f64).then_some(v as i64)
}
