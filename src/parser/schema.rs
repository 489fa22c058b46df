//! Record body schemas
//!
//! Runtime validation of decoded record bodies: each field has a type,
//! optional bounds and an optional default.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Body validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Expected an object body, got {0}")]
    NotAnObject(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' has invalid type: expected {expected}, got {actual}")]
    InvalidType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Field '{field}' is shorter than {min}")]
    TooShort { field: String, min: usize },

    #[error("Field '{field}' length {length} exceeds max: {max}")]
    TooLong {
        field: String,
        length: usize,
        max: usize,
    },

    #[error("Field '{field}' value {value} is outside [{min:?}, {max:?}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("Field '{field}' value '{value}' does not match pattern {pattern}")]
    PatternMismatch {
        field: String,
        value: String,
        pattern: String,
    },

    #[error("Field '{field}' value '{value}' is not one of {valid_options:?}")]
    InvalidEnum {
        field: String,
        value: String,
        valid_options: Vec<String>,
    },

    #[error("Nested validation failed for field '{field}': {error}")]
    Nested {
        field: String,
        error: Box<SchemaError>,
    },
}

/// Field type definition
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Array(Box<FieldType>),
    Object(Box<RecordSchema>),
    Enum(Vec<String>),
    Any,
}

impl FieldType {
    /// Check if a value has this type (shallow for objects)
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Float, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array(inner), Value::Array(items)) => items.iter().all(|v| inner.matches(v)),
            (FieldType::Object(_), Value::Object(_)) => true,
            (FieldType::Enum(_), Value::String(_)) => true,
            (FieldType::Any, _) => true,
            _ => false,
        }
    }

    /// Human-readable type name
    pub fn type_name(&self) -> String {
        match self {
            FieldType::String => "string".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Array(inner) => format!("array<{}>", inner.type_name()),
            FieldType::Object(schema) => format!("object<{}>", schema.name),
            FieldType::Enum(options) => format!("enum({:?})", options),
            FieldType::Any => "any".to_string(),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One field of a record body
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub pattern: Option<Regex>,
}

impl FieldDefinition {
    /// Start a fluent builder
    pub fn builder(name: impl Into<String>, field_type: FieldType) -> FieldDefinitionBuilder {
        FieldDefinitionBuilder::new(name, field_type)
    }

    /// Validate a (possibly absent) value against this field
    pub fn validate(&self, value: Option<&Value>) -> Result<(), SchemaError> {
        let val = match value {
            Some(Value::Null) | None if self.required => {
                return Err(SchemaError::MissingField(self.name.clone()));
            }
            Some(Value::Null) | None => return Ok(()),
            Some(v) => v,
        };

        if !self.field_type.matches(val) {
            return Err(SchemaError::InvalidType {
                field: self.name.clone(),
                expected: self.field_type.type_name(),
                actual: json_type_name(val).to_string(),
            });
        }

        match (&self.field_type, val) {
            (FieldType::String, Value::String(s)) => {
                self.check_length(s.chars().count())?;
                if let Some(pattern) = &self.pattern {
                    if !pattern.is_match(s) {
                        return Err(SchemaError::PatternMismatch {
                            field: self.name.clone(),
                            value: s.clone(),
                            pattern: pattern.as_str().to_string(),
                        });
                    }
                }
            }
            (FieldType::Integer | FieldType::Float, Value::Number(n)) => {
                if let Some(num) = n.as_f64() {
                    let below = self.min_value.is_some_and(|min| num < min);
                    let above = self.max_value.is_some_and(|max| num > max);
                    if below || above {
                        return Err(SchemaError::OutOfRange {
                            field: self.name.clone(),
                            value: num,
                            min: self.min_value,
                            max: self.max_value,
                        });
                    }
                }
            }
            (FieldType::Array(_), Value::Array(items)) => self.check_length(items.len())?,
            (FieldType::Object(schema), Value::Object(obj)) => {
                schema.validate(obj).map_err(|e| SchemaError::Nested {
                    field: self.name.clone(),
                    error: Box::new(e),
                })?;
            }
            (FieldType::Enum(options), Value::String(s)) if !options.contains(s) => {
                return Err(SchemaError::InvalidEnum {
                    field: self.name.clone(),
                    value: s.clone(),
                    valid_options: options.clone(),
                });
            }
            _ => {}
        }

        Ok(())
    }

    fn check_length(&self, length: usize) -> Result<(), SchemaError> {
        if let Some(min) = self.min_length {
            if length < min {
                return Err(SchemaError::TooShort {
                    field: self.name.clone(),
                    min,
                });
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(SchemaError::TooLong {
                    field: self.name.clone(),
                    length,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Schema a decoded record body must satisfy
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub name: String,
    fields: BTreeMap<String, FieldDefinition>,
}

impl RecordSchema {
    /// Create an empty schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field, builder style
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.add_field(field);
        self
    }

    /// Add a field definition
    pub fn add_field(&mut self, field: FieldDefinition) {
        self.fields.insert(field.name.clone(), field);
    }

    /// Validate an object body; fields are checked in name order
    pub fn validate(&self, body: &Map<String, Value>) -> Result<(), SchemaError> {
        self.fields
            .values()
            .try_for_each(|field| field.validate(body.get(&field.name)))
    }

    /// Validate any JSON value, requiring it to be an object, and return it
    /// with defaults applied
    pub fn parse_value(&self, body: Value) -> Result<Value, SchemaError> {
        match body {
            Value::Object(obj) => {
                self.validate(&obj)?;
                Ok(Value::Object(self.apply_defaults(obj)))
            }
            other => Err(SchemaError::NotAnObject(json_type_name(&other).to_string())),
        }
    }

    /// Fill absent fields that declare a default
    pub fn apply_defaults(&self, mut body: Map<String, Value>) -> Map<String, Value> {
        for (name, field) in &self.fields {
            if let Some(default) = &field.default {
                body.entry(name.clone()).or_insert_with(|| default.clone());
            }
        }
        body
    }

    /// Get field definition
    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// All field names, sorted
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

/// Builder for creating FieldDefinition with fluent API
pub struct FieldDefinitionBuilder {
    field: FieldDefinition,
}

impl FieldDefinitionBuilder {
    /// Create new builder
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field: FieldDefinition {
                name: name.into(),
                field_type,
                required: false,
                default: None,
                min_length: None,
                max_length: None,
                min_value: None,
                max_value: None,
                pattern: None,
            },
        }
    }

    /// Mark field as required
    pub fn required(mut self) -> Self {
        self.field.required = true;
        self
    }

    /// Set default value
    pub fn default_value(mut self, value: Value) -> Self {
        self.field.default = Some(value);
        self
    }

    /// Minimum length (chars for strings, items for arrays)
    pub fn min_length(mut self, min: usize) -> Self {
        self.field.min_length = Some(min);
        self
    }

    /// Maximum length (chars for strings, items for arrays)
    pub fn max_length(mut self, max: usize) -> Self {
        self.field.max_length = Some(max);
        self
    }

    /// Set minimum value (for numbers)
    pub fn min_value(mut self, min: f64) -> Self {
        self.field.min_value = Some(min);
        self
    }

    /// Set maximum value (for numbers)
    pub fn max_value(mut self, max: f64) -> Self {
        self.field.max_value = Some(max);
        self
    }

    /// Require string values to match a regex
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.field.pattern = Some(pattern);
        self
    }

    /// Build the FieldDefinition
    pub fn build(self) -> FieldDefinition {
        self.field
    }
}
