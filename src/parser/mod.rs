//! Decoding and validation of record bodies before they reach the handler
//!
//! A [`RecordParser`] turns a raw record into the value the handler receives.
//! [`SchemaParser`] decodes the body the way each source encodes it and checks
//! it against a [`RecordSchema`]; the record keeps its envelope so the handler
//! can still see identifiers and attributes.

use std::fmt::Debug;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::records::EventType;

pub mod dynamodb;
pub mod schema;

pub use schema::{FieldDefinition, FieldDefinitionBuilder, FieldType, RecordSchema, SchemaError};

/// A record body could not be decoded or did not match its schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParsingError {
    /// Body missing or not encoded the way the source encodes it
    #[error("invalid envelope: {0}")]
    Envelope(String),

    /// Body is not valid JSON
    #[error("invalid JSON body: {0}")]
    Json(String),

    /// Body decoded but failed validation
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Turns a raw record into the value passed to the handler
pub trait RecordParser: Send + Sync + Debug {
    /// Parse one record of the given source
    fn parse(&self, record: &Value, event_type: EventType) -> Result<Value, ParsingError>;
}

/// Decodes the body per source and validates it against a schema
#[derive(Debug, Clone)]
pub struct SchemaParser {
    schema: RecordSchema,
}

impl SchemaParser {
    /// Create a parser for the given schema
    pub fn new(schema: RecordSchema) -> Self {
        Self { schema }
    }

    /// Schema used for validation
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }
}

impl RecordParser for SchemaParser {
    fn parse(&self, record: &Value, event_type: EventType) -> Result<Value, ParsingError> {
        let body = decode_body(record, event_type)?;
        let parsed = self.schema.parse_value(body)?;
        trace!(schema = %self.schema.name, event_type = %event_type, "Record body validated");

        let mut record = record.clone();
        if let Some(slot) = body_slot(&mut record, event_type) {
            *slot = parsed;
        }
        Ok(record)
    }
}

/// Decode a record's body into JSON according to how its source encodes it
pub fn decode_body(record: &Value, event_type: EventType) -> Result<Value, ParsingError> {
    let missing = |field: &str| ParsingError::Envelope(format!("record has no '{}' field", field));

    match event_type {
        EventType::Sqs => {
            let body = record.get("body").ok_or_else(|| missing("body"))?;
            match body {
                Value::String(text) => {
                    serde_json::from_str(text).map_err(|e| ParsingError::Json(e.to_string()))
                }
                other => Ok(other.clone()),
            }
        }
        EventType::KinesisDataStreams => {
            let data = record
                .get("kinesis")
                .and_then(|k| k.get("data"))
                .and_then(Value::as_str)
                .ok_or_else(|| missing("kinesis.data"))?;
            let bytes = STANDARD
                .decode(data)
                .map_err(|e| ParsingError::Envelope(format!("kinesis.data is not base64: {}", e)))?;
            serde_json::from_slice(&bytes).map_err(|e| ParsingError::Json(e.to_string()))
        }
        EventType::DynamoDbStreams => {
            let image = record
                .get("dynamodb")
                .and_then(|d| d.get("NewImage"))
                .ok_or_else(|| missing("dynamodb.NewImage"))?;
            dynamodb::unmarshall_image(image)
        }
    }
}

fn body_slot(record: &mut Value, event_type: EventType) -> Option<&mut Value> {
    match event_type {
        EventType::Sqs => record.get_mut("body"),
        EventType::KinesisDataStreams => record.get_mut("kinesis")?.get_mut("data"),
        EventType::DynamoDbStreams => record.get_mut("dynamodb")?.get_mut("NewImage"),
    }
}
