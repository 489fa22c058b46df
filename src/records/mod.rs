//! Record sources and the adapters that read identifiers out of them
//!
//! Records travel through the processor as raw `serde_json::Value` objects in
//! the shape the platform delivers them. An adapter knows where a source keeps
//! the item identifier that goes into the partial-failure report, the ordering
//! group (if any) and the body.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Supported event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Standard and FIFO queues
    #[serde(rename = "SQS")]
    Sqs,
    /// Data streams
    #[serde(rename = "KinesisDataStreams")]
    KinesisDataStreams,
    /// Table change streams
    #[serde(rename = "DynamoDBStreams")]
    DynamoDbStreams,
}

impl EventType {
    /// Built-in adapter for this source
    pub fn adapter(self) -> Arc<dyn RecordAdapter> {
        match self {
            EventType::Sqs => Arc::new(SqsRecordAdapter),
            EventType::KinesisDataStreams => Arc::new(KinesisRecordAdapter),
            EventType::DynamoDbStreams => Arc::new(DynamoDbRecordAdapter),
        }
    }

    /// Platform name of the source
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Sqs => "SQS",
            EventType::KinesisDataStreams => "KinesisDataStreams",
            EventType::DynamoDbStreams => "DynamoDBStreams",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record did not have the shape its adapter expects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordShapeError {
    /// Record is not a JSON object
    #[error("record is not an object")]
    NotAnObject,

    /// Identifier is missing or not a string
    #[error("missing string field '{0}'")]
    MissingIdentifier(&'static str),
}

/// Fields an adapter extracts from one record
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord<'a> {
    /// Identifier reported back in `batchItemFailures`
    pub identifier: String,
    /// Ordering partition for ordered sources
    pub group_id: Option<String>,
    /// Body as delivered, before any decoding
    pub body: Option<&'a Value>,
}

/// Reads identifier, ordering group and body from a raw record
pub trait RecordAdapter: Send + Sync + Debug {
    /// Extract the adapter-defined fields
    fn extract<'a>(&self, record: &'a Value) -> Result<ExtractedRecord<'a>, RecordShapeError>;

    /// Identifier only
    fn identifier(&self, record: &Value) -> Result<String, RecordShapeError> {
        self.extract(record).map(|extracted| extracted.identifier)
    }

    /// Ordering group only; records without one yield `None`
    fn group_id(&self, record: &Value) -> Option<String> {
        self.extract(record).ok().and_then(|extracted| extracted.group_id)
    }
}

fn string_at(record: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(record, |value, key| value.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn require_object(record: &Value) -> Result<(), RecordShapeError> {
    if record.is_object() {
        Ok(())
    } else {
        Err(RecordShapeError::NotAnObject)
    }
}

/// Queue records: `messageId`, `attributes.MessageGroupId`, `body`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqsRecordAdapter;

impl RecordAdapter for SqsRecordAdapter {
    fn extract<'a>(&self, record: &'a Value) -> Result<ExtractedRecord<'a>, RecordShapeError> {
        require_object(record)?;
        let identifier = string_at(record, &["messageId"])
            .ok_or(RecordShapeError::MissingIdentifier("messageId"))?;

        Ok(ExtractedRecord {
            identifier,
            group_id: string_at(record, &["attributes", "MessageGroupId"]),
            body: record.get("body"),
        })
    }
}

/// Stream records: `kinesis.sequenceNumber`, `kinesis.partitionKey`, `kinesis.data`
#[derive(Debug, Clone, Copy, Default)]
pub struct KinesisRecordAdapter;

impl RecordAdapter for KinesisRecordAdapter {
    fn extract<'a>(&self, record: &'a Value) -> Result<ExtractedRecord<'a>, RecordShapeError> {
        require_object(record)?;
        let identifier = string_at(record, &["kinesis", "sequenceNumber"])
            .ok_or(RecordShapeError::MissingIdentifier("kinesis.sequenceNumber"))?;

        Ok(ExtractedRecord {
            identifier,
            group_id: string_at(record, &["kinesis", "partitionKey"]),
            body: record.get("kinesis").and_then(|k| k.get("data")),
        })
    }
}

/// Change stream records: `dynamodb.SequenceNumber`, `dynamodb.NewImage`
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamoDbRecordAdapter;

impl RecordAdapter for DynamoDbRecordAdapter {
    fn extract<'a>(&self, record: &'a Value) -> Result<ExtractedRecord<'a>, RecordShapeError> {
        require_object(record)?;
        let identifier = string_at(record, &["dynamodb", "SequenceNumber"])
            .ok_or(RecordShapeError::MissingIdentifier("dynamodb.SequenceNumber"))?;

        Ok(ExtractedRecord {
            identifier,
            group_id: None,
            body: record.get("dynamodb").and_then(|d| d.get("NewImage")),
        })
    }
}
