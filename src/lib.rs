//! # Batch Processing
//!
//! Partial batch failure handling for serverless functions consuming queue
//! and stream batches.
//!
//! ## Overview
//!
//! A function invoked with a batch of records runs a handler per record and
//! reports back only the records that failed, so the platform redelivers
//! those and nothing else. The processor is built once and reused across
//! invocations; its per-batch state lives in an invocation-scoped store, so
//! runtimes that interleave several invocations in one process stay correct.
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_processing::batch::{handler_fn, BatchProcessor, ProcessorOptions};
//! use batch_processing::records::EventType;
//! use batch_processing::state::with_invocation;
//! use serde_json::{json, Value};
//!
//! # async fn example() -> batch_processing::Result<()> {
//! let processor = BatchProcessor::new(EventType::Sqs);
//! let handler = handler_fn(|record: Value| async move {
//!     match record["body"].as_str() {
//!         Some("poison") => anyhow::bail!("cannot process poison message"),
//!         _ => Ok(Value::Null),
//!     }
//! });
//!
//! let records = vec![
//!     json!({ "messageId": "1", "body": "ok" }),
//!     json!({ "messageId": "2", "body": "poison" }),
//! ];
//!
//! let response = with_invocation("request-1", async {
//!     processor.register(records, handler, ProcessorOptions::default())?;
//!     processor.process().await?;
//!     processor.response()
//! })
//! .await?;
//!
//! assert_eq!(response.identifiers(), vec!["2"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`batch`]: processor, ordering policies, handlers and outcomes
//! - [`state`]: invocation-scoped state store and context propagation
//! - [`records`]: event sources and record adapters
//! - [`parser`]: body decoding and schema validation
//! - [`config`]: isolation configuration
//! - [`telemetry`]: tracing subscriber setup

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for batch processing operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors raised out of the processor
///
/// Per-record failures are not errors at this level; they are outcomes.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Every record of the batch failed
    #[error(transparent)]
    FullBatchFailure(#[from] batch::FullBatchFailureError),

    /// Isolation is required but no invocation scope is active
    #[error(transparent)]
    InvocationStateUnavailable(#[from] batch::InvocationStateUnavailableError),

    /// The event has no `Records` array
    #[error("Unexpected batch type. Possible values are: SQS, KinesisDataStreams, DynamoDBStreams")]
    UnexpectedBatchType,

    /// A record carries no identifier for its source
    #[error("Malformed record at index {index}: {reason}")]
    MalformedRecord {
        /// Position of the record in the batch
        index: usize,
        /// What the adapter could not find
        reason: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Batch processor, ordering policies and handlers
pub mod batch;

/// Invocation-scoped state
pub mod state;

/// Event sources and record adapters
pub mod records;

/// Record body parsing
pub mod parser;

/// Processor configuration
pub mod config;

/// Logging setup
pub mod telemetry;

pub use batch::{
    process_partial_response, BatchProcessor, BatchResponse, ProcessingOutcome, ProcessorOptions,
    SqsFifoPartialProcessor,
};
pub use records::EventType;
pub use state::with_invocation;
