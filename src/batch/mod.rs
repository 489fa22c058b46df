//! Partial batch failure processing
//!
//! [`BatchProcessor`] handles each record of a batch with a user handler,
//! records per-record outcomes, and builds the [`BatchResponse`] that tells
//! the platform which items to redeliver. [`SqsFifoPartialProcessor`] adds
//! the FIFO ordering policy on top of the same loop.

pub mod errors;
pub mod handler;
pub mod ordering;
pub mod partial_response;
pub mod processor;
pub mod types;

pub use errors::{FullBatchFailureError, InvocationStateUnavailableError, RecordError};
pub use handler::{handler_fn, sync_handler_fn, FnHandler, NoopHandler, RecordHandler, SyncFnHandler};
pub use ordering::{OrderingPolicy, PolicyContext, RecordDecision, SqsFifoPolicy, Unordered};
pub use partial_response::process_partial_response;
pub use processor::{BatchProcessor, SqsFifoPartialProcessor};
pub use types::*;
