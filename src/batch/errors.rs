//! Error types recorded while processing a batch
//!
//! Per-record errors are never thrown out of `process()`. They are folded into
//! [`ProcessingOutcome::Failure`](super::ProcessingOutcome) entries and kept in
//! the invocation's state bucket. Only [`FullBatchFailureError`] escalates.

use std::sync::Arc;

use thiserror::Error;

use crate::parser::ParsingError;

/// Error recorded against a single record of a batch
#[derive(Error, Debug, Clone)]
pub enum RecordError {
    /// The user handler returned an error or panicked
    #[error("{0}")]
    Handler(Arc<anyhow::Error>),

    /// The record body did not decode or did not match the configured schema
    #[error("Failed to parse record: {0}")]
    Parsing(#[from] ParsingError),

    /// An earlier record of an ordered batch failed, so this one was not handled
    #[error("A previous record failed processing")]
    SqsFifoShortCircuit,

    /// An earlier record of the same message group failed, so this one was not handled
    #[error("A previous record from message group {group_id} failed processing")]
    SqsFifoMessageGroupShortCircuit {
        /// Group that already produced a failure in this batch
        group_id: String,
    },
}

impl RecordError {
    /// Wrap an error returned by user code
    pub fn handler(error: anyhow::Error) -> Self {
        RecordError::Handler(Arc::new(error))
    }

    /// Whether the error was injected by an ordering policy rather than raised
    /// by the handler or the parser
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            RecordError::SqsFifoShortCircuit | RecordError::SqsFifoMessageGroupShortCircuit { .. }
        )
    }

    /// Short machine-readable kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Handler(_) => "HandlerError",
            RecordError::Parsing(_) => "ParsingError",
            RecordError::SqsFifoShortCircuit => "SqsFifoShortCircuitError",
            RecordError::SqsFifoMessageGroupShortCircuit { .. } => {
                "SqsFifoMessageGroupShortCircuitError"
            }
        }
    }
}

impl PartialEq for RecordError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RecordError::Handler(a), RecordError::Handler(b)) => {
                Arc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            (RecordError::Parsing(a), RecordError::Parsing(b)) => a == b,
            (RecordError::SqsFifoShortCircuit, RecordError::SqsFifoShortCircuit) => true,
            (
                RecordError::SqsFifoMessageGroupShortCircuit { group_id: a },
                RecordError::SqsFifoMessageGroupShortCircuit { group_id: b },
            ) => a == b,
            _ => false,
        }
    }
}

/// Raised by `process()` when every record of a non-empty batch failed and
/// `throw_on_full_batch_failure` is enabled
#[derive(Error, Debug, Clone)]
#[error(
    "All records failed processing. {} individual errors logged separately below.",
    .record_errors.len()
)]
pub struct FullBatchFailureError {
    /// Every per-record error, in the order they were recorded
    pub record_errors: Vec<RecordError>,
}

/// Isolation was required but no invocation context was active at call time
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error(
    "Invocation state isolation is required but no invocation context is active; \
     run the handler inside `with_invocation`"
)]
pub struct InvocationStateUnavailableError;
