use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parser::RecordParser;

/// Outcome of one record, returned by `process()` in input order
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// Handler returned a value
    Success {
        /// Record as registered
        record: Value,
        /// Value returned by the handler
        result: Value,
    },
    /// Handler, parser or ordering policy failed the record
    Failure {
        /// Record as registered
        record: Value,
        /// Display form of the recorded error
        error_message: String,
    },
}

impl ProcessingOutcome {
    /// Whether the record succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }

    /// The record this outcome belongs to
    pub fn record(&self) -> &Value {
        match self {
            ProcessingOutcome::Success { record, .. } | ProcessingOutcome::Failure { record, .. } => {
                record
            }
        }
    }
}

/// One entry of the partial-failure report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Partial-failure report handed back to the invoking platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    /// Identifiers of the failed items, in report order
    pub fn identifiers(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
            .collect()
    }
}

/// Options supplied with each `register()` call
#[derive(Clone)]
pub struct ProcessorOptions {
    /// Fail `process()` with `FullBatchFailureError` when every record failed
    pub throw_on_full_batch_failure: bool,
    /// FIFO only: after a failure, skip just that record's message group
    /// instead of the rest of the batch
    pub skip_group_on_error: bool,
    /// Drive all handlers concurrently within the invocation (unordered only)
    pub process_in_parallel: bool,
    /// Parser applied to each record before the handler
    pub schema: Option<Arc<dyn RecordParser>>,
}

impl ProcessorOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether an all-failed batch is raised as an error
    pub fn with_throw_on_full_batch_failure(mut self, throw: bool) -> Self {
        self.throw_on_full_batch_failure = throw;
        self
    }

    /// Set per-group skipping for FIFO batches
    pub fn with_skip_group_on_error(mut self, skip: bool) -> Self {
        self.skip_group_on_error = skip;
        self
    }

    /// Set concurrent handler execution
    pub fn with_process_in_parallel(mut self, parallel: bool) -> Self {
        self.process_in_parallel = parallel;
        self
    }

    /// Parse each record with the given parser before handling it
    pub fn with_schema(mut self, parser: Arc<dyn RecordParser>) -> Self {
        self.schema = Some(parser);
        self
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            throw_on_full_batch_failure: true,
            skip_group_on_error: false,
            process_in_parallel: false,
            schema: None,
        }
    }
}

impl fmt::Debug for ProcessorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorOptions")
            .field("throw_on_full_batch_failure", &self.throw_on_full_batch_failure)
            .field("skip_group_on_error", &self.skip_group_on_error)
            .field("process_in_parallel", &self.process_in_parallel)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}
