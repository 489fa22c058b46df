//! Invocation-scoped processing state
//!
//! A processor is built once and reused for every invocation the process
//! serves. Everything it mutates while handling a batch lives in an
//! [`InvocationState`] bucket owned by the current invocation, reached through
//! an [`InvocationStateStore`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::batch::{BatchResponse, NoopHandler, ProcessorOptions, RecordError, RecordHandler};

pub mod invocation;
pub mod store;

pub use invocation::{
    current_invocation, with_invocation, DetachedContext, InvocationContext, InvocationFrame,
    TaskLocalContext,
};
pub use store::{InvocationStateStore, StateScope, StoreResult};

/// Ordering-policy tracking for the batch being processed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderingState {
    /// Group of the record currently being evaluated
    pub current_group: Option<String>,
    /// Groups that already produced a failure in this batch
    pub failed_groups: HashSet<String>,
}

/// Mutable fields of one batch, owned by a single bucket
#[derive(Clone)]
pub struct InvocationState {
    pub records: Vec<Value>,
    pub handler: Arc<dyn RecordHandler>,
    pub options: ProcessorOptions,
    pub errors: Vec<RecordError>,
    pub failure_messages: Vec<Value>,
    pub success_messages: Vec<Value>,
    pub batch_response: BatchResponse,
    pub ordering: OrderingState,
}

impl InvocationState {
    /// Clear accumulated outcomes, keeping the registration
    pub fn reset_outcomes(&mut self) {
        self.errors.clear();
        self.failure_messages.clear();
        self.success_messages.clear();
        self.batch_response = BatchResponse::default();
        self.ordering = OrderingState::default();
    }
}

impl Default for InvocationState {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            handler: Arc::new(NoopHandler),
            options: ProcessorOptions::default(),
            errors: Vec::new(),
            failure_messages: Vec::new(),
            success_messages: Vec::new(),
            batch_response: BatchResponse::default(),
            ordering: OrderingState::default(),
        }
    }
}

impl fmt::Debug for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationState")
            .field("records", &self.records.len())
            .field("options", &self.options)
            .field("errors", &self.errors.len())
            .field("failure_messages", &self.failure_messages.len())
            .field("success_messages", &self.success_messages.len())
            .field("batch_response", &self.batch_response)
            .field("ordering", &self.ordering)
            .finish()
    }
}
