//! The state store a processor reads and writes through
//!
//! Every accessor resolves the bucket anew: the active invocation's bucket
//! when a scope is active, otherwise the store's single shared bucket (or an
//! error under [`IsolationMode::Required`]). The shared bucket has no
//! isolation whatsoever; interleaved invocations overwrite each other's data
//! there, exactly as a plain singleton processor would.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

use super::invocation::{InvocationContext, TaskLocalContext};
use super::{InvocationState, OrderingState};
use crate::batch::{BatchResponse, InvocationStateUnavailableError, RecordError, RecordHandler};
use crate::config::{IsolationMode, ProcessorConfig};

/// Result of a store access
pub type StoreResult<T> = std::result::Result<T, InvocationStateUnavailableError>;

/// Which bucket an access resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateScope {
    /// Bucket of the invocation with this request id
    Isolated { request_id: String },
    /// The store's shared bucket
    Shared,
}

impl StateScope {
    /// Log-friendly label
    pub fn label(&self) -> &'static str {
        match self {
            StateScope::Isolated { .. } => "isolated",
            StateScope::Shared => "shared",
        }
    }
}

/// Invocation-scoped storage for one processor's mutable fields
#[derive(Debug)]
pub struct InvocationStateStore {
    id: Uuid,
    mode: IsolationMode,
    context: Arc<dyn InvocationContext>,
    shared: Arc<Mutex<InvocationState>>,
}

impl InvocationStateStore {
    /// Store using the task-local invocation context
    pub fn new(config: &ProcessorConfig) -> Self {
        Self::with_context(config.isolation, Arc::new(TaskLocalContext))
    }

    /// Store using a custom invocation context
    pub fn with_context(mode: IsolationMode, context: Arc<dyn InvocationContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            context,
            shared: Arc::new(Mutex::new(InvocationState::default())),
        }
    }

    /// Isolation mode this store was built with
    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    /// Resolve the bucket the caller is allowed to use right now
    fn bucket(&self) -> StoreResult<(StateScope, Arc<Mutex<InvocationState>>)> {
        match self.context.current() {
            Some(frame) => Ok((
                StateScope::Isolated {
                    request_id: frame.request_id().to_string(),
                },
                frame.bucket(self.id),
            )),
            None if self.mode == IsolationMode::Required => Err(InvocationStateUnavailableError),
            None => Ok((StateScope::Shared, Arc::clone(&self.shared))),
        }
    }

    /// Which bucket the caller currently resolves to
    pub fn scope(&self) -> StoreResult<StateScope> {
        self.bucket().map(|(scope, _)| scope)
    }

    /// Run `f` with exclusive access to the caller's bucket
    ///
    /// The lock is held only for the duration of `f`, never across an await.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut InvocationState) -> R) -> StoreResult<R> {
        let (scope, bucket) = self.bucket()?;
        trace!(scope = scope.label(), "State store access");
        let mut state = bucket.lock();
        Ok(f(&mut state))
    }

    pub fn records(&self) -> StoreResult<Vec<Value>> {
        self.with_state(|s| s.records.clone())
    }

    pub fn set_records(&self, records: Vec<Value>) -> StoreResult<()> {
        self.with_state(|s| s.records = records)
    }

    pub fn errors(&self) -> StoreResult<Vec<RecordError>> {
        self.with_state(|s| s.errors.clone())
    }

    pub fn set_errors(&self, errors: Vec<RecordError>) -> StoreResult<()> {
        self.with_state(|s| s.errors = errors)
    }

    pub fn failure_messages(&self) -> StoreResult<Vec<Value>> {
        self.with_state(|s| s.failure_messages.clone())
    }

    pub fn set_failure_messages(&self, messages: Vec<Value>) -> StoreResult<()> {
        self.with_state(|s| s.failure_messages = messages)
    }

    pub fn success_messages(&self) -> StoreResult<Vec<Value>> {
        self.with_state(|s| s.success_messages.clone())
    }

    pub fn set_success_messages(&self, messages: Vec<Value>) -> StoreResult<()> {
        self.with_state(|s| s.success_messages = messages)
    }

    pub fn batch_response(&self) -> StoreResult<BatchResponse> {
        self.with_state(|s| s.batch_response.clone())
    }

    pub fn set_batch_response(&self, response: BatchResponse) -> StoreResult<()> {
        self.with_state(|s| s.batch_response = response)
    }

    pub fn handler(&self) -> StoreResult<Arc<dyn RecordHandler>> {
        self.with_state(|s| Arc::clone(&s.handler))
    }

    pub fn set_handler(&self, handler: Arc<dyn RecordHandler>) -> StoreResult<()> {
        self.with_state(|s| s.handler = handler)
    }

    /// Number of failures recorded so far, without cloning them
    pub fn failure_count(&self) -> StoreResult<usize> {
        self.with_state(|s| s.failure_messages.len())
    }

    /// Record a failed record and its error
    pub fn record_failure(&self, record: Value, error: RecordError) -> StoreResult<()> {
        self.with_state(|s| {
            s.failure_messages.push(record);
            s.errors.push(error);
        })
    }

    /// Record a successfully handled record
    pub fn record_success(&self, record: Value) -> StoreResult<()> {
        self.with_state(|s| s.success_messages.push(record))
    }

    pub fn current_group(&self) -> StoreResult<Option<String>> {
        self.with_state(|s| s.ordering.current_group.clone())
    }

    pub fn set_current_group(&self, group: Option<String>) -> StoreResult<()> {
        self.with_state(|s| s.ordering.current_group = group)
    }

    pub fn failed_groups(&self) -> StoreResult<HashSet<String>> {
        self.with_state(|s| s.ordering.failed_groups.clone())
    }

    /// Mark a message group as failed for the rest of the batch
    pub fn mark_group_failed(&self, group: String) -> StoreResult<()> {
        self.with_state(|s| {
            s.ordering.failed_groups.insert(group);
        })
    }

    /// Whether a message group already failed in this batch
    pub fn is_group_failed(&self, group: &str) -> StoreResult<bool> {
        self.with_state(|s| s.ordering.failed_groups.contains(group))
    }

    /// Drop ordering-policy tracking
    pub fn clear_ordering(&self) -> StoreResult<()> {
        self.with_state(|s| s.ordering = OrderingState::default())
    }
}
