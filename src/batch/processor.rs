//! Batch processor: register, process, report
//!
//! One processor is built per function and reused by every invocation. It
//! keeps no per-batch data of its own; records, handler, options and
//! accumulated outcomes all go through the [`InvocationStateStore`], so two
//! invocations interleaved on one runtime each see only their own batch.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::ordering::{OrderingPolicy, PolicyContext, RecordDecision, SqsFifoPolicy, Unordered};
use super::{
    BatchItemFailure, BatchResponse, FullBatchFailureError, ProcessingOutcome, ProcessorOptions,
    RecordError, RecordHandler,
};
use crate::config::ProcessorConfig;
use crate::records::{EventType, RecordAdapter};
use crate::state::InvocationStateStore;
use crate::{BatchError, Result};

/// Processor for queue and stream batches reporting partial failures
#[derive(Debug)]
pub struct BatchProcessor<P: OrderingPolicy = Unordered> {
    event_type: EventType,
    adapter: Arc<dyn RecordAdapter>,
    policy: P,
    store: InvocationStateStore,
}

/// Processor for FIFO queues, preserving message order on failure
pub type SqsFifoPartialProcessor = BatchProcessor<SqsFifoPolicy>;

impl BatchProcessor<Unordered> {
    /// Processor for a standard source with default configuration
    pub fn new(event_type: EventType) -> Self {
        Self::with_policy(event_type, Unordered, &ProcessorConfig::default())
    }
}

impl BatchProcessor<SqsFifoPolicy> {
    /// FIFO queue processor with default configuration
    pub fn sqs_fifo() -> Self {
        Self::with_policy(EventType::Sqs, SqsFifoPolicy, &ProcessorConfig::default())
    }
}

impl<P: OrderingPolicy> BatchProcessor<P> {
    /// Processor with an explicit ordering policy and configuration
    pub fn with_policy(event_type: EventType, policy: P, config: &ProcessorConfig) -> Self {
        Self {
            event_type,
            adapter: event_type.adapter(),
            policy,
            store: InvocationStateStore::new(config),
        }
    }

    /// Replace the state store, e.g. to use a different invocation context
    pub fn with_store(mut self, store: InvocationStateStore) -> Self {
        self.store = store;
        self
    }

    /// Replace the record adapter used for identifiers and groups
    pub fn with_adapter(mut self, adapter: Arc<dyn RecordAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    /// Source this processor handles
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// State store backing this processor
    pub fn store(&self) -> &InvocationStateStore {
        &self.store
    }

    /// Ordering policy in use
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Register a batch in the caller's bucket, replacing any earlier
    /// registration there
    ///
    /// Every record must carry an identifier, otherwise it could not be
    /// reported back as failed.
    pub fn register(
        &self,
        records: Vec<Value>,
        handler: Arc<dyn RecordHandler>,
        options: ProcessorOptions,
    ) -> Result<&Self> {
        for (index, record) in records.iter().enumerate() {
            self.adapter
                .identifier(record)
                .map_err(|e| BatchError::MalformedRecord {
                    index,
                    reason: e.to_string(),
                })?;
        }

        let count = records.len();
        self.store.with_state(|state| {
            state.records = records;
            state.handler = handler;
            state.options = options;
        })?;

        debug!(records = count, event_type = %self.event_type, "Batch registered");
        Ok(self)
    }

    /// Clear the accumulated outcomes of the caller's bucket
    pub fn prepare(&self) -> Result<()> {
        self.store.with_state(|state| state.reset_outcomes())?;
        Ok(())
    }

    /// Process the registered batch
    ///
    /// Returns one outcome per record in input order. Per-record errors never
    /// escape; the only error raised for a batch is [`FullBatchFailureError`],
    /// when every record failed and the options ask for it.
    #[instrument(skip(self), fields(event_type = %self.event_type))]
    pub async fn process(&self) -> Result<Vec<ProcessingOutcome>> {
        self.prepare()?;

        let (records, handler, options) = self.store.with_state(|state| {
            (
                state.records.clone(),
                Arc::clone(&state.handler),
                state.options.clone(),
            )
        })?;
        let scope = self.store.scope()?;

        if records.is_empty() {
            debug!(scope = scope.label(), "No records to process");
        }

        let parallel = options.process_in_parallel && self.policy.allows_parallel();
        if options.process_in_parallel && !parallel {
            debug!("Ordering policy requires sequential processing, ignoring process_in_parallel");
        }

        let outcomes = if parallel {
            self.process_concurrently(&records, &handler, &options).await?
        } else {
            self.process_sequentially(&records, &handler, &options).await?
        };

        self.policy.clean(self.policy_context(&options))?;
        let response = self.response()?;

        let failed = response.batch_item_failures.len();
        info!(
            total = records.len(),
            succeeded = records.len() - failed.min(records.len()),
            failed = failed,
            parallel = parallel,
            scope = scope.label(),
            "Batch processing completed"
        );

        let error_count = self.store.with_state(|state| state.errors.len())?;
        if options.throw_on_full_batch_failure && !records.is_empty() && error_count == records.len() {
            let record_errors = self.store.errors()?;
            error!(
                failed = record_errors.len(),
                "All records failed processing"
            );
            for (index, record_error) in record_errors.iter().enumerate() {
                error!(
                    index = index,
                    error_kind = record_error.kind(),
                    error = %record_error,
                    "Record error"
                );
            }
            return Err(FullBatchFailureError { record_errors }.into());
        }

        Ok(outcomes)
    }

    async fn process_sequentially(
        &self,
        records: &[Value],
        handler: &Arc<dyn RecordHandler>,
        options: &ProcessorOptions,
    ) -> Result<Vec<ProcessingOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            match self.policy.before_record(record, self.policy_context(options))? {
                RecordDecision::Proceed => {
                    outcomes.push(self.handle_record(record, handler, options).await?);
                }
                RecordDecision::ForceFail(error) => {
                    outcomes.push(self.fail_record(record, error, options)?);
                }
                RecordDecision::ShortCircuit(error) => {
                    debug!(
                        index = index,
                        remaining = records.len() - index,
                        "Short-circuiting remaining records"
                    );
                    for remaining in &records[index..] {
                        outcomes.push(self.fail_record(remaining, error.clone(), options)?);
                    }
                    break;
                }
            }
        }

        Ok(outcomes)
    }

    async fn process_concurrently(
        &self,
        records: &[Value],
        handler: &Arc<dyn RecordHandler>,
        options: &ProcessorOptions,
    ) -> Result<Vec<ProcessingOutcome>> {
        let mut decisions = Vec::with_capacity(records.len());
        let mut halted: Option<RecordError> = None;

        for record in records {
            let decision = match &halted {
                Some(error) => RecordDecision::ForceFail(error.clone()),
                None => self.policy.before_record(record, self.policy_context(options))?,
            };
            if let RecordDecision::ShortCircuit(error) = &decision {
                halted = Some(error.clone());
            }
            decisions.push(decision);
        }

        let pending = records.iter().zip(decisions).map(|(record, decision)| async move {
            match decision {
                RecordDecision::Proceed => self.handle_record(record, handler, options).await,
                RecordDecision::ForceFail(error) | RecordDecision::ShortCircuit(error) => {
                    self.fail_record(record, error, options)
                }
            }
        });

        join_all(pending).await.into_iter().collect()
    }

    /// Parse and handle a single record of the registered batch, recording
    /// the outcome in the caller's bucket
    pub async fn process_record(&self, record: &Value) -> Result<ProcessingOutcome> {
        let (handler, options) = self
            .store
            .with_state(|state| (Arc::clone(&state.handler), state.options.clone()))?;
        self.handle_record(record, &handler, &options).await
    }

    async fn handle_record(
        &self,
        record: &Value,
        handler: &Arc<dyn RecordHandler>,
        options: &ProcessorOptions,
    ) -> Result<ProcessingOutcome> {
        let input = match &options.schema {
            Some(parser) => match parser.parse(record, self.event_type) {
                Ok(parsed) => parsed,
                Err(parsing_error) => return self.fail_record(record, parsing_error.into(), options),
            },
            None => record.clone(),
        };

        match AssertUnwindSafe(handler.handle(input)).catch_unwind().await {
            Ok(Ok(result)) => self.success_handler(record, result),
            Ok(Err(handler_error)) => {
                self.fail_record(record, RecordError::handler(handler_error), options)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.fail_record(
                    record,
                    RecordError::handler(anyhow::anyhow!("handler panicked: {}", message)),
                    options,
                )
            }
        }
    }

    /// Record a successful record
    pub fn success_handler(&self, record: &Value, result: Value) -> Result<ProcessingOutcome> {
        debug!(identifier = %self.identify(record), "Record processed");
        self.store.record_success(record.clone())?;
        Ok(ProcessingOutcome::Success {
            record: record.clone(),
            result,
        })
    }

    /// Record a failed record and let the ordering policy react to it
    ///
    /// The record must carry an identifier, like any registered record;
    /// `index` in the error is its position in the registered batch, or the
    /// batch length when it was never registered.
    pub fn failure_handler(&self, record: &Value, error: RecordError) -> Result<ProcessingOutcome> {
        let (options, index) = self.store.with_state(|state| {
            let index = state
                .records
                .iter()
                .position(|registered| registered == record)
                .unwrap_or(state.records.len());
            (state.options.clone(), index)
        })?;
        if let Err(e) = self.adapter.identifier(record) {
            return Err(BatchError::MalformedRecord {
                index,
                reason: e.to_string(),
            });
        }
        self.fail_record(record, error, &options)
    }

    fn fail_record(
        &self,
        record: &Value,
        error: RecordError,
        options: &ProcessorOptions,
    ) -> Result<ProcessingOutcome> {
        warn!(
            identifier = %self.identify(record),
            error_kind = error.kind(),
            error = %error,
            "Record failed"
        );

        let error_message = error.to_string();
        self.store.record_failure(record.clone(), error)?;
        self.policy.after_failure(record, self.policy_context(options))?;

        Ok(ProcessingOutcome::Failure {
            record: record.clone(),
            error_message,
        })
    }

    /// Release ordering-policy tracking for the caller's batch
    pub fn clean(&self) -> Result<()> {
        let options = self.store.with_state(|state| state.options.clone())?;
        self.policy.clean(self.policy_context(&options))?;
        Ok(())
    }

    /// Partial-failure report for the caller's last processed batch
    ///
    /// Built from the recorded failures on every call; it never re-runs a
    /// handler, so calling it repeatedly yields the same report.
    pub fn response(&self) -> Result<BatchResponse> {
        let failures = self.store.failure_messages()?;
        let batch_item_failures = failures
            .iter()
            .filter_map(|record| match self.adapter.identifier(record) {
                Ok(item_identifier) => Some(BatchItemFailure { item_identifier }),
                Err(e) => {
                    warn!(error = %e, "Failed record has no identifier, leaving it out of the report");
                    None
                }
            })
            .collect();

        let response = BatchResponse {
            batch_item_failures,
        };
        self.store.set_batch_response(response.clone())?;
        Ok(response)
    }

    fn policy_context<'a>(&'a self, options: &'a ProcessorOptions) -> PolicyContext<'a> {
        PolicyContext {
            store: &self.store,
            adapter: self.adapter.as_ref(),
            options,
        }
    }

    fn identify(&self, record: &Value) -> String {
        self.adapter
            .identifier(record)
            .unwrap_or_else(|_| "<unidentified>".to_string())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
