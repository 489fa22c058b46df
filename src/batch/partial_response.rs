//! One-call entry point for function handlers

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::ordering::OrderingPolicy;
use super::{BatchProcessor, BatchResponse, ProcessorOptions, RecordHandler};
use crate::{BatchError, Result};

/// Register the event's records, process them and return the partial-failure
/// report
///
/// `event` is the raw invocation payload; its `Records` array is the batch.
/// Run this inside [`with_invocation`](crate::state::with_invocation) when the
/// runtime may interleave invocations.
///
/// ```rust,no_run
/// use batch_processing::batch::{handler_fn, process_partial_response, BatchProcessor, ProcessorOptions};
/// use batch_processing::records::EventType;
/// use batch_processing::state::with_invocation;
/// use serde_json::{json, Value};
///
/// # async fn example(event: Value) -> batch_processing::Result<()> {
/// let processor = BatchProcessor::new(EventType::Sqs);
/// let handler = handler_fn(|record: Value| async move { Ok(record["body"].clone()) });
///
/// let response = with_invocation("request-id", async {
///     process_partial_response(&event, handler, &processor, ProcessorOptions::default()).await
/// })
/// .await?;
/// println!("{}", serde_json::to_string(&response)?);
/// # Ok(())
/// # }
/// ```
pub async fn process_partial_response<P: OrderingPolicy>(
    event: &Value,
    handler: Arc<dyn RecordHandler>,
    processor: &BatchProcessor<P>,
    options: ProcessorOptions,
) -> Result<BatchResponse> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or(BatchError::UnexpectedBatchType)?;

    debug!(
        records = records.len(),
        event_type = %processor.event_type(),
        "Processing partial batch response"
    );

    processor.register(records.clone(), handler, options)?;
    processor.process().await?;
    processor.response()
}
