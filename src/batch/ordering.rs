//! Ordering policies consulted by the processor's per-record loop
//!
//! The processor owns the loop; a policy only decides, before each record,
//! whether the handler may run, and gets told about every failure. All policy
//! tracking lives in the invocation's state bucket so it is isolated the same
//! way the rest of the batch state is.

use std::fmt::Debug;

use serde_json::Value;
use tracing::debug;

use super::{ProcessorOptions, RecordError};
use crate::records::RecordAdapter;
use crate::state::{InvocationStateStore, StoreResult};

/// What the loop does with the next record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordDecision {
    /// Parse and handle the record
    Proceed,
    /// Fail this record without handling it, then continue
    ForceFail(RecordError),
    /// Fail this record and every remaining one without handling them, then stop
    ShortCircuit(RecordError),
}

/// Everything a policy may consult for one batch
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub store: &'a InvocationStateStore,
    pub adapter: &'a dyn RecordAdapter,
    pub options: &'a ProcessorOptions,
}

/// Strategy deciding whether a record may be handled
pub trait OrderingPolicy: Send + Sync + Debug {
    /// Whether handlers may run concurrently under this policy
    fn allows_parallel(&self) -> bool {
        true
    }

    /// Called before each record, in input order
    fn before_record(&self, record: &Value, ctx: PolicyContext<'_>) -> StoreResult<RecordDecision>;

    /// Called after a failure has been recorded for `record`
    fn after_failure(&self, _record: &Value, _ctx: PolicyContext<'_>) -> StoreResult<()> {
        Ok(())
    }

    /// Called once the loop is over, however it ended
    fn clean(&self, _ctx: PolicyContext<'_>) -> StoreResult<()> {
        Ok(())
    }
}

/// No ordering constraints; every record is handled
#[derive(Debug, Clone, Copy, Default)]
pub struct Unordered;

impl OrderingPolicy for Unordered {
    fn before_record(&self, _record: &Value, _ctx: PolicyContext<'_>) -> StoreResult<RecordDecision> {
        Ok(RecordDecision::Proceed)
    }
}

/// Ordering for FIFO queues
///
/// By default the first failure fails the rest of the batch unhandled. With
/// `skip_group_on_error` only later records of the failed message group are
/// skipped, and other groups keep being handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqsFifoPolicy;

impl OrderingPolicy for SqsFifoPolicy {
    fn allows_parallel(&self) -> bool {
        false
    }

    fn before_record(&self, record: &Value, ctx: PolicyContext<'_>) -> StoreResult<RecordDecision> {
        let group = ctx.adapter.group_id(record);
        ctx.store.set_current_group(group.clone())?;

        if !ctx.options.skip_group_on_error {
            if ctx.store.failure_count()? > 0 {
                debug!("Earlier record failed, short-circuiting the rest of the batch");
                return Ok(RecordDecision::ShortCircuit(RecordError::SqsFifoShortCircuit));
            }
            return Ok(RecordDecision::Proceed);
        }

        match group {
            Some(group_id) if ctx.store.is_group_failed(&group_id)? => {
                debug!(group_id = %group_id, "Skipping record of failed message group");
                Ok(RecordDecision::ForceFail(
                    RecordError::SqsFifoMessageGroupShortCircuit { group_id },
                ))
            }
            _ => Ok(RecordDecision::Proceed),
        }
    }

    fn after_failure(&self, record: &Value, ctx: PolicyContext<'_>) -> StoreResult<()> {
        if !ctx.options.skip_group_on_error {
            return Ok(());
        }
        let group = match ctx.adapter.group_id(record) {
            Some(group_id) => Some(group_id),
            None => ctx.store.current_group()?,
        };
        if let Some(group_id) = group {
            ctx.store.mark_group_failed(group_id)?;
        }
        Ok(())
    }

    fn clean(&self, ctx: PolicyContext<'_>) -> StoreResult<()> {
        ctx.store.clear_ordering()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use crate::records::SqsRecordAdapter;
    use serde_json::json;

    fn record(id: &str, group: &str) -> Value {
        json!({ "messageId": id, "body": "{}", "attributes": { "MessageGroupId": group } })
    }

    #[test]
    fn test_fifo_short_circuits_after_any_failure() {
        let store = InvocationStateStore::new(&ProcessorConfig::default());
        let options = ProcessorOptions::default();
        let ctx = PolicyContext {
            store: &store,
            adapter: &SqsRecordAdapter,
            options: &options,
        };

        assert_eq!(
            SqsFifoPolicy.before_record(&record("a", "g1"), ctx).unwrap(),
            RecordDecision::Proceed
        );
        store
            .record_failure(record("a", "g1"), RecordError::handler(anyhow::anyhow!("x")))
            .unwrap();
        SqsFifoPolicy.after_failure(&record("a", "g1"), ctx).unwrap();

        assert!(store.failed_groups().unwrap().is_empty());
        assert_eq!(
            SqsFifoPolicy.before_record(&record("b", "g2"), ctx).unwrap(),
            RecordDecision::ShortCircuit(RecordError::SqsFifoShortCircuit)
        );
    }

    #[test]
    fn test_fifo_group_skip_only_touches_failed_group() {
        let store = InvocationStateStore::new(&ProcessorConfig::default());
        let options = ProcessorOptions::default().with_skip_group_on_error(true);
        let ctx = PolicyContext {
            store: &store,
            adapter: &SqsRecordAdapter,
            options: &options,
        };

        SqsFifoPolicy.before_record(&record("a", "g1"), ctx).unwrap();
        SqsFifoPolicy.after_failure(&record("a", "g1"), ctx).unwrap();

        assert_eq!(
            SqsFifoPolicy.before_record(&record("b", "g1"), ctx).unwrap(),
            RecordDecision::ForceFail(RecordError::SqsFifoMessageGroupShortCircuit {
                group_id: "g1".to_string()
            })
        );
        assert_eq!(
            SqsFifoPolicy.before_record(&record("c", "g2"), ctx).unwrap(),
            RecordDecision::Proceed
        );

        SqsFifoPolicy.clean(ctx).unwrap();
        assert!(store.failed_groups().unwrap().is_empty());
    }
}
