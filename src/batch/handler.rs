//! User record handlers

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Per-record user handler
///
/// Receives the raw record, or the parsed record when a schema is configured.
/// Returning an error (or panicking) marks only that record as failed.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// Handle one record
    async fn handle(&self, record: Value) -> anyhow::Result<Value>;
}

/// Handler yielded by an unset handler field; accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

#[async_trait]
impl RecordHandler for NoopHandler {
    async fn handle(&self, _record: Value) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
}

/// Adapter for async closures, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RecordHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, record: Value) -> anyhow::Result<Value> {
        (self.f)(record).await
    }
}

/// Adapter for blocking closures, see [`sync_handler_fn`]
pub struct SyncFnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> RecordHandler for SyncFnHandler<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync,
{
    async fn handle(&self, record: Value) -> anyhow::Result<Value> {
        (self.f)(record)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

impl<F> fmt::Debug for SyncFnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyncFnHandler")
    }
}

/// Wrap an async closure as a shareable handler
///
/// ```rust
/// use batch_processing::batch::handler_fn;
/// use serde_json::Value;
///
/// let handler = handler_fn(|record: Value| async move {
///     let body = record["body"].as_str().unwrap_or_default().to_string();
///     Ok(Value::String(body))
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RecordHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Wrap a synchronous closure as a shareable handler
pub fn sync_handler_fn<F>(f: F) -> Arc<dyn RecordHandler>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(SyncFnHandler { f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_handlers() {
        let doubled = handler_fn(|record: Value| async move {
            let n = record.as_i64().ok_or_else(|| anyhow::anyhow!("not a number"))?;
            Ok(json!(n * 2))
        });
        assert_eq!(doubled.handle(json!(21)).await.unwrap(), json!(42));
        assert!(doubled.handle(json!("x")).await.is_err());

        let upper = sync_handler_fn(|record: Value| {
            Ok(json!(record.as_str().unwrap_or_default().to_uppercase()))
        });
        assert_eq!(upper.handle(json!("abc")).await.unwrap(), json!("ABC"));
    }

    #[tokio::test]
    async fn test_noop_handler() {
        assert_eq!(NoopHandler.handle(json!({ "a": 1 })).await.unwrap(), Value::Null);
    }
}
