//! Per-invocation context propagation
//!
//! A logical invocation is a future run through [`with_invocation`]. The scope
//! is carried by a tokio task-local, so it follows the future across every
//! `.await`, including futures polled through `join_all` or `select!` on the
//! same task. Futures handed to `tokio::spawn` start outside the scope and
//! must be wrapped again.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::InvocationState;

tokio::task_local! {
    static CURRENT_INVOCATION: Arc<InvocationFrame>;
}

/// Token of one logical invocation, owning that invocation's state buckets
///
/// Buckets are keyed by the id of the store that created them, so several
/// processors used by one invocation never share a bucket. They are dropped
/// together with the frame when the scope ends.
pub struct InvocationFrame {
    token: Uuid,
    request_id: String,
    buckets: DashMap<Uuid, Arc<Mutex<InvocationState>>>,
}

impl InvocationFrame {
    /// Create a frame for the given request id
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            token: Uuid::new_v4(),
            request_id: request_id.into(),
            buckets: DashMap::new(),
        }
    }

    /// Opaque token unique to this frame
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Request id the invocation was started with
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Number of stores that have touched this invocation
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket for `store_id`, created on first access
    pub(crate) fn bucket(&self, store_id: Uuid) -> Arc<Mutex<InvocationState>> {
        self.buckets.entry(store_id).or_default().value().clone()
    }
}

impl fmt::Debug for InvocationFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationFrame")
            .field("token", &self.token)
            .field("request_id", &self.request_id)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

/// Source of the active invocation, if any
///
/// The state store asks this on every access; swapping the implementation is
/// how tests and legacy hosts opt out of isolation.
pub trait InvocationContext: Send + Sync + fmt::Debug {
    /// The frame of the invocation the caller is running in
    fn current(&self) -> Option<Arc<InvocationFrame>>;
}

/// Context backed by the task-local scope set up by [`with_invocation`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalContext;

impl InvocationContext for TaskLocalContext {
    fn current(&self) -> Option<Arc<InvocationFrame>> {
        current_invocation()
    }
}

/// Context that is never active
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedContext;

impl InvocationContext for DetachedContext {
    fn current(&self) -> Option<Arc<InvocationFrame>> {
        None
    }
}

/// Frame of the invocation the current task is running in
pub fn current_invocation() -> Option<Arc<InvocationFrame>> {
    CURRENT_INVOCATION.try_with(Arc::clone).ok()
}

/// Run `fut` as one logical invocation with its own state buckets
pub async fn with_invocation<F>(request_id: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    let frame = Arc::new(InvocationFrame::new(request_id));
    debug!(
        request_id = %frame.request_id(),
        token = %frame.token(),
        "Entering invocation scope"
    );
    CURRENT_INVOCATION.scope(frame, fut).await
}
