//! Ambient execution context for a graph run
//!
//! [`ExecutionContext`] carries cross-cutting attributes (tenant, user,
//! session, correlation id) through a run without parameter threading. It
//! is immutable: [`with`](ExecutionContext::with) and
//! [`merge`](ExecutionContext::merge) return new instances, so a context
//! handed to a node is exactly the context the caller built.
//!
//! The context is made ambient with a tokio task-local rather than a
//! thread-local, so it survives `.await` suspension points:
//!
//! ```rust
//! use agentgraph_core::context::ExecutionContext;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ctx = ExecutionContext::new().with("tenant_id", "acme");
//!
//! ExecutionContext::scope(ctx, async {
//!     // Any nested async call can pick the context up without arguments.
//!     let current = ExecutionContext::current().unwrap();
//!     assert_eq!(current.tenant_id(), Some("acme".to_string()));
//! })
//! .await;
//! # }
//! ```
//!
//! The context also carries the run's cancellation flag. The flag is shared
//! across derived contexts (`with`/`merge` preserve it) so a caller holding
//! the original context can cancel a run that is already executing.

use crate::error::{GraphError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Well-known context key: tenant id
pub const TENANT_ID: &str = "tenant_id";
/// Well-known context key: user id
pub const USER_ID: &str = "user_id";
/// Well-known context key: session id
pub const SESSION_ID: &str = "session_id";
/// Well-known context key: correlation id
pub const CORRELATION_ID: &str = "correlation_id";

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

/// Immutable key-value context propagated through a run
///
/// Values are shared via `Arc`, so cloning a context or deriving a new one
/// with [`with`](Self::with) is cheap. The context is never serialized as
/// part of messages or checkpoints.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    values: Arc<HashMap<String, Value>>,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a raw value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a value and deserialize it into `T`
    ///
    /// Returns `None` when the key is absent or the value does not
    /// deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Look up a string value
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Tenant id, if set
    pub fn tenant_id(&self) -> Option<String> {
        self.get_str(TENANT_ID)
    }

    /// User id, if set
    pub fn user_id(&self) -> Option<String> {
        self.get_str(USER_ID)
    }

    /// Session id, if set
    pub fn session_id(&self) -> Option<String> {
        self.get_str(SESSION_ID)
    }

    /// Correlation id, if set
    pub fn correlation_id(&self) -> Option<String> {
        self.get_str(CORRELATION_ID)
    }

    /// Tenant id, or [`GraphError::MissingContext`]
    pub fn require_tenant_id(&self) -> Result<String> {
        self.require(TENANT_ID)
    }

    /// User id, or [`GraphError::MissingContext`]
    pub fn require_user_id(&self) -> Result<String> {
        self.require(USER_ID)
    }

    /// Correlation id, or [`GraphError::MissingContext`]
    pub fn require_correlation_id(&self) -> Result<String> {
        self.require(CORRELATION_ID)
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get_str(key)
            .ok_or_else(|| GraphError::MissingContext(key.to_string()))
    }

    /// Derive a new context with one additional entry
    ///
    /// The cancellation flag is shared with the parent context.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.into(), value.into());
        Self {
            values: Arc::new(values),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Merge another context into this one; `other`'s entries win on conflict
    ///
    /// The result keeps this context's cancellation flag.
    pub fn merge(&self, other: &ExecutionContext) -> Self {
        let mut values = (*self.values).clone();
        for (k, v) in other.values.iter() {
            values.insert(k.clone(), v.clone());
        }
        Self {
            values: Arc::new(values),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context holds no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Signal cancellation to every run carrying this context
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run a future with this context installed as the ambient context
    pub async fn scope<F>(ctx: ExecutionContext, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT.scope(ctx, fut).await
    }

    /// The ambient context of the current task, if inside a [`scope`](Self::scope)
    pub fn current() -> Option<ExecutionContext> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("values", &self.values)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_returns_new_instance() {
        let base = ExecutionContext::new();
        let derived = base.with(TENANT_ID, "acme");

        assert!(base.tenant_id().is_none());
        assert_eq!(derived.tenant_id(), Some("acme".to_string()));
    }

    #[test]
    fn test_merge_right_wins() {
        let left = ExecutionContext::new()
            .with(TENANT_ID, "left")
            .with(USER_ID, "u-1");
        let right = ExecutionContext::new().with(TENANT_ID, "right");

        let merged = left.merge(&right);
        assert_eq!(merged.tenant_id(), Some("right".to_string()));
        assert_eq!(merged.user_id(), Some("u-1".to_string()));
    }

    #[test]
    fn test_require_missing_key_fails() {
        let ctx = ExecutionContext::new();
        let err = ctx.require_tenant_id().unwrap_err();
        assert!(matches!(err, GraphError::MissingContext(key) if key == TENANT_ID));
    }

    #[test]
    fn test_get_as_typed() {
        let ctx = ExecutionContext::new().with("retries", json!(3));
        assert_eq!(ctx.get_as::<u32>("retries"), Some(3));
        assert_eq!(ctx.get_as::<String>("retries"), None);
    }

    #[test]
    fn test_cancellation_shared_across_derived_contexts() {
        let base = ExecutionContext::new();
        let derived = base.with(USER_ID, "u-1");

        base.cancel();
        assert!(derived.is_cancelled());
    }

    #[tokio::test]
    async fn test_ambient_scope_survives_await() {
        let ctx = ExecutionContext::new().with(CORRELATION_ID, "corr-1");

        ExecutionContext::scope(ctx, async {
            tokio::task::yield_now().await;
            let current = ExecutionContext::current().unwrap();
            assert_eq!(current.correlation_id(), Some("corr-1".to_string()));
        })
        .await;

        assert!(ExecutionContext::current().is_none());
    }
}
