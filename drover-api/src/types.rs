use crate::store::Session;
use crate::work::WorkError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// Type aliases for common types
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one unit of work.
pub type WorkResult = Result<(), WorkError>;

/// Shared handle to a scoped store session.
pub type SessionRef = Arc<dyn Session>;

/// One-shot action executed against a scoped session.
pub type SessionAction = Box<dyn FnOnce(SessionRef) -> BoxedFuture<'static, WorkResult> + Send>;

/// Callback invoked for every query result admitted to the pool.
pub type ItemCallback =
    Arc<dyn Fn(SessionRef, String) -> BoxedFuture<'static, WorkResult> + Send + Sync>;

/// Synchronous admission filter applied to a query result identifier.
///
/// Filters combine with AND semantics; a `false` skips the result without
/// counting it as a failure.
pub type ItemFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Re-runnable mutation grouped by the batch committer.
///
/// Mutations must be re-runnable (`Fn`, not `FnOnce`) because a failed
/// commit retries the whole group against the same session.
pub type MutationFn = Arc<dyn Fn(SessionRef) -> BoxedFuture<'static, WorkResult> + Send + Sync>;
