//! # Drover Task-Execution API
//!
//! Drover is a resource-aware task-execution core for bulk operations against
//! a shared, session-oriented content store. This crate is the abstract
//! interface layer: the collaborator traits the core consumes, the shared
//! type aliases, and the error taxonomy. The runtime (throttled worker pool,
//! action managers, batch committer) lives in the `drover` crate.
//!
//! ## Design Principles
//!
//! - **Opaque collaborators**: the backing store, query execution, and system
//!   metrics are consumed through small traits; the core never assumes a
//!   concrete store implementation.
//! - **Typed failure classes**: auth/setup errors are fatal for a unit of
//!   work, commit conflicts are retryable, callback errors are ledgered, and
//!   cancellation is not an error at all.
//! - **Closures over hierarchies**: units of work, per-item callbacks,
//!   filters, and mutations are plain function values taking a session and
//!   returning a result.
//!
//! ## Module Organization
//!
//! - [`store`]: store session, session provider, and query executor seams
//! - [`metrics`]: system CPU/memory pressure sampling seam
//! - [`work`]: unit-of-work states and the work error taxonomy
//! - [`priority`]: admission-time priority constants
//! - [`types`]: common type and callback aliases

pub mod metrics;
pub mod priority;
pub mod store;
pub mod types;
pub mod work;

// Re-export commonly used types
pub use metrics::{MetricsError, MetricsSource};
pub use store::{QueryExecutor, Session, SessionProvider, StoreError};
pub use types::{
    BoxedFuture, ItemCallback, ItemFilter, MutationFn, SessionAction, SessionRef, WorkResult,
};
pub use work::{WorkError, WorkStatus};
