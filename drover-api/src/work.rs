//! # Unit-of-Work States and Errors
//!
//! This module defines the lifecycle a scheduled unit of work moves through
//! and the error taxonomy captured at the dispatch boundary.
//!
//! ## Design Philosophy
//!
//! Nothing inside a unit of work is allowed to terminate the hosting worker
//! or the pool. Every failure is captured, classified, and either retried or
//! recorded; cancellation is a clean exit, not a failure.
//!
//! ## Usage Example
//!
//! ```rust
//! use drover_api::work::WorkError;
//!
//! fn classify(error: &WorkError) -> &'static str {
//!     match error {
//!         WorkError::Store(e) if e.is_retryable() => "retry",
//!         WorkError::Interrupted => "clean exit",
//!         _ => "ledger",
//!     }
//! }
//! ```

use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Lifecycle states of a unit of work.
///
/// A unit is immutable once submitted and moves strictly forward:
/// `Queued → Admitted → Running → {Succeeded, Failed, Cancelled}`.
/// Terminal states appear in completion records and their serialized
/// snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkStatus {
    /// Waiting in the priority-ordered pending queue.
    Queued,

    /// Released by the admission gate, awaiting a free worker.
    Admitted,

    /// Executing on a pool worker.
    Running,

    /// Completed without error.
    Succeeded,

    /// Completed with a captured error.
    Failed,

    /// Exited early because its cancellation group was cancelled.
    ///
    /// Not a failure: never ledgered, never counted as an error.
    Cancelled,
}

impl WorkStatus {
    /// Whether the unit has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkStatus::Succeeded | WorkStatus::Failed | WorkStatus::Cancelled
        )
    }
}

/// Errors produced by a unit of work, captured at the dispatch boundary.
#[derive(Error, Debug)]
pub enum WorkError {
    /// The store collaborator failed.
    ///
    /// Auth failures are fatal for the unit; retryable variants are only
    /// retried inside the batch committer, never by the pool itself.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The scheduled callback returned an error of its own.
    #[error("Callback failed: {0}")]
    Callback(String),

    /// The unit observed a forced cancellation and stopped at an await point.
    ///
    /// Treated as a clean exit, not recorded as a failure.
    #[error("Interrupted by forced cancellation")]
    Interrupted,

    /// A batch commit group exhausted its retries.
    ///
    /// The committer has already ledgered one entry per grouped item, so
    /// the dispatch wrapper must not ledger this error again.
    #[error("Batch commit failed after {attempts} attempts: {source}")]
    BatchCommit {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// The callback panicked; the panic was caught at the dispatch boundary.
    #[error("Panic in unit of work: {0}")]
    Panic(String),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkError {
    /// Whether this error represents cancellation rather than failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!WorkStatus::Queued.is_terminal());
        assert!(!WorkStatus::Admitted.is_terminal());
        assert!(!WorkStatus::Running.is_terminal());
        assert!(WorkStatus::Succeeded.is_terminal());
        assert!(WorkStatus::Failed.is_terminal());
        assert!(WorkStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_cancellation_is_not_failure() {
        assert!(WorkError::Interrupted.is_cancellation());
        assert!(!WorkError::Callback("boom".into()).is_cancellation());
        assert!(!WorkError::Store(StoreError::SessionClosed).is_cancellation());
    }
}
