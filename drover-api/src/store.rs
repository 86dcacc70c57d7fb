//! # Store Collaborator Seams
//!
//! The backing content store is an external collaborator. The core only ever
//! touches it through the traits in this module: a [`Session`] is a scoped,
//! transactional handle, a [`SessionProvider`] opens new sessions, and a
//! [`QueryExecutor`] resolves a query statement to result identifiers.
//!
//! Error classification matters more than error detail here: the core
//! distinguishes retryable commit conflicts from fatal auth failures and
//! treats everything else as a plain backend error.

use crate::types::SessionRef;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the store collaborator.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The store rejected the credentials or the auth context expired.
    ///
    /// Fatal for the affected session; never retried.
    #[error("Store authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A commit raced a concurrent mutation of the same content.
    ///
    /// Transient; the batch committer retries these a bounded number of
    /// times before ledgering the group.
    #[error("Commit conflict: {0}")]
    CommitConflict(String),

    /// The store did not answer within its own deadline.
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// The target path or key does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// The session was used after being closed.
    #[error("Session closed")]
    SessionClosed,

    /// Any other backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a retry of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::CommitConflict(_) | StoreError::Timeout(_))
    }
}

/// A scoped, transactional handle to the backing content store.
///
/// Sessions are owned exclusively by one action manager and are never shared
/// between concurrently running units of work. Implementations carry their
/// own interior mutability; the core only requires `Send + Sync`.
#[async_trait]
pub trait Session: Send + Sync {
    /// Persist all pending mutations made through this session.
    async fn commit(&self) -> Result<(), StoreError>;

    /// Release the session. Safe to call more than once.
    async fn close(&self) -> Result<(), StoreError>;

    /// Whether the session is still usable.
    fn is_live(&self) -> bool;
}

/// Opens scoped sessions against the backing store.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Open a fresh session.
    ///
    /// Fails with [`StoreError::AuthenticationFailed`] when the provider's
    /// auth context is no longer valid.
    async fn open_session(&self) -> Result<SessionRef, StoreError>;
}

/// Executes queries against the backing store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `statement` in the given query `language` and return the matched
    /// identifiers (store paths or keys) in result order.
    async fn query(
        &self,
        statement: &str,
        language: &str,
        session: &SessionRef,
    ) -> Result<Vec<String>, StoreError>;
}
