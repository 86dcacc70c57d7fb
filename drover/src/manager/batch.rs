//! # Batch Committer
//!
//! Committing a transactional session after every single mutation is
//! prohibitively slow at scale. The [`BatchCommitter`] groups a configurable
//! number of mutations, schedules each full group as one deferred unit of
//! work that applies every mutation and commits once, and absorbs transient
//! commit conflicts with a bounded retry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time;
use tracing::{error, warn};

use drover_api::types::MutationFn;
use drover_api::work::WorkError;

use super::{ActionManager, ManagerError};

/// Groups mutations into periodically committed, retryable transactions.
///
/// One committer serves one action manager; `add` from multiple tasks is
/// safe, though groups then reflect arrival order across those tasks.
pub struct BatchCommitter {
    manager: Arc<ActionManager>,
    batch_size: usize,
    retry_count: u32,
    retry_wait: Duration,
    pending: Mutex<Vec<(String, MutationFn)>>,
}

impl BatchCommitter {
    /// Create a committer flushing every `batch_size` mutations.
    pub fn new(manager: Arc<ActionManager>, batch_size: usize) -> Self {
        Self {
            manager,
            batch_size: batch_size.max(1),
            retry_count: 3,
            retry_wait: Duration::from_millis(100),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Create a committer using the manager's configured save interval.
    pub fn with_save_interval(manager: Arc<ActionManager>) -> Self {
        let batch_size = manager.save_interval();
        Self::new(manager, batch_size)
    }

    /// Number of retries after a failed commit before the group is recorded
    /// as failed; `n` retries means at most `n + 1` total attempts.
    pub fn set_retry_count(&mut self, retry_count: u32) {
        self.retry_count = retry_count;
    }

    /// Wait between commit attempts.
    pub fn set_retry_wait(&mut self, retry_wait: Duration) {
        self.retry_wait = retry_wait;
    }

    /// Append a mutation for `identifier` to the current group, scheduling
    /// the group once it reaches the batch size.
    pub fn add(&self, identifier: impl Into<String>, mutation: MutationFn) -> Result<(), ManagerError> {
        let full_group = {
            let mut pending = self.pending.lock().unwrap();
            pending.push((identifier.into(), mutation));
            if pending.len() >= self.batch_size {
                Some(pending.drain(..).collect::<Vec<_>>())
            } else {
                None
            }
        };

        match full_group {
            Some(group) => self.schedule_group(group),
            None => Ok(()),
        }
    }

    /// Force-flush a partial group.
    ///
    /// Used at traversal boundaries and at the very end of processing; a
    /// committer dropped with unflushed mutations loses them.
    pub fn commit_batch(&self) -> Result<(), ManagerError> {
        let group: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        if group.is_empty() {
            return Ok(());
        }
        self.schedule_group(group)
    }

    /// Mutations currently buffered and not yet scheduled.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn schedule_group(&self, group: Vec<(String, MutationFn)>) -> Result<(), ManagerError> {
        let manager = self.manager.clone();
        let retry_count = self.retry_count;
        let retry_wait = self.retry_wait;

        self.manager.deferred_with_resolver(Box::new(move |session| {
            Box::pin(async move {
                let mut attempts = 0u32;
                loop {
                    attempts += 1;

                    let attempt = async {
                        for (identifier, mutation) in &group {
                            manager.set_current_item(identifier.clone());
                            mutation(session.clone()).await?;
                        }
                        session.commit().await.map_err(WorkError::from)
                    }
                    .await;

                    match attempt {
                        Ok(()) => return Ok(()),
                        Err(WorkError::Store(store_error)) => {
                            if store_error.is_retryable() && attempts <= retry_count {
                                warn!(
                                    manager = manager.name(),
                                    attempts,
                                    error = %store_error,
                                    "commit group failed, retrying"
                                );
                                time::sleep(retry_wait).await;
                                continue;
                            }

                            error!(
                                manager = manager.name(),
                                attempts,
                                group_size = group.len(),
                                error = %store_error,
                                "commit group exhausted retries"
                            );
                            // One ledger entry per originally-grouped item;
                            // the dispatch wrapper sees BatchCommit and will
                            // not ledger the group a second time.
                            for (identifier, _) in &group {
                                manager.record_failure(
                                    identifier.clone(),
                                    &WorkError::Store(store_error.clone()),
                                );
                            }
                            return Err(WorkError::BatchCommit {
                                attempts,
                                source: store_error,
                            });
                        }
                        // A mutation's own logic error: not a commit failure,
                        // handled by the normal single-entry ledger path.
                        Err(other) => return Err(other),
                    }
                }
            })
        }))
    }
}
