use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use drover_api::types::WorkResult;
use drover_api::work::{WorkError, WorkStatus};

use super::stats::PoolStatistics;
use super::DispatchedItem;
use crate::cancel::WorkerId;

/// Status codes for worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Worker is idle, waiting for admitted work
    Idle = 0,

    /// Worker is executing a unit of work
    Processing = 1,

    /// Worker is shutting down
    ShuttingDown = 2,
}

/// # Worker Implementation
///
/// One worker of the throttled pool. Workers receive only work that the
/// dispatch loop has already admitted through the resource gate; they never
/// consult the gate themselves.
///
/// ## Key Responsibilities
/// - Executing admitted units of work
/// - Error isolation through panic recovery: a panicking unit never takes
///   the worker down, so the pool's worker count stays stable for its life
/// - Honoring forced cancellation via the unit's cancel-group interrupt
/// - Recording completion timing and outcome statistics
pub struct Worker {
    /// Unique identifier for this worker, stable for the pool's lifetime
    id: WorkerId,

    /// Rendezvous channel carrying admitted work from the dispatch loop
    rx: flume::Receiver<DispatchedItem>,

    /// Signal for worker shutdown
    shutdown_flag: Arc<AtomicBool>,

    /// Shared statistics table
    stats: Arc<PoolStatistics>,

    /// Current worker status
    status: Arc<AtomicUsize>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        rx: flume::Receiver<DispatchedItem>,
        shutdown_flag: Arc<AtomicBool>,
        stats: Arc<PoolStatistics>,
    ) -> Self {
        Self {
            id,
            rx,
            shutdown_flag,
            stats,
            status: Arc::new(AtomicUsize::new(WorkerStatus::Idle as usize)),
        }
    }

    /// Launches the worker's main loop as a Tokio task
    pub fn spawn(self, runtime_handle: &Handle) -> JoinHandle<()> {
        runtime_handle.spawn(async move {
            self.run_loop().await;
        })
    }

    /// Main worker loop
    ///
    /// Receives admitted work until the dispatch channel closes or shutdown
    /// is requested.
    async fn run_loop(&self) {
        while !self.shutdown_flag.load(Ordering::Relaxed) {
            match self.rx.recv_async().await {
                Ok(dispatched) => {
                    self.status
                        .store(WorkerStatus::Processing as usize, Ordering::Relaxed);
                    self.execute(dispatched).await;
                    self.status
                        .store(WorkerStatus::Idle as usize, Ordering::Relaxed);
                }
                // Dispatch loop is gone; nothing more will arrive.
                Err(_) => break,
            }
        }

        self.status
            .store(WorkerStatus::ShuttingDown as usize, Ordering::Relaxed);
        trace!(worker_id = self.id, "worker stopped");
    }

    /// Execute one admitted unit of work with panic isolation.
    async fn execute(&self, dispatched: DispatchedItem) {
        let DispatchedItem {
            item,
            started,
            executed,
        } = dispatched;
        let task_id = item.id;

        // Register with the unit's cancel group. A refusal means the group
        // was cancelled after admission; exit cleanly without starting.
        let interrupt = match &item.cancel {
            Some(group) => match group.track_active_work(self.id) {
                Some(handle) => Some(handle),
                None => {
                    self.stats.log_cancelled();
                    if let Some(on_complete) = item.on_complete {
                        on_complete(Err(WorkError::Interrupted));
                    }
                    return;
                }
            },
            None => None,
        };

        self.stats.worker_started();

        let fut = AssertUnwindSafe((item.job)()).catch_unwind();
        let result: WorkResult = match &interrupt {
            Some(handle) => {
                tokio::select! {
                    caught = fut => flatten_caught(caught),
                    _ = handle.notified() => Err(WorkError::Interrupted),
                }
            }
            None => flatten_caught(fut.await),
        };

        if let Some(group) = &item.cancel {
            group.untrack_active_work(self.id);
        }

        let finished = Instant::now();
        match &result {
            Ok(()) => {
                trace!(worker_id = self.id, %task_id, "unit of work succeeded");
                self.stats.log_completion(
                    item.created,
                    started,
                    executed,
                    finished,
                    WorkStatus::Succeeded,
                    None,
                );
            }
            Err(e) if e.is_cancellation() => {
                debug!(worker_id = self.id, %task_id, "unit of work interrupted");
                self.stats.log_cancelled();
            }
            Err(e) => {
                error!(worker_id = self.id, %task_id, error = %e, "unit of work failed");
                self.stats.log_completion(
                    item.created,
                    started,
                    executed,
                    finished,
                    WorkStatus::Failed,
                    Some(e.to_string()),
                );
            }
        }

        self.stats.worker_finished();

        if let Some(on_complete) = item.on_complete {
            on_complete(result);
        }
    }
}

/// Collapse a caught-panic result into a plain work result.
fn flatten_caught(caught: Result<WorkResult, Box<dyn Any + Send>>) -> WorkResult {
    match caught {
        Ok(result) => result,
        Err(payload) => Err(WorkError::Panic(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
