//! # Throttled Worker Pool
//!
//! A bounded pool of workers draining one shared, priority-ordered queue of
//! units of work, with admission gated on live CPU/memory pressure.
//!
//! The dispatch loop is the only place the gate is checked: it pops the
//! highest-priority pending item, blocks until pressure is below both
//! ceilings, and hands the item to a free worker over a rendezvous channel.
//! Callers submitting work never block; callers who want to self-throttle
//! their own expensive sections can use
//! [`ThrottledWorkPool::wait_for_low_cpu_and_low_memory`] directly.

pub mod config;
pub(crate) mod queue;
pub mod stats;
pub mod throttle;
pub(crate) mod worker;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use drover_api::metrics::MetricsSource;
use drover_api::priority;
use drover_api::types::{BoxedFuture, WorkResult};
use drover_api::work::{WorkError, WorkStatus};

use crate::cancel::CancelGroup;
use config::ThrottledPoolConfig;
use queue::PendingQueue;
use stats::{PoolSnapshot, PoolStatistics, TaskTimingSnapshot};
use throttle::ResourceGate;
use worker::Worker;

/// A schedulable unit of work: a one-shot closure producing the work future.
pub type Job = Box<dyn FnOnce() -> BoxedFuture<'static, WorkResult> + Send>;

/// Invoked exactly once when a unit of work reaches a terminal state.
pub(crate) type CompletionFn = Box<dyn FnOnce(WorkResult) + Send>;

/// One queued unit of work plus its scheduling metadata.
pub(crate) struct WorkItem {
    pub(crate) id: Uuid,
    pub(crate) priority: u8,
    /// Admission sequence, assigned by the pending queue.
    pub(crate) seq: u64,
    pub(crate) created: Instant,
    pub(crate) cancel: Option<CancelGroup>,
    pub(crate) job: Job,
    pub(crate) on_complete: Option<CompletionFn>,
}

#[cfg(test)]
impl WorkItem {
    pub(crate) fn noop(priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority,
            seq: 0,
            created: Instant::now(),
            cancel: None,
            job: Box::new(|| Box::pin(async { Ok(()) })),
            on_complete: None,
        }
    }
}

/// An admitted unit of work on its way to a worker.
pub(crate) struct DispatchedItem {
    pub(crate) item: WorkItem,
    /// When the dispatch loop popped the item from the queue.
    pub(crate) started: Instant,
    /// When the resource gate released the item.
    pub(crate) executed: Instant,
}

/// Errors related to the worker pool itself.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker pool is shutting down")]
    ShuttingDown,
    #[error("Worker pool did not drain within the shutdown timeout")]
    ShutdownTimeout,
    #[error("Internal pool error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Status codes for the pool lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Pool is initializing
    Initializing = 0,

    /// Pool is running normally
    Running = 1,

    /// Pool is shutting down
    ShuttingDown = 2,

    /// Pool has completed shutdown
    Shutdown = 3,
}

/// Resource-aware, admission-controlled worker pool.
///
/// # Thread Safety
/// - Shared state is held behind `Arc`s, atomics, and short-critical-section
///   locks; workers and the dispatch loop run as independent tokio tasks.
///
/// # Failure Semantics
/// - An uncaught error or panic in a unit of work is captured at the
///   dispatch boundary, recorded in statistics, and never kills the worker;
///   the worker count stays stable for the life of the pool.
pub struct ThrottledWorkPool {
    config: ThrottledPoolConfig,

    /// Priority-ordered pending queue
    queue: Arc<PendingQueue>,

    /// CPU/memory admission gate
    gate: Arc<ResourceGate>,

    /// Rolling statistics table
    stats: Arc<PoolStatistics>,

    /// Sender side of the dispatch → worker rendezvous channel.
    /// Taken on shutdown so workers observe channel closure.
    tx: Mutex<Option<flume::Sender<DispatchedItem>>>,

    /// Worker task handles
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Dispatch loop and sampler task handles
    background: Mutex<Vec<JoinHandle<()>>>,

    /// Shutdown flag shared with workers, sampler, and dispatch loop
    is_shutting_down: Arc<AtomicBool>,

    /// Wakes the dispatch loop out of queue/gate waits on shutdown
    shutdown_notify: Arc<Notify>,

    /// Current status of the pool
    status: Arc<AtomicUsize>,
}

impl ThrottledWorkPool {
    /// Create a new pool and start its workers, sampler, and dispatch loop.
    ///
    /// # Arguments
    /// * `config` - Optional configuration; defaults are sized from the host
    /// * `metrics` - Pressure sampler feeding the admission gate
    /// * `runtime_handle` - Tokio runtime handle the pool's tasks run on
    pub fn new(
        config: Option<ThrottledPoolConfig>,
        metrics: Arc<dyn MetricsSource>,
        runtime_handle: Handle,
    ) -> Self {
        let config = config.unwrap_or_default();
        let queue = Arc::new(PendingQueue::new());
        let gate = Arc::new(ResourceGate::new(
            config.cpu_ceiling,
            config.memory_ceiling,
            config.sample_interval,
        ));
        let stats = Arc::new(PoolStatistics::new(config.stats_capacity));
        let is_shutting_down = Arc::new(AtomicBool::new(false));
        let shutdown_notify = Arc::new(Notify::new());
        let status = Arc::new(AtomicUsize::new(PoolStatus::Initializing as usize));

        let (tx, rx) = flume::bounded::<DispatchedItem>(0);

        // Start worker tasks
        let mut workers = Vec::with_capacity(config.pool_size);
        for worker_id in 0..config.pool_size {
            let worker = Worker::new(
                worker_id,
                rx.clone(),
                is_shutting_down.clone(),
                stats.clone(),
            );
            workers.push(worker.spawn(&runtime_handle));
        }

        // Start the pressure sampler
        let sampler = gate.spawn_sampler(&runtime_handle, metrics, is_shutting_down.clone());

        // Start the dispatch loop
        let dispatch = Self::spawn_dispatch_loop(
            &runtime_handle,
            queue.clone(),
            gate.clone(),
            stats.clone(),
            tx.clone(),
            is_shutting_down.clone(),
            shutdown_notify.clone(),
        );

        status.store(PoolStatus::Running as usize, Ordering::SeqCst);
        info!(
            pool_size = config.pool_size,
            cpu_ceiling = config.cpu_ceiling,
            memory_ceiling = config.memory_ceiling,
            "throttled work pool started"
        );

        Self {
            config,
            queue,
            gate,
            stats,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            background: Mutex::new(vec![sampler, dispatch]),
            is_shutting_down,
            shutdown_notify,
            status,
        }
    }

    /// The dispatch loop: pop highest-priority work, hold it at the gate,
    /// hand it to a free worker. Runs on its own task; the gate is never
    /// checked anywhere else.
    fn spawn_dispatch_loop(
        runtime_handle: &Handle,
        queue: Arc<PendingQueue>,
        gate: Arc<ResourceGate>,
        stats: Arc<PoolStatistics>,
        tx: flume::Sender<DispatchedItem>,
        is_shutting_down: Arc<AtomicBool>,
        shutdown_notify: Arc<Notify>,
    ) -> JoinHandle<()> {
        runtime_handle.spawn(async move {
            loop {
                if is_shutting_down.load(Ordering::Relaxed) {
                    break;
                }

                let item = tokio::select! {
                    item = queue.pop() => item,
                    _ = shutdown_notify.notified() => break,
                };

                let started = Instant::now();

                // Work belonging to a cancelled group is never admitted.
                if let Some(group) = &item.cancel {
                    if group.is_cancelled() {
                        debug!(task_id = %item.id, "skipping work for cancelled group");
                        stats.log_cancelled();
                        if let Some(on_complete) = item.on_complete {
                            on_complete(Err(WorkError::Interrupted));
                        }
                        continue;
                    }
                }

                tokio::select! {
                    _ = gate.wait_until_low() => {}
                    _ = shutdown_notify.notified() => {
                        Self::resolve_unstarted(item, &stats);
                        break;
                    }
                }

                let executed = Instant::now();
                crate::log_pool!(
                    "dispatch",
                    "admitted",
                    task_id = %item.id,
                    priority = item.priority,
                    throttle_ms = executed.duration_since(started).as_millis() as u64
                );

                let dispatched = DispatchedItem {
                    item,
                    started,
                    executed,
                };
                if let Err(send_error) = tx.send_async(dispatched).await {
                    // All workers are gone; resolve the stranded item.
                    Self::resolve_unstarted(send_error.into_inner().item, &stats);
                    break;
                }
            }

            debug!("dispatch loop stopped");
        })
    }

    /// Terminal accounting for an item the pool will never run.
    fn resolve_unstarted(item: WorkItem, stats: &PoolStatistics) {
        stats.log_cancelled();
        if let Some(on_complete) = item.on_complete {
            on_complete(Err(WorkError::Interrupted));
        }
    }

    /// Enqueue a unit of work at the given priority. Never blocks the caller.
    ///
    /// # Arguments
    /// * `job` - The work closure
    /// * `priority` - Admission priority; see [`drover_api::priority`]
    /// * `cancel` - Optional cancellation group the unit belongs to
    ///
    /// # Returns
    /// The task id, usable to correlate log and statistics entries.
    pub fn schedule_work(
        &self,
        job: Job,
        priority: u8,
        cancel: Option<CancelGroup>,
    ) -> Result<Uuid, PoolError> {
        self.submit(job, priority, cancel, None)
    }

    /// Enqueue with default (normal) priority and no cancellation group.
    pub fn schedule(&self, job: Job) -> Result<Uuid, PoolError> {
        self.submit(job, priority::NORMAL, None, None)
    }

    pub(crate) fn submit(
        &self,
        job: Job,
        priority: u8,
        cancel: Option<CancelGroup>,
        on_complete: Option<CompletionFn>,
    ) -> Result<Uuid, PoolError> {
        if self.is_shutting_down.load(Ordering::Relaxed) {
            return Err(PoolError::ShuttingDown);
        }

        let id = Uuid::new_v4();
        self.queue.push(WorkItem {
            id,
            priority,
            seq: 0,
            created: Instant::now(),
            cancel,
            job,
            on_complete,
        });
        trace!(task_id = %id, priority, queued = self.queue.len(), "work queued");
        Ok(id)
    }

    /// Block the calling task until sampled CPU and memory are both under
    /// their ceilings.
    ///
    /// This is the self-throttling primitive for expensive work running
    /// *outside* the pool. Caller contract: never call this while holding a
    /// lock that pool workers need, since a high-pressure phase would then
    /// stall
    /// the whole pool behind the lock, not just the caller.
    pub async fn wait_for_low_cpu_and_low_memory(&self) {
        self.gate.wait_until_low().await;
    }

    /// Record the outcome and timing of a unit of work executed outside the
    /// pool's workers.
    ///
    /// `executed` marks when the throttle gate released the task, so callers
    /// can separate queueing delay (`started - created`), throttle delay
    /// (`executed - started`) and work duration (`finished - executed`).
    /// `status` must be a terminal [`WorkStatus`].
    #[allow(clippy::too_many_arguments)]
    pub fn log_completion(
        &self,
        created: Instant,
        started: Instant,
        executed: Instant,
        finished: Instant,
        status: WorkStatus,
        error: Option<String>,
    ) {
        self.stats
            .log_completion(created, started, executed, finished, status, error);
    }

    /// Read-only pool size.
    pub fn max_threads(&self) -> usize {
        self.config.pool_size
    }

    /// Current queue depth.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Get the current pool status
    pub fn status(&self) -> PoolStatus {
        match self.status.load(Ordering::Relaxed) {
            0 => PoolStatus::Initializing,
            1 => PoolStatus::Running,
            2 => PoolStatus::ShuttingDown,
            _ => PoolStatus::Shutdown,
        }
    }

    /// Read-only snapshot of pool statistics for monitoring surfaces.
    pub fn snapshot(&self) -> PoolSnapshot {
        let recent = self
            .stats
            .drain_recent()
            .iter()
            .map(TaskTimingSnapshot::from)
            .collect();

        PoolSnapshot {
            pool_size: self.config.pool_size,
            queued: self.queue.len(),
            running: self.stats.running(),
            completed: self.stats.completed(),
            failed: self.stats.failed(),
            cancelled: self.stats.cancelled(),
            cpu_percent: self.gate.current_cpu(),
            memory_percent: self.gate.current_memory(),
            sample_failures: self.gate.sample_failures(),
            recent,
        }
    }

    /// Shut the pool down, waiting up to `timeout` for workers to drain.
    ///
    /// Queued work that was never admitted is resolved as cancelled.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PoolError> {
        self.status
            .store(PoolStatus::ShuttingDown as usize, Ordering::SeqCst);
        self.is_shutting_down.store(true, Ordering::SeqCst);

        // Wake the dispatch loop out of any queue or gate wait, then close
        // the handoff channel so idle workers see disconnection.
        self.shutdown_notify.notify_waiters();
        self.queue.notify_handle().notify_waiters();
        self.tx.lock().unwrap().take();

        // Resolve whatever never left the queue.
        while let Some(item) = self.queue.try_pop() {
            Self::resolve_unstarted(item, &self.stats);
        }

        let mut handles: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        handles.extend(self.background.lock().unwrap().drain(..));

        let drained = tokio::time::timeout(timeout, join_all(handles)).await;

        self.status
            .store(PoolStatus::Shutdown as usize, Ordering::SeqCst);

        match drained {
            Ok(_) => {
                info!("throttled work pool shut down");
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, "workers did not drain within shutdown timeout");
                Err(PoolError::ShutdownTimeout)
            }
        }
    }
}
