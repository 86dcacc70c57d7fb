//! # Pool Statistics
//!
//! Every completed unit of work logs a timing record; the pool keeps a
//! bounded rolling table of them plus aggregate counters, and exposes the
//! whole thing as a serializable read-only snapshot for reporting surfaces.
//!
//! Workers push completion records onto a lock-free queue so the hot path
//! never contends on the rolling table; records are folded in when a
//! snapshot is taken.

use crossbeam_queue::SegQueue;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use drover_api::work::WorkStatus;

/// Timing record for one completed unit of work.
///
/// The four timestamps bracket the three delays callers care about:
/// queueing (`started - created`), throttling (`executed - started`) and the
/// work itself (`finished - executed`). `status` is the unit's terminal
/// state.
#[derive(Debug, Clone)]
pub struct TaskTiming {
    pub created: Instant,
    pub started: Instant,
    pub executed: Instant,
    pub finished: Instant,
    pub status: WorkStatus,
    pub error: Option<String>,
}

impl TaskTiming {
    pub fn queue_delay(&self) -> std::time::Duration {
        self.started.duration_since(self.created)
    }

    pub fn throttle_delay(&self) -> std::time::Duration {
        self.executed.duration_since(self.started)
    }

    pub fn work_duration(&self) -> std::time::Duration {
        self.finished.duration_since(self.executed)
    }
}

/// Serializable view of one completion record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTimingSnapshot {
    pub queue_ms: u64,
    pub throttle_ms: u64,
    pub work_ms: u64,
    pub status: WorkStatus,
    pub error: Option<String>,
}

impl From<&TaskTiming> for TaskTimingSnapshot {
    fn from(timing: &TaskTiming) -> Self {
        Self {
            queue_ms: timing.queue_delay().as_millis() as u64,
            throttle_ms: timing.throttle_delay().as_millis() as u64,
            work_ms: timing.work_duration().as_millis() as u64,
            status: timing.status,
            error: timing.error.clone(),
        }
    }
}

/// Read-only snapshot of pool state for monitoring dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub pool_size: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub sample_failures: u64,
    pub recent: Vec<TaskTimingSnapshot>,
}

/// Rolling statistics table shared by all workers of one pool.
pub struct PoolStatistics {
    capacity: usize,
    incoming: SegQueue<TaskTiming>,
    recent: Mutex<VecDeque<TaskTiming>>,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    running: AtomicUsize,
}

impl PoolStatistics {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            incoming: SegQueue::new(),
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            running: AtomicUsize::new(0),
        }
    }

    /// Record the outcome and timing of one executed unit of work.
    ///
    /// `status` must be terminal; cancelled units go through
    /// [`Self::log_cancelled`] instead and produce no timing record.
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
        debug_assert!(status.is_terminal());
        if status == WorkStatus::Succeeded {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        self.incoming.push(TaskTiming {
            created,
            started,
            executed,
            finished,
            status,
            error,
        });
    }

    /// Record a unit that exited due to cancellation.
    ///
    /// Cancellation is not a failure; it is counted separately and produces
    /// no timing record.
    pub fn log_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_finished(&self) {
        self.running.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fold queued completion records into the rolling table and return the
    /// most recent records, oldest first.
    pub fn drain_recent(&self) -> Vec<TaskTiming> {
        let mut recent = self.recent.lock().unwrap();
        while let Some(timing) = self.incoming.pop() {
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(timing);
        }
        recent.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn log_one(stats: &PoolStatistics, status: WorkStatus) {
        let t0 = Instant::now();
        stats.log_completion(t0, t0, t0, t0 + Duration::from_millis(5), status, None);
    }

    #[test]
    fn test_counters() {
        let stats = PoolStatistics::new(16);
        log_one(&stats, WorkStatus::Succeeded);
        log_one(&stats, WorkStatus::Succeeded);
        log_one(&stats, WorkStatus::Failed);
        stats.log_cancelled();

        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.cancelled(), 1);

        let recent = stats.drain_recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[2].status, WorkStatus::Failed);
    }

    #[test]
    fn test_rolling_table_is_bounded() {
        let stats = PoolStatistics::new(4);
        for _ in 0..10 {
            log_one(&stats, WorkStatus::Succeeded);
        }

        assert_eq!(stats.drain_recent().len(), 4);
        assert_eq!(stats.completed(), 10);
    }

    #[test]
    fn test_timing_breakdown() {
        let t0 = Instant::now();
        let timing = TaskTiming {
            created: t0,
            started: t0 + Duration::from_millis(10),
            executed: t0 + Duration::from_millis(30),
            finished: t0 + Duration::from_millis(70),
            status: WorkStatus::Succeeded,
            error: None,
        };

        assert_eq!(timing.queue_delay(), Duration::from_millis(10));
        assert_eq!(timing.throttle_delay(), Duration::from_millis(20));
        assert_eq!(timing.work_duration(), Duration::from_millis(40));
    }
}
