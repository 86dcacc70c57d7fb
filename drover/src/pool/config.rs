use std::time::Duration;

/// Configuration for the throttled worker pool
///
/// All tuning values live here; the pool has no package-level defaults so
/// tests can run it with arbitrary parameters.
#[derive(Debug, Clone)]
pub struct ThrottledPoolConfig {
    /// Number of worker tasks. The pool never runs more units of work
    /// concurrently than this, regardless of queue depth.
    pub pool_size: usize,

    /// CPU utilization ceiling (percent). The dispatch loop holds queued
    /// work while the sampled CPU is at or above this value.
    pub cpu_ceiling: f32,

    /// Memory utilization ceiling (percent).
    pub memory_ceiling: f32,

    /// Interval between pressure samples. Short enough to catch runaway
    /// growth, long enough not to dominate CPU itself.
    pub sample_interval: Duration,

    /// Number of recent completion records retained for the statistics
    /// snapshot.
    pub stats_capacity: usize,

    /// How long `shutdown` waits for workers to drain before giving up.
    pub shutdown_timeout: Duration,
}

impl Default for ThrottledPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get(),
            cpu_ceiling: 85.0,
            memory_ceiling: 85.0,
            sample_interval: Duration::from_millis(100),
            stats_capacity: 4096,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}
