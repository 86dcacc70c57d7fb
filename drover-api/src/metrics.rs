//! # System Metrics Seam
//!
//! The admission gate samples host pressure through [`MetricsSource`]. The
//! trait is synchronous on purpose: samplers read counters, they do not do
//! I/O, and the gate calls them from its own sampling task on a bounded
//! interval. A sampler that occasionally fails is tolerated; the gate reuses
//! the last known value instead of blocking forever.

use thiserror::Error;

/// Errors from a pressure sampler.
#[derive(Error, Debug, Clone)]
pub enum MetricsError {
    /// The sampler could not produce a reading this cycle.
    #[error("Metrics sample unavailable: {0}")]
    Unavailable(String),
}

/// Live source of system CPU and memory pressure.
pub trait MetricsSource: Send + Sync {
    /// Current CPU utilization, 0.0–100.0.
    fn sample_cpu_percent(&self) -> Result<f32, MetricsError>;

    /// Current memory utilization, 0.0–100.0.
    fn sample_memory_percent(&self) -> Result<f32, MetricsError>;
}
