//! Default metrics source backed by `sysinfo`.
//!
//! The admission gate only depends on the [`MetricsSource`] trait; this is
//! the out-of-the-box implementation sampling host-wide CPU and memory.

use drover_api::metrics::{MetricsError, MetricsSource};
use std::sync::Mutex;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

/// Host-wide CPU and memory sampler.
///
/// CPU usage needs two refreshes some interval apart before the first
/// meaningful reading; the gate's periodic sampling provides that naturally.
pub struct SystemMonitor {
    system: Mutex<System>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SystemMonitor {
    fn sample_cpu_percent(&self) -> Result<f32, MetricsError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| MetricsError::Unavailable("sampler lock poisoned".to_string()))?;
        system.refresh_cpu_usage();
        Ok(system.global_cpu_usage())
    }

    fn sample_memory_percent(&self) -> Result<f32, MetricsError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| MetricsError::Unavailable("sampler lock poisoned".to_string()))?;
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(MetricsError::Unavailable(
                "total memory reported as zero".to_string(),
            ));
        }

        Ok((system.used_memory() as f32 / total as f32) * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_are_in_percent_range() {
        let monitor = SystemMonitor::new();

        let cpu = monitor.sample_cpu_percent().unwrap();
        assert!((0.0..=100.0).contains(&cpu));

        let memory = monitor.sample_memory_percent().unwrap();
        assert!((0.0..=100.0).contains(&memory));
    }
}
