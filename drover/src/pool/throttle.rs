//! # Admission Gate
//!
//! The [`ResourceGate`] holds the most recent CPU and memory samples and
//! answers one question: is the host under enough pressure that no new work
//! should be admitted? Samples are refreshed by a dedicated sampler task on
//! a bounded interval rather than recomputed per task, which keeps the gate
//! itself nearly free.
//!
//! A sampler failure never blocks admission forever: the gate keeps serving
//! the last known values until a sample succeeds again.

use drover_api::metrics::MetricsSource;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{trace, warn};

/// Shared view of sampled host pressure with configured ceilings.
pub struct ResourceGate {
    /// Last sampled CPU percent, stored as f32 bits.
    cpu_bits: AtomicU32,

    /// Last sampled memory percent, stored as f32 bits.
    memory_bits: AtomicU32,

    cpu_ceiling: f32,
    memory_ceiling: f32,
    sample_interval: Duration,

    /// Woken after every sample that lands below both ceilings.
    changed: Arc<Notify>,

    /// Count of failed sampler reads, for the statistics snapshot.
    sample_failures: AtomicU64,
}

impl ResourceGate {
    pub fn new(cpu_ceiling: f32, memory_ceiling: f32, sample_interval: Duration) -> Self {
        Self {
            // Start optimistic: the first real sample arrives within one
            // interval and corrects the picture.
            cpu_bits: AtomicU32::new(0f32.to_bits()),
            memory_bits: AtomicU32::new(0f32.to_bits()),
            cpu_ceiling,
            memory_ceiling,
            sample_interval,
            changed: Arc::new(Notify::new()),
            sample_failures: AtomicU64::new(0),
        }
    }

    /// Last sampled CPU percent.
    pub fn current_cpu(&self) -> f32 {
        f32::from_bits(self.cpu_bits.load(Ordering::Relaxed))
    }

    /// Last sampled memory percent.
    pub fn current_memory(&self) -> f32 {
        f32::from_bits(self.memory_bits.load(Ordering::Relaxed))
    }

    /// Whether both dimensions are below their ceilings.
    pub fn is_low(&self) -> bool {
        self.current_cpu() < self.cpu_ceiling && self.current_memory() < self.memory_ceiling
    }

    pub fn sample_failures(&self) -> u64 {
        self.sample_failures.load(Ordering::Relaxed)
    }

    /// Take one sample from the source and publish it.
    ///
    /// On a failed read the previous value is kept; the gate must keep
    /// answering with the last known pressure rather than stall.
    pub fn record_sample(&self, source: &dyn MetricsSource) {
        match source.sample_cpu_percent() {
            Ok(cpu) => self.cpu_bits.store(cpu.to_bits(), Ordering::Relaxed),
            Err(e) => {
                self.sample_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "cpu sample failed, reusing last value");
            }
        }

        match source.sample_memory_percent() {
            Ok(memory) => self.memory_bits.store(memory.to_bits(), Ordering::Relaxed),
            Err(e) => {
                self.sample_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "memory sample failed, reusing last value");
            }
        }

        trace!(
            cpu = self.current_cpu(),
            memory = self.current_memory(),
            "pressure sample"
        );

        if self.is_low() {
            self.changed.notify_waiters();
        }
    }

    /// Block the calling task until sampled CPU and memory are both below
    /// their ceilings.
    ///
    /// Waiters are woken on every low sample and additionally re-check on
    /// the sampling interval, so a missed notification cannot strand them.
    pub async fn wait_until_low(&self) {
        loop {
            if self.is_low() {
                return;
            }

            let notified = self.changed.notified();
            tokio::select! {
                _ = notified => {}
                _ = time::sleep(self.sample_interval) => {}
            }
        }
    }

    /// Launch the sampler loop for this gate.
    ///
    /// The loop samples `source` every `sample_interval` until the shutdown
    /// flag is set.
    pub fn spawn_sampler(
        self: &Arc<Self>,
        runtime_handle: &Handle,
        source: Arc<dyn MetricsSource>,
        shutdown_flag: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let gate = self.clone();
        runtime_handle.spawn(async move {
            while !shutdown_flag.load(Ordering::Relaxed) {
                gate.record_sample(source.as_ref());
                time::sleep(gate.sample_interval).await;
            }
            // Release anything still parked on the gate so shutdown can
            // observe the flag.
            gate.changed.notify_waiters();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_api::metrics::MetricsError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        cpu: Mutex<VecDeque<Result<f32, MetricsError>>>,
        memory: f32,
    }

    impl MetricsSource for ScriptedSource {
        fn sample_cpu_percent(&self) -> Result<f32, MetricsError> {
            self.cpu
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(self.memory))
        }

        fn sample_memory_percent(&self) -> Result<f32, MetricsError> {
            Ok(self.memory)
        }
    }

    #[test]
    fn test_gate_tracks_samples() {
        let gate = ResourceGate::new(80.0, 80.0, Duration::from_millis(10));
        let source = ScriptedSource {
            cpu: Mutex::new(VecDeque::from([Ok(95.0f32), Ok(10.0f32)])),
            memory: 10.0,
        };

        gate.record_sample(&source);
        assert_eq!(gate.current_cpu(), 95.0);
        assert!(!gate.is_low());

        gate.record_sample(&source);
        assert_eq!(gate.current_cpu(), 10.0);
        assert!(gate.is_low());
    }

    #[test]
    fn test_failed_sample_reuses_last_value() {
        let gate = ResourceGate::new(80.0, 80.0, Duration::from_millis(10));
        let source = ScriptedSource {
            cpu: Mutex::new(VecDeque::from([
                Ok(95.0f32),
                Err(MetricsError::Unavailable("proc".into())),
            ])),
            memory: 10.0,
        };

        gate.record_sample(&source);
        gate.record_sample(&source);

        assert_eq!(gate.current_cpu(), 95.0);
        assert_eq!(gate.sample_failures(), 1);
    }

    #[tokio::test]
    async fn test_wait_until_low_releases_on_low_sample() {
        let gate = Arc::new(ResourceGate::new(80.0, 80.0, Duration::from_millis(5)));
        let source = ScriptedSource {
            cpu: Mutex::new(VecDeque::from([Ok(95.0f32), Ok(10.0f32)])),
            memory: 10.0,
        };

        gate.record_sample(&source);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_until_low().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.record_sample(&source);
        waiter.await.unwrap();
    }
}
