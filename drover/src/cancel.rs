//! # Cancellation Groups
//!
//! A [`CancelGroup`] is a shared cancellation flag for one logical bulk
//! operation. Thousands of units of work belonging to the same operation
//! share a single group; the group tracks which pool workers are currently
//! executing its work and can, on a forced cancel, interrupt them.
//!
//! # State Machine
//!
//! Active → Cancelled (terminal for registration) → ForceCancelled
//! (additionally interrupts in-flight workers). There is no transition back.
//!
//! # Safety Considerations
//!
//! Cancellation is cooperative and best-effort. Once the group is cancelled,
//! no new work starts, but already-running work is allowed to finish unless
//! the cancel was forced: interrupting a worker mid-write to the shared
//! store can leave half-applied state behind, so the non-forced path only
//! blocks dispatch and registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Identifier of a pool worker, stable for the life of the pool.
pub type WorkerId = usize;

struct CancelGroupInner {
    /// Once set, new registrations and dispatch of queued work are refused.
    cancelled: AtomicBool,

    /// Set together with `cancelled` on a forced cancel.
    force: AtomicBool,

    /// Interrupt handles for workers currently executing this group's work.
    tracked: Mutex<HashMap<WorkerId, Arc<Notify>>>,
}

/// Shared, shareable cancellation handle for one logical bulk operation.
///
/// Cloning is cheap and every clone observes the same flags and tracked set.
#[derive(Clone)]
pub struct CancelGroup {
    inner: Arc<CancelGroupInner>,
}

impl fmt::Debug for CancelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelGroup")
            .field("cancelled", &self.is_cancelled())
            .field("force", &self.is_force_cancelled())
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

impl Default for CancelGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelGroup {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelGroupInner {
                cancelled: AtomicBool::new(false),
                force: AtomicBool::new(false),
                tracked: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a worker as actively running this group's work.
    ///
    /// Returns the interrupt handle the worker must watch while the unit
    /// runs, or `None` (with a warning) if the group was already cancelled;
    /// the unit must then exit cleanly without starting.
    pub fn track_active_work(&self, worker_id: WorkerId) -> Option<Arc<Notify>> {
        if self.is_cancelled() {
            warn!(worker_id, "refusing to track work on a cancelled group");
            return None;
        }

        let interrupt = Arc::new(Notify::new());
        let mut tracked = self.inner.tracked.lock().unwrap();

        // The flag may have flipped while we waited for the lock; a forced
        // cancel already drained this map and will not visit us again.
        if self.is_cancelled() {
            warn!(worker_id, "refusing to track work on a cancelled group");
            return None;
        }

        tracked.insert(worker_id, interrupt.clone());
        Some(interrupt)
    }

    /// Deregister a worker after its unit of work reached a terminal state.
    pub fn untrack_active_work(&self, worker_id: WorkerId) {
        self.inner.tracked.lock().unwrap().remove(&worker_id);
    }

    /// Cancel the group.
    ///
    /// After this call no queued work of the group is admitted and no new
    /// registration succeeds. With `force`, every currently tracked worker
    /// is additionally sent an interrupt signal and the tracked set is
    /// cleared; in-flight work then stops at its next await point.
    pub fn cancel(&self, force: bool) {
        self.inner.cancelled.store(true, Ordering::SeqCst);

        if force {
            self.inner.force.store(true, Ordering::SeqCst);
            let mut tracked = self.inner.tracked.lock().unwrap();
            debug!(workers = tracked.len(), "force-cancelling tracked workers");
            for (worker_id, interrupt) in tracked.drain() {
                debug!(worker_id, "interrupting worker");
                interrupt.notify_one();
            }
        } else {
            debug!("group cancelled, in-flight work allowed to finish");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_force_cancelled(&self) -> bool {
        self.inner.force.load(Ordering::SeqCst)
    }

    /// Number of workers currently tracked by this group.
    pub fn tracked_count(&self) -> usize {
        self.inner.tracked.lock().unwrap().len()
    }
}
