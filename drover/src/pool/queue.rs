use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::WorkItem;

/// Heap entry pairing a work item with its admission ordering key.
///
/// Higher priority wins; within one priority the lower sequence number wins,
/// which keeps dispatch stable FIFO for equal-priority work.
struct PendingEntry {
    item: WorkItem,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.item.priority == other.item.priority && self.item.seq == other.item.seq
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.item
            .priority
            .cmp(&other.item.priority)
            .then_with(|| other.item.seq.cmp(&self.item.seq))
    }
}

/// Priority-ordered queue of pending units of work.
///
/// The dispatch loop is the only consumer; submitters are the producers.
/// Push and pop take a short critical section on the heap; wakeup uses
/// `Notify` so the dispatch loop neither spins nor misses work.
pub struct PendingQueue {
    heap: Mutex<BinaryHeap<PendingEntry>>,
    notify: Arc<Notify>,
    seq: AtomicU64,
}

impl fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Arc::new(Notify::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Enqueue a unit of work. Never blocks the caller.
    ///
    /// The queue assigns the admission sequence number here so FIFO order
    /// within a priority reflects submission order.
    pub fn push(&self, mut item: WorkItem) {
        item.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().unwrap().push(PendingEntry { item });
        self.notify.notify_one();
    }

    /// Pop the highest-priority pending item, if any.
    pub fn try_pop(&self) -> Option<WorkItem> {
        self.heap.lock().unwrap().pop().map(|entry| entry.item)
    }

    /// Wait until a pending item is available and pop it.
    pub async fn pop(&self) -> WorkItem {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }

            self.notify.notified().await;

            // Another consumer may have raced us; loop and wait again.
            if let Some(item) = self.try_pop() {
                return item;
            }
        }
    }

    /// Snapshot of the current queue depth.
    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    /// Notification handle used to wake the dispatch loop on shutdown.
    pub fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
