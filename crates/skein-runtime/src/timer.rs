//! Deadline-ordered timer queue
//!
//! BinaryHeap keyed by deadline with lazy cancellation: a cancelled handle is
//! dropped from the live set and its heap entry is skipped when it surfaces.
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1)
//! - Pop expired: O(k log n) where k = number of expired timers
//!
//! Not thread-safe on its own; the reactor keeps it behind a mutex.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Callback run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Globally unique timer handle for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    #[inline]
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerHandle(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw handle value (for logging)
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct TimerEntry {
    deadline: Instant,
    handle: TimerHandle,
    callback: TimerCallback,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.handle == other.handle
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed for a min-heap; equal deadlines fire in insertion order
        match other.deadline.cmp(&self.deadline) {
            CmpOrdering::Equal => other.handle.0.cmp(&self.handle.0),
            ord => ord,
        }
    }
}

/// Min-heap of one-shot timers
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    /// Handles inserted and neither fired nor cancelled
    live: HashSet<TimerHandle>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
        }
    }

    /// Schedule `callback` to run at `deadline`
    pub fn insert(&mut self, deadline: Instant, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::next();
        self.live.insert(handle);
        self.heap.push(TimerEntry {
            deadline,
            handle,
            callback,
        });
        handle
    }

    /// Cancel a pending timer
    ///
    /// Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.live.remove(&handle);
        if self.live.is_empty() {
            // Nothing live remains; drop stale entries (and their callbacks) now
            self.heap.clear();
        }
        removed
    }

    /// Remove and return the callbacks of all timers due at `now`,
    /// earliest first
    pub fn pop_expired(&mut self, now: Instant) -> Vec<TimerCallback> {
        let mut expired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(entry) = self.heap.pop() else { break };
            if self.live.remove(&entry.handle) {
                expired.push(entry.callback);
            }
        }
        expired
    }

    /// Earliest live deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.heap.peek() {
            if self.live.contains(&top.handle) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Number of live timers
    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, tag: u32) -> TimerCallback {
        let log = log.clone();
        Box::new(move || log.lock().unwrap().push(tag))
    }

    #[test]
    fn test_handle_uniqueness() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        let h1 = q.insert(now, Box::new(|| {}));
        let h2 = q.insert(now, Box::new(|| {}));
        assert_ne!(h1, h2);
        assert!(h2.raw() > h1.raw());
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut q = TimerQueue::new();
        let base = Instant::now();

        q.insert(base + Duration::from_millis(30), recorder(&log, 3));
        q.insert(base + Duration::from_millis(10), recorder(&log, 1));
        q.insert(base + Duration::from_millis(20), recorder(&log, 2));
        q.insert(base + Duration::from_millis(10), recorder(&log, 11));

        assert_eq!(q.len(), 4);
        assert_eq!(q.next_deadline(), Some(base + Duration::from_millis(10)));

        for cb in q.pop_expired(base + Duration::from_millis(20)) {
            cb();
        }
        assert_eq!(*log.lock().unwrap(), vec![1, 11, 2]);
        assert_eq!(q.len(), 1);

        assert!(q.pop_expired(base).is_empty());
        for cb in q.pop_expired(base + Duration::from_secs(1)) {
            cb();
        }
        assert_eq!(*log.lock().unwrap(), vec![1, 11, 2, 3]);
        assert!(q.is_empty());
        assert_eq!(q.next_deadline(), None);
    }

    #[test]
    fn test_cancel() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut q = TimerQueue::new();
        let base = Instant::now();

        let early = q.insert(base + Duration::from_millis(5), recorder(&log, 1));
        q.insert(base + Duration::from_millis(50), recorder(&log, 2));

        assert!(q.cancel(early));
        assert!(!q.cancel(early));
        assert_eq!(q.len(), 1);
        // Cancelled head is skipped
        assert_eq!(q.next_deadline(), Some(base + Duration::from_millis(50)));

        for cb in q.pop_expired(base + Duration::from_secs(1)) {
            cb();
        }
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_cancel_last_drops_callback() {
        let marker = Arc::new(());
        let held = marker.clone();
        let mut q = TimerQueue::new();
        let h = q.insert(Instant::now() + Duration::from_secs(60), Box::new(move || drop(held)));
        assert_eq!(Arc::strong_count(&marker), 2);
        assert!(q.cancel(h));
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
