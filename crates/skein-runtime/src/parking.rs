//! Worker parking
//!
//! One parker per worker. A wake sets a token under the mutex, so a wake that
//! races ahead of `park()` is not lost: the next park consumes it and returns
//! immediately.
//!
//! The `parked` flag lets wakers skip workers that are busy. A worker sets it,
//! fences, then re-checks its queues before committing to sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

pub struct Parker {
    /// Wake token
    token: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl Parker {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }

    /// Announce intent to park
    ///
    /// Must be followed by a queue re-check and then either `park()` or
    /// `cancel_park()`.
    #[inline]
    pub fn prepare_park(&self) {
        self.parked.store(true, Ordering::SeqCst);
        std::sync::atomic::fence(Ordering::SeqCst);
    }

    #[inline]
    pub fn cancel_park(&self) {
        self.parked.store(false, Ordering::SeqCst);
    }

    /// Sleep until woken or `timeout` elapses
    ///
    /// Returns true if woken by `unpark()`.
    pub fn park(&self, timeout: Duration) -> bool {
        let mut token = self.token.lock();
        if !*token {
            let _ = self.condvar.wait_for(&mut token, timeout);
        }
        let woken = std::mem::replace(&mut *token, false);
        self.parked.store(false, Ordering::SeqCst);
        woken
    }

    /// Wake the worker if it is parked or about to park
    ///
    /// Returns true if the worker had announced parking. Clears the flag so
    /// a second waker moves on to another worker.
    pub fn unpark(&self) -> bool {
        if !self.parked.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.force_unpark();
        true
    }

    /// Leave a wake token regardless of the parked flag
    pub fn force_unpark(&self) {
        *self.token.lock() = true;
        self.condvar.notify_one();
    }

    #[inline]
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_park_timeout() {
        let parker = Parker::new();
        parker.prepare_park();
        let start = Instant::now();
        assert!(!parker.park(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(!parker.is_parked());
    }

    #[test]
    fn test_unpark_wakes_parked_worker() {
        let parker = Arc::new(Parker::new());
        let p = parker.clone();
        let handle = thread::spawn(move || {
            p.prepare_park();
            p.park(Duration::from_secs(10))
        });

        let start = Instant::now();
        while !parker.is_parked() {
            thread::yield_now();
        }
        assert!(parker.unpark());
        assert!(!parker.unpark());
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_early_token_not_lost() {
        let parker = Parker::new();
        parker.prepare_park();
        assert!(parker.unpark());
        // Token already set, returns at once
        let start = Instant::now();
        assert!(parker.park(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unpark_busy_worker_is_noop() {
        let parker = Parker::new();
        assert!(!parker.unpark());
        parker.prepare_park();
        assert!(!parker.park(Duration::from_millis(1)));
    }
}
