//! Counting semaphore
//!
//! `signal` adds a permit, `wait` blocks until a permit is available and takes
//! it. The quiescence protocol uses one as a barrier: the coordinator waits
//! once per expected worker signal.
//!
//! The semaphore also keeps running totals of signals and completed waits so
//! callers can check protocol invariants after the fact.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
    signals: AtomicUsize,
    waits: AtomicUsize,
}

impl Semaphore {
    /// Create a semaphore holding `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
            signals: AtomicUsize::new(0),
            waits: AtomicUsize::new(0),
        }
    }

    /// Release one permit, waking a single waiter.
    pub fn signal(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.signals.fetch_add(1, Ordering::SeqCst);
        self.available.notify_one();
    }

    /// Block until a permit is available, then take it.
    ///
    /// There is no timeout: a missing signal blocks the caller forever.
    pub fn wait(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        self.waits.fetch_add(1, Ordering::SeqCst);
    }

    /// Total number of `signal` calls so far.
    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }

    /// Total number of completed `wait` calls so far.
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initial_permits_do_not_block() {
        let sem = Semaphore::new(2);
        sem.wait();
        sem.wait();
        assert_eq!(sem.waits(), 2);
        assert_eq!(sem.signals(), 0);
    }

    #[test]
    fn test_wait_blocks_until_signal() {
        let sem = Arc::new(Semaphore::new(0));
        let signaller = Arc::clone(&sem);

        let handle = thread::spawn(move || {
            for _ in 0..3 {
                signaller.signal();
            }
        });

        for _ in 0..3 {
            sem.wait();
        }
        handle.join().unwrap();

        assert_eq!(sem.signals(), 3);
        assert_eq!(sem.waits(), 3);
    }

    #[test]
    fn test_signals_accumulate_without_waiters() {
        let sem = Semaphore::new(0);
        sem.signal();
        sem.signal();
        assert_eq!(sem.signals(), 2);
        assert_eq!(sem.waits(), 0);
        sem.wait();
        sem.wait();
        assert_eq!(sem.waits(), 2);
    }
}
