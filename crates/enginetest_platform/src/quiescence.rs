//! Worker quiescence: park every worker, swap, release
//!
//! Replacing the process-wide platform while a worker thread is running a task
//! that reads it would let that task observe a half-torn-down platform. The
//! protocol below makes the swap happen only while every worker is provably
//! parked inside a task the coordinator owns.
//!
//! For a pool of `N` workers:
//!
//! 1. Create a session: a counting barrier, a mutex-guarded `may_proceed`
//!    flag (initially false) and a condition variable.
//! 2. Post `N` shutdown tasks. Each one signals the barrier, blocks until
//!    `may_proceed` is true, then signals the barrier again. A worker that is
//!    blocked in one shutdown task cannot pick up another, so the `N` tasks
//!    land on `N` distinct workers.
//! 3. Wait on the barrier `N` times: every worker is now parked.
//! 4. Swap.
//! 5. Set `may_proceed` and wake every worker.
//! 6. Wait on the barrier `N` more times: every worker has left the wait and
//!    is unwinding out of the shutdown task.
//! 7. Drop the session.
//!
//! The second round keeps the session alive until the last worker is done
//! with its mutex and condition variable, and it guarantees the pool is idle
//! again when the coordinator returns.
//!
//! There is no timeout. A pool that never runs the posted tasks blocks the
//! coordinator forever; a hung pool during shutdown is fatal and has to be
//! diagnosed from outside.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::{Platform, Semaphore};

/// What the coordinator observed during one drain-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescenceReport {
    /// Pool size the protocol was run against.
    pub workers: usize,
    /// Barrier waits completed by the coordinator (`2 * workers`).
    pub barrier_waits: usize,
    /// Barrier signals received when the swap ran (`workers`).
    pub signals_at_swap: usize,
    /// Barrier signals received in total (`2 * workers`).
    pub signals_total: usize,
}

/// Synchronization state shared by the coordinator and the shutdown tasks.
struct QuiescenceSession {
    barrier: Semaphore,
    may_proceed: Mutex<bool>,
    released: Condvar,
}

impl QuiescenceSession {
    fn new() -> Self {
        Self {
            barrier: Semaphore::new(0),
            may_proceed: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// Body of a shutdown task.
    fn park_worker(&self) {
        self.barrier.signal();
        {
            let mut may_proceed = self.may_proceed.lock();
            while !*may_proceed {
                self.released.wait(&mut may_proceed);
            }
        }
        self.barrier.signal();
    }

    fn release_workers(&self) {
        let mut may_proceed = self.may_proceed.lock();
        *may_proceed = true;
        self.released.notify_all();
    }

    fn await_workers(&self, workers: usize) {
        for _ in 0..workers {
            self.barrier.wait();
        }
    }
}

/// Park all `workers` threads of `pool`, run `swap`, then release them.
///
/// `workers` must be the number of threads that actually execute tasks posted
/// to `pool`. Returns the value produced by `swap` and a report of the
/// barrier traffic.
#[tracing::instrument(skip_all, fields(workers = workers))]
pub fn quiesce_and_swap<R>(pool: &dyn Platform, workers: usize, swap: impl FnOnce() -> R) -> (R, QuiescenceReport) {
    if workers == 0 {
        tracing::debug!("no workers to park, swapping immediately");
        let value = swap();
        let report = QuiescenceReport {
            workers,
            barrier_waits: 0,
            signals_at_swap: 0,
            signals_total: 0,
        };
        return (value, report);
    }

    let session = Arc::new(QuiescenceSession::new());

    for _ in 0..workers {
        let session = Arc::clone(&session);
        pool.call_on_worker_thread(Box::new(move || session.park_worker()));
    }

    session.await_workers(workers);
    tracing::debug!("all workers parked");

    let signals_at_swap = session.barrier.signals();
    let value = swap();

    session.release_workers();
    session.await_workers(workers);
    tracing::debug!("all workers resumed");

    let report = QuiescenceReport {
        workers,
        barrier_waits: session.barrier.waits(),
        signals_at_swap,
        signals_total: session.barrier.signals(),
    };
    drop(session);

    (value, report)
}
