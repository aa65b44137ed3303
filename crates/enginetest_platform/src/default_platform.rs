//! Default platform: a fixed-size worker pool
//!
//! Worker threads share one ready queue and one delayed-task heap guarded by a
//! single mutex. Delayed tasks are promoted to the ready queue by whichever
//! worker wakes up first after their deadline. Foreground tasks are never run
//! by workers; the control thread runs them through
//! [`Platform::pump_foreground_tasks`].
//!
//! On shutdown workers finish every task already in the ready queue, drop
//! delayed tasks that are not yet due, and exit. A delay too large to add to
//! the current `Instant` parks the task until shutdown; it never runs.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};

use crate::{Platform, Task};

const THREAD_NAME_PREFIX: &str = "enginetest-worker";

/// A task waiting for its deadline.
struct DelayedTask {
    deadline: Instant,
    /// Tie-breaker so equal deadlines run in posting order.
    seq: u64,
    task: Task,
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    // Reversed: `BinaryHeap` is a max-heap and the earliest deadline must surface first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct WorkerQueues {
    ready: VecDeque<Task>,
    delayed: BinaryHeap<DelayedTask>,
    /// Tasks whose deadline does not fit in an `Instant`. They never run.
    parked: Vec<Task>,
    next_seq: u64,
    shutdown: bool,
}

impl WorkerQueues {
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|d| d.deadline <= now) {
            if let Some(due) = self.delayed.pop() {
                self.ready.push_back(due.task);
            }
        }
    }
}

struct PoolShared {
    queues: Mutex<WorkerQueues>,
    work_available: Condvar,
}

/// The production platform.
pub struct DefaultPlatform {
    worker_count: usize,
    shared: Arc<PoolShared>,
    foreground: Mutex<VecDeque<Task>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
}

impl fmt::Debug for DefaultPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.shared.queues.lock();
        f.debug_struct("DefaultPlatform")
            .field("worker_count", &self.worker_count)
            .field("ready", &queues.ready.len())
            .field("delayed", &queues.delayed.len())
            .field("parked", &queues.parked.len())
            .field("shutdown", &queues.shutdown)
            .finish()
    }
}

impl DefaultPlatform {
    /// Start a platform with `worker_count` worker threads.
    ///
    /// A count of zero is allowed: worker tasks are then queued but never run.
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(PoolShared {
            queues: Mutex::new(WorkerQueues::default()),
            work_available: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{THREAD_NAME_PREFIX}-{index}"))
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::warn!(index, error = %e, "failed to spawn platform worker");
                }
            }
        }

        let worker_count = handles.len();
        tracing::debug!(worker_count, "default platform started");

        Self {
            worker_count,
            shared,
            foreground: Mutex::new(VecDeque::new()),
            handles: Mutex::new(handles),
            started_at: Instant::now(),
        }
    }

    /// Stop accepting delayed work, let workers drain the ready queue and join them.
    ///
    /// Idempotent. Tasks posted after shutdown are dropped.
    pub fn shutdown(&self) {
        {
            let mut queues = self.shared.queues.lock();
            if queues.shutdown {
                return;
            }
            queues.shutdown = true;
            self.shared.work_available.notify_all();
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        drop(std::mem::take(&mut self.shared.queues.lock().parked));
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("platform worker panicked");
            }
        }
        tracing::debug!("default platform shut down");
    }

    fn enqueue(&self, task: Task, delay: Option<Duration>) {
        let mut queues = self.shared.queues.lock();
        if queues.shutdown {
            tracing::debug!("dropping task posted after shutdown");
            return;
        }
        match delay {
            Some(delay) if !delay.is_zero() => match Instant::now().checked_add(delay) {
                Some(deadline) => {
                    let seq = queues.next_seq;
                    queues.next_seq += 1;
                    queues.delayed.push(DelayedTask { deadline, seq, task });
                    // Sleepers may need to shorten their wait.
                    self.shared.work_available.notify_all();
                }
                None => {
                    tracing::debug!(?delay, "delay overflows the clock; task parked until shutdown");
                    queues.parked.push(task);
                }
            },
            _ => {
                queues.ready.push_back(task);
                self.shared.work_available.notify_one();
            }
        }
    }
}

fn worker_loop(shared: &PoolShared) {
    loop {
        let task = {
            let mut queues = shared.queues.lock();
            loop {
                queues.promote_due(Instant::now());
                if let Some(task) = queues.ready.pop_front() {
                    break task;
                }
                if queues.shutdown {
                    return;
                }
                match queues.delayed.peek().map(|d| d.deadline) {
                    Some(deadline) => {
                        shared.work_available.wait_until(&mut queues, deadline);
                    }
                    None => shared.work_available.wait(&mut queues),
                }
            }
        };
        task();
    }
}

impl Platform for DefaultPlatform {
    fn number_of_worker_threads(&self) -> usize {
        self.worker_count
    }

    fn call_on_worker_thread(&self, task: Task) {
        self.enqueue(task, None);
    }

    fn call_delayed_on_worker_thread(&self, task: Task, delay: Duration) {
        self.enqueue(task, Some(delay));
    }

    fn post_foreground_task(&self, task: Task) {
        self.foreground.lock().push_back(task);
    }

    fn pump_foreground_tasks(&self) -> usize {
        let mut ran = 0;
        // The lock is released before each task runs so tasks may post more.
        loop {
            let next = self.foreground.lock().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    fn monotonically_increasing_time(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    fn current_clock_time_millis(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

impl Drop for DefaultPlatform {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_reports_worker_count() {
        let platform = DefaultPlatform::new(3);
        assert_eq!(platform.number_of_worker_threads(), 3);
    }

    #[test]
    fn test_worker_tasks_run() {
        let platform = DefaultPlatform::new(2);
        let (tx, rx) = mpsc::channel();

        for i in 0..10 {
            let tx = tx.clone();
            platform.call_on_worker_thread(Box::new(move || {
                tx.send(i).unwrap();
            }));
        }

        let mut seen: Vec<i32> = (0..10).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_worker_tasks_run_off_the_calling_thread() {
        let platform = DefaultPlatform::new(1);
        let (tx, rx) = mpsc::channel();
        platform.call_on_worker_thread(Box::new(move || {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        }));

        let name = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert!(name.starts_with(THREAD_NAME_PREFIX));
    }

    #[test]
    fn test_delayed_task_waits_for_deadline() {
        let platform = DefaultPlatform::new(1);
        let (tx, rx) = mpsc::channel();
        let posted = Instant::now();

        platform.call_delayed_on_worker_thread(
            Box::new(move || {
                tx.send(Instant::now()).unwrap();
            }),
            Duration::from_millis(50),
        );

        let ran_at = rx.recv_timeout(WAIT).unwrap();
        assert!(ran_at.duration_since(posted) >= Duration::from_millis(50));
    }

    #[test]
    fn test_delayed_tasks_run_in_deadline_order() {
        let platform = DefaultPlatform::new(1);
        let (tx, rx) = mpsc::channel();

        for (label, delay_ms) in [("late", 80), ("early", 20)] {
            let tx = tx.clone();
            platform.call_delayed_on_worker_thread(
                Box::new(move || {
                    tx.send(label).unwrap();
                }),
                Duration::from_millis(delay_ms),
            );
        }

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "early");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "late");
    }

    #[test]
    fn test_unbounded_delay_never_runs() {
        let platform = DefaultPlatform::new(1);
        let parked = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let never = Arc::clone(&parked);
        platform.call_delayed_on_worker_thread(
            Box::new(move || {
                never.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::MAX,
        );
        platform.call_delayed_on_worker_thread(
            Box::new(move || {
                tx.send(()).unwrap();
            }),
            Duration::from_millis(10),
        );

        // The pool keeps serving ordinary work.
        rx.recv_timeout(WAIT).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(parked.load(Ordering::SeqCst), 0);
        assert!(format!("{platform:?}").contains("parked: 1"));

        platform.shutdown();
        assert_eq!(parked.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&parked), 1);
    }

    #[test]
    fn test_foreground_tasks_run_only_when_pumped() {
        let platform = DefaultPlatform::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            platform.post_foreground_task(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(platform.pump_foreground_tasks(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(platform.pump_foreground_tasks(), 0);
    }

    #[test]
    fn test_shutdown_drains_ready_queue() {
        let platform = DefaultPlatform::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            platform.call_on_worker_thread(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        platform.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);

        // Idempotent, and later posts are dropped.
        platform.shutdown();
        let late = Arc::clone(&counter);
        platform.call_on_worker_thread(Box::new(move || {
            late.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn test_monotonic_time_never_decreases() {
        let platform = DefaultPlatform::new(0);
        let first = platform.monotonically_increasing_time();
        let second = platform.monotonically_increasing_time();
        assert!(second >= first);
        assert!(platform.current_clock_time_millis() > 0.0);
    }
}
