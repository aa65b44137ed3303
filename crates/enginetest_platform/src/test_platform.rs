//! Test platform: a delegating shim installed over the current platform
//!
//! A [`TestPlatform`] remembers the platform that was installed when it was
//! built and forwards every operation to it, counting the worker tasks that
//! pass through. Tests install it with [`TestPlatform::notify_platform_ready`]
//! and must remove it with [`TestPlatform::remove_platform`] before dropping
//! it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::quiescence::{QuiescenceReport, quiesce_and_swap};
use crate::{Platform, PlatformError, PlatformSlot, Task};

pub struct TestPlatform {
    old_platform: Arc<dyn Platform>,
    active: AtomicBool,
    worker_tasks: AtomicUsize,
    delayed_worker_tasks: AtomicUsize,
    foreground_tasks: AtomicUsize,
}

impl std::fmt::Debug for TestPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPlatform")
            .field("active", &self.is_active())
            .field("worker_tasks", &self.worker_tasks())
            .field("delayed_worker_tasks", &self.delayed_worker_tasks())
            .field("foreground_tasks", &self.foreground_tasks())
            .finish()
    }
}

impl TestPlatform {
    /// Build a shim over the platform currently installed in `slot`.
    pub fn new(slot: &PlatformSlot) -> Result<Arc<Self>, PlatformError> {
        Ok(Self::wrapping(slot.current()?))
    }

    /// Build a shim over an explicit platform.
    pub fn wrapping(old_platform: Arc<dyn Platform>) -> Arc<Self> {
        Arc::new(Self {
            old_platform,
            active: AtomicBool::new(false),
            worker_tasks: AtomicUsize::new(0),
            delayed_worker_tasks: AtomicUsize::new(0),
            foreground_tasks: AtomicUsize::new(0),
        })
    }

    /// Install this shim as the current platform of `slot`.
    pub fn notify_platform_ready(self: &Arc<Self>, slot: &PlatformSlot) -> Result<(), PlatformError> {
        if self.active.load(Ordering::SeqCst) {
            return Err(PlatformError::AlreadyActive);
        }
        let shim: Arc<dyn Platform> = Arc::clone(self) as Arc<dyn Platform>;
        slot.swap(shim)?;
        self.active.store(true, Ordering::SeqCst);
        tracing::debug!("test platform installed");
        Ok(())
    }

    /// Restore the wrapped platform in `slot` once every worker is parked.
    ///
    /// Blocks until all worker threads of the wrapped platform have run the
    /// shutdown task; see [`crate::quiescence`].
    #[tracing::instrument(skip_all)]
    pub fn remove_platform(&self, slot: &PlatformSlot) -> Result<QuiescenceReport, PlatformError> {
        if !slot.is_current(self) {
            return Err(PlatformError::NotCurrent);
        }
        if !self.active.load(Ordering::SeqCst) {
            return Err(PlatformError::NotActive);
        }

        let workers = self.number_of_worker_threads();
        let (swapped, report) = quiesce_and_swap(self.old_platform.as_ref(), workers, || {
            slot.swap(Arc::clone(&self.old_platform))
        });
        let displaced = swapped?;
        self.active.store(false, Ordering::SeqCst);
        drop(displaced);
        tracing::debug!(workers, "test platform removed");
        Ok(report)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The platform this shim delegates to.
    pub fn old_platform(&self) -> &Arc<dyn Platform> {
        &self.old_platform
    }

    /// Worker tasks posted through this shim.
    pub fn worker_tasks(&self) -> usize {
        self.worker_tasks.load(Ordering::SeqCst)
    }

    /// Delayed worker tasks posted through this shim.
    pub fn delayed_worker_tasks(&self) -> usize {
        self.delayed_worker_tasks.load(Ordering::SeqCst)
    }

    /// Foreground tasks posted through this shim.
    pub fn foreground_tasks(&self) -> usize {
        self.foreground_tasks.load(Ordering::SeqCst)
    }
}

impl Platform for TestPlatform {
    fn number_of_worker_threads(&self) -> usize {
        self.old_platform.number_of_worker_threads()
    }

    fn call_on_worker_thread(&self, task: Task) {
        self.worker_tasks.fetch_add(1, Ordering::SeqCst);
        self.old_platform.call_on_worker_thread(task);
    }

    fn call_delayed_on_worker_thread(&self, task: Task, delay: Duration) {
        self.delayed_worker_tasks.fetch_add(1, Ordering::SeqCst);
        self.old_platform.call_delayed_on_worker_thread(task, delay);
    }

    fn post_foreground_task(&self, task: Task) {
        self.foreground_tasks.fetch_add(1, Ordering::SeqCst);
        self.old_platform.post_foreground_task(task);
    }

    fn pump_foreground_tasks(&self) -> usize {
        self.old_platform.pump_foreground_tasks()
    }

    fn monotonically_increasing_time(&self) -> f64 {
        self.old_platform.monotonically_increasing_time()
    }

    fn current_clock_time_millis(&self) -> f64 {
        self.old_platform.current_clock_time_millis()
    }
}

impl Drop for TestPlatform {
    fn drop(&mut self) {
        // Dropping an active shim means a test skipped `remove_platform`.
        if self.active.load(Ordering::SeqCst) && !std::thread::panicking() {
            panic!("test platform dropped while still active; call remove_platform first");
        }
    }
}
