#![forbid(unsafe_code)]
//! Task-scheduling platform for the enginetest harness
//!
//! A *platform* is the process-wide backend that owns the worker-thread pool
//! and the foreground task queue. The engine and the tests post work to
//! whatever platform is currently installed in a [`PlatformSlot`].
//!
//! ## Modules
//!
//! - `default_platform` - fixed-size worker pool with delayed and foreground tasks
//! - `slot` - the process-wide platform pointer
//! - `test_platform` - a delegating shim tests install over the current platform
//! - `quiescence` - the drain-and-swap protocol used to remove the shim
//! - `semaphore` - counting barrier used by the protocol
//!
//! ## Swapping platforms
//!
//! Installing a [`TestPlatform`] is a plain pointer swap. Removing it is not:
//! worker threads may still be running tasks that observe the shim, so
//! [`TestPlatform::remove_platform`] parks every worker before the pointer is
//! restored and releases them afterwards. See [`quiescence`] for the protocol.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod default_platform;
pub mod quiescence;
pub mod semaphore;
pub mod slot;
pub mod test_platform;

use std::time::Duration;

use thiserror::Error;

pub use default_platform::DefaultPlatform;
pub use quiescence::{QuiescenceReport, quiesce_and_swap};
pub use semaphore::Semaphore;
pub use slot::PlatformSlot;
pub use test_platform::TestPlatform;

/// A unit of work posted to a platform.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The scheduling backend abstraction.
///
/// Implementations must be shareable across threads: the slot hands out
/// `Arc<dyn Platform>` clones to any thread that wants to post work.
pub trait Platform: Send + Sync {
    /// Number of threads in the worker pool.
    fn number_of_worker_threads(&self) -> usize;

    /// Post a task to the worker pool.
    fn call_on_worker_thread(&self, task: Task);

    /// Post a task to the worker pool that becomes runnable after `delay`.
    fn call_delayed_on_worker_thread(&self, task: Task, delay: Duration);

    /// Queue a task for the control thread. It runs on the next
    /// [`Platform::pump_foreground_tasks`].
    fn post_foreground_task(&self, task: Task);

    /// Run every pending foreground task on the calling thread, including
    /// tasks posted while pumping. Returns the number of tasks run.
    fn pump_foreground_tasks(&self) -> usize;

    /// Seconds since an arbitrary fixed point; never decreases.
    fn monotonically_increasing_time(&self) -> f64;

    /// Wall-clock milliseconds since the Unix epoch.
    fn current_clock_time_millis(&self) -> f64;
}

/// Misuse of the platform install/remove contract.
///
/// The harness treats every variant as fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("no platform is installed")]
    NoPlatform,

    #[error("a platform is already installed")]
    AlreadyInstalled,

    #[error("test platform is already active")]
    AlreadyActive,

    #[error("test platform is not active")]
    NotActive,

    #[error("test platform is not the current platform")]
    NotCurrent,
}
