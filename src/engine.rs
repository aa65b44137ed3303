//! Engine collaborator interface and the in-process reference engine
//!
//! The harness never talks to a concrete engine directly. It needs four
//! things from one: process-level initialize/dispose, a way to create runtime
//! instances, and a count of instances that have not been disposed yet (used
//! for leak detection). Instances in turn are entered and exited around each
//! test body, can be locked, and queue completions posted while a test runs.
//!
//! [`ReferenceEngine`] implements both traits without any real engine behind
//! it. Entering an instance makes it the calling thread's current instance,
//! which is how test bodies (zero-argument functions) reach it:
//!
//! ```
//! use enginetest::engine::{Engine, ReferenceEngine, RuntimeInstance, current_instance};
//!
//! let engine = ReferenceEngine::new();
//! let instance = engine.create_instance();
//! instance.enter();
//! assert_eq!(current_instance().map(|i| i.id()), Some(instance.id()));
//! instance.exit();
//! instance.dispose();
//! assert_eq!(engine.live_instances(), 0);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::ContractViolation;

/// Identity of a runtime instance, unique per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-level engine operations the harness depends on.
pub trait Engine {
    type Instance: RuntimeInstance;

    /// One-time process setup. Calling it again has no effect.
    fn initialize(&self) {}

    /// Process-level teardown, called once after the last test.
    fn dispose(&self) {}

    fn create_instance(&self) -> Self::Instance;

    /// Instances created and not yet disposed.
    fn live_instances(&self) -> usize;
}

/// A runtime instance as seen by the lifecycle controller.
pub trait RuntimeInstance {
    fn id(&self) -> InstanceId;

    /// Make this the calling thread's current instance.
    fn enter(&self);

    /// Undo the matching [`RuntimeInstance::enter`]; must run on the same thread.
    fn exit(&self);

    /// Whether [`RuntimeInstance::locked`] was ever used on this instance.
    fn locker_ever_used(&self) -> bool;

    /// Run `f` while holding the instance lock.
    fn locked<R>(&self, f: impl FnOnce(&Self) -> R) -> R;

    /// Run queued completions until the queue is empty. Returns how many ran.
    fn drain_message_queue(&self) -> usize;

    fn dispose(self);
}

type Message = Box<dyn FnOnce() + Send + 'static>;

struct EngineShared {
    initialized: AtomicBool,
    next_id: AtomicU64,
    live: AtomicUsize,
}

/// In-process engine with observable instances.
#[derive(Clone)]
pub struct ReferenceEngine {
    shared: Arc<EngineShared>,
}

impl fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceEngine")
            .field("initialized", &self.shared.initialized.load(Ordering::SeqCst))
            .field("live_instances", &self.live_instances())
            .finish()
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(EngineShared {
                initialized: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                live: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }
}

impl Engine for ReferenceEngine {
    type Instance = EngineInstance;

    fn initialize(&self) {
        if !self.shared.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("reference engine initialized");
        }
    }

    fn dispose(&self) {
        if self.shared.initialized.swap(false, Ordering::SeqCst) {
            tracing::debug!(live = self.live_instances(), "reference engine disposed");
        }
    }

    fn create_instance(&self) -> EngineInstance {
        let id = InstanceId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%id, "runtime instance created");
        EngineInstance {
            inner: Arc::new(InstanceInner {
                id,
                engine: self.clone(),
                lock: ReentrantMutex::new(()),
                locker_used: AtomicBool::new(false),
                context_initialized: AtomicBool::new(false),
                messages: Mutex::new(VecDeque::new()),
                owner: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn live_instances(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }
}

struct InstanceInner {
    id: InstanceId,
    engine: ReferenceEngine,
    lock: ReentrantMutex<()>,
    locker_used: AtomicBool,
    context_initialized: AtomicBool,
    messages: Mutex<VecDeque<Message>>,
    /// Thread that entered the instance, with its entry depth.
    owner: Mutex<Option<(ThreadId, usize)>>,
    disposed: AtomicBool,
}

/// Handle to a [`ReferenceEngine`] instance. Clones share the instance.
#[derive(Clone)]
pub struct EngineInstance {
    inner: Arc<InstanceInner>,
}

impl fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInstance")
            .field("id", &self.inner.id)
            .field("pending_messages", &self.pending_messages())
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

thread_local! {
    static ENTERED: RefCell<Vec<EngineInstance>> = const { RefCell::new(Vec::new()) };
}

/// The instance most recently entered on this thread, if any.
pub fn current_instance() -> Option<EngineInstance> {
    ENTERED.with(|entered| entered.borrow().last().cloned())
}

impl EngineInstance {
    /// The engine that created this instance.
    pub fn engine(&self) -> &ReferenceEngine {
        &self.inner.engine
    }

    /// Queue a completion to run on the next drain.
    pub fn post_message(&self, message: impl FnOnce() + Send + 'static) {
        self.inner.messages.lock().push_back(Box::new(message));
    }

    pub fn pending_messages(&self) -> usize {
        self.inner.messages.lock().len()
    }

    /// Set up the instance's default context. Allowed once per instance.
    pub fn initialize_context(&self) -> Result<(), ContractViolation> {
        if self.inner.context_initialized.swap(true, Ordering::SeqCst) {
            return Err(ContractViolation::DoubleInitialization { instance: self.inner.id });
        }
        Ok(())
    }

    pub fn is_entered(&self) -> bool {
        self.inner.owner.lock().is_some()
    }

    /// Whether the calling thread holds the instance lock right now.
    pub fn lock_held_by_current_thread(&self) -> bool {
        self.inner.lock.is_owned_by_current_thread()
    }
}

impl RuntimeInstance for EngineInstance {
    fn id(&self) -> InstanceId {
        self.inner.id
    }

    fn enter(&self) {
        let this_thread = thread::current().id();
        {
            let mut owner = self.inner.owner.lock();
            match owner.as_mut() {
                Some((thread, depth)) => {
                    assert_eq!(*thread, this_thread, "instance {} entered from two threads", self.inner.id);
                    *depth += 1;
                }
                None => *owner = Some((this_thread, 1)),
            }
        }
        ENTERED.with(|entered| entered.borrow_mut().push(self.clone()));
    }

    fn exit(&self) {
        {
            let mut owner = self.inner.owner.lock();
            match owner.as_mut() {
                Some((thread, depth)) => {
                    assert_eq!(
                        *thread,
                        thread::current().id(),
                        "instance {} exited from a thread that did not enter it",
                        self.inner.id
                    );
                    *depth -= 1;
                    if *depth == 0 {
                        *owner = None;
                    }
                }
                None => panic!("instance {} exited without being entered", self.inner.id),
            }
        }
        ENTERED.with(|entered| {
            let popped = entered.borrow_mut().pop();
            debug_assert_eq!(popped.map(|i| i.inner.id), Some(self.inner.id), "unbalanced enter/exit");
        });
    }

    fn locker_ever_used(&self) -> bool {
        self.inner.locker_used.load(Ordering::SeqCst)
    }

    fn locked<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.inner.locker_used.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        f(self)
    }

    fn drain_message_queue(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.inner.messages.lock().pop_front();
            match next {
                Some(message) => {
                    message();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    fn dispose(self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.inner.messages.lock().len();
        self.inner.engine.shared.live.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(id = %self.inner.id, dropped, "runtime instance disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let engine = ReferenceEngine::new();
        engine.initialize();
        engine.initialize();
        assert!(engine.is_initialized());
        engine.dispose();
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_live_instance_count() {
        let engine = ReferenceEngine::new();
        let a = engine.create_instance();
        let b = engine.create_instance();
        assert_ne!(a.id(), b.id());
        assert_eq!(engine.live_instances(), 2);

        a.dispose();
        assert_eq!(engine.live_instances(), 1);
        // A clone of a disposed handle does not count twice.
        let b2 = b.clone();
        b.dispose();
        b2.dispose();
        assert_eq!(engine.live_instances(), 0);
    }

    #[test]
    fn test_enter_sets_current_instance() {
        let engine = ReferenceEngine::new();
        let outer = engine.create_instance();
        let inner = engine.create_instance();

        assert!(current_instance().is_none());
        outer.enter();
        inner.enter();
        assert_eq!(current_instance().map(|i| i.id()), Some(inner.id()));
        inner.exit();
        assert_eq!(current_instance().map(|i| i.id()), Some(outer.id()));
        outer.exit();
        assert!(current_instance().is_none());
        assert!(!outer.is_entered());
    }

    #[test]
    fn test_enter_is_reentrant_on_one_thread() {
        let engine = ReferenceEngine::new();
        let instance = engine.create_instance();
        instance.enter();
        instance.enter();
        instance.exit();
        assert!(instance.is_entered());
        instance.exit();
        assert!(!instance.is_entered());
    }

    #[test]
    #[should_panic(expected = "exited without being entered")]
    fn test_exit_without_enter_panics() {
        let engine = ReferenceEngine::new();
        engine.create_instance().exit();
    }

    #[test]
    fn test_exit_from_another_thread_panics() {
        let engine = ReferenceEngine::new();
        let instance = engine.create_instance();
        instance.enter();

        let other = instance.clone();
        let result = thread::spawn(move || other.exit()).join();
        assert!(result.is_err());
        assert!(instance.is_entered());
        instance.exit();
    }

    #[test]
    fn test_drain_runs_messages_posted_while_draining() {
        let engine = ReferenceEngine::new();
        let instance = engine.create_instance();
        let counter = Arc::new(AtomicUsize::new(0));

        let chained = instance.clone();
        let c = Arc::clone(&counter);
        instance.post_message(move || {
            c.fetch_add(1, Ordering::SeqCst);
            let c = Arc::clone(&c);
            chained.post_message(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(instance.drain_message_queue(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(instance.pending_messages(), 0);
    }

    #[test]
    fn test_locked_records_use() {
        let engine = ReferenceEngine::new();
        let instance = engine.create_instance();
        assert!(!instance.locker_ever_used());

        let nested = instance.locked(|i| i.locked(|_| 5));
        assert_eq!(nested, 5);
        assert!(instance.locker_ever_used());
    }

    #[test]
    fn test_lock_ownership_is_per_thread() {
        let engine = ReferenceEngine::new();
        let instance = engine.create_instance();
        assert!(!instance.lock_held_by_current_thread());

        instance.locked(|i| {
            assert!(i.lock_held_by_current_thread());
            let other = i.clone();
            let seen = thread::spawn(move || other.lock_held_by_current_thread()).join().unwrap();
            assert!(!seen);
        });
        assert!(!instance.lock_held_by_current_thread());
    }

    #[test]
    fn test_context_initializes_once() {
        let engine = ReferenceEngine::new();
        let instance = engine.create_instance();
        assert!(instance.initialize_context().is_ok());
        assert!(matches!(
            instance.initialize_context(),
            Err(ContractViolation::DoubleInitialization { .. })
        ));
    }
}
