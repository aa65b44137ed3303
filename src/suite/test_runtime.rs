//! Tests that run inside the shared runtime instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use crate::descriptor;
use crate::engine::{Engine, EngineInstance, RuntimeInstance, current_instance};
use crate::error::fatal;
use crate::platform::PlatformSlot;
use crate::registry::TestRegistry;

pub fn register(registry: &mut TestRegistry) {
    registry.register(descriptor!(initialize_context));
    registry.register(descriptor!(instance_is_entered));
    registry.register(descriptor!(locked_message_queue));
    registry.register(descriptor!(scratch_instance_is_disposed));
    registry.register(descriptor!(worker_task_posts_completion));
}

fn shared_instance() -> EngineInstance {
    match current_instance() {
        Some(instance) => instance,
        None => panic!("no runtime instance is entered on this thread"),
    }
}

fn initialize_context() {
    if let Err(violation) = shared_instance().initialize_context() {
        fatal(violation);
    }
}

fn instance_is_entered() {
    let instance = shared_instance();
    assert!(instance.is_entered());
    assert!(instance.engine().live_instances() >= 1);
}

fn locked_message_queue() {
    let instance = shared_instance();
    instance.locked(|locked| {
        let held = locked.clone();
        locked.post_message(move || {
            assert!(held.lock_held_by_current_thread(), "completion drained without the instance lock");
        });
    });
    assert!(instance.locker_ever_used());
    // Delivery happens after the body returns.
    assert_eq!(instance.pending_messages(), 1);
}

fn scratch_instance_is_disposed() {
    let shared = shared_instance();
    let engine = shared.engine();
    let live = engine.live_instances();

    let scratch = engine.create_instance();
    scratch.enter();
    assert_eq!(current_instance().map(|i| i.id()), Some(scratch.id()));
    scratch.exit();
    assert_eq!(current_instance().map(|i| i.id()), Some(shared.id()));
    scratch.dispose();

    assert_eq!(engine.live_instances(), live);
}

fn worker_task_posts_completion() {
    let instance = shared_instance();
    let platform = match PlatformSlot::process().current() {
        Ok(platform) => platform,
        Err(err) => fatal(err.into()),
    };

    let delivered = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let target = instance.clone();
    let flag = Arc::clone(&delivered);
    platform.call_on_worker_thread(Box::new(move || {
        target.post_message(move || flag.store(true, Ordering::SeqCst));
        let _ = tx.send(());
    }));

    assert!(rx.recv_timeout(Duration::from_secs(10)).is_ok());
    assert_eq!(instance.drain_message_queue(), 1);
    assert!(delivered.load(Ordering::SeqCst));
}
