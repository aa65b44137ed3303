//! Tests that install a test platform over the process platform.
//!
//! None of these use the shared runtime instance.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use parking_lot::Mutex;

use crate::descriptor;
use crate::error::{ContractViolation, fatal};
use crate::platform::{Platform, PlatformSlot, TestPlatform};
use crate::registry::TestRegistry;

const TASK_TIMEOUT: Duration = Duration::from_secs(10);

pub fn register(registry: &mut TestRegistry) {
    registry.register(descriptor!(swap_and_restore).without_runtime());
    registry.register(descriptor!(worker_tasks_route_through_shim).without_runtime());
    registry.register(descriptor!(delayed_and_foreground_tasks).without_runtime());
    registry.register(descriptor!(remove_while_workers_busy).without_runtime());
    // Removing a shim whose pool never runs tasks blocks forever.
    registry.register(descriptor!(remove_with_stalled_pool).without_runtime().disabled());
}

fn check<T>(result: Result<T, impl Into<ContractViolation>>) -> T {
    result.unwrap_or_else(|err| fatal(err.into()))
}

fn install_shim(slot: &PlatformSlot) -> Arc<TestPlatform> {
    let shim = check(TestPlatform::new(slot));
    check(shim.notify_platform_ready(slot));
    shim
}

fn swap_and_restore() {
    let slot = PlatformSlot::process();
    let original = check(slot.current());

    let shim = install_shim(slot);
    assert!(slot.is_current(&*shim));
    assert_eq!(
        shim.number_of_worker_threads(),
        original.number_of_worker_threads()
    );

    let report = check(shim.remove_platform(slot));
    assert!(slot.is_current(&*original));
    assert_eq!(report.barrier_waits, 2 * original.number_of_worker_threads());
    assert_eq!(report.signals_at_swap, report.workers);
}

fn worker_tasks_route_through_shim() {
    let slot = PlatformSlot::process();
    let shim = install_shim(slot);

    let (tx, rx) = mpsc::channel();
    let current = check(slot.current());
    for i in 0..8 {
        let tx = tx.clone();
        current.call_on_worker_thread(Box::new(move || {
            let _ = tx.send(i);
        }));
    }
    drop(current);

    let mut seen: Vec<i32> = (0..8)
        .map(|_| rx.recv_timeout(TASK_TIMEOUT).unwrap_or(-1))
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..8).collect::<Vec<_>>());
    assert_eq!(shim.worker_tasks(), 8);

    check(shim.remove_platform(slot));
}

fn delayed_and_foreground_tasks() {
    let slot = PlatformSlot::process();
    let shim = install_shim(slot);
    let current = check(slot.current());

    let (tx, rx) = mpsc::channel();
    let posted_at = current.monotonically_increasing_time();
    current.call_delayed_on_worker_thread(
        Box::new(move || {
            let _ = tx.send(());
        }),
        Duration::from_millis(20),
    );
    assert!(rx.recv_timeout(TASK_TIMEOUT).is_ok());
    assert!(current.monotonically_increasing_time() - posted_at >= 0.02);

    let hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let hits = Arc::clone(&hits);
        current.post_foreground_task(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert_eq!(current.pump_foreground_tasks(), 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(current.current_clock_time_millis() > 0.0);

    assert_eq!(shim.delayed_worker_tasks(), 1);
    assert_eq!(shim.foreground_tasks(), 3);
    drop(current);
    check(shim.remove_platform(slot));
}

fn remove_while_workers_busy() {
    let slot = PlatformSlot::process();
    let original = check(slot.current());
    let shim = install_shim(slot);

    let (tx, rx) = mpsc::channel();
    let current = check(slot.current());
    for _ in 0..32 {
        let tx = tx.clone();
        current.call_on_worker_thread(Box::new(move || {
            std::thread::sleep(Duration::from_micros(500));
            let _ = tx.send(());
        }));
    }
    drop(current);

    check(shim.remove_platform(slot));
    assert!(slot.is_current(&*original));
    let finished = (0..32).filter(|_| rx.recv_timeout(TASK_TIMEOUT).is_ok()).count();
    assert_eq!(finished, 32);
}

fn remove_with_stalled_pool() {
    let slot = PlatformSlot::process();
    let shim = install_shim(slot);
    // Occupy every worker so the shutdown tasks never start.
    let (_hold, release) = mpsc::channel::<()>();
    let release = Arc::new(Mutex::new(release));
    let current = check(slot.current());
    for _ in 0..current.number_of_worker_threads() {
        let release = Arc::clone(&release);
        current.call_on_worker_thread(Box::new(move || {
            let _ = release.lock().recv();
        }));
    }
    drop(current);
    check(shim.remove_platform(slot));
}
