//! Built-in test suite
//!
//! Each submodule is one group; its file name is the group name on the
//! command line (`enginetest test_platform/swap_and_restore`).
//!
//! - `test_platform` - non-initializing tests that swap the process platform
//! - `test_runtime` - initializing tests that use the shared runtime instance
//!
//! The two groups cannot run in the same invocation.

pub mod test_platform;
pub mod test_runtime;

use crate::registry::TestRegistry;

/// Register every built-in test, in a fixed order.
pub fn register_all(registry: &mut TestRegistry) {
    test_platform::register(registry);
    test_runtime::register(registry);
}

/// A fresh registry holding the built-in suite.
pub fn registry() -> TestRegistry {
    let mut registry = TestRegistry::new();
    register_all(&mut registry);
    registry
}
