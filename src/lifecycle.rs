//! Runtime lifecycle controller
//!
//! A process runs either tests that share one runtime instance
//! (*initializing* tests) or tests that manage the engine themselves
//! (*non-initializing* tests), never both. The first test decides which, and
//! every later test must agree.
//!
//! ```text
//!            requires_runtime = false              requires_runtime = true
//! NonInitializing  <──────────────  Unset  ──────────────>  Initializing
//!       │  ▲                                                     │  ▲
//!       └──┘ false                                          true └──┘
//! ```
//!
//! Any other move is a [`ContractViolation::Lifecycle`].

use std::fmt;

use crate::engine::{Engine, InstanceId, RuntimeInstance};
use crate::error::{ContractViolation, LifecycleMismatch};
use crate::registry::TestDescriptor;

/// Which kind of test this process has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No test has run yet.
    #[default]
    Unset,
    NonInitializing,
    Initializing,
}

impl LifecycleState {
    fn requested(requires_runtime: bool) -> Self {
        if requires_runtime {
            LifecycleState::Initializing
        } else {
            LifecycleState::NonInitializing
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unset => "unset",
            LifecycleState::NonInitializing => "non-initializing",
            LifecycleState::Initializing => "initializing",
        };
        f.write_str(name)
    }
}

/// The state after running a test that does (or does not) need the shared
/// runtime instance, starting from `current`.
pub fn transition(current: LifecycleState, requires_runtime: bool) -> Result<LifecycleState, LifecycleMismatch> {
    let requested = LifecycleState::requested(requires_runtime);
    match current {
        LifecycleState::Unset => Ok(requested),
        same if same == requested => Ok(requested),
        from => Err(LifecycleMismatch { from, requested }),
    }
}

/// Owns the shared runtime instance and the process lifecycle state.
pub struct RuntimeLifecycle<E: Engine> {
    engine: E,
    state: LifecycleState,
    instance: Option<E::Instance>,
}

impl<E: Engine> fmt::Debug for RuntimeLifecycle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeLifecycle")
            .field("state", &self.state)
            .field("instance", &self.instance_id())
            .finish_non_exhaustive()
    }
}

impl<E: Engine> RuntimeLifecycle<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: LifecycleState::Unset,
            instance: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Id of the shared instance, once an initializing test has created it.
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance.as_ref().map(RuntimeInstance::id)
    }

    /// Run one test under the lifecycle rules.
    pub fn run(&mut self, descriptor: &TestDescriptor) -> Result<(), ContractViolation> {
        let next = transition(self.state, descriptor.requires_runtime()).map_err(|source| {
            ContractViolation::Lifecycle {
                test: descriptor.qualified_name(),
                source,
            }
        })?;
        self.state = next;
        tracing::debug!(test = %descriptor.qualified_name(), state = %next, "running test");

        if descriptor.requires_runtime() {
            self.run_in_instance(descriptor)
        } else {
            if self.instance.is_some() {
                return Err(ContractViolation::StrayInstance {
                    test: descriptor.qualified_name(),
                });
            }
            self.invoke_checked(descriptor)
        }
    }

    fn run_in_instance(&mut self, descriptor: &TestDescriptor) -> Result<(), ContractViolation> {
        let engine = &self.engine;
        let instance = self.instance.get_or_insert_with(|| engine.create_instance());
        instance.enter();

        let checked = Self::invoke_with_leak_check(engine, descriptor);

        let drained = if instance.locker_ever_used() {
            instance.locked(|locked| locked.drain_message_queue())
        } else {
            instance.drain_message_queue()
        };
        instance.exit();
        tracing::debug!(test = %descriptor.qualified_name(), drained, "left runtime instance");
        checked
    }

    fn invoke_checked(&self, descriptor: &TestDescriptor) -> Result<(), ContractViolation> {
        Self::invoke_with_leak_check(&self.engine, descriptor)
    }

    /// Call the body. Debug builds compare the live-instance count around it.
    fn invoke_with_leak_check(engine: &E, descriptor: &TestDescriptor) -> Result<(), ContractViolation> {
        #[cfg(debug_assertions)]
        let before = engine.live_instances();

        descriptor.invoke();

        #[cfg(debug_assertions)]
        {
            let after = engine.live_instances();
            if before != after {
                return Err(ContractViolation::LeakedInstances {
                    test: descriptor.qualified_name(),
                    before,
                    after,
                });
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = engine;

        Ok(())
    }

    /// Dispose the shared instance if one was created. Safe to call again.
    pub fn tear_down(&mut self) {
        if let Some(instance) = self.instance.take() {
            let id = instance.id();
            instance.dispose();
            tracing::debug!(%id, "shared runtime instance torn down");
        }
    }
}
