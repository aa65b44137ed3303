#![forbid(unsafe_code)]
//! enginetest: an in-process test harness for an embeddable runtime engine
//!
//! Tests are registered into a [`registry::TestRegistry`], picked by
//! command-line tokens ([`selector`]) and run one after another in the same
//! process. Each process commits to one of two kinds of test on the first run
//! (see [`lifecycle`]): tests that share a lazily created runtime instance,
//! or tests that manage the engine themselves. Tests may swap a
//! [`platform::TestPlatform`] over the process platform; removing it parks
//! every worker thread first (see [`platform::quiescence`]).
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` with `?` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Contract violations**: Misuse the harness detects in its own checks (lifecycle mixing, leaked
//!   instances, double context initialization, platform slot errors) is returned as a
//!   [`error::ContractViolation`] and turned into a process abort by [`error::fatal`].
//!
//! - **Invariant panics**: Two kinds of misuse panic instead, because no `Result` can carry them:
//!   dropping a [`platform::TestPlatform`] that is still active (detected in `Drop`), and entering or
//!   exiting an [`engine::EngineInstance`] from the wrong thread or without a matching `enter`.
//!
//! - **Test code**: `.unwrap()`, `.expect()` and `assert!` are acceptable in tests, including the bodies of
//!   registered tests, where a panic is the failure signal.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod selector;
pub mod suite;

pub use enginetest_platform as platform;

pub use config::HarnessConfig;
pub use engine::{Engine, ReferenceEngine, RuntimeInstance};
pub use error::{ContractViolation, HarnessError};
pub use lifecycle::{LifecycleState, RuntimeLifecycle};
pub use registry::{TestDescriptor, TestRegistry};
