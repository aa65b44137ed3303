//! Error types for the harness
//!
//! [`ContractViolation`] covers misuse of the harness by a test or its
//! collaborators. These are never recovered from: `cli::run` renders them and
//! aborts the process. [`ConfigError`] covers bad settings and ends the run
//! with a normal failure exit.

use std::io::{self, Write};
use std::process;

use miette::Diagnostic;
use thiserror::Error;

use crate::engine::InstanceId;
use crate::lifecycle::LifecycleState;
use crate::platform::PlatformError;

/// A test asked for a lifecycle state the process cannot move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move from {from} to {requested}")]
pub struct LifecycleMismatch {
    pub from: LifecycleState,
    pub requested: LifecycleState,
}

/// Fatal misuse of the harness.
#[derive(Debug, Error, Diagnostic)]
pub enum ContractViolation {
    #[error("test `{test}` cannot run in this process")]
    #[diagnostic(
        code(enginetest::lifecycle),
        help("tests with and without a shared runtime instance cannot share a process; run them separately")
    )]
    Lifecycle {
        test: String,
        #[source]
        source: LifecycleMismatch,
    },

    #[error("test `{test}` does not use a runtime instance, but one already exists")]
    #[diagnostic(code(enginetest::stray_instance))]
    StrayInstance { test: String },

    #[error("test `{test}` leaked runtime instances ({before} live before, {after} after)")]
    #[diagnostic(
        code(enginetest::leaked_instances),
        help("every runtime instance created by a test must be disposed before it returns")
    )]
    LeakedInstances { test: String, before: usize, after: usize },

    #[error("runtime instance {instance} initialized twice")]
    #[diagnostic(code(enginetest::double_initialization))]
    DoubleInitialization { instance: InstanceId },

    #[error("platform misuse: {0}")]
    #[diagnostic(
        code(enginetest::platform),
        help("install a test platform with notify_platform_ready and remove it with remove_platform before it is dropped")
    )]
    Platform(#[from] PlatformError),
}

/// Invalid harness settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number, got `{value}`")]
    InvalidWorkerThreads {
        var: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("worker thread count must be at least 1")]
    ZeroWorkerThreads,
}

/// Anything that can stop a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

impl From<PlatformError> for HarnessError {
    fn from(err: PlatformError) -> Self {
        HarnessError::Contract(err.into())
    }
}

/// Print `violation` as a diagnostic on stderr and abort the process.
///
/// Stdout is flushed first so listing and advisory lines already printed are
/// not lost.
pub fn fatal(violation: ContractViolation) -> ! {
    let _ = io::stdout().flush();
    tracing::error!(%violation, "contract violation");
    eprintln!("{:?}", miette::Report::new(violation));
    process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_messages_name_the_test() {
        let leak = ContractViolation::LeakedInstances {
            test: "math/add".to_string(),
            before: 1,
            after: 2,
        };
        assert_eq!(
            leak.to_string(),
            "test `math/add` leaked runtime instances (1 live before, 2 after)"
        );

        let mismatch = ContractViolation::Lifecycle {
            test: "platform/swap".to_string(),
            source: LifecycleMismatch {
                from: LifecycleState::Initializing,
                requested: LifecycleState::NonInitializing,
            },
        };
        assert!(mismatch.to_string().contains("platform/swap"));
        let source = std::error::Error::source(&mismatch).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("cannot move from initializing to non-initializing"));
    }

    #[test]
    fn test_violations_carry_diagnostic_codes() {
        let stray = ContractViolation::StrayInstance { test: "x/y".to_string() };
        let code = stray.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("enginetest::stray_instance"));

        let platform = ContractViolation::from(PlatformError::AlreadyActive);
        let code = platform.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("enginetest::platform"));
    }
}
