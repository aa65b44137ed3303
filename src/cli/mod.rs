//! CLI module for the enginetest harness
//!
//! ## Usage
//!
//! - `enginetest --list` - print every registered test as `group/name`
//! - `enginetest TOKEN...` - run every enabled test matching each token
//!
//! A token is either `group/name` or a bare group or test name. Tokens are
//! processed in command-line order and a token that matches nothing is not an
//! error.
//!
//! ## Modules
//!
//! - `test_runner` - selection, execution and reporting
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros. Everything below
//! `run()` returns a `Result`; only `run()` exits the process. Contract
//! violations are the exception to a normal exit: they are rendered with miette
//! and abort.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod test_runner;

use std::fmt;
use std::process;
use std::sync::Arc;

use clap::Parser;

use crate::config::HarnessConfig;
use crate::engine::{Engine, ReferenceEngine};
use crate::error::{ConfigError, ContractViolation, HarnessError, fatal};
use crate::lifecycle::RuntimeLifecycle;
use crate::platform::{DefaultPlatform, Platform, PlatformSlot};
use crate::registry::TestRegistry;
use crate::suite;

use test_runner::{ConsoleReporter, RunReporter, RunSummary, TestRunner};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    /// Bad configuration or arguments.
    pub const USAGE: ExitCode = ExitCode(2);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::USAGE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::usage(format!("error: {err}"))
    }
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Run registered engine tests in this process
#[derive(Parser, Debug, Default)]
#[command(name = "enginetest")]
#[command(version = VERSION)]
#[command(about = "Run registered engine tests in this process", long_about = None)]
pub struct Cli {
    /// Print every registered test as group/name, oldest first, and exit
    #[arg(long)]
    pub list: bool,

    /// Worker threads in the default platform (overrides ENGINETEST_WORKER_THREADS)
    #[arg(long, value_name = "N")]
    pub worker_threads: Option<usize>,

    /// Tests to run: group/name, or a bare group or test name
    #[arg(value_name = "TEST")]
    pub tests: Vec<String>,
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where the process exits. A contract violation
/// aborts; every other error exits with its code.
pub fn run() {
    let cli = Cli::parse();

    match execute(&cli) {
        Ok(exit_code) => {
            if exit_code != ExitCode::SUCCESS {
                process::exit(exit_code.0);
            }
        }
        Err(HarnessError::Contract(violation)) => fatal(violation),
        Err(HarnessError::Config(err)) => {
            let err = CliError::from(err);
            eprintln!("{}", err.message);
            process::exit(err.exit_code.0);
        }
    }
}

/// Resolve settings: defaults, then the environment, then the command line.
pub fn load_config(cli: &Cli) -> Result<HarnessConfig, HarnessError> {
    let config = HarnessConfig::from_env()?;
    let config = match cli.worker_threads {
        Some(threads) => config.with_worker_threads(threads)?,
        None => config,
    };
    Ok(config)
}

/// Boot the default platform, run the built-in suite, and shut down.
fn execute(cli: &Cli) -> Result<ExitCode, HarnessError> {
    let config = load_config(cli)?;
    let registry = suite::registry();
    let mut reporter = ConsoleReporter::new(config.print_run_count);

    let slot = PlatformSlot::process();
    let platform = Arc::new(DefaultPlatform::new(config.worker_threads));
    slot.install(Arc::clone(&platform) as Arc<dyn Platform>)?;
    tracing::debug!(workers = config.worker_threads, "default platform installed");

    run_harness(cli, &registry, &config, ReferenceEngine::new(), &mut reporter)?;

    slot.uninstall()?;
    platform.shutdown();
    tracing::debug!("default platform shut down");
    Ok(ExitCode::SUCCESS)
}

/// Run (or list) the tests selected by `cli` against `engine`.
///
/// Initializes the engine first. After running, tears down the shared
/// runtime instance and then disposes the engine. Returns `None` for
/// `--list`, which runs nothing.
pub fn run_harness<E: Engine>(
    cli: &Cli,
    registry: &TestRegistry,
    config: &HarnessConfig,
    engine: E,
    reporter: &mut dyn RunReporter,
) -> Result<Option<RunSummary>, ContractViolation> {
    engine.initialize();
    let mut lifecycle = RuntimeLifecycle::new(engine);

    let summary = {
        let mut runner = TestRunner::new(registry, &mut lifecycle, config);
        if cli.list {
            runner.list(reporter);
            None
        } else {
            Some(runner.run_all(cli.tests.as_slice(), reporter)?)
        }
    };

    lifecycle.tear_down();
    lifecycle.engine().dispose();
    Ok(summary)
}

// ============================================================================
// Tests
// ============================================================================
