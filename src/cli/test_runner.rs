//! Test runner: selection, execution and reporting
//!
//! ## RunReporter Trait
//!
//! The runner reports through a `RunReporter` so the console output (which
//! external tools parse line by line) is kept apart from execution. Tests use
//! [`RecordingReporter`] to observe a run without touching stdout.

use std::time::{Duration, Instant};

use crate::config::HarnessConfig;
use crate::engine::Engine;
use crate::error::ContractViolation;
use crate::lifecycle::RuntimeLifecycle;
use crate::registry::{TestDescriptor, TestRegistry};
use crate::selector;

/// Printed before every test after the first in one invocation.
pub const ADVISORY: &str =
    "Running multiple tests in sequence is deprecated and may cause bogus failure.  Consider using a multi-test driver instead.";

// ============================================================================
// Run Reporter Trait
// ============================================================================

/// Receives the observable events of a harness invocation.
pub trait RunReporter {
    /// Called with the `--list` output, oldest registration first
    fn on_listing(&mut self, names: &[String]);

    /// Called before a selected test runs
    fn on_test_start(&mut self, _test: &TestDescriptor) {}

    /// Called before every test after the first, when advisories are enabled
    fn on_advisory(&mut self);

    /// Called once after every token has been processed
    fn on_run_complete(&mut self, summary: &RunSummary);
}

/// Summary of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub tests_run: usize,
    pub duration: Duration,
}

/// Console reporter; everything goes to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    pub print_run_count: bool,
}

impl ConsoleReporter {
    pub fn new(print_run_count: bool) -> Self {
        Self { print_run_count }
    }
}

impl RunReporter for ConsoleReporter {
    fn on_listing(&mut self, names: &[String]) {
        for name in names {
            println!("{name}");
        }
    }

    fn on_test_start(&mut self, test: &TestDescriptor) {
        tracing::debug!(test = %test.qualified_name(), "running");
    }

    fn on_advisory(&mut self) {
        println!("{ADVISORY}");
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        if self.print_run_count && summary.tests_run != 1 {
            println!("Ran {} tests.", summary.tests_run);
        }
        tracing::debug!(elapsed = ?summary.duration, "run complete");
    }
}

/// Reporter that keeps every event, in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingReporter {
    pub listing: Vec<String>,
    pub started: Vec<String>,
    pub advisories: usize,
    pub tests_run: Option<usize>,
}

impl RunReporter for RecordingReporter {
    fn on_listing(&mut self, names: &[String]) {
        self.listing.extend_from_slice(names);
    }

    fn on_test_start(&mut self, test: &TestDescriptor) {
        self.started.push(test.qualified_name());
    }

    fn on_advisory(&mut self) {
        self.advisories += 1;
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        self.tests_run = Some(summary.tests_run);
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Runs selected tests through a [`RuntimeLifecycle`].
pub struct TestRunner<'a, E: Engine> {
    registry: &'a TestRegistry,
    lifecycle: &'a mut RuntimeLifecycle<E>,
    config: &'a HarnessConfig,
    tests_run: usize,
}

impl<'a, E: Engine> TestRunner<'a, E> {
    pub fn new(registry: &'a TestRegistry, lifecycle: &'a mut RuntimeLifecycle<E>, config: &'a HarnessConfig) -> Self {
        Self {
            registry,
            lifecycle,
            config,
            tests_run: 0,
        }
    }

    pub fn tests_run(&self) -> usize {
        self.tests_run
    }

    /// Print the registry listing.
    pub fn list(&self, reporter: &mut dyn RunReporter) {
        reporter.on_listing(&selector::list(self.registry));
    }

    /// Run every enabled match of `token`, in traversal order.
    pub fn run_token(&mut self, token: &str, reporter: &mut dyn RunReporter) -> Result<usize, ContractViolation> {
        let selected = selector::select(self.registry, token);
        if selected.is_empty() {
            tracing::debug!(token, "token selected nothing");
        }
        for descriptor in &selected {
            if self.tests_run > 0 && self.config.suggest_harness {
                reporter.on_advisory();
            }
            self.tests_run += 1;
            reporter.on_test_start(descriptor);
            self.lifecycle.run(descriptor)?;
        }
        Ok(selected.len())
    }

    /// Run every token in order, then report the summary.
    pub fn run_all<S: AsRef<str>>(
        &mut self,
        tokens: &[S],
        reporter: &mut dyn RunReporter,
    ) -> Result<RunSummary, ContractViolation> {
        let start = Instant::now();
        for token in tokens {
            self.run_token(token.as_ref(), reporter)?;
        }
        let summary = RunSummary {
            tests_run: self.tests_run,
            duration: start.elapsed(),
        };
        reporter.on_run_complete(&summary);
        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::ReferenceEngine;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_registry(counter: &Arc<AtomicUsize>) -> TestRegistry {
        let mut registry = TestRegistry::new();
        for (file, name) in [("math.rs", "add"), ("math.rs", "sub"), ("str.rs", "concat")] {
            let counter = Arc::clone(counter);
            registry.register(TestDescriptor::new(file, name, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        registry
    }

    #[test]
    fn test_advisory_before_every_test_after_first() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(&counter);
        let mut lifecycle = RuntimeLifecycle::new(ReferenceEngine::new());
        let config = HarnessConfig::new();
        let mut reporter = RecordingReporter::default();

        let mut runner = TestRunner::new(&registry, &mut lifecycle, &config);
        let summary = runner.run_all(&["math", "str/concat"], &mut reporter).unwrap();

        assert_eq!(summary.tests_run, 3);
        assert_eq!(reporter.advisories, 2);
        assert_eq!(reporter.started, vec!["math/sub", "math/add", "str/concat"]);
        assert_eq!(reporter.tests_run, Some(3));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        lifecycle.tear_down();
    }

    #[test]
    fn test_advisory_can_be_disabled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(&counter);
        let mut lifecycle = RuntimeLifecycle::new(ReferenceEngine::new());
        let config = HarnessConfig::new().with_suggest_harness(false);
        let mut reporter = RecordingReporter::default();

        TestRunner::new(&registry, &mut lifecycle, &config)
            .run_all(&["math"], &mut reporter)
            .unwrap();
        assert_eq!(reporter.advisories, 0);
        lifecycle.tear_down();
    }

    #[test]
    fn test_unmatched_token_runs_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(&counter);
        let mut lifecycle = RuntimeLifecycle::new(ReferenceEngine::new());
        let config = HarnessConfig::new();
        let mut reporter = RecordingReporter::default();

        let mut runner = TestRunner::new(&registry, &mut lifecycle, &config);
        assert_eq!(runner.run_token("nope", &mut reporter).unwrap(), 0);
        assert_eq!(runner.tests_run(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listing_goes_to_reporter() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(&counter);
        let mut lifecycle = RuntimeLifecycle::new(ReferenceEngine::new());
        let config = HarnessConfig::new();
        let mut reporter = RecordingReporter::default();

        TestRunner::new(&registry, &mut lifecycle, &config).list(&mut reporter);
        assert_eq!(reporter.listing, vec!["math/add", "math/sub", "str/concat"]);
        assert_eq!(reporter.tests_run, None);
    }
}
