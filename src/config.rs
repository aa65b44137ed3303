//! Harness configuration

use std::thread;

use crate::error::ConfigError;

/// Environment variable overriding the worker pool size.
pub const WORKER_THREADS_VAR: &str = "ENGINETEST_WORKER_THREADS";
/// Environment variable that, when set to anything but `0`, silences the
/// multi-test advisory.
pub const NO_ADVISORY_VAR: &str = "ENGINETEST_NO_ADVISORY";

/// Settings for one harness run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Threads in the default platform's worker pool
    pub worker_threads: usize,
    /// Print an advisory before every test after the first
    pub suggest_harness: bool,
    /// Print `Ran N tests.` after a run unless exactly one test ran
    pub print_run_count: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            suggest_harness: true,
            print_run_count: true,
        }
    }
}

fn default_worker_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl HarnessConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|var| std::env::var(var).ok())
    }

    /// Defaults, overridden by whatever `lookup` returns for each variable.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(WORKER_THREADS_VAR) {
            let threads = value
                .trim()
                .parse::<usize>()
                .map_err(|source| ConfigError::InvalidWorkerThreads {
                    var: WORKER_THREADS_VAR,
                    value: value.clone(),
                    source,
                })?;
            config = config.with_worker_threads(threads)?;
        }
        if let Some(value) = lookup(NO_ADVISORY_VAR) {
            config = config.with_suggest_harness(value.trim() == "0");
        }
        Ok(config)
    }

    /// Set the worker pool size. Zero is rejected.
    pub fn with_worker_threads(mut self, threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::ZeroWorkerThreads);
        }
        self.worker_threads = threads;
        Ok(self)
    }

    pub fn with_suggest_harness(mut self, suggest: bool) -> Self {
        self.suggest_harness = suggest;
        self
    }

    pub fn with_print_run_count(mut self, print: bool) -> Self {
        self.print_run_count = print;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::new();
        assert!(config.worker_threads >= 1);
        assert!(config.suggest_harness);
        assert!(config.print_run_count);
    }

    #[test]
    fn test_empty_env_keeps_defaults() {
        assert_eq!(HarnessConfig::from_env_with(env(&[])).unwrap(), HarnessConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = HarnessConfig::from_env_with(env(&[(WORKER_THREADS_VAR, " 3 "), (NO_ADVISORY_VAR, "1")])).unwrap();
        assert_eq!(config.worker_threads, 3);
        assert!(!config.suggest_harness);

        let config = HarnessConfig::from_env_with(env(&[(NO_ADVISORY_VAR, "0")])).unwrap();
        assert!(config.suggest_harness);
    }

    #[test]
    fn test_bad_thread_count_is_rejected() {
        let err = HarnessConfig::from_env_with(env(&[(WORKER_THREADS_VAR, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkerThreads { ref value, .. } if value == "many"));

        let err = HarnessConfig::from_env_with(env(&[(WORKER_THREADS_VAR, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroWorkerThreads);
    }

    #[test]
    fn test_builders_chain() {
        let config = HarnessConfig::new()
            .with_worker_threads(2)
            .unwrap()
            .with_suggest_harness(false)
            .with_print_run_count(false);
        assert_eq!(config.worker_threads, 2);
        assert!(!config.suggest_harness);
        assert!(!config.print_run_count);
    }
}
