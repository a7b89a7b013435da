//! Configuration schema for lockstep
//!
//! Configuration is stored at `~/.config/lockstep/config.toml`

use crate::eval::EvalPolicy;
use crate::lock::ResolvePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Input resolution
    pub resolve: ResolveConfig,

    /// Output evaluation
    pub eval: EvalConfig,

    /// Development shells
    pub shell: ShellConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Fetch retry and concurrency settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Tries per input, including the first
    pub attempts: u32,

    /// Delay before the first retry, doubled on each further one
    pub backoff_ms: u64,

    /// Upper bound for one fetch attempt
    pub timeout_secs: u64,

    /// Inputs fetched concurrently
    pub jobs: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        let policy = ResolvePolicy::default();
        Self {
            attempts: policy.attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
            timeout_secs: policy.timeout.as_secs(),
            jobs: policy.jobs,
        }
    }
}

impl ResolveConfig {
    pub fn policy(&self) -> ResolvePolicy {
        ResolvePolicy {
            attempts: self.attempts.max(1),
            backoff: Duration::from_millis(self.backoff_ms),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            jobs: self.jobs.max(1),
        }
    }
}

/// Evaluation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Platforms evaluated concurrently (default: available CPUs)
    pub jobs: Option<usize>,
}

impl EvalConfig {
    pub fn policy(&self) -> EvalPolicy {
        match self.jobs {
            Some(jobs) => EvalPolicy { jobs: jobs.max(1) },
            None => EvalPolicy::default(),
        }
    }
}

/// Shell hand-off settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Program started by `lockstep shell` (default: $SHELL, then /bin/sh)
    pub program: Option<String>,
}
