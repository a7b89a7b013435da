//! Output evaluation
//!
//! Every output is evaluated once per platform. Evaluations are pure: an
//! [`OutputSpec`] only sees the lock and the platform, so results can be
//! memoized in the [`EvalCache`] and platforms can run in parallel without
//! sharing anything mutable.
//!
//! Failures are collected, never short-circuited: a failing (or panicking)
//! output on one platform does not stop any other evaluation.

pub mod cache;

pub use cache::{CacheKey, CacheStats, EvalCache};

use crate::builder::{PackageOutput, ToolDescriptor};
use crate::error::{EvaluationFailures, LockstepError, LockstepResult};
use crate::lock::{LockFile, LockIdentity};
use crate::platform::{PlatformId, Platforms};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What an output spec may look at
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub lock: &'a LockFile,
    pub platform: &'a PlatformId,
}

/// A named output expression
pub trait OutputSpec: Send + Sync {
    /// Unique output key, e.g. `package`
    fn key(&self) -> &str;

    /// Describe this output for one platform; must be deterministic
    fn evaluate(&self, ctx: &EvalContext<'_>) -> LockstepResult<OutputDescription>;
}

/// A development shell: tools on `PATH` plus environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutput {
    pub platform: PlatformId,
    pub tools: Vec<ToolDescriptor>,
    pub env: BTreeMap<String, String>,
}

impl ShellOutput {
    /// `PATH` entries contributed by the shell's tools, in tool order
    pub fn path_entries(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = Vec::new();
        for dir in self.tools.iter().flat_map(|t| t.bin_dirs.iter()) {
            if !entries.contains(&dir.as_str()) {
                entries.push(dir);
            }
        }
        entries
    }
}

/// Result of evaluating one output on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OutputDescription {
    Package(PackageOutput),
    Shell(ShellOutput),
}

impl OutputDescription {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Package(_) => "package",
            Self::Shell(_) => "shell",
        }
    }
}

/// Evaluation concurrency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalPolicy {
    /// Platforms evaluated at once
    pub jobs: usize,
}

impl Default for EvalPolicy {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Outputs and failures of one platform
#[derive(Debug, Serialize)]
pub struct PlatformEvaluation {
    pub platform: PlatformId,
    pub outputs: BTreeMap<String, OutputDescription>,
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<LockstepError>,
}

impl PlatformEvaluation {
    fn new(platform: PlatformId) -> Self {
        Self {
            platform,
            outputs: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

fn serialize_failures<S: serde::Serializer>(
    failures: &[LockstepError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(failures.iter().map(|f| f.to_string()))
}

/// Evaluations of every requested platform
#[derive(Debug, Default, Serialize)]
pub struct EvaluationReport {
    pub platforms: BTreeMap<PlatformId, PlatformEvaluation>,
}

impl EvaluationReport {
    pub fn is_success(&self) -> bool {
        self.platforms.values().all(PlatformEvaluation::is_success)
    }

    pub fn failure_count(&self) -> usize {
        self.platforms.values().map(|p| p.failures.len()).sum()
    }

    pub fn get(&self, platform: &PlatformId) -> Option<&PlatformEvaluation> {
        self.platforms.get(platform)
    }

    /// The report if everything succeeded, otherwise every failing
    /// (output, platform) pair in platform order
    pub fn into_result(self) -> LockstepResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let failures = self
            .platforms
            .into_values()
            .flat_map(|p| p.failures)
            .collect();
        Err(LockstepError::EvaluationFailed(EvaluationFailures(failures)))
    }
}

/// Evaluates registered output specs against a lock
#[derive(Clone)]
pub struct Evaluator {
    specs: Arc<BTreeMap<String, Arc<dyn OutputSpec>>>,
    cache: Arc<EvalCache>,
    policy: EvalPolicy,
}

impl Evaluator {
    /// Register specs; output keys must be unique
    pub fn new(
        specs: Vec<Arc<dyn OutputSpec>>,
        cache: Arc<EvalCache>,
        policy: EvalPolicy,
    ) -> LockstepResult<Self> {
        let mut by_key = BTreeMap::new();
        for spec in specs {
            let key = spec.key().to_string();
            if by_key.insert(key.clone(), spec).is_some() {
                return Err(LockstepError::User(format!(
                    "Output '{}' is defined twice",
                    key
                )));
            }
        }
        Ok(Self {
            specs: Arc::new(by_key),
            cache,
            policy,
        })
    }

    /// Registered output keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn cache(&self) -> &EvalCache {
        &self.cache
    }

    /// Evaluate one output for one platform
    pub fn evaluate_output(
        &self,
        lock: &LockFile,
        platform: &PlatformId,
        key: &str,
    ) -> LockstepResult<OutputDescription> {
        let spec = self
            .specs
            .get(key)
            .ok_or_else(|| LockstepError::UnknownOutput(key.to_string()))?;
        let identity = lock.identity()?;
        self.run_spec(spec.as_ref(), &identity, lock, platform)
    }

    /// Evaluate every output for one platform
    pub fn evaluate(
        &self,
        lock: &LockFile,
        platform: &PlatformId,
    ) -> LockstepResult<PlatformEvaluation> {
        let identity = lock.identity()?;
        Ok(self.evaluate_platform(&identity, lock, platform, None))
    }

    /// Evaluate every output on every platform, one blocking task per
    /// platform, at most `policy.jobs` at a time
    pub async fn evaluate_all(
        &self,
        lock: Arc<LockFile>,
        platforms: &Platforms,
    ) -> LockstepResult<EvaluationReport> {
        self.evaluate_all_with(lock, platforms, |_| {}).await
    }

    /// Like [`Evaluator::evaluate_all`], calling `on_platform` as each
    /// platform finishes
    pub async fn evaluate_all_with<F>(
        &self,
        lock: Arc<LockFile>,
        platforms: &Platforms,
        on_platform: F,
    ) -> LockstepResult<EvaluationReport>
    where
        F: FnMut(&PlatformEvaluation),
    {
        self.fan_out(lock, platforms, None, on_platform).await
    }

    /// Evaluate a single output on every platform, in parallel like
    /// [`Evaluator::evaluate_all`]
    pub async fn evaluate_output_all(
        &self,
        lock: Arc<LockFile>,
        platforms: &Platforms,
        key: &str,
    ) -> LockstepResult<EvaluationReport> {
        if !self.specs.contains_key(key) {
            return Err(LockstepError::UnknownOutput(key.to_string()));
        }
        self.fan_out(lock, platforms, Some(key.to_string()), |_| {})
            .await
    }

    /// One blocking task per platform, restricted to `only` when given
    async fn fan_out<F>(
        &self,
        lock: Arc<LockFile>,
        platforms: &Platforms,
        only: Option<String>,
        mut on_platform: F,
    ) -> LockstepResult<EvaluationReport>
    where
        F: FnMut(&PlatformEvaluation),
    {
        let identity = lock.identity()?;
        let permits = Arc::new(Semaphore::new(self.policy.jobs.max(1)));
        let mut tasks = JoinSet::new();

        for platform in platforms.iter() {
            let evaluator = self.clone();
            let lock = Arc::clone(&lock);
            let identity = identity.clone();
            let platform = platform.clone();
            let permits = Arc::clone(&permits);
            let only = only.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let task_platform = platform.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    evaluator.evaluate_platform(
                        &identity,
                        &lock,
                        &task_platform,
                        only.as_deref(),
                    )
                })
                .await;
                match joined {
                    Ok(evaluation) => evaluation,
                    Err(e) => {
                        let mut evaluation = PlatformEvaluation::new(platform.clone());
                        evaluation.failures.push(LockstepError::evaluation(
                            "*",
                            platform.as_str(),
                            LockstepError::Internal(format!("evaluation task failed: {}", e)),
                        ));
                        evaluation
                    }
                }
            });
        }

        let mut report = EvaluationReport::default();
        while let Some(joined) = tasks.join_next().await {
            let evaluation = joined
                .map_err(|e| LockstepError::Internal(format!("evaluation task failed: {}", e)))?;
            on_platform(&evaluation);
            report
                .platforms
                .insert(evaluation.platform.clone(), evaluation);
        }

        let stats = self.cache.stats();
        info!(
            "Evaluated {} output(s) on {} platform(s), {} failure(s); cache {} hit(s), {} miss(es)",
            if only.is_some() { 1 } else { self.specs.len() },
            report.platforms.len(),
            report.failure_count(),
            stats.hits,
            stats.misses
        );
        Ok(report)
    }

    fn evaluate_platform(
        &self,
        identity: &LockIdentity,
        lock: &LockFile,
        platform: &PlatformId,
        only: Option<&str>,
    ) -> PlatformEvaluation {
        let mut evaluation = PlatformEvaluation::new(platform.clone());
        for (key, spec) in self.specs.iter() {
            if only.is_some_and(|only| only != key) {
                continue;
            }
            match self.run_spec(spec.as_ref(), identity, lock, platform) {
                Ok(output) => {
                    evaluation.outputs.insert(key.clone(), output);
                }
                Err(e) => {
                    warn!("{}", e);
                    evaluation.failures.push(e);
                }
            }
        }
        evaluation
    }

    /// Cache lookup, then the spec itself with panics turned into errors
    fn run_spec(
        &self,
        spec: &dyn OutputSpec,
        identity: &LockIdentity,
        lock: &LockFile,
        platform: &PlatformId,
    ) -> LockstepResult<OutputDescription> {
        let key = CacheKey::new(identity, platform, spec.key());
        if let Some(cached) = self.cache.get(&key) {
            debug!("Cache hit: {} on {}", spec.key(), platform);
            return Ok(cached);
        }

        let ctx = EvalContext { lock, platform };
        let result = panic::catch_unwind(AssertUnwindSafe(|| spec.evaluate(&ctx)))
            .unwrap_or_else(|payload| {
                Err(LockstepError::Internal(format!(
                    "panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match result {
            Ok(output) => {
                debug!("Evaluated {} on {}", spec.key(), platform);
                self.cache.put(key, output.clone());
                Ok(output)
            }
            Err(e) => Err(LockstepError::evaluation(spec.key(), platform.as_str(), e)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
