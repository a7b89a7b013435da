//! Lock resolution
//!
//! Turns an [`InputRegistry`] into a [`LockFile`]. Inputs are processed in
//! dependency waves: everything an input follows is locked before the input
//! itself, so `follows` entries can record the target's final revision.
//! Inputs of one wave are fetched concurrently; only this coordinator writes
//! the resulting map.

use crate::error::{LockstepError, LockstepResult};
use crate::lock::fetch::{Fetched, Fetcher};
use crate::lock::locator::Locator;
use crate::lock::{FollowedInput, LockFile, LockedInput};
use crate::registry::{InputDescriptor, InputRegistry};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Retry and concurrency settings for fetching inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Tries per input, including the first
    pub attempts: u32,
    /// Delay before the first retry, doubled after each further failure
    pub backoff: Duration,
    /// Upper bound for a single fetch attempt
    pub timeout: Duration,
    /// Concurrent fetches within one wave
    pub jobs: usize,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
            jobs: 8,
        }
    }
}

/// Which inputs to fetch again even though the lock already pins them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RefreshMode {
    /// Reuse every pinned input whose locator is unchanged
    #[default]
    None,
    /// Fetch every input
    All,
    /// Fetch only the named inputs
    Inputs(BTreeSet<String>),
}

impl RefreshMode {
    fn refreshes(&self, name: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Inputs(names) => names.contains(name),
        }
    }
}

/// Pins inputs to revisions through a [`Fetcher`]
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    policy: ResolvePolicy,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: ResolvePolicy) -> Self {
        Self { fetcher, policy }
    }

    pub fn policy(&self) -> &ResolvePolicy {
        &self.policy
    }

    /// Resolve every registered input.
    ///
    /// With a previous lock, inputs whose written locator is unchanged keep
    /// their pinned revision unless `refresh` selects them. Running this
    /// again on the same registry with its own output returns an identical
    /// lock.
    pub async fn resolve(
        &self,
        registry: &InputRegistry,
        previous: Option<&LockFile>,
        refresh: &RefreshMode,
    ) -> LockstepResult<LockFile> {
        registry.validate()?;
        if let RefreshMode::Inputs(names) = refresh {
            if let Some(unknown) = names.iter().find(|n| !registry.contains(n)) {
                return Err(LockstepError::UnknownInput(unknown.clone()));
            }
        }

        let waves = registry.waves()?;
        let mut locked: BTreeMap<String, LockedInput> = BTreeMap::new();
        let mut fetched_count = 0usize;

        for (depth, wave) in waves.into_iter().enumerate() {
            let mut to_fetch = Vec::new();

            for input in wave {
                let reusable = previous
                    .and_then(|lock| lock.get(&input.name))
                    .filter(|entry| entry.locator == input.locator.as_str())
                    .filter(|_| !refresh.refreshes(&input.name));

                match reusable {
                    Some(entry) => {
                        debug!("Reusing {} at {}", input.name, entry.revision);
                        let fetched = Fetched {
                            revision: entry.revision.clone(),
                            resolved_locator: entry.resolved_locator.clone(),
                        };
                        let entry = lock_entry(input, fetched, &locked)?;
                        locked.insert(input.name.clone(), entry);
                    }
                    None => to_fetch.push(input),
                }
            }

            if to_fetch.is_empty() {
                continue;
            }
            debug!("Wave {}: fetching {} input(s)", depth, to_fetch.len());
            fetched_count += to_fetch.len();

            let results = self.fetch_wave(&to_fetch).await?;
            for input in to_fetch {
                let fetched = results.get(&input.name).cloned().ok_or_else(|| {
                    LockstepError::Internal(format!("no fetch result for '{}'", input.name))
                })?;
                let entry = lock_entry(input, fetched, &locked)?;
                locked.insert(input.name.clone(), entry);
            }
        }

        info!(
            "Resolved {} input(s), {} fetched",
            locked.len(),
            fetched_count
        );
        Ok(LockFile {
            inputs: locked,
            ..LockFile::default()
        })
    }

    /// Fetch independent inputs concurrently, bounded by `policy.jobs`.
    ///
    /// Every task runs to completion so the reported failure does not
    /// depend on scheduling: the first failing input by name wins.
    async fn fetch_wave(
        &self,
        inputs: &[&InputDescriptor],
    ) -> LockstepResult<BTreeMap<String, Fetched>> {
        let permits = Arc::new(Semaphore::new(self.policy.jobs.max(1)));
        let mut tasks = JoinSet::new();

        for input in inputs {
            let fetcher = Arc::clone(&self.fetcher);
            let policy = self.policy.clone();
            let permits = Arc::clone(&permits);
            let name = input.name.clone();
            let locator = input.locator.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = fetch_with_retry(fetcher.as_ref(), &policy, &name, &locator).await;
                (name, result)
            });
        }

        let mut fetched = BTreeMap::new();
        let mut failures = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, result) = joined
                .map_err(|e| LockstepError::Internal(format!("fetch task failed: {}", e)))?;
            match result {
                Ok(value) => {
                    fetched.insert(name, value);
                }
                Err(e) => {
                    failures.insert(name, e);
                }
            }
        }

        match failures.into_values().next() {
            Some(first) => Err(first),
            None => Ok(fetched),
        }
    }
}

/// Build the lock entry for `input`, reading override targets from `locked`
fn lock_entry(
    input: &InputDescriptor,
    fetched: Fetched,
    locked: &BTreeMap<String, LockedInput>,
) -> LockstepResult<LockedInput> {
    let mut follows = BTreeMap::new();
    for (slot, target) in &input.overrides {
        let target_entry = locked.get(target).ok_or_else(|| {
            LockstepError::Internal(format!(
                "'{}' follows '{}' which is not locked yet",
                input.name, target
            ))
        })?;
        follows.insert(
            slot.clone(),
            FollowedInput {
                input: target.clone(),
                revision: target_entry.revision.clone(),
            },
        );
    }

    Ok(LockedInput {
        locator: input.locator.as_str().to_string(),
        resolved_locator: fetched.resolved_locator,
        revision: fetched.revision,
        follows,
    })
}

/// Fetch one input with bounded retries and exponential backoff
async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    policy: &ResolvePolicy,
    name: &str,
    locator: &Locator,
) -> LockstepResult<Fetched> {
    let attempts = policy.attempts.max(1);
    let mut delay = policy.backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, fetcher.fetch(locator)).await {
            Ok(result) => result,
            Err(_) => Err(LockstepError::transient_fetch(
                locator.as_str(),
                format!("timed out after {}ms", policy.timeout.as_millis()),
            )),
        };

        match result {
            Ok(fetched) => {
                debug!("{} -> {} (attempt {})", name, fetched.revision, attempt);
                return Ok(fetched);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    "Fetching {} failed (attempt {}/{}): {}; retrying in {}ms",
                    name,
                    attempt,
                    attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => {
                return Err(LockstepError::UnresolvableInput {
                    input: name.to_string(),
                    locator: locator.as_str().to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
        }
    }
}
