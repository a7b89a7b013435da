//! Lock files
//!
//! `lockstep.lock` pins every input of a project to an immutable revision.
//! It is the only artifact lockstep persists.
//!
//! # Determinism
//!
//! - Inputs are stored in a `BTreeMap`, so keys serialize in sorted order
//! - Re-serializing an unchanged lock produces byte-identical output
//! - The lock's identity is the SHA-256 of that serialization: same lock
//!   = same identity = same evaluation cache entries
//!
//! # Writes
//!
//! Saving goes through a temporary file and a rename, so a failed
//! resolution never leaves a half-written lock behind.

pub mod fetch;
pub mod locator;
pub mod resolver;

pub use fetch::{Fetched, Fetcher, SourceFetcher};
pub use locator::{GitRef, Locator, Source};
pub use resolver::{RefreshMode, ResolvePolicy, Resolver};

use crate::error::{LockstepError, LockstepResult};
use crate::hash::hash_bytes;
use crate::registry::InputRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Current lock file format version
pub const LOCK_VERSION: u32 = 1;

/// File name of the lock, next to `lockstep.toml`
pub const LOCK_FILE_NAME: &str = "lockstep.lock";

const LOCK_HEADER: &str = "# This file is generated by `lockstep resolve`. Do not edit.\n";

/// Revision of another input substituted through an override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowedInput {
    /// The registered input this slot follows
    pub input: String,
    /// That input's locked revision
    pub revision: String,
}

/// One pinned input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedInput {
    /// Locator as written in the descriptor
    pub locator: String,
    /// Address that fetches exactly `revision`
    pub resolved_locator: String,
    /// Commit id or content hash
    pub revision: String,
    /// Overridden dependency slots
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub follows: BTreeMap<String, FollowedInput>,
}

impl LockedInput {
    /// First 12 characters of the revision, without any hash prefix
    pub fn short_revision(&self) -> &str {
        let rev = self
            .revision
            .strip_prefix(crate::hash::HASH_PREFIX)
            .unwrap_or(&self.revision);
        &rev[..rev.len().min(12)]
    }
}

/// Content identity of a lock file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockIdentity(String);

impl LockIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for LockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pinned revisions of every input, keyed by input name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    pub version: u32,
    #[serde(default)]
    pub inputs: BTreeMap<String, LockedInput>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            version: LOCK_VERSION,
            inputs: BTreeMap::new(),
        }
    }
}

impl LockFile {
    pub fn get(&self, name: &str) -> Option<&LockedInput> {
        self.inputs.get(name)
    }

    /// Look up an input that must be locked
    pub fn require(&self, name: &str) -> LockstepResult<&LockedInput> {
        self.inputs.get(name).ok_or_else(|| {
            LockstepError::LockOutdated(format!("input '{}' is not locked", name))
        })
    }

    /// Canonical serialization: header line followed by sorted TOML
    pub fn to_toml(&self) -> LockstepResult<String> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("{}{}", LOCK_HEADER, body))
    }

    /// Parse a serialized lock
    pub fn from_toml(content: &str) -> LockstepResult<Self> {
        let lock: Self = toml::from_str(content)?;
        if lock.version != LOCK_VERSION {
            return Err(LockstepError::User(format!(
                "Unsupported lock file version {} (expected {})",
                lock.version, LOCK_VERSION
            )));
        }
        Ok(lock)
    }

    /// SHA-256 of the canonical serialization
    pub fn identity(&self) -> LockstepResult<LockIdentity> {
        let canonical = self.to_toml()?;
        Ok(LockIdentity(hash_bytes(canonical.as_bytes())))
    }

    /// Explain why this lock no longer matches the registry, if it doesn't.
    ///
    /// A lock is stale when an input is missing or extra, when a locator
    /// changed, or when an override points somewhere else.
    pub fn staleness(&self, registry: &InputRegistry) -> Option<String> {
        for input in registry.iter() {
            let Some(locked) = self.inputs.get(&input.name) else {
                return Some(format!("input '{}' is not locked", input.name));
            };
            if locked.locator != input.locator.as_str() {
                return Some(format!(
                    "input '{}' changed from {} to {}",
                    input.name, locked.locator, input.locator
                ));
            }
            let locked_follows: BTreeMap<&str, &str> = locked
                .follows
                .iter()
                .map(|(slot, f)| (slot.as_str(), f.input.as_str()))
                .collect();
            let wanted: BTreeMap<&str, &str> = input
                .overrides
                .iter()
                .map(|(slot, target)| (slot.as_str(), target.as_str()))
                .collect();
            if locked_follows != wanted {
                return Some(format!("overrides of input '{}' changed", input.name));
            }
            for (slot, followed) in &locked.follows {
                let current = self.inputs.get(&followed.input).map(|l| l.revision.as_str());
                if current != Some(followed.revision.as_str()) {
                    return Some(format!(
                        "input '{}' follows an outdated revision of '{}' (slot {})",
                        input.name, followed.input, slot
                    ));
                }
            }
        }

        self.inputs
            .keys()
            .find(|name| !registry.contains(name))
            .map(|name| format!("input '{}' is no longer declared", name))
    }

    /// Load a lock from disk, `None` if the file does not exist
    pub async fn load(path: &Path) -> LockstepResult<Option<Self>> {
        if !path.exists() {
            debug!("No lock file at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| LockstepError::io(format!("reading lock file {}", path.display()), e))?;

        Self::from_toml(&content)
            .map(Some)
            .map_err(|e| LockstepError::LockfileRead {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Write the lock atomically; returns whether the file content changed
    pub async fn save(&self, path: &Path) -> LockstepResult<bool> {
        let content = self.to_toml()?;

        if let Ok(existing) = fs::read_to_string(path).await {
            if existing == content {
                debug!("Lock file {} unchanged", path.display());
                return Ok(false);
            }
        }

        let tmp = path.with_extension("lock.tmp");
        fs::write(&tmp, &content)
            .await
            .map_err(|e| LockstepError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| LockstepError::io(format!("replacing {}", path.display()), e))?;

        info!("Wrote {}", path.display());
        Ok(true)
    }
}
