//! Platform enumeration
//!
//! A platform is an opaque `<arch>-<os>` identifier. Outputs are evaluated
//! once per platform in the closed set supplied by the descriptor.

use crate::error::{LockstepError, LockstepResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Platforms evaluated when the descriptor has no `[platforms]` table
pub const DEFAULT_SYSTEMS: &[&str] = &[
    "x86_64-linux",
    "aarch64-linux",
    "x86_64-darwin",
    "aarch64-darwin",
];

/// Identifier of a target platform
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformId(String);

impl PlatformId {
    /// Parse a platform identifier
    pub fn new(id: impl Into<String>) -> LockstepResult<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LockstepError::InvalidPlatform(id));
        }
        Ok(Self(id))
    }

    /// The platform of the running host
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        Self(format!("{}-{}", std::env::consts::ARCH, os))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_host(&self) -> bool {
        *self == Self::host()
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PlatformId {
    type Err = LockstepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PlatformId {
    type Error = LockstepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlatformId> for String {
    fn from(id: PlatformId) -> Self {
        id.0
    }
}

/// The closed, non-empty set of platforms outputs are evaluated over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platforms {
    set: BTreeSet<PlatformId>,
}

impl Platforms {
    /// Build the set from identifiers, rejecting an empty set
    pub fn new<I, S>(ids: I) -> LockstepResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = ids
            .into_iter()
            .map(PlatformId::new)
            .collect::<LockstepResult<BTreeSet<_>>>()?;

        if set.is_empty() {
            return Err(LockstepError::NoPlatforms);
        }
        Ok(Self { set })
    }

    /// The conventional four Linux/Darwin systems
    pub fn default_systems() -> Self {
        Self {
            set: DEFAULT_SYSTEMS
                .iter()
                .map(|s| PlatformId((*s).to_string()))
                .collect(),
        }
    }

    pub fn platforms(&self) -> &BTreeSet<PlatformId> {
        &self.set
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformId> {
        self.set.iter()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains(&self, platform: &PlatformId) -> bool {
        self.set.contains(platform)
    }

    /// Look up a platform, failing if it is outside the set
    pub fn require(&self, platform: &str) -> LockstepResult<PlatformId> {
        let id = PlatformId::new(platform)?;
        if self.set.contains(&id) {
            Ok(id)
        } else {
            Err(LockstepError::UnknownPlatform {
                platform: id.0,
                known: self
                    .set
                    .iter()
                    .map(PlatformId::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_rejected() {
        let result = Platforms::new(Vec::<String>::new());
        assert!(matches!(result, Err(LockstepError::NoPlatforms)));
    }

    #[test]
    fn whitespace_is_rejected() {
        assert!(PlatformId::new("x86_64 linux").is_err());
        assert!(PlatformId::new("").is_err());
    }

    #[test]
    fn set_is_sorted_and_deduplicated() {
        let platforms = Platforms::new(["x86_64-linux", "aarch64-darwin", "x86_64-linux"]).unwrap();
        let ids: Vec<&str> = platforms.iter().map(PlatformId::as_str).collect();
        assert_eq!(ids, vec!["aarch64-darwin", "x86_64-linux"]);
    }

    #[test]
    fn host_uses_darwin_naming() {
        let host = PlatformId::host();
        assert!(host.as_str().contains('-'));
        assert!(!host.as_str().ends_with("-macos"));
    }

    #[test]
    fn require_unknown_platform() {
        let platforms = Platforms::default_systems();
        assert!(platforms.require("x86_64-linux").is_ok());
        let err = platforms.require("riscv64-linux").unwrap_err();
        assert!(err.to_string().contains("riscv64-linux"));
        assert!(err.to_string().contains("aarch64-darwin"));
    }

    #[test]
    fn serde_validates() {
        let id: PlatformId = serde_json::from_str("\"x86_64-linux\"").unwrap();
        assert_eq!(id.as_str(), "x86_64-linux");
        assert!(serde_json::from_str::<PlatformId>("\"\"").is_err());
    }
}
