//! Tool catalog for development shells
//!
//! A [`PackageSet`] answers "which build of tool X exists for platform Y".
//! The default [`Catalog`] ships a small set of well-known tools and is
//! bound to the revision of a locked package-set input: the same revision
//! always yields the same store paths.

use crate::builder::store_path;
use crate::platform::PlatformId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Revision used when the project does not lock a package set
pub const UNPINNED_REVISION: &str = "builtin";

/// A tool available on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub version: String,
    pub store_path: String,
    /// Absolute directories added to `PATH`
    pub bin_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Source of tools for a platform
pub trait PackageSet: Send + Sync {
    fn lookup(&self, platform: &PlatformId, name: &str) -> Option<ToolDescriptor>;
}

/// Catalog entry, as written under `[catalog.<tool>]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogEntry {
    pub version: String,
    /// Directories relative to the tool's store path
    pub bin: Vec<String>,
    /// Restrict the tool to these platforms; empty = everywhere
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub platforms: BTreeSet<String>,
    /// Environment set in shells; `{store}` expands to the store path
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Default for CatalogEntry {
    fn default() -> Self {
        Self {
            version: "0.0.0".to_string(),
            bin: vec!["bin".to_string()],
            platforms: BTreeSet::new(),
            env: BTreeMap::new(),
        }
    }
}

impl CatalogEntry {
    fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Self::default()
        }
    }

    fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    fn available_on(&self, platform: &PlatformId) -> bool {
        self.platforms.is_empty() || self.platforms.contains(platform.as_str())
    }
}

/// Tools every catalog knows about
pub fn builtin_entries() -> BTreeMap<String, CatalogEntry> {
    let rust = "1.82.0";
    let entries = [
        ("rustc", CatalogEntry::new(rust)),
        ("cargo", CatalogEntry::new(rust)),
        ("rustfmt", CatalogEntry::new(rust)),
        ("clippy", CatalogEntry::new(rust)),
        ("rust-analyzer", CatalogEntry::new("2024-10-21")),
        (
            "protobuf",
            CatalogEntry::new("28.3").with_env("PROTOC", "{store}/bin/protoc"),
        ),
        ("zlib", CatalogEntry::new("1.3.1")),
        (
            "openssl",
            CatalogEntry::new("3.3.2").with_env("OPENSSL_DIR", "{store}"),
        ),
        ("pkg-config", CatalogEntry::new("0.29.2")),
    ];
    entries
        .into_iter()
        .map(|(name, entry)| (name.to_string(), entry))
        .collect()
}

/// Built-in tools merged with project entries, pinned to one revision
#[derive(Debug, Clone)]
pub struct Catalog {
    revision: String,
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Catalog of the built-in tools at `revision`
    pub fn builtin(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            entries: builtin_entries(),
        }
    }

    /// Add or replace entries; project entries win over built-ins
    pub fn with_entries(mut self, entries: &BTreeMap<String, CatalogEntry>) -> Self {
        for (name, entry) in entries {
            self.entries.insert(name.clone(), entry.clone());
        }
        self
    }
}

impl PackageSet for Catalog {
    fn lookup(&self, platform: &PlatformId, name: &str) -> Option<ToolDescriptor> {
        let entry = self.entries.get(name)?;
        if !entry.available_on(platform) {
            return None;
        }

        let store = store_path(
            [
                self.revision.as_str(),
                platform.as_str(),
                name,
                entry.version.as_str(),
            ],
            &format!("{}-{}", name, entry.version),
        );
        let bin_dirs = entry
            .bin
            .iter()
            .map(|dir| format!("{}/{}", store, dir.trim_matches('/')))
            .collect();
        let env = entry
            .env
            .iter()
            .map(|(key, value)| (key.clone(), value.replace("{store}", &store)))
            .collect();

        Some(ToolDescriptor {
            name: name.to_string(),
            version: entry.version.clone(),
            store_path: store,
            bin_dirs,
            env,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> PlatformId {
        PlatformId::new("x86_64-linux").unwrap()
    }

    #[test]
    fn builtin_tools_resolve() {
        let catalog = Catalog::builtin("rev1");
        for name in [
            "rustc",
            "cargo",
            "rustfmt",
            "clippy",
            "rust-analyzer",
            "protobuf",
            "zlib",
            "openssl",
            "pkg-config",
        ] {
            assert!(catalog.lookup(&linux(), name).is_some(), "missing {}", name);
        }
        assert!(catalog.lookup(&linux(), "node").is_none());
    }

    #[test]
    fn store_paths_follow_revision_and_platform() {
        let a = Catalog::builtin("rev1").lookup(&linux(), "rustc").unwrap();
        let b = Catalog::builtin("rev1").lookup(&linux(), "rustc").unwrap();
        let c = Catalog::builtin("rev2").lookup(&linux(), "rustc").unwrap();
        let d = Catalog::builtin("rev1")
            .lookup(&PlatformId::new("aarch64-darwin").unwrap(), "rustc")
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a.store_path, c.store_path);
        assert_ne!(a.store_path, d.store_path);
        assert!(a.store_path.ends_with("-rustc-1.82.0"));
        assert_eq!(a.bin_dirs, vec![format!("{}/bin", a.store_path)]);
    }

    #[test]
    fn env_expands_store_placeholder() {
        let tool = Catalog::builtin("rev1").lookup(&linux(), "openssl").unwrap();
        assert_eq!(tool.env["OPENSSL_DIR"], tool.store_path);
    }

    #[test]
    fn project_entries_override_and_restrict() {
        let mut extra = BTreeMap::new();
        extra.insert(
            "rustc".to_string(),
            CatalogEntry {
                version: "1.80.0".into(),
                ..CatalogEntry::default()
            },
        );
        extra.insert(
            "mold".to_string(),
            CatalogEntry {
                version: "2.34.1".into(),
                platforms: BTreeSet::from(["x86_64-linux".to_string()]),
                ..CatalogEntry::default()
            },
        );
        let catalog = Catalog::builtin("rev1").with_entries(&extra);

        assert_eq!(catalog.lookup(&linux(), "rustc").unwrap().version, "1.80.0");
        assert!(catalog.lookup(&linux(), "mold").is_some());
        let darwin = PlatformId::new("aarch64-darwin").unwrap();
        assert!(catalog.lookup(&darwin, "mold").is_none());
    }

    #[test]
    fn entry_defaults_from_toml() {
        let entry: CatalogEntry = toml::from_str("version = \"1.0\"").unwrap();
        assert_eq!(entry.bin, vec!["bin"]);
        assert!(entry.platforms.is_empty());
    }
}
