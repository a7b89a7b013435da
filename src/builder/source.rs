//! Immutable snapshot of the project source

use crate::error::{LockstepError, LockstepResult};
use crate::hash::hash_tree;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name and version read from the project's `Cargo.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPackage {
    pub name: String,
    pub version: String,
}

/// Project source captured once before evaluation.
///
/// Output specs only ever see this snapshot, never the live directory, so
/// every platform evaluates against the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub root: PathBuf,
    /// `sha256-` tree hash of `root`
    pub tree_hash: String,
    /// `[package]` of `Cargo.toml`, when present
    pub package: Option<ManifestPackage>,
}

#[derive(Deserialize)]
struct CargoManifest {
    package: Option<CargoPackage>,
}

#[derive(Deserialize)]
struct CargoPackage {
    name: String,
    /// Either a string or `{ workspace = true }`
    version: Option<toml::Value>,
}

impl SourceSnapshot {
    /// Hash `root` and read its manifest
    pub fn capture(root: &Path) -> LockstepResult<Self> {
        let tree_hash = hash_tree(root)?;
        let package = read_manifest(&root.join("Cargo.toml"))?;
        debug!("Captured source {} ({})", root.display(), tree_hash);

        Ok(Self {
            root: root.to_path_buf(),
            tree_hash,
            package,
        })
    }

    /// Snapshot with known values, for callers that already hashed the tree
    pub fn from_parts(
        root: impl Into<PathBuf>,
        tree_hash: impl Into<String>,
        package: Option<ManifestPackage>,
    ) -> Self {
        Self {
            root: root.into(),
            tree_hash: tree_hash.into(),
            package,
        }
    }
}

fn read_manifest(path: &Path) -> LockstepResult<Option<ManifestPackage>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| LockstepError::io(format!("reading {}", path.display()), e))?;
    let manifest: CargoManifest =
        toml::from_str(&content).map_err(|e| LockstepError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(manifest.package.map(|package| ManifestPackage {
        version: package
            .version
            .as_ref()
            .and_then(toml::Value::as_str)
            .unwrap_or("0.0.0")
            .to_string(),
        name: package.name,
    }))
}
