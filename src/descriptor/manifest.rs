//! `lockstep.toml` parsing
//!
//! ```toml
//! [project]
//! name = "hello"
//! package_set = "nixpkgs"
//!
//! [inputs.nixpkgs]
//! url = "github:NixOS/nixpkgs/nixos-unstable"
//!
//! [inputs.naersk]
//! url = "github:nix-community/naersk"
//! follows = { nixpkgs = "nixpkgs" }
//!
//! [outputs.package]
//! builder = "naersk"
//!
//! [outputs.dev-shell]
//! tools = ["rustc", "cargo"]
//! ```

use crate::builder::CatalogEntry;
use crate::error::{LockstepError, LockstepResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parsed project descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Project metadata
    pub project: ProjectMeta,

    /// External inputs by name
    #[serde(default)]
    pub inputs: BTreeMap<String, InputEntry>,

    /// Target platforms (default: the four common systems)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<PlatformsSection>,

    /// Declared outputs
    #[serde(default)]
    pub outputs: OutputsSection,

    /// Extra or overriding tool catalog entries
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub catalog: BTreeMap<String, CatalogEntry>,
}

/// `[project]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// Project name, used when the source has no Cargo manifest
    pub name: String,

    /// Source directory relative to the descriptor
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Input whose revision pins the tool catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_set: Option<String>,
}

fn default_source() -> PathBuf {
    PathBuf::from(".")
}

/// `[inputs.<name>]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEntry {
    /// Locator string
    pub url: String,

    /// Dependency slot -> input used instead
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub follows: BTreeMap<String, String>,
}

/// `[platforms]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformsSection {
    pub systems: Vec<String>,
}

/// `[outputs]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageSection>,

    #[serde(
        default,
        rename = "dev-shell",
        skip_serializing_if = "Option::is_none"
    )]
    pub dev_shell: Option<DevShellSection>,
}

/// `[outputs.package]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSection {
    /// Input providing the builder
    pub builder: String,

    /// Inputs the package depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// `[outputs.dev-shell]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevShellSection {
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse a descriptor from a TOML file on disk
    pub async fn from_file(path: &Path) -> LockstepResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LockstepError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&content, path)
    }

    /// Parse and check references between sections
    pub fn parse(content: &str, path: &Path) -> LockstepResult<Self> {
        let invalid = |reason: String| LockstepError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let manifest: Self = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
        manifest.check_references().map_err(invalid)?;
        Ok(manifest)
    }

    /// Every input named outside `[inputs]` must be declared there
    fn check_references(&self) -> Result<(), String> {
        let mut referenced: Vec<(&str, &str)> = Vec::new();
        if let Some(set) = &self.project.package_set {
            referenced.push(("project.package_set", set.as_str()));
        }
        if let Some(package) = &self.outputs.package {
            referenced.push(("outputs.package.builder", package.builder.as_str()));
            for dep in &package.dependencies {
                referenced.push(("outputs.package.dependencies", dep.as_str()));
            }
        }

        for (field, name) in referenced {
            if !self.inputs.contains_key(name) {
                return Err(format!("{} names undeclared input '{}'", field, name));
            }
        }
        Ok(())
    }
}
