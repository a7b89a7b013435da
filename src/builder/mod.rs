//! Package builders and tool sets
//!
//! Evaluation never compiles anything. It asks a [`PackageBuilder`] to
//! describe the package a build would produce, and a [`PackageSet`] for
//! the tools a development shell needs. Both are pure: the same request
//! always yields the same description.

pub mod catalog;
pub mod source;

pub use catalog::{Catalog, CatalogEntry, PackageSet, ToolDescriptor};
pub use source::{ManifestPackage, SourceSnapshot};

use crate::error::{LockstepError, LockstepResult};
use crate::hash::hash_fields;
use crate::lock::LockedInput;
use crate::platform::PlatformId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix of every derived store path
pub const STORE_ROOT: &str = "/lockstep/store";

/// Length of the hash part of a store path
const STORE_HASH_LEN: usize = 32;

/// Deterministic store path `/lockstep/store/<hash>-<label>`
pub fn store_path<'a>(fields: impl IntoIterator<Item = &'a str>, label: &str) -> String {
    let hash = hash_fields(fields);
    format!("{}/{}-{}", STORE_ROOT, &hash[..STORE_HASH_LEN], label)
}

/// Everything a builder may look at
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Package name when the source has no manifest
    pub package: &'a str,
    pub source: &'a SourceSnapshot,
    /// Locked input providing the build tooling
    pub builder: &'a LockedInput,
    /// Locked inputs the package depends on, by input name
    pub dependencies: BTreeMap<&'a str, &'a LockedInput>,
    pub platform: &'a PlatformId,
}

/// Description of a built package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOutput {
    pub name: String,
    pub version: String,
    pub platform: PlatformId,
    pub store_path: String,
    /// Revision of the builder input
    pub builder: String,
    /// Dependency input name -> revision
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

/// Describes the package a build would produce
pub trait PackageBuilder: Send + Sync {
    fn build(&self, request: &BuildRequest<'_>) -> LockstepResult<PackageOutput>;
}

/// Builder for Cargo projects.
///
/// The store path hashes the platform, the builder revision (and whatever
/// it follows), the source tree and every dependency revision.
#[derive(Debug, Clone, Default)]
pub struct CargoBuilder;

impl PackageBuilder for CargoBuilder {
    fn build(&self, request: &BuildRequest<'_>) -> LockstepResult<PackageOutput> {
        let (name, version) = match &request.source.package {
            Some(package) => (package.name.clone(), package.version.clone()),
            None if !request.package.is_empty() => {
                (request.package.to_string(), "0.0.0".to_string())
            }
            None => {
                return Err(LockstepError::Build(format!(
                    "{} has no Cargo.toml [package] and no project name",
                    request.source.root.display()
                )))
            }
        };

        let mut fields: Vec<&str> = vec![
            "cargo",
            request.platform.as_str(),
            request.builder.revision.as_str(),
        ];
        for (slot, followed) in &request.builder.follows {
            fields.push(slot);
            fields.push(&followed.revision);
        }
        fields.push(&request.source.tree_hash);
        for (dep, locked) in &request.dependencies {
            fields.push(dep);
            fields.push(&locked.revision);
        }

        let label = format!("{}-{}", name, version);
        Ok(PackageOutput {
            store_path: store_path(fields, &label),
            name,
            version,
            platform: request.platform.clone(),
            builder: request.builder.revision.clone(),
            dependencies: request
                .dependencies
                .iter()
                .map(|(dep, locked)| (dep.to_string(), locked.revision.clone()))
                .collect(),
        })
    }
}
