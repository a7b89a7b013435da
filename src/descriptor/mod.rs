//! Project descriptor
//!
//! A project is a directory containing `lockstep.toml`. The descriptor
//! names the inputs, platforms and outputs; the lock file lives next to it.

pub mod edit;
pub mod manifest;

pub use manifest::{InputEntry, Manifest};

use crate::builder::{CargoBuilder, SourceSnapshot};
use crate::error::{LockstepError, LockstepResult};
use crate::eval::OutputSpec;
use crate::lock::{Locator, LOCK_FILE_NAME};
use crate::outputs::{DevShellSpec, PackageSpec, ToolSource};
use crate::platform::Platforms;
use crate::registry::InputRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// File name of the project descriptor
pub const DESCRIPTOR_FILE_NAME: &str = "lockstep.toml";

/// Template written by `lockstep init`
const TEMPLATE: &str = r#"# lockstep project descriptor

[project]
name = "{name}"
# Package source, relative to this file
source = "."
# Input whose revision pins the dev-shell tool catalog
package_set = "nixpkgs"

[inputs.nixpkgs]
url = "github:NixOS/nixpkgs/nixos-unstable"

[inputs.naersk]
url = "github:nix-community/naersk"
# Use our nixpkgs instead of the one naersk pins
follows = { nixpkgs = "nixpkgs" }

[platforms]
systems = ["x86_64-linux", "aarch64-linux", "x86_64-darwin", "aarch64-darwin"]

[outputs.package]
builder = "naersk"

[outputs.dev-shell]
tools = ["rustc", "cargo", "rustfmt", "clippy", "rust-analyzer"]

# Extra tools for the dev shell
# [catalog.mold]
# version = "2.34.1"
# platforms = ["x86_64-linux"]
"#;

/// Descriptor template for a project called `name`
pub fn render_template(name: &str) -> String {
    TEMPLATE.replace("{name}", name)
}

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    manifest: Manifest,
}

impl Project {
    /// Find `lockstep.toml` in `start` or its nearest ancestor
    pub fn find(start: &Path) -> LockstepResult<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(DESCRIPTOR_FILE_NAME))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| LockstepError::DescriptorNotFound(start.to_path_buf()))
    }

    /// Load the descriptor at `path`
    pub async fn load(path: &Path) -> LockstepResult<Self> {
        let manifest = Manifest::from_file(path).await?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!("Loaded project '{}' from {}", manifest.project.name, path.display());
        Ok(Self { root, manifest })
    }

    /// Load from an explicit descriptor path or by searching from `cwd`
    pub async fn open(descriptor: Option<&Path>, cwd: &Path) -> LockstepResult<Self> {
        let path = match descriptor {
            Some(path) if path.is_dir() => path.join(DESCRIPTOR_FILE_NAME),
            Some(path) => path.to_path_buf(),
            None => Self::find(cwd)?,
        };
        if !path.is_file() {
            return Err(LockstepError::DescriptorNotFound(path));
        }
        Self::load(&path).await
    }

    pub fn name(&self) -> &str {
        &self.manifest.project.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(DESCRIPTOR_FILE_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    pub fn source_root(&self) -> PathBuf {
        self.root.join(&self.manifest.project.source)
    }

    /// Build the input registry from `[inputs]`
    pub fn registry(&self) -> LockstepResult<InputRegistry> {
        let mut registry = InputRegistry::new();
        for (name, entry) in &self.manifest.inputs {
            let locator = Locator::parse(&entry.url)?;
            registry.register(name, locator, entry.follows.clone())?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Declared platforms, or the default systems
    pub fn platforms(&self) -> LockstepResult<Platforms> {
        match &self.manifest.platforms {
            Some(section) => Platforms::new(section.systems.iter().map(String::as_str)),
            None => Ok(Platforms::default_systems()),
        }
    }

    /// Capture the package source for evaluation
    pub async fn snapshot(&self) -> LockstepResult<SourceSnapshot> {
        let root = self.source_root();
        tokio::task::spawn_blocking(move || SourceSnapshot::capture(&root))
            .await
            .map_err(|e| LockstepError::Internal(format!("snapshot task failed: {}", e)))?
    }

    /// Output specs for every declared output
    pub fn output_specs(&self, source: Arc<SourceSnapshot>) -> Vec<Arc<dyn OutputSpec>> {
        let mut specs: Vec<Arc<dyn OutputSpec>> = Vec::new();
        let outputs = &self.manifest.outputs;

        if let Some(package) = &outputs.package {
            specs.push(Arc::new(PackageSpec {
                package: self.manifest.project.name.clone(),
                source,
                builder_input: package.builder.clone(),
                dependencies: package.dependencies.clone(),
                builder: Arc::new(CargoBuilder),
            }));
        }

        if let Some(shell) = &outputs.dev_shell {
            specs.push(Arc::new(DevShellSpec {
                tools: shell.tools.clone(),
                env: shell.env.clone(),
                source: ToolSource::Locked {
                    input: self.manifest.project.package_set.clone(),
                    entries: self.manifest.catalog.clone(),
                },
            }));
        }

        specs
    }

    /// Point input `name` at `url`, rewriting the descriptor in place.
    ///
    /// The edited descriptor is parsed before it is written, so an invalid
    /// locator or a new cycle leaves the file untouched.
    pub async fn set_input(&mut self, name: &str, url: &str) -> LockstepResult<()> {
        Locator::parse(url)?;

        let path = self.descriptor_path();
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| LockstepError::io(format!("reading {}", path.display()), e))?;
        let edited = edit::set_input_url(&content, name, url)?;

        let manifest = Manifest::parse(&edited, &path)?;
        let candidate = Self {
            root: self.root.clone(),
            manifest,
        };
        candidate.registry()?;

        fs::write(&path, edited)
            .await
            .map_err(|e| LockstepError::io(format!("writing {}", path.display()), e))?;
        info!("Input {} now points at {}", name, url);

        *self = candidate;
        Ok(())
    }
}
