//! The outputs a project declares
//!
//! - `package`: the project built by a [`PackageBuilder`]
//! - `dev-shell`: tools from a [`PackageSet`] plus environment variables

use crate::builder::catalog::UNPINNED_REVISION;
use crate::builder::{
    BuildRequest, Catalog, CatalogEntry, PackageBuilder, PackageSet, SourceSnapshot,
};
use crate::error::{LockstepError, LockstepResult};
use crate::eval::{EvalContext, OutputDescription, OutputSpec, ShellOutput};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const PACKAGE_OUTPUT: &str = "package";
pub const DEV_SHELL_OUTPUT: &str = "dev-shell";

/// Builds the project source with tooling from a locked input
pub struct PackageSpec {
    pub package: String,
    pub source: Arc<SourceSnapshot>,
    /// Input providing the builder
    pub builder_input: String,
    /// Inputs the package depends on
    pub dependencies: Vec<String>,
    pub builder: Arc<dyn PackageBuilder>,
}

impl OutputSpec for PackageSpec {
    fn key(&self) -> &str {
        PACKAGE_OUTPUT
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> LockstepResult<OutputDescription> {
        let builder = ctx.lock.require(&self.builder_input)?;
        let mut dependencies = BTreeMap::new();
        for name in &self.dependencies {
            dependencies.insert(name.as_str(), ctx.lock.require(name)?);
        }

        let request = BuildRequest {
            package: &self.package,
            source: &self.source,
            builder,
            dependencies,
            platform: ctx.platform,
        };
        self.builder.build(&request).map(OutputDescription::Package)
    }
}

/// Where a dev shell gets its tools
pub enum ToolSource {
    /// The default catalog, pinned to a locked package-set input
    Locked {
        input: Option<String>,
        entries: BTreeMap<String, CatalogEntry>,
    },
    /// A fixed package set
    Fixed(Arc<dyn PackageSet>),
}

/// Development shell with a fixed tool list
pub struct DevShellSpec {
    pub tools: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub source: ToolSource,
}

impl DevShellSpec {
    fn package_set(&self, ctx: &EvalContext<'_>) -> LockstepResult<Arc<dyn PackageSet>> {
        match &self.source {
            ToolSource::Fixed(set) => Ok(Arc::clone(set)),
            ToolSource::Locked { input, entries } => {
                let revision = match input {
                    Some(name) => ctx.lock.require(name)?.revision.as_str(),
                    None => UNPINNED_REVISION,
                };
                Ok(Arc::new(Catalog::builtin(revision).with_entries(entries)))
            }
        }
    }
}

impl OutputSpec for DevShellSpec {
    fn key(&self) -> &str {
        DEV_SHELL_OUTPUT
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> LockstepResult<OutputDescription> {
        let set = self.package_set(ctx)?;

        let mut tools = Vec::with_capacity(self.tools.len());
        for name in &self.tools {
            let tool = set
                .lookup(ctx.platform, name)
                .ok_or_else(|| LockstepError::UnknownTool {
                    tool: name.clone(),
                    platform: ctx.platform.to_string(),
                })?;
            tools.push(tool);
        }

        // Tool env first, project env wins
        let mut env = BTreeMap::new();
        for tool in &tools {
            env.extend(tool.env.clone());
        }
        env.extend(self.env.clone());
        env.insert("LOCKSTEP_SHELL".to_string(), "1".to_string());
        env.insert("LOCKSTEP_PLATFORM".to_string(), ctx.platform.to_string());

        Ok(OutputDescription::Shell(ShellOutput {
            platform: ctx.platform.clone(),
            tools,
            env,
        }))
    }
}
