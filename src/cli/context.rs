//! State shared by every command

use crate::config::{Config, ConfigManager};
use crate::descriptor::Project;
use crate::error::{LockstepError, LockstepResult};
use crate::eval::{EvalCache, Evaluator};
use crate::lock::{LockFile, RefreshMode, Resolver, SourceFetcher, LOCK_FILE_NAME};
use crate::ui::{self, UiContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Loaded configuration and where to look for the project
pub struct CommandContext {
    config: Config,
    config_path: PathBuf,
    descriptor: Option<PathBuf>,
    cwd: PathBuf,
}

impl CommandContext {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        descriptor: Option<PathBuf>,
        cwd: PathBuf,
    ) -> Self {
        Self {
            config,
            config_path,
            descriptor,
            cwd,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_manager(&self) -> ConfigManager {
        ConfigManager::with_path(self.config_path.clone())
    }

    /// Load the project from `--descriptor` or the nearest `lockstep.toml`
    pub async fn project(&self) -> LockstepResult<Project> {
        Project::open(self.descriptor.as_deref(), &self.cwd).await
    }

    /// Resolver fetching relative to the project root
    pub fn resolver(&self, project: &Project) -> Resolver {
        let policy = self.config.resolve.policy();
        let fetcher = SourceFetcher::new(project.root()).with_timeout(policy.timeout);
        Resolver::new(Arc::new(fetcher), policy)
    }

    /// The project's lock, resolving first when it is missing or stale.
    ///
    /// With `locked`, a missing or stale lock is an error instead.
    pub async fn ensure_lock(
        &self,
        project: &Project,
        locked: bool,
        ctx: &UiContext,
    ) -> LockstepResult<LockFile> {
        let registry = project.registry()?;
        let path = project.lock_path();
        let previous = LockFile::load(&path).await?;

        let reason = match &previous {
            Some(lock) => match lock.staleness(&registry) {
                None => {
                    debug!("{} is up to date", path.display());
                    return Ok(lock.clone());
                }
                Some(reason) => reason,
            },
            None => format!("{} does not exist", LOCK_FILE_NAME),
        };

        if locked {
            return Err(LockstepError::LockOutdated(reason));
        }

        ui::step_warn_hint(ctx, &format!("Lock out of date: {}", reason), "resolving");
        let lock = self
            .resolver(project)
            .resolve(&registry, previous.as_ref(), &RefreshMode::None)
            .await?;
        lock.save(&path).await?;
        let identity = lock.identity()?;
        ui::step_ok_detail(ctx, &format!("Updated {}", LOCK_FILE_NAME), identity.short());
        Ok(lock)
    }

    /// Evaluator over the project's declared outputs with a fresh cache
    pub async fn evaluator(&self, project: &Project) -> LockstepResult<Evaluator> {
        let source = Arc::new(project.snapshot().await?);
        Evaluator::new(
            project.output_specs(source),
            Arc::new(EvalCache::new()),
            self.config.eval.policy(),
        )
    }
}
