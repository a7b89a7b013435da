//! Resolve command - pin every input and write lockstep.lock

use crate::cli::args::ResolveArgs;
use crate::cli::CommandContext;
use crate::error::{LockstepError, LockstepResult};
use crate::lock::{LockFile, RefreshMode, LOCK_FILE_NAME};
use crate::ui::{self, TaskSpinner, UiContext};
use tracing::warn;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, context: &CommandContext) -> LockstepResult<()> {
    let ctx = UiContext::detect();
    let project = context.project().await?;
    let registry = project.registry()?;
    let lock_path = project.lock_path();

    // A corrupt lock is replaced rather than blocking resolution
    let previous = match LockFile::load(&lock_path).await {
        Ok(previous) => previous,
        Err(e @ LockstepError::LockfileRead { .. }) => {
            warn!("{}", e);
            ui::step_warn_hint(&ctx, "Ignoring unreadable lock file", &e.to_string());
            None
        }
        Err(e) => return Err(e),
    };

    let refresh = if args.refresh {
        RefreshMode::All
    } else if !args.update.is_empty() {
        RefreshMode::Inputs(args.update.iter().cloned().collect())
    } else {
        RefreshMode::None
    };

    ui::intro(&ctx, &format!("Resolving {}", project.name()));

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Resolving {} input(s)...", registry.len()));

    let lock = match context
        .resolver(&project)
        .resolve(&registry, previous.as_ref(), &refresh)
        .await
    {
        Ok(lock) => {
            spinner.stop(&format!("Resolved {} input(s)", lock.inputs.len()));
            lock
        }
        Err(e) => {
            spinner.stop_error("Resolution failed");
            return Err(e);
        }
    };

    for (name, entry) in &lock.inputs {
        match previous.as_ref().and_then(|p| p.get(name)) {
            Some(old) if old.revision == entry.revision => {
                ui::step_ok_detail(&ctx, name, entry.short_revision());
            }
            Some(old) => ui::step_info(
                &ctx,
                &format!(
                    "{} updated {} -> {}",
                    name,
                    old.short_revision(),
                    entry.short_revision()
                ),
            ),
            None => ui::step_info(
                &ctx,
                &format!("{} added at {}", name, entry.short_revision()),
            ),
        }
    }

    let changed = lock.save(&lock_path).await?;
    let identity = lock.identity()?;
    if changed {
        ui::outro_success(
            &ctx,
            &format!("Wrote {} ({})", LOCK_FILE_NAME, identity.short()),
        );
    } else {
        ui::outro_success(
            &ctx,
            &format!("{} unchanged ({})", LOCK_FILE_NAME, identity.short()),
        );
    }

    Ok(())
}
