//! Init command - create lockstep.toml

use crate::cli::args::InitArgs;
use crate::descriptor::{render_template, DESCRIPTOR_FILE_NAME};
use crate::error::{LockstepError, LockstepResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Execute the init command
pub async fn execute(args: InitArgs) -> LockstepResult<()> {
    let ctx = UiContext::detect();

    let target_dir = match args.path {
        Some(ref p) => p.clone(),
        None => std::env::current_dir()
            .map_err(|e| LockstepError::io("getting current directory", e))?,
    };

    let descriptor_path = target_dir.join(DESCRIPTOR_FILE_NAME);

    if descriptor_path.exists() && !args.force {
        return Err(LockstepError::User(format!(
            "{} already exists. Use --force to overwrite.",
            descriptor_path.display()
        )));
    }

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| project_name(&target_dir));

    ensure_dir(&target_dir).await?;

    fs::write(&descriptor_path, render_template(&name))
        .await
        .map_err(|e| LockstepError::io(format!("writing {}", descriptor_path.display()), e))?;

    ui::step_ok_detail(
        &ctx,
        "Created project descriptor",
        &descriptor_path.display().to_string(),
    );
    ui::remark(&ctx, "Next: lockstep resolve");

    Ok(())
}

/// Directory name, or "project" for roots and unnamed paths
fn project_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("project")
        .to_string()
}

async fn ensure_dir(dir: &Path) -> LockstepResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| LockstepError::io(format!("creating directory {}", dir.display()), e))?;
    }
    Ok(())
}
