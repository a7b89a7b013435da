//! Platforms command - list target platforms

use crate::cli::args::{OutputFormat, PlatformsArgs};
use crate::cli::CommandContext;
use crate::error::LockstepResult;
use crate::platform::PlatformId;
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;

#[derive(Serialize)]
struct PlatformEntry<'a> {
    platform: &'a PlatformId,
    host: bool,
}

/// Execute the platforms command
pub async fn execute(args: PlatformsArgs, context: &CommandContext) -> LockstepResult<()> {
    let project = context.project().await?;
    let platforms = project.platforms()?;

    match args.format {
        OutputFormat::Json => {
            let entries: Vec<PlatformEntry> = platforms
                .iter()
                .map(|platform| PlatformEntry {
                    platform,
                    host: platform.is_host(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Plain => {
            for platform in platforms.iter() {
                println!("{}", platform);
            }
        }
        OutputFormat::Table => {
            let ctx = UiContext::detect();
            ui::intro(&ctx, &format!("Platforms of {}", project.name()));
            for platform in platforms.iter() {
                if platform.is_host() {
                    println!("{} {}", platform, style("(host)").green());
                } else {
                    println!("{}", platform);
                }
            }
            if !platforms.iter().any(PlatformId::is_host) {
                ui::step_warn_hint(
                    &ctx,
                    &format!("Host platform {} is not listed", PlatformId::host()),
                    "build and shell need an explicit platform",
                );
            }
        }
    }

    Ok(())
}
