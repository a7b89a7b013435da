//! Input command - list inputs or point one at a new locator

use crate::cli::args::{InputAction, InputArgs, OutputFormat};
use crate::cli::CommandContext;
use crate::error::LockstepResult;
use crate::lock::{LockFile, LockedInput};
use crate::registry::InputRegistry;
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct InputRow<'a> {
    name: &'a str,
    locator: String,
    /// Pinned revision, if the lock has one for the current locator
    revision: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    follows: BTreeMap<String, String>,
    #[serde(skip)]
    locked: Option<&'a LockedInput>,
}

/// Execute the input command
pub async fn execute(args: InputArgs, context: &CommandContext) -> LockstepResult<()> {
    match args.action {
        None => list(OutputFormat::Table, context).await,
        Some(InputAction::List { format }) => list(format, context).await,
        Some(InputAction::Set { name, locator }) => set(&name, &locator, context).await,
    }
}

async fn list(format: OutputFormat, context: &CommandContext) -> LockstepResult<()> {
    let project = context.project().await?;
    let registry = project.registry()?;
    let lock = LockFile::load(&project.lock_path()).await?;
    let rows = rows(&registry, lock.as_ref());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}\t{}", row.name, row.locator);
            }
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                ui::step_info(&UiContext::detect(), "No inputs declared");
                return Ok(());
            }
            println!(
                "{:<16} {:<44} {:<14} {}",
                style("NAME").bold(),
                style("LOCATOR").bold(),
                style("REVISION").bold(),
                style("FOLLOWS").bold()
            );
            println!("{}", "-".repeat(90));
            for row in &rows {
                let revision = match row.locked {
                    Some(entry) => style(entry.short_revision().to_string()),
                    None => style("unlocked".to_string()).yellow(),
                };
                let follows: Vec<String> = row
                    .follows
                    .iter()
                    .map(|(slot, target)| format!("{}={}", slot, target))
                    .collect();
                println!(
                    "{:<16} {:<44} {:<14} {}",
                    row.name,
                    row.locator,
                    revision,
                    follows.join(",")
                );
            }
        }
    }

    Ok(())
}

fn rows<'a>(registry: &'a InputRegistry, lock: Option<&'a LockFile>) -> Vec<InputRow<'a>> {
    registry
        .iter()
        .map(|input| {
            let locked = lock
                .and_then(|l| l.get(&input.name))
                .filter(|entry| entry.locator == input.locator.as_str());
            InputRow {
                name: &input.name,
                locator: input.locator.to_string(),
                revision: locked.map(|entry| entry.revision.as_str()),
                follows: input.overrides.clone(),
                locked,
            }
        })
        .collect()
}

async fn set(name: &str, locator: &str, context: &CommandContext) -> LockstepResult<()> {
    let ctx = UiContext::detect();
    let mut project = context.project().await?;
    project.set_input(name, locator).await?;

    ui::step_ok_detail(&ctx, &format!("Input {} updated", name), locator);
    ui::remark(&ctx, "Run: lockstep resolve");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Locator;

    #[test]
    fn rows_hide_revisions_of_changed_locators() {
        let mut registry = InputRegistry::new();
        registry
            .register("base", Locator::parse("path:./base").unwrap(), BTreeMap::new())
            .unwrap();
        registry
            .register("tools", Locator::parse("path:./tools").unwrap(), BTreeMap::new())
            .unwrap();

        let mut lock = LockFile::default();
        lock.inputs.insert(
            "base".to_string(),
            LockedInput {
                locator: "path:./base".to_string(),
                resolved_locator: "path:./base".to_string(),
                revision: "sha256-aaaa".to_string(),
                follows: BTreeMap::new(),
            },
        );
        lock.inputs.insert(
            "tools".to_string(),
            LockedInput {
                locator: "path:./old-tools".to_string(),
                resolved_locator: "path:./old-tools".to_string(),
                revision: "sha256-bbbb".to_string(),
                follows: BTreeMap::new(),
            },
        );

        let rows = rows(&registry, Some(&lock));
        assert_eq!(rows[0].revision, Some("sha256-aaaa"));
        assert_eq!(rows[0].locked.map(LockedInput::short_revision), Some("aaaa"));
        assert_eq!(rows[1].revision, None);
        assert!(rows[1].locked.is_none());
    }
}
