//! Show command - evaluate every output on every platform

use crate::cli::args::{OutputFormat, ShowArgs};
use crate::cli::CommandContext;
use crate::error::LockstepResult;
use crate::eval::{EvaluationReport, OutputDescription};
use crate::lock::LockIdentity;
use crate::ui::{self, PlatformProgress, UiContext};
use console::style;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct ShowReport<'a> {
    project: &'a str,
    lock: &'a LockIdentity,
    #[serde(flatten)]
    report: &'a EvaluationReport,
}

/// Execute the show command
pub async fn execute(args: ShowArgs, context: &CommandContext) -> LockstepResult<()> {
    let ctx = UiContext::detect().with_quiet(args.format == OutputFormat::Json);
    let project = context.project().await?;
    let platforms = project.platforms()?;
    let lock = Arc::new(context.ensure_lock(&project, args.locked, &ctx).await?);
    let identity = lock.identity()?;
    let evaluator = context.evaluator(&project).await?;

    let progress = PlatformProgress::new(&ctx, platforms.len());
    let report = evaluator
        .evaluate_all_with(lock, &platforms, |evaluation| {
            progress.platform_done(evaluation.platform.as_str(), evaluation.is_success());
        })
        .await?;
    progress.finish();

    match args.format {
        OutputFormat::Json => {
            let json = ShowReport {
                project: project.name(),
                lock: &identity,
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => print_table(&ctx, project.name(), &identity, &report),
        OutputFormat::Plain => print_plain(&report),
    }

    if !report.is_success() {
        ui::outro_error(
            &ctx,
            &format!("{} evaluation(s) failed", report.failure_count()),
        );
    }
    report.into_result().map(|_| ())
}

fn print_table(ctx: &UiContext, name: &str, identity: &LockIdentity, report: &EvaluationReport) {
    ui::intro(ctx, &format!("{} @ {}", name, identity.short()));

    println!(
        "{:<18} {:<10} {:<60}",
        style("PLATFORM").bold(),
        style("OUTPUT").bold(),
        style("RESULT").bold()
    );
    println!("{}", "-".repeat(88));

    for (platform, evaluation) in &report.platforms {
        for (key, output) in &evaluation.outputs {
            println!("{:<18} {:<10} {:<60}", platform, key, summary(output));
        }
        for failure in &evaluation.failures {
            println!(
                "{:<18} {:<10} {}",
                platform,
                style("failed").red(),
                failure
            );
        }
    }

    println!();
    println!(
        "{} platform(s), {} failure(s)",
        report.platforms.len(),
        report.failure_count()
    );
}

fn print_plain(report: &EvaluationReport) {
    for (platform, evaluation) in &report.platforms {
        for (key, output) in &evaluation.outputs {
            println!("{}\t{}\t{}", platform, key, summary(output));
        }
    }
}

/// One-line summary of an output
fn summary(output: &OutputDescription) -> String {
    match output {
        OutputDescription::Package(package) => package.store_path.clone(),
        OutputDescription::Shell(shell) => {
            let tools: Vec<&str> = shell.tools.iter().map(|t| t.name.as_str()).collect();
            format!("shell: {}", tools.join(" "))
        }
    }
}
