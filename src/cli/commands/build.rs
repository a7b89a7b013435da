//! Build command - evaluate the package output

use crate::cli::args::{BuildArgs, OutputFormat};
use crate::cli::CommandContext;
use crate::error::{LockstepError, LockstepResult};
use crate::eval::OutputDescription;
use crate::outputs::PACKAGE_OUTPUT;
use crate::platform::{PlatformId, Platforms};
use crate::ui::{self, UiContext};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Execute the build command
pub async fn execute(args: BuildArgs, context: &CommandContext) -> LockstepResult<()> {
    let ctx = UiContext::detect().with_quiet(args.format == OutputFormat::Json);
    let project = context.project().await?;
    let platforms = project.platforms()?;

    let targets = if args.all {
        platforms
    } else {
        let requested = args
            .platform
            .clone()
            .unwrap_or_else(|| PlatformId::host().to_string());
        Platforms::new([platforms.require(&requested)?.to_string()])?
    };

    let lock = Arc::new(context.ensure_lock(&project, args.locked, &ctx).await?);
    let evaluator = context.evaluator(&project).await?;
    let report = evaluator
        .evaluate_output_all(lock, &targets, PACKAGE_OUTPUT)
        .await?;

    let mut built = BTreeMap::new();
    for (platform, evaluation) in &report.platforms {
        for failure in &evaluation.failures {
            ui::step_error_detail(&ctx, platform.as_str(), &failure.to_string());
        }
        match evaluation.outputs.get(PACKAGE_OUTPUT) {
            Some(OutputDescription::Package(output)) => {
                ui::step_ok_detail(&ctx, platform.as_str(), &output.store_path);
                built.insert(platform, output);
            }
            Some(other) => {
                return Err(LockstepError::Internal(format!(
                    "'{}' evaluated to a {} output",
                    PACKAGE_OUTPUT,
                    other.kind()
                )))
            }
            None => {}
        }
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&built)?),
        OutputFormat::Plain if targets.len() == 1 => {
            for output in built.values() {
                println!("{}", output.store_path);
            }
        }
        OutputFormat::Plain | OutputFormat::Table => {
            for (platform, output) in &built {
                println!("{}\t{}", platform, output.store_path);
            }
        }
    }

    report.into_result().map(|_| ())
}
