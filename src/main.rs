//! lockstep - input-locked, multi-platform build outputs
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use lockstep::cli::{Cli, CommandContext, Commands};
use lockstep::config::{Config, ConfigManager};
use lockstep::error::{LockstepError, LockstepResult};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> LockstepResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);

    // Commands that don't need a project
    match cli.command {
        Commands::Init(args) => return lockstep::cli::commands::init(args).await,
        Commands::Completions(args) => return lockstep::cli::commands::completions(args),
        _ => {}
    }

    let cwd =
        std::env::current_dir().map_err(|e| LockstepError::io("getting current directory", e))?;
    let context = CommandContext::new(
        config,
        config_manager.path().to_path_buf(),
        cli.descriptor,
        cwd,
    );

    // Dispatch to command
    match cli.command {
        Commands::Init(_) | Commands::Completions(_) => unreachable!("handled above"),
        Commands::Resolve(args) => lockstep::cli::commands::resolve(args, &context).await,
        Commands::Build(args) => lockstep::cli::commands::build(args, &context).await,
        Commands::Shell(args) => lockstep::cli::commands::shell(args, &context).await,
        Commands::Show(args) => lockstep::cli::commands::show(args, &context).await,
        Commands::Platforms(args) => lockstep::cli::commands::platforms(args, &context).await,
        Commands::Input(args) => lockstep::cli::commands::input(args, &context).await,
        Commands::Config(args) => lockstep::cli::commands::config(args, &context).await,
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("lockstep=warn"),
        1 => EnvFilter::new("lockstep=info"),
        _ => EnvFilter::new("lockstep=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
