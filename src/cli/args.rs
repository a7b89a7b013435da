//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// lockstep - input-locked, multi-platform build outputs
///
/// Pins every input of a project in lockstep.lock, then evaluates the
/// project's package and development shell for each target platform.
#[derive(Parser, Debug)]
#[command(name = "lockstep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LOCKSTEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project descriptor (file or directory); searched upwards by default
    #[arg(short, long, global = true, env = "LOCKSTEP_DESCRIPTOR")]
    pub descriptor: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a lockstep.toml template
    Init(InitArgs),

    /// Pin every input and write lockstep.lock
    Resolve(ResolveArgs),

    /// Evaluate the package output
    Build(BuildArgs),

    /// Enter (or print) the development shell
    Shell(ShellArgs),

    /// Evaluate every output on every platform
    Show(ShowArgs),

    /// List target platforms
    Platforms(PlatformsArgs),

    /// List or change inputs
    Input(InputArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing lockstep.toml
    #[arg(short, long)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Project name (defaults to the directory name)
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Fetch every input again, ignoring pinned revisions
    #[arg(long, conflicts_with = "update")]
    pub refresh: bool,

    /// Fetch only these inputs again (repeatable)
    #[arg(short, long, value_name = "INPUT")]
    pub update: Vec<String>,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Target platform (defaults to the host)
    #[arg(conflicts_with = "all")]
    pub platform: Option<String>,

    /// Build for every declared platform
    #[arg(short, long)]
    pub all: bool,

    /// Fail instead of updating a missing or stale lock
    #[arg(long)]
    pub locked: bool,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the shell command
#[derive(Parser, Debug)]
pub struct ShellArgs {
    /// Target platform (defaults to the host)
    pub platform: Option<String>,

    /// Print the shell environment as `export` lines instead of starting it
    #[arg(long)]
    pub print: bool,

    /// Fail instead of updating a missing or stale lock
    #[arg(long)]
    pub locked: bool,

    /// Command and arguments to run (defaults to the configured shell)
    #[arg(last = true)]
    pub command: Vec<String>,
}

/// Arguments for the show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Fail instead of updating a missing or stale lock
    #[arg(long)]
    pub locked: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the platforms command
#[derive(Parser, Debug)]
pub struct PlatformsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the input command
#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Subcommand for inputs
    #[command(subcommand)]
    pub action: Option<InputAction>,
}

/// Input subcommands
#[derive(Subcommand, Debug)]
pub enum InputAction {
    /// List inputs with their locked revisions
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Point an input at a new locator (adds the input if missing)
    Set {
        /// Input name
        name: String,
        /// Locator, e.g. github:owner/repo/branch
        locator: String,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
