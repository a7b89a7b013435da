//! CLI command implementations

pub mod build;
pub mod completions;
pub mod config;
pub mod init;
pub mod input;
pub mod platforms;
pub mod resolve;
pub mod shell;
pub mod show;

pub use build::execute as build;
pub use completions::execute as completions;
pub use config::execute as config;
pub use init::execute as init;
pub use input::execute as input;
pub use platforms::execute as platforms;
pub use resolve::execute as resolve;
pub use shell::execute as shell;
pub use show::execute as show;
