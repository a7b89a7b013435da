//! Error types for lockstep
//!
//! All modules use `LockstepResult<T>` as their return type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lockstep operations
pub type LockstepResult<T> = Result<T, LockstepError>;

/// All errors that can occur in lockstep
#[derive(Error, Debug)]
pub enum LockstepError {
    // Registry errors
    #[error("Input already registered: {0}")]
    DuplicateName(String),

    #[error("Invalid input name '{name}': {reason}")]
    InvalidInputName { name: String, reason: String },

    #[error("Override cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Unknown input: {0}")]
    UnknownInput(String),

    #[error("Input '{input}' follows '{target}', which is not a registered input")]
    DanglingOverride { input: String, target: String },

    // Resolution errors
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Fetching {locator} failed: {reason}")]
    Fetch {
        locator: String,
        reason: String,
        transient: bool,
    },

    #[error("Unable to resolve input '{input}' ({locator}) after {attempts} attempt(s): {reason}")]
    UnresolvableInput {
        input: String,
        locator: String,
        attempts: u32,
        reason: String,
    },

    #[error("Lock file is out of date: {0}")]
    LockOutdated(String),

    #[error("Failed to read lock file {path}: {reason}")]
    LockfileRead { path: PathBuf, reason: String },

    // Evaluation errors
    #[error("Evaluating '{output}' for {platform} failed: {source}")]
    OutputEvaluation {
        output: String,
        platform: String,
        #[source]
        source: Box<LockstepError>,
    },

    #[error("{0}")]
    EvaluationFailed(EvaluationFailures),

    #[error("Tool '{tool}' is not available for {platform}")]
    UnknownTool { tool: String, platform: String },

    #[error("Unknown output: {0}")]
    UnknownOutput(String),

    #[error("Build failed: {0}")]
    Build(String),

    // Platform errors
    #[error("No platforms configured")]
    NoPlatforms,

    #[error("Invalid platform identifier '{0}'")]
    InvalidPlatform(String),

    #[error("Platform {platform} is not one of: {known}")]
    UnknownPlatform { platform: String, known: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("No lockstep.toml found in {0} or any parent directory")]
    DescriptorNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML edit error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

/// Every failing (output, platform) pair of one evaluation run
#[derive(Debug, Default)]
pub struct EvaluationFailures(pub Vec<LockstepError>);

impl fmt::Display for EvaluationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} evaluation(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

impl LockstepError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a fetch error that may succeed on retry
    pub fn transient_fetch(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            locator: locator.into(),
            reason: reason.into(),
            transient: true,
        }
    }

    /// Create a fetch error that will not succeed on retry
    pub fn permanent_fetch(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            locator: locator.into(),
            reason: reason.into(),
            transient: false,
        }
    }

    /// Tag an evaluation failure with the output key and platform
    pub fn evaluation(output: impl Into<String>, platform: impl Into<String>, source: Self) -> Self {
        Self::OutputEvaluation {
            output: output.into(),
            platform: platform.into(),
            source: Box::new(source),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch {
                transient: true,
                ..
            }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnresolvableInput { .. } => 2,
            _ => 1,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DescriptorNotFound(_) => Some("Run: lockstep init"),
            Self::LockOutdated(_) => Some("Run: lockstep resolve"),
            Self::UnresolvableInput { .. } => {
                Some("Check the input URL, or run with -vv to see each fetch attempt")
            }
            Self::Cycle { .. } => Some("Remove one of the `follows` entries that forms the loop"),
            Self::UnknownTool { .. } => {
                Some("Add a [catalog.<tool>] entry to lockstep.toml or drop the tool")
            }
            Self::UnknownPlatform { .. } => Some("Run: lockstep platforms"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LockstepError::DuplicateName("nixpkgs".to_string());
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn cycle_display_lists_path() {
        let err = LockstepError::Cycle {
            path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Override cycle detected: a -> b -> c -> a");
    }

    #[test]
    fn error_hint() {
        let err = LockstepError::LockOutdated("input 'base' changed".to_string());
        assert_eq!(err.hint(), Some("Run: lockstep resolve"));
    }

    #[test]
    fn error_retryable() {
        assert!(LockstepError::transient_fetch("github:a/b", "timed out").is_retryable());
        assert!(!LockstepError::permanent_fetch("path:/nope", "missing").is_retryable());
        assert!(!LockstepError::NoPlatforms.is_retryable());
        assert!(!LockstepError::command_exec("sh", "exited with 1").is_retryable());
    }

    #[test]
    fn exit_codes() {
        let unresolvable = LockstepError::UnresolvableInput {
            input: "base".into(),
            locator: "path:/nope".into(),
            attempts: 3,
            reason: "missing".into(),
        };
        assert_eq!(unresolvable.exit_code(), 2);
        assert_eq!(LockstepError::NoPlatforms.exit_code(), 1);
    }

    #[test]
    fn aggregate_lists_every_failure() {
        let failures = EvaluationFailures(vec![
            LockstepError::evaluation("package", "x86_64-linux", LockstepError::Build("boom".into())),
            LockstepError::evaluation(
                "dev-shell",
                "aarch64-darwin",
                LockstepError::UnknownTool {
                    tool: "zlib".into(),
                    platform: "aarch64-darwin".into(),
                },
            ),
        ]);
        let text = LockstepError::EvaluationFailed(failures).to_string();
        assert!(text.starts_with("2 evaluation(s) failed"));
        assert!(text.contains("'package' for x86_64-linux"));
        assert!(text.contains("'dev-shell' for aarch64-darwin"));
    }
}
