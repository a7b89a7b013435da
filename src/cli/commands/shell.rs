//! Shell command - enter or print the development shell

use crate::cli::args::ShellArgs;
use crate::cli::CommandContext;
use crate::error::{LockstepError, LockstepResult};
use crate::eval::{OutputDescription, ShellOutput};
use crate::outputs::DEV_SHELL_OUTPUT;
use crate::platform::PlatformId;
use crate::ui::{self, UiContext};
use tokio::process::Command;
use tracing::debug;

/// Execute the shell command
pub async fn execute(args: ShellArgs, context: &CommandContext) -> LockstepResult<()> {
    let ctx = UiContext::detect().with_quiet(args.print);
    let project = context.project().await?;
    let platforms = project.platforms()?;

    let requested = args
        .platform
        .clone()
        .unwrap_or_else(|| PlatformId::host().to_string());
    let platform = platforms.require(&requested)?;

    if !args.print && !platform.is_host() {
        return Err(LockstepError::User(format!(
            "Cannot enter a {} shell on {}. Use --print to inspect it.",
            platform,
            PlatformId::host()
        )));
    }

    let lock = context.ensure_lock(&project, args.locked, &ctx).await?;
    let evaluator = context.evaluator(&project).await?;
    let shell = match evaluator.evaluate_output(&lock, &platform, DEV_SHELL_OUTPUT)? {
        OutputDescription::Shell(shell) => shell,
        other => {
            return Err(LockstepError::Internal(format!(
                "'{}' evaluated to a {} output",
                DEV_SHELL_OUTPUT,
                other.kind()
            )))
        }
    };

    if args.print {
        print!("{}", render_exports(&shell, std::env::var("PATH").ok().as_deref()));
        return Ok(());
    }

    let (program, program_args) = match args.command.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => (default_shell(context), Vec::new()),
    };

    ui::step_info(
        &ctx,
        &format!(
            "Entering {} dev shell ({} tool(s))",
            project.name(),
            shell.tools.len()
        ),
    );
    debug!("Running {} {:?}", program, program_args);

    let status = Command::new(&program)
        .args(&program_args)
        .envs(&shell.env)
        .env("PATH", search_path(&shell, std::env::var("PATH").ok().as_deref()))
        .status()
        .await
        .map_err(|e| LockstepError::command_failed(&program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(LockstepError::command_exec(
            program,
            format!("exited with {}", status),
        ))
    }
}

/// Configured shell, then `$SHELL`, then `/bin/sh`
fn default_shell(context: &CommandContext) -> String {
    context
        .config()
        .shell
        .program
        .clone()
        .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "/bin/sh".to_string())
}

/// Tool directories ahead of the inherited `PATH`
fn search_path(shell: &ShellOutput, inherited: Option<&str>) -> String {
    let mut entries: Vec<&str> = shell.path_entries();
    if let Some(inherited) = inherited.filter(|p| !p.is_empty()) {
        entries.push(inherited);
    }
    entries.join(":")
}

/// POSIX `export` lines for the shell environment, `PATH` last
fn render_exports(shell: &ShellOutput, inherited: Option<&str>) -> String {
    let mut out = String::new();
    for (key, value) in &shell.env {
        out.push_str(&format!("export {}={}\n", key, quote(value)));
    }
    out.push_str(&format!(
        "export PATH={}\n",
        quote(&search_path(shell, inherited))
    ));
    out
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ToolDescriptor;
    use crate::config::Config;
    use serial_test::serial;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn shell() -> ShellOutput {
        let tool = |name: &str, dir: &str| ToolDescriptor {
            name: name.to_string(),
            version: "1.0".to_string(),
            store_path: format!("/lockstep/store/abc-{}", name),
            bin_dirs: vec![dir.to_string()],
            env: BTreeMap::new(),
        };
        ShellOutput {
            platform: PlatformId::new("x86_64-linux").unwrap(),
            tools: vec![tool("cargo", "/store/rust/bin"), tool("rustc", "/store/rust/bin")],
            env: BTreeMap::from([
                ("LOCKSTEP_SHELL".to_string(), "1".to_string()),
                ("GREETING".to_string(), "it's here".to_string()),
            ]),
        }
    }

    fn context(program: Option<&str>) -> CommandContext {
        let mut config = Config::default();
        config.shell.program = program.map(str::to_string);
        CommandContext::new(config, PathBuf::from("config.toml"), None, PathBuf::from("."))
    }

    #[test]
    #[serial]
    fn default_shell_prefers_config_then_env() {
        let saved = std::env::var_os("SHELL");

        std::env::set_var("SHELL", "/bin/zsh");
        assert_eq!(default_shell(&context(Some("fish"))), "fish");
        assert_eq!(default_shell(&context(None)), "/bin/zsh");

        std::env::remove_var("SHELL");
        assert_eq!(default_shell(&context(None)), "/bin/sh");

        if let Some(shell) = saved {
            std::env::set_var("SHELL", shell);
        }
    }

    #[test]
    fn search_path_prepends_tool_dirs() {
        assert_eq!(
            search_path(&shell(), Some("/usr/bin")),
            "/store/rust/bin:/usr/bin"
        );
        assert_eq!(search_path(&shell(), None), "/store/rust/bin");
    }

    #[test]
    fn exports_are_sorted_and_quoted() {
        let rendered = render_exports(&shell(), Some("/usr/bin"));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                r"export GREETING='it'\''s here'",
                "export LOCKSTEP_SHELL='1'",
                "export PATH='/store/rust/bin:/usr/bin'",
            ]
        );
    }
}
