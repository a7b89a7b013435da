//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    fancy: bool,
    quiet: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            fancy: ctx.use_fancy_output(),
            quiet: ctx.is_quiet(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.fancy {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else if !self.quiet {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if !self.quiet {
            eprintln!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if !self.quiet {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Per-platform progress while outputs are evaluated.
///
/// An indicatif bar in a terminal; one line per finished platform otherwise.
pub struct PlatformProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl PlatformProgress {
    pub fn new(ctx: &UiContext, total: usize) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total as u64);
            let template = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} Evaluating {bar:20.cyan/dim} {pos}/{len} {msg:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━╸─");
            bar.set_style(template);
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self {
            bar,
            quiet: ctx.is_quiet(),
        }
    }

    /// Record one finished platform
    pub fn platform_done(&self, platform: &str, ok: bool) {
        match &self.bar {
            Some(bar) => {
                bar.set_message(platform.to_string());
                bar.inc(1);
            }
            None if !self.quiet => {
                let mark = if ok {
                    style("[OK]").green()
                } else {
                    style("[FAIL]").red()
                };
                eprintln!("  {} {}", mark, platform);
            }
            None => {}
        }
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Resolving inputs...");
        spinner.stop("Resolved");
    }

    #[test]
    fn platform_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let progress = PlatformProgress::new(&ctx, 2);
        progress.platform_done("x86_64-linux", true);
        progress.platform_done("aarch64-darwin", false);
        progress.finish();
    }
}
