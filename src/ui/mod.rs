//! Terminal UI
//!
//! Uses `cliclack` for framed status output and `indicatif` for progress,
//! with plain fallback in CI/non-interactive environments.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, outro_error, outro_success, remark, step_error_detail, step_info, step_ok_detail,
    step_warn_hint,
};
pub use progress::{PlatformProgress, TaskSpinner};
