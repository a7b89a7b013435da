//! lockstep - input-locked, multi-platform build outputs
//!
//! Pins every external input of a project to an exact revision, then
//! evaluates the project's outputs (a package and a development shell)
//! for each target platform from nothing but the lock and the source.

pub mod builder;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod eval;
pub mod hash;
pub mod lock;
pub mod outputs;
pub mod platform;
pub mod registry;
pub mod ui;

pub use error::{LockstepError, LockstepResult};
