//! Application-level orchestration.
//!
//! This module owns the run state machine, the UI-facing controller loop, and post-run
//! processing such as image probing and export. UI/CLI layers call into this module to
//! keep responsibilities separated.

mod controller;
mod post_process;
mod run;

pub(crate) use controller::{run_controller, ControllerCtx, UiCommand};
pub(crate) use post_process::process_run_completion;
pub use run::{RunOrchestrator, RunPolicy};
