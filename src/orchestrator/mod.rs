//! Application-level orchestration utilities.
//!
//! This module owns the job lifecycle (submit, launch, cancel, shutdown) and the
//! models-page fetch. UI/CLI layers call into it so presentation code never
//! touches child processes directly.

mod controller;
mod submit;

pub(crate) use controller::{run_controller, AppEvent, LaunchedJob, UiCommand};
pub(crate) use submit::{submit, Submission};
