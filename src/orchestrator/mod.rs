//! Application-level orchestration.
//!
//! This module owns the run lifecycle (validate, count down, launch, stop, finish) and the
//! per-run summary. UI and headless layers talk to it only through `UiCommand` and
//! `UiEvent` channels plus a watch channel carrying the current form values.

mod controller;
mod summary;

pub(crate) use controller::{run_controller, RunController, UiCommand};
