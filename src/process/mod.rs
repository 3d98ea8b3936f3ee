//! Driving the external downloader binary.
//!
//! This module owns everything between a job and its child process: building
//! the argument vector from the quality selector and feature flags, running
//! the process and streaming its output lines back to the engine, and the
//! post-completion pass that reconciles the parsed filename and streamed
//! size estimates against what actually landed on disk.
//!
//! # Features
//!
//! - Quality selectors: `best`, `audio`, `<N>p` height caps, raw format
//!   expressions, and custom argument presets with `${quality}` substitution
//! - Line-buffered capture of both stdout and stderr, in read order
//! - Cooperative kill through a cancellation token, with the exit event as
//!   the single finalization signal
//! - Confidence-ordered filename/size reconciliation after success

mod args;
mod reconcile;
mod run;

pub use args::{build_args, resolve_format};
pub use reconcile::{ReconcileOutcome, reconcile};
pub use run::{OutputStream, ProcessEvent, SpawnSpec, run_process};
