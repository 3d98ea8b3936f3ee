//! Mediafetch Core Library
//!
//! This library provides the download orchestration engine behind the
//! mediafetch tool: a concurrency-limited queue of media-download jobs, each
//! backed by an external `yt-dlp`-compatible downloader process, with live
//! structured progress parsed out of the process's text output.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`job`] - Per-job records, the status state machine, the error taxonomy
//! - [`parser`] - Line-oriented progress/error parsing of downloader output
//! - [`process`] - Argument building, process lifecycle, reconciliation
//! - [`events`] - Update channels, batching, and subscriptions
//! - [`engine`] - The actor that ties it all together, and its boundary handle
//! - [`config`] - Engine configuration and feature flags
//!
//! Hosts interact exclusively through [`DownloadEngine`]; everything else is
//! exposed for its types.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod events;
pub mod job;
pub mod parser;
pub mod process;
mod scheduler;

// Re-export commonly used types
pub use config::{DEFAULT_BINARY, DEFAULT_CONCURRENCY, EngineConfig, FeatureFlags};
pub use engine::{DownloadEngine, EngineError};
pub use events::{BatcherConfig, JobUpdate, UpdateBatcher, UpdateKind, UpdateMessage};
pub use job::{
    BatchEntry, ClassifiedError, ErrorKind, Job, JobId, JobMetadata, JobStatus, SubmitOptions,
};
pub use parser::{LineUpdate, classify_error, format_size, parse_line};
