//! Job records and the download state machine.
//!
//! # Overview
//!
//! The job system consists of:
//! - [`Job`] - The authoritative per-download record
//! - [`JobStatus`] - Lifecycle states with a closed transition table
//! - [`ClassifiedError`] / [`ErrorKind`] - The failure taxonomy
//! - [`SubmitOptions`] / [`BatchEntry`] - Submission-time inputs
//!
//! Every status change goes through [`Job::try_transition`]; an edge missing
//! from [`JobStatus::can_transition_to`] is logged and ignored rather than
//! applied. Jobs are mutated exclusively on the engine task, so the record
//! itself carries no synchronization.

mod error;
mod record;
mod status;

pub use error::{ClassifiedError, ErrorKind};
pub use record::{ApplyOutcome, BatchEntry, Job, JobId, JobMetadata, PlaylistEntry, SubmitOptions};
pub use status::JobStatus;
