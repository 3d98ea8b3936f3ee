//! The download orchestration engine and its boundary handle.
//!
//! [`DownloadEngine`] is the only surface a host (CLI, GUI shell, service)
//! talks to. Creating one spawns the engine actor, a single task that owns
//! the job table, the queue scheduler, the live process handles, and the
//! update batcher; the handle is a cheap clone that sends commands to the
//! actor and awaits a reply.
//!
//! Job failures never surface as `Err` from these methods: they are recorded
//! on the job and published on the `failed` update channel. [`EngineError`]
//! covers only engine-level problems (bad configuration, actor gone).
//!
//! # Example
//!
//! ```no_run
//! use mediafetch_core::{DownloadEngine, EngineConfig, SubmitOptions, UpdateKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(EngineConfig::default())?;
//! let mut updates = engine.subscribe(UpdateKind::Progress).await?;
//!
//! let job = engine
//!     .submit(
//!         "https://example.com/watch?v=abc",
//!         SubmitOptions::new("720p", "/srv/media"),
//!     )
//!     .await?;
//! println!("queued job {}", job.id);
//!
//! while let Some(message) = updates.recv().await {
//!     println!("{} update(s)", message.len());
//! }
//! # Ok(())
//! # }
//! ```

mod actor;

use tokio::sync::{mpsc, oneshot};

use actor::Command;

use crate::config::{EngineConfig, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::events::{UpdateKind, UpdateMessage};
use crate::job::{BatchEntry, Job, JobId, SubmitOptions};

/// Error type for engine-boundary operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The engine actor has shut down; no further commands are possible.
    #[error("engine stopped")]
    Stopped,
}

/// Cloneable boundary handle to a running engine actor.
///
/// All methods are async command round-trips. Per-job operations return
/// `Ok(false)` when the id is unknown or the job's current status makes the
/// command a no-op; `Err(EngineError::Stopped)` only when the actor is gone.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    commands: mpsc::UnboundedSender<Command>,
}

impl DownloadEngine {
    /// Starts a new engine actor and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the configured
    /// concurrency is outside the `1..=100` range.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(actor::run(config, rx));
        Ok(Self { commands })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Submits one URL; the job enters the queue as `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn submit(
        &self,
        url: impl Into<String>,
        options: SubmitOptions,
    ) -> Result<Job, EngineError> {
        let url = url.into();
        self.request(|reply| Command::Submit {
            url,
            options,
            reply,
        })
        .await
    }

    /// Submits a batch of entries (playlist expansion) under shared options.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn submit_batch(
        &self,
        entries: Vec<BatchEntry>,
        options: SubmitOptions,
    ) -> Result<Vec<Job>, EngineError> {
        self.request(|reply| Command::SubmitBatch {
            entries,
            options,
            reply,
        })
        .await
    }

    /// Admits one specific pending job now, bypassing queue order but not
    /// the concurrency cap.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn start(&self, id: JobId) -> Result<bool, EngineError> {
        self.request(|reply| Command::Start { id, reply }).await
    }

    /// Clears the global pause flag; returns whether it was set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn start_queue(&self) -> Result<bool, EngineError> {
        self.request(|reply| Command::StartQueue { reply }).await
    }

    /// Sets the global pause flag; running jobs continue to their own end.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn pause_queue(&self) -> Result<bool, EngineError> {
        self.request(|reply| Command::PauseQueue { reply }).await
    }

    /// Pauses the queue, kills every live run, and settles all non-terminal
    /// jobs to `paused`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn stop_all(&self) -> Result<bool, EngineError> {
        self.request(|reply| Command::StopAll { reply }).await
    }

    /// Pauses one job, killing its live run if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn pause(&self, id: JobId) -> Result<bool, EngineError> {
        self.request(|reply| Command::Pause { id, reply }).await
    }

    /// Returns a paused job to `pending` for re-admission.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn resume(&self, id: JobId) -> Result<bool, EngineError> {
        self.request(|reply| Command::Resume { id, reply }).await
    }

    /// Retries an errored job: clears the failure, bumps the retry count,
    /// re-enters the queue at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn retry(&self, id: JobId) -> Result<bool, EngineError> {
        self.request(|reply| Command::Retry { id, reply }).await
    }

    /// Removes a job from the table, force-killing any owned process.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn remove(&self, id: JobId) -> Result<bool, EngineError> {
        self.request(|reply| Command::Remove { id, reply }).await
    }

    /// Snapshots every job, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, EngineError> {
        self.request(|reply| Command::ListJobs { reply }).await
    }

    /// Snapshots the queue members, in queue order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn list_queue(&self) -> Result<Vec<Job>, EngineError> {
        self.request(|reply| Command::ListQueue { reply }).await
    }

    /// Subscribes to one update channel; see [`crate::events`] for the
    /// batching contract.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the engine actor has shut down.
    pub async fn subscribe(
        &self,
        kind: UpdateKind,
    ) -> Result<mpsc::UnboundedReceiver<UpdateMessage>, EngineError> {
        self.request(|reply| Command::Subscribe { kind, reply })
            .await
    }

    /// Stops the engine: kills all live runs, flushes pending updates, and
    /// ends the actor task. Further commands return [`EngineError::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the actor had already shut down.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
