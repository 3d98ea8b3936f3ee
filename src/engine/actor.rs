//! The engine actor: single-task owner of all mutable download state.
//!
//! Every mutation of the job table, the queue, the scheduler flags, and the
//! batcher happens inside this one task, driven by four event sources in a
//! `select!` loop: boundary commands, downloader process events, scheduler
//! ticks, and the batch-flush interval. No job is ever touched from two
//! places at once, so the records themselves carry no synchronization.
//!
//! Finalization of a run is exactly-once by construction: the actor keeps a
//! `{job id → CancellationToken}` entry for every live run, and whichever
//! handler removes that entry (explicit kill, classified error line, or the
//! exit event) performs finalization. Everything arriving afterwards for the
//! same run observes the missing entry and becomes a no-op.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::events::{
    JobUpdate, SubscriberRegistry, UpdateBatcher, UpdateKind, UpdateMessage,
};
use crate::job::{
    BatchEntry, ClassifiedError, Job, JobId, JobMetadata, JobStatus, SubmitOptions,
};
use crate::parser::{classify_error, parse_line};
use crate::process::{ProcessEvent, SpawnSpec, build_args, reconcile, run_process};
use crate::scheduler::{JobTable, Scheduler, TickOutcome, plan_tick};

/// Boundary commands sent from [`crate::engine::DownloadEngine`] handles.
pub(crate) enum Command {
    Submit {
        url: String,
        options: SubmitOptions,
        reply: oneshot::Sender<Job>,
    },
    SubmitBatch {
        entries: Vec<BatchEntry>,
        options: SubmitOptions,
        reply: oneshot::Sender<Vec<Job>>,
    },
    Start {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    StartQueue {
        reply: oneshot::Sender<bool>,
    },
    PauseQueue {
        reply: oneshot::Sender<bool>,
    },
    StopAll {
        reply: oneshot::Sender<bool>,
    },
    Pause {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    Resume {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    Retry {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    ListJobs {
        reply: oneshot::Sender<Vec<Job>>,
    },
    ListQueue {
        reply: oneshot::Sender<Vec<Job>>,
    },
    Subscribe {
        kind: UpdateKind,
        reply: oneshot::Sender<mpsc::UnboundedReceiver<UpdateMessage>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Runs the actor until shutdown or until every engine handle is dropped.
pub(crate) async fn run(config: EngineConfig, commands: mpsc::UnboundedReceiver<Command>) {
    Actor::new(config, commands).run().await;
}

struct Actor {
    config: EngineConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    process_tx: mpsc::UnboundedSender<ProcessEvent>,
    process_rx: mpsc::UnboundedReceiver<ProcessEvent>,
    tick_tx: mpsc::UnboundedSender<()>,
    tick_rx: mpsc::UnboundedReceiver<()>,
    table: JobTable,
    scheduler: Scheduler,
    batcher: UpdateBatcher,
    subscribers: SubscriberRegistry,
    /// Cancellation handles of live runs. Presence means "not yet finalized".
    runs: HashMap<JobId, CancellationToken>,
    /// Jobs stop-all caught mid-spawn; settled to `paused` on their
    /// `Spawned` event.
    pause_on_spawn: HashSet<JobId>,
    next_id: u64,
}

impl Actor {
    fn new(config: EngineConfig, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let batcher = UpdateBatcher::new(config.batching.clone());
        Self {
            config,
            commands,
            process_tx,
            process_rx,
            tick_tx,
            tick_rx,
            table: JobTable::new(),
            scheduler: Scheduler::new(),
            batcher,
            subscribers: SubscriberRegistry::default(),
            runs: HashMap::new(),
            pause_on_spawn: HashSet::new(),
            next_id: 1,
        }
    }

    async fn run(mut self) {
        let mut flush = tokio::time::interval(self.config.batching.flush_interval);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.handle_command(command).await,
                    // Every handle dropped; nobody is listening anymore.
                    None => {
                        self.shutdown();
                        return;
                    }
                },
                Some(event) = self.process_rx.recv() => self.handle_process_event(event).await,
                Some(()) = self.tick_rx.recv() => self.handle_tick().await,
                _ = flush.tick() => self.flush(),
            }
        }
    }

    // ==================== Boundary commands ====================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit {
                url,
                options,
                reply,
            } => {
                let job = self.create_job(url, None, options);
                let _ = reply.send(job);
            }
            Command::SubmitBatch {
                entries,
                options,
                reply,
            } => {
                let jobs = entries
                    .into_iter()
                    .map(|entry| self.create_job(entry.url, entry.title, options.clone()))
                    .collect();
                let _ = reply.send(jobs);
            }
            Command::Start { id, reply } => {
                let _ = reply.send(self.start_job(id).await);
            }
            Command::StartQueue { reply } => {
                let changed = self.scheduler.set_paused(false);
                if changed {
                    info!("queue started");
                }
                self.nudge();
                let _ = reply.send(changed);
            }
            Command::PauseQueue { reply } => {
                let changed = self.scheduler.set_paused(true);
                if changed {
                    info!("queue paused");
                }
                let _ = reply.send(changed);
            }
            Command::StopAll { reply } => {
                self.stop_all();
                let _ = reply.send(true);
            }
            Command::Pause { id, reply } => {
                let _ = reply.send(self.pause_job(id));
            }
            Command::Resume { id, reply } => {
                let _ = reply.send(self.resume_job(id));
            }
            Command::Retry { id, reply } => {
                let _ = reply.send(self.retry_job(id));
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove_job(id));
            }
            Command::ListJobs { reply } => {
                let _ = reply.send(self.table.jobs().cloned().collect());
            }
            Command::ListQueue { reply } => {
                let _ = reply.send(self.table.queued_jobs().cloned().collect());
            }
            Command::Subscribe { kind, reply } => {
                let _ = reply.send(self.subscribers.subscribe(kind));
            }
            Command::Shutdown { .. } => unreachable!("handled by the select loop"),
        }
    }

    fn create_job(
        &mut self,
        url: String,
        title: Option<String>,
        mut options: SubmitOptions,
    ) -> Job {
        let id = JobId::new(self.next_id);
        self.next_id += 1;

        if let Some(title) = title {
            options
                .metadata
                .get_or_insert_with(JobMetadata::default)
                .title
                .get_or_insert(title);
        }

        let job = Job::new(id, url, options);
        info!(job_id = %id, url = %job.url, quality = %job.quality, "job submitted");
        self.table.insert(job.clone());
        self.emit_queue();
        self.nudge();
        job
    }

    /// Admits one specific pending job immediately, bypassing queue order
    /// but never the concurrency cap.
    async fn start_job(&mut self, id: JobId) -> bool {
        let pending = self
            .table
            .get(id)
            .is_some_and(|job| job.status() == JobStatus::Pending);
        if !pending || self.table.active_count() >= self.config.concurrency {
            return false;
        }
        self.admit(id).await;
        true
    }

    fn pause_job(&mut self, id: JobId) -> bool {
        let Some(status) = self.table.get(id).map(Job::status) else {
            return false;
        };
        match status {
            JobStatus::Pending => {
                self.transition(id, JobStatus::Paused);
                true
            }
            JobStatus::Connecting | JobStatus::Downloading | JobStatus::Processing => {
                if let Some(token) = self.runs.remove(&id) {
                    token.cancel();
                }
                self.transition(id, JobStatus::Paused);
                // A slot was freed; the queue may admit someone else.
                self.nudge();
                true
            }
            // Initializing (mid-spawn), terminal, and already-paused jobs
            // cannot be paused.
            _ => false,
        }
    }

    fn resume_job(&mut self, id: JobId) -> bool {
        let paused = self
            .table
            .get(id)
            .is_some_and(|job| job.status() == JobStatus::Paused);
        if !paused {
            return false;
        }
        self.transition(id, JobStatus::Pending);
        self.table.enqueue(id);
        self.emit_queue();
        self.nudge();
        true
    }

    fn retry_job(&mut self, id: JobId) -> bool {
        let retried = self.table.get_mut(id).is_some_and(Job::retry);
        if !retried {
            return false;
        }
        info!(job_id = %id, "job retried");
        self.table.enqueue(id);
        self.emit_status(id);
        self.emit_queue();
        self.nudge();
        true
    }

    fn remove_job(&mut self, id: JobId) -> bool {
        if let Some(token) = self.runs.remove(&id) {
            token.cancel();
        }
        self.pause_on_spawn.remove(&id);
        match self.table.remove(id) {
            Some(job) => {
                info!(job_id = %id, url = %job.url, "job removed");
                self.emit_queue();
                self.nudge();
                true
            }
            None => false,
        }
    }

    /// Pauses the queue and settles every non-terminal job to `paused`,
    /// killing live runs.
    fn stop_all(&mut self) {
        self.scheduler.set_paused(true);
        info!(jobs = self.table.len(), "stop all");

        let ids: Vec<JobId> = self.table.jobs().map(|job| job.id).collect();
        for id in ids {
            let Some(status) = self.table.get(id).map(Job::status) else {
                continue;
            };
            match status {
                JobStatus::Pending => {
                    self.transition(id, JobStatus::Paused);
                }
                JobStatus::Connecting | JobStatus::Downloading | JobStatus::Processing => {
                    if let Some(token) = self.runs.remove(&id) {
                        token.cancel();
                    }
                    self.transition(id, JobStatus::Paused);
                }
                JobStatus::Initializing => {
                    // Mid-spawn: kill now, settle to paused when the spawn
                    // handshake arrives.
                    if let Some(token) = self.runs.get(&id) {
                        token.cancel();
                        self.pause_on_spawn.insert(id);
                    }
                }
                JobStatus::Paused | JobStatus::Completed | JobStatus::Error => {}
            }
        }
    }

    // ==================== Scheduler ====================

    /// Requests a near-term tick; rides along with any outstanding timer.
    fn nudge(&mut self) {
        self.schedule_tick(self.config.schedule_delay);
    }

    fn schedule_tick(&mut self, delay: std::time::Duration) {
        if !self.scheduler.try_arm() {
            return;
        }
        let tx = self.tick_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(());
        });
    }

    async fn handle_tick(&mut self) {
        self.scheduler.tick_fired();
        match plan_tick(&self.table, &self.scheduler, self.config.concurrency) {
            TickOutcome::Paused | TickOutcome::Idle => {}
            TickOutcome::Saturated => self.schedule_tick(self.config.schedule_backoff),
            TickOutcome::Admit(id) => {
                self.admit(id).await;
                self.schedule_tick(self.config.schedule_delay);
            }
        }
    }

    /// Starts the downloader run for a pending job.
    async fn admit(&mut self, id: JobId) {
        let Some(job) = self.table.get_mut(id) else {
            return;
        };
        if !job.begin() {
            return;
        }
        let directory = job.output_directory.clone();
        self.emit_status(id);

        if let Err(e) = tokio::fs::create_dir_all(&directory).await {
            warn!(job_id = %id, dir = %directory.display(), error = %e, "cannot create output directory");
            self.fail_job(id, ClassifiedError::filesystem(&directory, &e));
            return;
        }

        let Some(job) = self.table.get(id) else {
            return;
        };
        let args = build_args(job, &self.config);
        debug!(job_id = %id, ?args, "admitting job");

        let token = CancellationToken::new();
        self.runs.insert(id, token.clone());
        tokio::spawn(run_process(
            SpawnSpec {
                job_id: id,
                binary: self.config.binary.clone(),
                args,
                cancel: token,
            },
            self.process_tx.clone(),
        ));
    }

    // ==================== Process events ====================

    async fn handle_process_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Spawned { job_id } => self.handle_spawned(job_id),
            ProcessEvent::SpawnFailed { job_id, error } => {
                if self.runs.remove(&job_id).is_none() {
                    return;
                }
                self.pause_on_spawn.remove(&job_id);
                self.fail_job(job_id, error);
            }
            ProcessEvent::Line { job_id, stream, line } => {
                self.handle_line(job_id, stream, &line);
            }
            ProcessEvent::Exited { job_id, code } => {
                // Whoever removed the run entry earlier already finalized.
                if self.runs.remove(&job_id).is_none() {
                    debug!(job_id = %job_id, ?code, "exit after finalization, ignored");
                    return;
                }
                self.pause_on_spawn.remove(&job_id);
                if code == Some(0) {
                    self.finalize_success(job_id).await;
                } else {
                    self.fail_job(job_id, ClassifiedError::non_zero_exit(code));
                }
            }
        }
    }

    fn handle_spawned(&mut self, id: JobId) {
        if !self.runs.contains_key(&id) {
            return;
        }
        if self.pause_on_spawn.remove(&id) {
            // Stop-all caught this job mid-spawn; the kill is already on its
            // way. Settle through the spawn edge to paused.
            self.runs.remove(&id);
            if let Some(job) = self.table.get_mut(id) {
                job.try_transition(JobStatus::Connecting);
            }
            self.transition(id, JobStatus::Paused);
            return;
        }
        self.transition(id, JobStatus::Connecting);
    }

    fn handle_line(&mut self, id: JobId, stream: crate::process::OutputStream, line: &str) {
        // Late output from an already-finalized run carries no authority.
        if !self.runs.contains_key(&id) {
            return;
        }
        let update = parse_line(line);
        if update.is_empty() {
            return;
        }
        if let Some(message) = &update.warning {
            warn!(job_id = %id, %stream, message = %message, "downloader warning");
            return;
        }
        if let Some(message) = &update.error {
            let error = classify_error(message);
            warn!(job_id = %id, kind = %error.kind, message = %error.message, "downloader error");
            // A classified line finalizes the job now; the exit event that
            // follows observes the released handle and is a no-op.
            if let Some(token) = self.runs.remove(&id) {
                token.cancel();
            }
            self.fail_job(id, error);
            return;
        }

        let Some(job) = self.table.get_mut(id) else {
            return;
        };
        let outcome = job.apply_update(&update);
        let snapshot = job.clone();
        if outcome.status_changed {
            self.emit(JobUpdate::Status {
                job: snapshot.clone(),
            });
        }
        if outcome.changed {
            self.emit(JobUpdate::Progress { job: snapshot });
        }
    }

    // ==================== Finalization ====================

    /// Completion path: stamp, reconcile the on-disk truth, publish.
    async fn finalize_success(&mut self, id: JobId) {
        let snapshot = {
            let Some(job) = self.table.get_mut(id) else {
                return;
            };
            if !job.complete() {
                return;
            }
            job.clone()
        };

        if let Some(outcome) = reconcile(&snapshot).await {
            if let Some(job) = self.table.get_mut(id) {
                debug!(job_id = %id, file = %outcome.filename, size = outcome.size, "reconciled output");
                job.resolved_filename = Some(outcome.filename);
                job.downloaded_bytes = Some(outcome.size);
                job.total_bytes = Some(outcome.size);
                job.progress_percent = 100;
            }
        }

        self.table.dequeue(id);
        if let Some(job) = self.table.get(id).cloned() {
            info!(job_id = %id, file = ?job.resolved_filename, "job completed");
            self.emit(JobUpdate::Completed { job: job.clone() });
            self.emit(JobUpdate::Status { job });
        }
        self.emit_queue();
        self.nudge();
    }

    /// Failure path: record the classified error and publish. Callers must
    /// have released the run handle already (or never created one).
    fn fail_job(&mut self, id: JobId, error: ClassifiedError) {
        let Some(job) = self.table.get_mut(id) else {
            return;
        };
        if !job.fail(error.clone()) {
            return;
        }
        let snapshot = job.clone();
        self.table.dequeue(id);
        info!(job_id = %id, kind = %error.kind, "job failed");
        self.emit(JobUpdate::Failed {
            job: snapshot.clone(),
            error,
        });
        self.emit(JobUpdate::Status { job: snapshot });
        self.emit_queue();
        self.nudge();
    }

    // ==================== Update emission ====================

    fn emit(&mut self, update: JobUpdate) {
        if let Some((kind, message)) = self.batcher.push(update) {
            self.subscribers.publish(kind, &message);
        }
    }

    fn emit_status(&mut self, id: JobId) {
        if let Some(job) = self.table.get(id).cloned() {
            self.emit(JobUpdate::Status { job });
        }
    }

    fn emit_queue(&mut self) {
        let job_ids = self.table.queue_ids();
        self.emit(JobUpdate::Queue { job_ids });
    }

    /// Applies a guarded transition and emits a status update on change.
    fn transition(&mut self, id: JobId, next: JobStatus) {
        let changed = self
            .table
            .get_mut(id)
            .is_some_and(|job| job.try_transition(next));
        if changed {
            self.emit_status(id);
        }
    }

    fn flush(&mut self) {
        for (kind, message) in self.batcher.flush_all() {
            self.subscribers.publish(kind, &message);
        }
    }

    fn shutdown(&mut self) {
        debug!(live_runs = self.runs.len(), "engine shutting down");
        for (_, token) in self.runs.drain() {
            token.cancel();
        }
        self.flush();
    }
}
