//! External downloader process lifecycle.
//!
//! One spawned task per running job: it launches the downloader, forwards
//! every output line to the engine as it arrives, and reports the exit. The
//! task owns the child handle exclusively; the engine holds only the
//! cancellation token. Killing is cooperative: cancelling the token sends
//! the kill signal and the exit event still flows through the single
//! finalization path.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::job::{ClassifiedError, ErrorKind, JobId};

/// Which stream a line arrived on. Diagnostics only; both streams are
/// parsed identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        })
    }
}

/// Everything needed to start one downloader run.
#[derive(Debug)]
pub struct SpawnSpec {
    /// The job this run belongs to.
    pub job_id: JobId,
    /// Downloader binary path or bare name.
    pub binary: PathBuf,
    /// Full argument vector, URL last.
    pub args: Vec<String>,
    /// Cancelling this kills the child.
    pub cancel: CancellationToken,
}

/// Events a downloader task sends back to the engine.
#[derive(Debug)]
pub enum ProcessEvent {
    /// The child started; output will follow.
    Spawned { job_id: JobId },
    /// The child could not be started at all.
    SpawnFailed {
        job_id: JobId,
        error: ClassifiedError,
    },
    /// One line of child output, in read order.
    Line {
        job_id: JobId,
        stream: OutputStream,
        line: String,
    },
    /// The child exited or was killed. Always the task's last event;
    /// `code` is `None` when the child died to a signal.
    Exited { job_id: JobId, code: Option<i32> },
}

/// Runs one downloader process to completion.
///
/// All outcomes, including spawn failure and kill, are reported through
/// `events`; this function itself never fails. Send errors mean the engine
/// is gone, in which case there is nobody left to tell.
#[instrument(skip(spec, events), fields(job_id = %spec.job_id, binary = %spec.binary.display()))]
pub async fn run_process(spec: SpawnSpec, events: mpsc::UnboundedSender<ProcessEvent>) {
    let SpawnSpec {
        job_id,
        binary,
        args,
        cancel,
    } = spec;

    let mut child = match Command::new(&binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!(error = %e, "downloader spawn failed");
            let _ = events.send(ProcessEvent::SpawnFailed {
                job_id,
                error: ClassifiedError::spawn_failure(&binary, &e),
            });
            return;
        }
    };

    // Both handles exist for piped stdio; their absence means the start is
    // unusable and is reported as a spawn failure.
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.start_kill();
        let _ = events.send(ProcessEvent::SpawnFailed {
            job_id,
            error: ClassifiedError::new(
                ErrorKind::SpawnFailure,
                "failed to capture downloader output streams",
            ),
        });
        return;
    };

    let _ = events.send(ProcessEvent::Spawned { job_id });

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !(stdout_done && stderr_done) {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("kill requested");
                if let Err(e) = child.start_kill() {
                    // Lost the race against a natural exit; wait() below
                    // still yields the status.
                    debug!(error = %e, "kill signal not delivered");
                }
                break;
            }
            line = stdout_lines.next_line(), if !stdout_done => match line {
                Ok(Some(line)) => {
                    let _ = events.send(ProcessEvent::Line {
                        job_id,
                        stream: OutputStream::Stdout,
                        line,
                    });
                }
                Ok(None) => stdout_done = true,
                Err(e) => {
                    debug!(error = %e, "stdout read error");
                    stdout_done = true;
                }
            },
            line = stderr_lines.next_line(), if !stderr_done => match line {
                Ok(Some(line)) => {
                    let _ = events.send(ProcessEvent::Line {
                        job_id,
                        stream: OutputStream::Stderr,
                        line,
                    });
                }
                Ok(None) => stderr_done = true,
                Err(e) => {
                    debug!(error = %e, "stderr read error");
                    stderr_done = true;
                }
            },
        }
    }

    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(error = %e, "failed to reap downloader");
            None
        }
    };
    debug!(?code, "downloader exited");
    let _ = events.send(ProcessEvent::Exited { job_id, code });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(binary: &str, args: &[&str]) -> (SpawnSpec, CancellationToken) {
        let cancel = CancellationToken::new();
        let spec = SpawnSpec {
            job_id: JobId::new(1),
            binary: PathBuf::from(binary),
            args: args.iter().map(|s| (*s).to_string()).collect(),
            cancel: cancel.clone(),
        };
        (spec, cancel)
    }

    async fn collect_events(mut rx: mpsc::UnboundedReceiver<ProcessEvent>) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_run_emits_spawned_lines_exit_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (spec, _cancel) = spec("sh", &["-c", "printf 'one\\ntwo\\n'"]);

        run_process(spec, tx).await;
        let events = collect_events(rx).await;

        assert!(matches!(events[0], ProcessEvent::Spawned { .. }));
        let lines: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::Line { line, .. } => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
        assert!(
            matches!(events.last(), Some(ProcessEvent::Exited { code: Some(0), .. })),
            "exit must be the final event"
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_classified() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (spec, _cancel) = spec("/nonexistent/no-such-downloader", &[]);

        run_process(spec, tx).await;
        let events = collect_events(rx).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            ProcessEvent::SpawnFailed { error, .. } => {
                assert_eq!(error.kind, ErrorKind::SpawnFailure);
                assert!(error.message.contains("no-such-downloader"));
            }
            other => panic!("expected SpawnFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_lines_are_forwarded() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (spec, _cancel) = spec("sh", &["-c", "echo oops >&2"]);

        run_process(spec, tx).await;
        let events = collect_events(rx).await;

        assert!(events.iter().any(|e| matches!(
            e,
            ProcessEvent::Line { stream: OutputStream::Stderr, line, .. } if line == "oops"
        )));
    }

    #[tokio::test]
    async fn test_cancel_kills_child_and_still_reports_exit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (spec, cancel) = spec("sh", &["-c", "echo started; sleep 30"]);

        let task = tokio::spawn(run_process(spec, tx));

        // Wait for the child to be up before killing it.
        loop {
            match rx.recv().await.unwrap() {
                ProcessEvent::Line { .. } => break,
                ProcessEvent::Spawned { .. } => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        cancel.cancel();

        let events = tokio::time::timeout(Duration::from_secs(5), collect_events(rx))
            .await
            .unwrap();
        assert!(
            matches!(events.last(), Some(ProcessEvent::Exited { code: None, .. })),
            "a killed child exits by signal: {events:?}"
        );
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_zero_exit_code_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (spec, _cancel) = spec("sh", &["-c", "exit 3"]);

        run_process(spec, tx).await;
        let events = collect_events(rx).await;

        assert!(matches!(
            events.last(),
            Some(ProcessEvent::Exited { code: Some(3), .. })
        ));
    }
}
