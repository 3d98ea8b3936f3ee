//! Outbound update events: channels, batching, and subscriptions.
//!
//! Every observable change to a job is published on one of a small set of
//! logical channels ([`UpdateKind`]). Progress reporting is bursty, so
//! updates pass through an [`UpdateBatcher`] that bounds message volume:
//! a channel flushes on the earlier of a fixed interval or a per-channel
//! item cap. Batching never reorders events within a channel and never
//! drops one.
//!
//! Hosts call `subscribe` for the channels they care about and receive
//! [`UpdateMessage`]s: a lone pending item flushes as `Single`, two or more
//! flush as one ordered `Batch`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::job::{ClassifiedError, Job, JobId};

/// Logical update channels a host can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Progress field changes (percent, speed, ETA, bytes, filename).
    Progress,
    /// Lifecycle status changes.
    Status,
    /// Successful completions, after reconciliation.
    Completed,
    /// Failures, carrying the classified error.
    Failed,
    /// Queue membership or order changes.
    Queue,
}

impl UpdateKind {
    /// All channels, in flush order.
    pub const ALL: [UpdateKind; 5] = [
        UpdateKind::Progress,
        UpdateKind::Status,
        UpdateKind::Completed,
        UpdateKind::Failed,
        UpdateKind::Queue,
    ];

    /// Returns the wire name of the channel.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Progress => "progress",
            UpdateKind::Status => "status",
            UpdateKind::Completed => "completed",
            UpdateKind::Failed => "failed",
            UpdateKind::Queue => "queue",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UpdateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "progress" => Ok(Self::Progress),
            "status" => Ok(Self::Status),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "queue" => Ok(Self::Queue),
            other => Err(format!("unknown update channel: {other}")),
        }
    }
}

/// One update event, carrying the snapshot the host needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum JobUpdate {
    /// Progress fields changed.
    Progress { job: Job },
    /// The lifecycle status changed.
    Status { job: Job },
    /// The job completed; sizes are reconciled and authoritative.
    Completed { job: Job },
    /// The job failed.
    Failed { job: Job, error: ClassifiedError },
    /// The pending queue changed; ids are in queue order.
    Queue { job_ids: Vec<JobId> },
}

impl JobUpdate {
    /// The channel this update belongs to.
    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        match self {
            JobUpdate::Progress { .. } => UpdateKind::Progress,
            JobUpdate::Status { .. } => UpdateKind::Status,
            JobUpdate::Completed { .. } => UpdateKind::Completed,
            JobUpdate::Failed { .. } => UpdateKind::Failed,
            JobUpdate::Queue { .. } => UpdateKind::Queue,
        }
    }
}

/// What a subscriber receives per flush: one event, or an ordered burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateMessage {
    Single(JobUpdate),
    Batch(Vec<JobUpdate>),
}

impl UpdateMessage {
    /// Number of events carried.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            UpdateMessage::Single(_) => 1,
            UpdateMessage::Batch(items) => items.len(),
        }
    }

    /// `true` when an empty batch slipped through (never produced by the
    /// batcher, but subscribers should not have to trust that).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Update batching knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// Maximum time a buffered update waits before flushing.
    pub flush_interval: Duration,
    /// Per-flush item cap for the progress channel.
    pub max_progress_items: usize,
    /// Per-flush item cap for the status channel.
    pub max_status_items: usize,
    /// Per-flush item cap for the completed channel.
    pub max_completed_items: usize,
    /// Per-flush item cap for the failed channel.
    pub max_failed_items: usize,
    /// Per-flush item cap for the queue channel.
    pub max_queue_items: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(250),
            max_progress_items: 25,
            max_status_items: 10,
            max_completed_items: 10,
            max_failed_items: 10,
            max_queue_items: 5,
        }
    }
}

impl BatcherConfig {
    fn max_for(&self, kind: UpdateKind) -> usize {
        let max = match kind {
            UpdateKind::Progress => self.max_progress_items,
            UpdateKind::Status => self.max_status_items,
            UpdateKind::Completed => self.max_completed_items,
            UpdateKind::Failed => self.max_failed_items,
            UpdateKind::Queue => self.max_queue_items,
        };
        max.max(1)
    }
}

/// Buffers updates per channel until a cap or interval flush.
///
/// The batcher holds no timer of its own: the owner pushes updates as they
/// happen (a push may return a cap-triggered flush) and calls
/// [`UpdateBatcher::flush_all`] on its own interval.
#[derive(Debug)]
pub struct UpdateBatcher {
    config: BatcherConfig,
    buffers: HashMap<UpdateKind, Vec<JobUpdate>>,
}

impl UpdateBatcher {
    /// Creates an empty batcher.
    #[must_use]
    pub fn new(config: BatcherConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
        }
    }

    /// Buffers one update.
    ///
    /// Returns the channel's packaged contents when the push made it reach
    /// its item cap; otherwise the update just waits for the next interval.
    pub fn push(&mut self, update: JobUpdate) -> Option<(UpdateKind, UpdateMessage)> {
        let kind = update.kind();
        let buffer = self.buffers.entry(kind).or_default();
        buffer.push(update);

        if buffer.len() >= self.config.max_for(kind) {
            let items = std::mem::take(buffer);
            trace!(channel = %kind, count = items.len(), "cap flush");
            return Some((kind, package(items)));
        }
        None
    }

    /// Drains every non-empty channel, in [`UpdateKind::ALL`] order.
    pub fn flush_all(&mut self) -> Vec<(UpdateKind, UpdateMessage)> {
        let mut flushed = Vec::new();
        for kind in UpdateKind::ALL {
            if let Some(buffer) = self.buffers.get_mut(&kind) {
                if buffer.is_empty() {
                    continue;
                }
                let items = std::mem::take(buffer);
                flushed.push((kind, package(items)));
            }
        }
        flushed
    }

    /// `true` when no channel holds a pending update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(Vec::is_empty)
    }
}

/// Packages a drained buffer: one item flushes as `Single`, more as `Batch`.
fn package(mut items: Vec<JobUpdate>) -> UpdateMessage {
    if items.len() == 1 {
        UpdateMessage::Single(items.remove(0))
    } else {
        UpdateMessage::Batch(items)
    }
}

/// Per-channel subscriber lists, pruned lazily on publish.
#[derive(Debug, Default)]
pub(crate) struct SubscriberRegistry {
    channels: HashMap<UpdateKind, Vec<mpsc::UnboundedSender<UpdateMessage>>>,
}

impl SubscriberRegistry {
    /// Registers a new subscriber on `kind` and returns its receiving end.
    pub fn subscribe(&mut self, kind: UpdateKind) -> mpsc::UnboundedReceiver<UpdateMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.entry(kind).or_default().push(tx);
        rx
    }

    /// Delivers a flushed message to every live subscriber of `kind`.
    ///
    /// Subscribers whose receiving end was dropped are removed here.
    pub fn publish(&mut self, kind: UpdateKind, message: &UpdateMessage) {
        if let Some(senders) = self.channels.get_mut(&kind) {
            senders.retain(|tx| tx.send(message.clone()).is_ok());
        }
    }

    /// `true` when at least one subscriber is registered on `kind`.
    #[cfg(test)]
    pub fn has_subscribers(&self, kind: UpdateKind) -> bool {
        self.channels.get(&kind).is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::{JobId, SubmitOptions};

    fn test_job() -> Job {
        Job::new(
            JobId::new(7),
            "https://example.com/watch?v=abc",
            SubmitOptions::new("best", "/tmp/media"),
        )
    }

    fn progress_update() -> JobUpdate {
        JobUpdate::Progress { job: test_job() }
    }

    fn small_config() -> BatcherConfig {
        BatcherConfig {
            max_progress_items: 3,
            max_status_items: 2,
            ..BatcherConfig::default()
        }
    }

    // ==================== Batcher Tests ====================

    #[test]
    fn test_push_below_cap_buffers() {
        let mut batcher = UpdateBatcher::new(small_config());
        assert!(batcher.push(progress_update()).is_none());
        assert!(batcher.push(progress_update()).is_none());
        assert!(!batcher.is_empty());
    }

    #[test]
    fn test_push_at_cap_flushes_channel() {
        let mut batcher = UpdateBatcher::new(small_config());
        batcher.push(progress_update());
        batcher.push(progress_update());
        let (kind, message) = batcher.push(progress_update()).unwrap();

        assert_eq!(kind, UpdateKind::Progress);
        assert_eq!(message.len(), 3);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_single_item_flushes_as_single() {
        let mut batcher = UpdateBatcher::new(small_config());
        batcher.push(progress_update());
        let flushed = batcher.flush_all();

        assert_eq!(flushed.len(), 1);
        assert!(matches!(flushed[0].1, UpdateMessage::Single(_)));
    }

    #[test]
    fn test_multiple_items_flush_as_ordered_batch() {
        let mut batcher = UpdateBatcher::new(small_config());
        let mut first = test_job();
        first.progress_percent = 10;
        let mut second = test_job();
        second.progress_percent = 20;
        batcher.push(JobUpdate::Progress { job: first });
        batcher.push(JobUpdate::Progress { job: second });

        let flushed = batcher.flush_all();
        let UpdateMessage::Batch(items) = &flushed[0].1 else {
            panic!("expected a batch");
        };
        let percents: Vec<u8> = items
            .iter()
            .map(|u| match u {
                JobUpdate::Progress { job } => job.progress_percent,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(percents, vec![10, 20]);
    }

    #[test]
    fn test_channels_do_not_mix() {
        let mut batcher = UpdateBatcher::new(small_config());
        batcher.push(progress_update());
        batcher.push(JobUpdate::Status { job: test_job() });

        let flushed = batcher.flush_all();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].0, UpdateKind::Progress);
        assert_eq!(flushed[1].0, UpdateKind::Status);
        assert_eq!(flushed[0].1.len(), 1);
        assert_eq!(flushed[1].1.len(), 1);
    }

    #[test]
    fn test_flush_all_on_empty_batcher() {
        let mut batcher = UpdateBatcher::new(BatcherConfig::default());
        assert!(batcher.flush_all().is_empty());
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_cap_of_zero_is_treated_as_one() {
        let config = BatcherConfig {
            max_queue_items: 0,
            ..BatcherConfig::default()
        };
        let mut batcher = UpdateBatcher::new(config);
        let flushed = batcher.push(JobUpdate::Queue { job_ids: vec![] });
        assert!(flushed.is_some());
    }

    // ==================== Registry Tests ====================

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let mut registry = SubscriberRegistry::default();
        let mut rx_a = registry.subscribe(UpdateKind::Status);
        let mut rx_b = registry.subscribe(UpdateKind::Status);

        let message = UpdateMessage::Single(JobUpdate::Status { job: test_job() });
        registry.publish(UpdateKind::Status, &message);

        assert_eq!(rx_a.try_recv().unwrap(), message);
        assert_eq!(rx_b.try_recv().unwrap(), message);
    }

    #[test]
    fn test_publish_only_hits_the_addressed_channel() {
        let mut registry = SubscriberRegistry::default();
        let mut status_rx = registry.subscribe(UpdateKind::Status);
        let mut progress_rx = registry.subscribe(UpdateKind::Progress);

        registry.publish(
            UpdateKind::Status,
            &UpdateMessage::Single(JobUpdate::Status { job: test_job() }),
        );

        assert!(status_rx.try_recv().is_ok());
        assert!(progress_rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut registry = SubscriberRegistry::default();
        let rx = registry.subscribe(UpdateKind::Completed);
        drop(rx);

        registry.publish(
            UpdateKind::Completed,
            &UpdateMessage::Single(JobUpdate::Completed { job: test_job() }),
        );
        assert!(!registry.has_subscribers(UpdateKind::Completed));
    }

    // ==================== Wire Format Tests ====================

    #[test]
    fn test_update_kind_wire_names() {
        for kind in UpdateKind::ALL {
            let parsed: UpdateKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("nonsense".parse::<UpdateKind>().is_err());
    }

    #[test]
    fn test_update_message_serde_shapes() {
        let single = UpdateMessage::Single(JobUpdate::Queue {
            job_ids: vec![JobId::new(1)],
        });
        let json = serde_json::to_string(&single).unwrap();
        assert!(json.starts_with('{'), "single flushes as one object: {json}");

        let batch = UpdateMessage::Batch(vec![
            JobUpdate::Queue { job_ids: vec![] },
            JobUpdate::Queue { job_ids: vec![] },
        ]);
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.starts_with('['), "batch flushes as an array: {json}");
    }

    #[test]
    fn test_job_update_kind_mapping() {
        assert_eq!(progress_update().kind(), UpdateKind::Progress);
        assert_eq!(
            JobUpdate::Queue { job_ids: vec![] }.kind(),
            UpdateKind::Queue
        );
    }
}
