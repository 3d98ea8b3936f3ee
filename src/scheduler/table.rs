//! The in-memory job table and pending-queue order.
//!
//! All job records live here, owned by the engine task. Two orderings are
//! maintained next to the records: insertion order (for listing) and queue
//! order (for admission). Queue membership follows a job's whole life: a job
//! enters on submission, stays through pauses and running states, and leaves
//! only on a terminal transition or removal. A retried job re-enters at the
//! tail.

use std::collections::HashMap;

use crate::job::{Job, JobId, JobStatus};

/// Owns every job record plus the listing and admission orders.
#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: HashMap<JobId, Job>,
    /// Insertion order of all jobs ever added, minus removals.
    order: Vec<JobId>,
    /// Admission order of jobs not yet terminal, minus removals.
    queue: Vec<JobId>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new job and enqueues it at the tail.
    pub fn insert(&mut self, job: Job) {
        let id = job.id;
        self.jobs.insert(id, job);
        self.order.push(id);
        self.enqueue(id);
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Removes the record and both order entries.
    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let job = self.jobs.remove(&id)?;
        self.order.retain(|other| *other != id);
        self.queue.retain(|other| *other != id);
        Some(job)
    }

    /// Appends to the queue tail unless already a member.
    pub fn enqueue(&mut self, id: JobId) {
        if !self.queue.contains(&id) {
            self.queue.push(id);
        }
    }

    /// Drops queue membership, keeping the record.
    pub fn dequeue(&mut self, id: JobId) {
        self.queue.retain(|other| *other != id);
    }

    /// All jobs, in insertion order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    /// Queue members, in queue order.
    pub fn queued_jobs(&self) -> impl Iterator<Item = &Job> {
        self.queue.iter().filter_map(|id| self.jobs.get(id))
    }

    /// Queue member ids, in queue order.
    pub fn queue_ids(&self) -> Vec<JobId> {
        self.queue.clone()
    }

    /// The earliest-queued job still pending, if any.
    pub fn next_pending(&self) -> Option<JobId> {
        self.queued_jobs()
            .find(|job| job.status() == JobStatus::Pending)
            .map(|job| job.id)
    }

    /// Number of jobs currently in an active substate.
    pub fn active_count(&self) -> usize {
        self.jobs.values().filter(|j| j.status().is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, SubmitOptions};

    fn job(id: u64) -> Job {
        Job::new(
            JobId::new(id),
            format!("https://example.com/watch?v={id}"),
            SubmitOptions::new("best", "/tmp/media"),
        )
    }

    fn table_with(n: u64) -> JobTable {
        let mut table = JobTable::new();
        for id in 1..=n {
            table.insert(job(id));
        }
        table
    }

    #[test]
    fn test_insert_preserves_both_orders() {
        let table = table_with(3);
        let listed: Vec<JobId> = table.jobs().map(|j| j.id).collect();
        assert_eq!(listed, vec![JobId::new(1), JobId::new(2), JobId::new(3)]);
        assert_eq!(table.queue_ids(), listed);
    }

    #[test]
    fn test_remove_drops_record_and_orders() {
        let mut table = table_with(3);
        let removed = table.remove(JobId::new(2)).unwrap();
        assert_eq!(removed.id, JobId::new(2));

        assert_eq!(table.len(), 2);
        assert!(!table.contains(JobId::new(2)));
        assert_eq!(table.queue_ids(), vec![JobId::new(1), JobId::new(3)]);
        assert!(table.remove(JobId::new(2)).is_none());
    }

    #[test]
    fn test_enqueue_is_duplicate_free() {
        let mut table = table_with(2);
        table.enqueue(JobId::new(1));
        table.enqueue(JobId::new(1));
        assert_eq!(table.queue_ids().len(), 2);
    }

    #[test]
    fn test_requeue_after_dequeue_lands_at_tail() {
        let mut table = table_with(3);
        table.dequeue(JobId::new(1));
        table.enqueue(JobId::new(1));
        assert_eq!(
            table.queue_ids(),
            vec![JobId::new(2), JobId::new(3), JobId::new(1)]
        );
    }

    #[test]
    fn test_next_pending_skips_non_pending_members() {
        let mut table = table_with(3);
        // Job 1 is now running; job 2 paused; job 3 still pending.
        table.get_mut(JobId::new(1)).unwrap().begin();
        table.get_mut(JobId::new(2)).unwrap().try_transition(JobStatus::Paused);

        assert_eq!(table.next_pending(), Some(JobId::new(3)));
    }

    #[test]
    fn test_next_pending_on_empty_queue() {
        let mut table = table_with(1);
        table.dequeue(JobId::new(1));
        assert_eq!(table.next_pending(), None);
    }

    #[test]
    fn test_active_count_excludes_pending_and_terminal() {
        let mut table = table_with(4);
        table.get_mut(JobId::new(1)).unwrap().begin(); // initializing
        let second = table.get_mut(JobId::new(2)).unwrap();
        second.begin();
        second.try_transition(JobStatus::Connecting);
        let third = table.get_mut(JobId::new(3)).unwrap();
        third.begin();
        third.try_transition(JobStatus::Error);
        // Job 4 stays pending.

        assert_eq!(table.active_count(), 2);
    }

    #[test]
    fn test_queued_jobs_follow_queue_order_not_insertion() {
        let mut table = table_with(2);
        table.dequeue(JobId::new(1));
        table.enqueue(JobId::new(1));

        let urls: Vec<&str> = table.queued_jobs().map(|j| j.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/watch?v=2",
                "https://example.com/watch?v=1"
            ]
        );
    }
}
