//! Queue scheduling: polling admission under a concurrency limit.
//!
//! Admission is poll-driven, not push-driven. Anything that might unblock
//! the queue (a submission, a resume, a retry, a finished job, a queue
//! start) nudges the scheduler; the actual decision happens on the next
//! tick. Exactly one tick timer is ever outstanding, so two nudges close
//! together cannot admit the same job twice.
//!
//! Each tick: if the queue is globally paused, do nothing and let the timer
//! lapse; if the active-job count has reached the limit, back off; else
//! admit the earliest-queued pending job and tick again after a short delay.

mod table;

pub(crate) use table::JobTable;

use crate::job::JobId;

/// Global pause flag plus the single-timer guard.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    paused: bool,
    /// `true` while a tick timer is outstanding.
    tick_armed: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Sets the global pause flag; returns `true` when the flag changed.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        if self.paused == paused {
            return false;
        }
        self.paused = paused;
        true
    }

    /// Claims the single timer slot.
    ///
    /// Returns `true` when the caller should actually start a timer; `false`
    /// means one is already outstanding and this nudge rides along with it.
    pub fn try_arm(&mut self) -> bool {
        if self.tick_armed {
            return false;
        }
        self.tick_armed = true;
        true
    }

    /// Releases the timer slot when its tick fires.
    pub fn tick_fired(&mut self) {
        self.tick_armed = false;
    }
}

/// What a tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Globally paused; do not reschedule.
    Paused,
    /// At the concurrency limit; tick again after the backoff interval.
    Saturated,
    /// Admit this job, then tick again after the short fixed delay.
    Admit(JobId),
    /// Nothing pending; stay idle until the next nudge.
    Idle,
}

/// Pure admission decision for one tick.
pub(crate) fn plan_tick(table: &JobTable, scheduler: &Scheduler, limit: usize) -> TickOutcome {
    if scheduler.is_paused() {
        return TickOutcome::Paused;
    }
    if table.active_count() >= limit {
        return TickOutcome::Saturated;
    }
    match table.next_pending() {
        Some(id) => TickOutcome::Admit(id),
        None => TickOutcome::Idle,
    }
}
