//! Debounced auto-save state machine.
//!
//! `Idle -> Pending` on every mutation (the timer restarts), `Pending ->
//! Flushing` when the deadline passes or an immediate flush is requested,
//! `Flushing -> Idle` once the save returns. A mutation reported while a
//! save is in flight queues a new timer that takes over when the flush ends.
//! The scheduler never holds log data: the save reads the store at flush
//! time, so whatever changed meanwhile is included.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::trace;

use crate::types::LogId;

pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Saving,
    Unsaved,
    Failed,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveStatus::Saved => "All changes saved",
            SaveStatus::Saving => "Saving...",
            SaveStatus::Unsaved => "Unsaved changes...",
            SaveStatus::Failed => "Failed to save to server (using local backup)",
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Pending {
        log_id: LogId,
        deadline: DateTime<Utc>,
    },
    Flushing {
        log_id: LogId,
    },
}

#[derive(Debug)]
pub struct AutosaveScheduler {
    delay: Duration,
    state: SchedulerState,
    queued: Option<(LogId, DateTime<Utc>)>,
    status: SaveStatus,
}

impl AutosaveScheduler {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            delay: Duration::from_std(delay).unwrap_or_else(|_| Duration::milliseconds(2000)),
            state: SchedulerState::Idle,
            queued: None,
            status: SaveStatus::Saved,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn is_idle(&self) -> bool {
        self.state == SchedulerState::Idle
    }

    /// Restarts the debounce timer for `log_id`.
    pub fn schedule(&mut self, log_id: &str, now: DateTime<Utc>) {
        let deadline = now + self.delay;
        match &self.state {
            SchedulerState::Flushing { .. } => {
                self.queued = Some((log_id.to_string(), deadline));
            }
            _ => {
                self.state = SchedulerState::Pending {
                    log_id: log_id.to_string(),
                    deadline,
                };
            }
        }
        self.status = SaveStatus::Unsaved;
        trace!(log_id, %deadline, "auto-save scheduled");
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            SchedulerState::Pending { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// The log whose timer has expired at `now`, if any.
    pub fn due(&self, now: DateTime<Utc>) -> Option<&str> {
        match &self.state {
            SchedulerState::Pending { log_id, deadline } if *deadline <= now => Some(log_id),
            _ => None,
        }
    }

    /// Drops the pending timer and returns the log it was for.
    pub fn cancel(&mut self) -> Option<LogId> {
        match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Pending { log_id, .. } => Some(log_id),
            flushing @ SchedulerState::Flushing { .. } => {
                self.state = flushing;
                self.queued.take().map(|(log_id, _)| log_id)
            }
            SchedulerState::Idle => None,
        }
    }

    /// Forgets any timer for a log that no longer exists.
    pub fn discard(&mut self, log_id: &str) {
        let pending = match &self.state {
            SchedulerState::Pending { log_id: pending, .. } => Some(pending.as_str()),
            _ => None,
        };
        if pending == Some(log_id) {
            self.state = SchedulerState::Idle;
            self.status = SaveStatus::Saved;
        }
        if self.queued.as_ref().is_some_and(|(queued, _)| queued == log_id) {
            self.queued = None;
        }
    }

    /// A pending timer for the same log is absorbed by the flush; one for a
    /// different log is queued and resumes when the flush ends.
    pub fn begin_flush(&mut self, log_id: &str) {
        let previous = std::mem::replace(
            &mut self.state,
            SchedulerState::Flushing {
                log_id: log_id.to_string(),
            },
        );
        if let SchedulerState::Pending { log_id: other, deadline } = previous {
            if other != log_id {
                self.queued = Some((other, deadline));
            }
        }
        self.status = SaveStatus::Saving;
    }

    pub fn finish_flush(&mut self, remote_ok: bool) {
        self.status = if remote_ok {
            SaveStatus::Saved
        } else {
            SaveStatus::Failed
        };
        self.state = match self.queued.take() {
            Some((log_id, deadline)) => {
                self.status = SaveStatus::Unsaved;
                SchedulerState::Pending { log_id, deadline }
            }
            None => SchedulerState::Idle,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn scheduler() -> AutosaveScheduler {
        AutosaveScheduler::new(std::time::Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    #[test]
    fn starts_idle_and_saved() {
        let s = scheduler();
        assert!(s.is_idle());
        assert_eq!(s.status().to_string(), "All changes saved");
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn each_mutation_restarts_the_single_timer() {
        let mut s = scheduler();
        s.schedule("log", t0());
        s.schedule("log", t0() + Duration::milliseconds(1500));
        assert_eq!(s.status(), SaveStatus::Unsaved);
        assert_eq!(s.due(t0() + Duration::milliseconds(2000)), None);
        assert_eq!(s.due(t0() + Duration::milliseconds(3500)), Some("log"));
        assert_eq!(
            s.next_deadline(),
            Some(t0() + Duration::milliseconds(3500))
        );
    }

    #[test]
    fn flush_outcome_sets_status() {
        let mut s = scheduler();
        s.schedule("log", t0());
        s.begin_flush("log");
        assert_eq!(s.status().to_string(), "Saving...");
        s.finish_flush(false);
        assert!(s.is_idle());
        assert_eq!(
            s.status().to_string(),
            "Failed to save to server (using local backup)"
        );
        s.schedule("log", t0());
        s.begin_flush("log");
        s.finish_flush(true);
        assert_eq!(s.status(), SaveStatus::Saved);
    }

    #[test]
    fn mutation_during_flush_survives_it() {
        let mut s = scheduler();
        s.schedule("log", t0());
        s.begin_flush("log");
        s.schedule("log", t0() + Duration::milliseconds(100));
        assert!(matches!(s.state(), SchedulerState::Flushing { .. }));
        s.finish_flush(true);
        assert_eq!(s.status(), SaveStatus::Unsaved);
        assert_eq!(
            s.next_deadline(),
            Some(t0() + Duration::milliseconds(2100))
        );
    }

    #[test]
    fn flushing_another_log_keeps_pending_timer() {
        let mut s = scheduler();
        s.schedule("a", t0());
        s.begin_flush("b");
        s.finish_flush(true);
        assert_eq!(s.due(t0() + Duration::milliseconds(2000)), Some("a"));
        assert_eq!(s.status(), SaveStatus::Unsaved);
    }

    #[test]
    fn cancel_returns_pending_log() {
        let mut s = scheduler();
        assert_eq!(s.cancel(), None);
        s.schedule("log", t0());
        assert_eq!(s.cancel().as_deref(), Some("log"));
        assert!(s.is_idle());
    }

    #[test]
    fn discard_only_affects_matching_log() {
        let mut s = scheduler();
        s.schedule("a", t0());
        s.discard("b");
        assert!(!s.is_idle());
        s.discard("a");
        assert!(s.is_idle());
        assert_eq!(s.status(), SaveStatus::Saved);
    }
}
