use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{error, info};

pub const DEFAULT_NOTIFICATION_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Error => "error",
        })
    }
}

/// A transient toast message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Holds toasts until they expire; newest last.
#[derive(Debug)]
pub struct Notifier {
    ttl: Duration,
    entries: Vec<Notification>,
}

impl Notifier {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::milliseconds(3000)),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        match level {
            Level::Error => error!(%message, "notification"),
            _ => info!(%level, %message, "notification"),
        }
        self.entries.push(Notification {
            level,
            message,
            expires_at: now + self.ttl,
        });
    }

    /// Toasts still visible at `now`; expired ones are dropped.
    pub fn active(&mut self, now: DateTime<Utc>) -> &[Notification] {
        self.entries.retain(|n| n.expires_at > now);
        &self.entries
    }

    /// Removes and returns everything, expired or not.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn notifications_expire_after_ttl() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let mut n = Notifier::new(std::time::Duration::from_millis(DEFAULT_NOTIFICATION_MS));
        n.push(Level::Success, "Quest log exported successfully", t0);
        n.push(Level::Error, "Failed to load quest log", t0 + Duration::seconds(2));

        assert_eq!(n.active(t0 + Duration::milliseconds(2999)).len(), 2);
        let remaining = n.active(t0 + Duration::seconds(3));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].level, Level::Error);
        assert!(n.active(t0 + Duration::seconds(5)).is_empty());
    }

    #[test]
    fn drain_empties_queue() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let mut n = Notifier::new(std::time::Duration::from_secs(3));
        n.push(Level::Info, "hello", t0);
        let drained = n.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].message, "hello");
        assert!(n.drain().is_empty());
    }
}
