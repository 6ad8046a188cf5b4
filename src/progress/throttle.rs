use std::time::{Duration, Instant};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(12);

/// Caller-side gate in front of [`super::ProgressSync::heartbeat`].
///
/// A position is let through only when at least `interval` of wall-clock time
/// passed since the last one that was let through and the whole-second value
/// strictly increased.
#[derive(Debug, Clone)]
pub struct HeartbeatThrottle {
    interval: Duration,
    last_sent_at: Option<Instant>,
    last_sent_seconds: u64,
}

impl Default for HeartbeatThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

impl HeartbeatThrottle {
    pub fn new(interval: Duration) -> Self {
        HeartbeatThrottle {
            interval,
            last_sent_at: None,
            last_sent_seconds: 0,
        }
    }

    /// Decide whether `seconds` observed at `now` should be sent, recording it if so.
    pub fn should_send(&mut self, seconds: u64, now: Instant) -> bool {
        if let Some(at) = self.last_sent_at {
            if now.saturating_duration_since(at) < self.interval {
                return false;
            }
        }
        if seconds <= self.last_sent_seconds {
            return false;
        }
        self.last_sent_at = Some(now);
        self.last_sent_seconds = seconds;
        true
    }

    pub fn last_sent_seconds(&self) -> u64 {
        self.last_sent_seconds
    }
}
