use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use super::{HeartbeatThrottle, ProgressSync, normalize_seconds};
use crate::media::PlayerOutput;

/// Connects one lesson's video player to [`ProgressSync`]: throttled
/// heartbeats while it plays, a completion when it ends.
pub struct LessonWatchTracker {
    sync: Arc<ProgressSync>,
    lesson_id: String,
    throttle: HeartbeatThrottle,
}

impl LessonWatchTracker {
    pub fn new(sync: Arc<ProgressSync>, lesson_id: impl Into<String>, interval: Duration) -> Self {
        LessonWatchTracker {
            sync,
            lesson_id: lesson_id.into(),
            throttle: HeartbeatThrottle::new(interval),
        }
    }

    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    /// Player time update. Returns the push task when a heartbeat was sent.
    pub async fn on_time(&mut self, seconds: f64, now: Instant) -> Option<JoinHandle<()>> {
        let s = normalize_seconds(seconds);
        if !self.throttle.should_send(s, now) {
            return None;
        }
        Some(self.sync.heartbeat(&self.lesson_id, s as f64).await)
    }

    /// End of stream. Always recorded, regardless of the throttle.
    pub async fn on_ended(&mut self, seconds: f64) -> JoinHandle<()> {
        tracing::info!(lesson_id = %self.lesson_id, seconds, "lesson finished");
        self.sync.complete(&self.lesson_id, seconds).await
    }

    /// Route a player notification.
    pub async fn handle(&mut self, output: PlayerOutput, now: Instant) -> Option<JoinHandle<()>> {
        match output {
            PlayerOutput::Time(seconds) => self.on_time(seconds, now).await,
            PlayerOutput::Ended(seconds) => Some(self.on_ended(seconds).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::sync::tests::FakeRemote;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn throttled_heartbeats_then_completion() {
        let remote = Arc::new(FakeRemote::default());
        let sync = Arc::new(ProgressSync::load(Arc::new(MemoryStore::default()), remote.clone()).await);
        let mut tracker = LessonWatchTracker::new(sync.clone(), "L1", Duration::from_secs(12));
        let t0 = Instant::now();

        let mut handles = Vec::new();
        handles.extend(tracker.handle(PlayerOutput::Time(5.2), t0).await);
        handles.extend(
            tracker
                .handle(PlayerOutput::Time(10.0), t0 + Duration::from_secs(5))
                .await,
        );
        handles.extend(
            tracker
                .handle(PlayerOutput::Time(20.0), t0 + Duration::from_secs(13))
                .await,
        );
        handles.extend(
            tracker
                .handle(PlayerOutput::Ended(61.0), t0 + Duration::from_secs(14))
                .await,
        );
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(
            remote.pushes(),
            vec![
                ("L1".to_string(), 5, None),
                ("L1".to_string(), 20, None),
                ("L1".to_string(), 61, Some(true)),
            ]
        );
        let rec = sync.get("L1").unwrap();
        assert_eq!(rec.seconds, 61);
        assert!(rec.completed);
    }
}
