//! Lesson watch-progress: the record model, the conflict-free merge, the
//! local/remote [`ProgressSync`] repository and the caller-side heartbeat
//! throttle.
//!
//! Reconciliation is value-wise rather than timestamp-wise: `seconds` only
//! grows (max) and `completed` only flips to true (OR), so applying the same
//! server snapshot twice, or snapshots in any order, never regresses state.

mod merge;
mod sync;
mod throttle;
mod tracker;

pub use merge::{apply_local, merge_progress, merge_row};
pub use sync::{ProgressRemote, ProgressSync};
pub use throttle::{DEFAULT_HEARTBEAT_INTERVAL, HeartbeatThrottle};
pub use tracker::LessonWatchTracker;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api_client::de;

/// Progress of one lesson as kept in the local cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Furthest watched offset in whole seconds. Never decreases.
    #[serde(default, deserialize_with = "de::seconds")]
    pub seconds: u64,
    /// Sticky: once true it stays true.
    #[serde(default, deserialize_with = "de::bool_or_null")]
    pub completed: bool,
    /// Last server-side update marker. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Lesson id -> progress. Ordered so snapshots compare and serialize deterministically.
pub type ProgressMap = BTreeMap<String, ProgressRecord>;

/// One row of `GET /progress`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendLessonProgress {
    #[serde(deserialize_with = "de::id_from_str_or_num")]
    pub lesson_id: String,
    #[serde(default, deserialize_with = "de::seconds")]
    pub seconds_watched: u64,
    #[serde(default, deserialize_with = "de::bool_or_null")]
    pub completed: bool,
    #[serde(default, deserialize_with = "de::opt_datetime_lenient")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Whole, non-negative seconds from a player-reported position.
pub fn normalize_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    }
}

/// Number of lessons marked completed.
pub fn completed_count(map: &ProgressMap) -> usize {
    map.values().filter(|r| r.completed).count()
}
