// Pure reconciliation rules. No I/O here so they can be tested on their own.

use super::{BackendLessonProgress, ProgressMap, ProgressRecord};

/// Merge a server snapshot into a copy of the local map.
///
/// `seconds = max(local, server)`, `completed = local || server`, and the
/// server's `updated_at` replaces the local one when present.
pub fn merge_progress(local: &ProgressMap, server_rows: &[BackendLessonProgress]) -> ProgressMap {
    let mut out = local.clone();
    for row in server_rows {
        merge_row(&mut out, row);
    }
    out
}

/// Merge one server row in place.
pub fn merge_row(map: &mut ProgressMap, row: &BackendLessonProgress) {
    let entry = map.entry(row.lesson_id.clone()).or_default();
    entry.seconds = entry.seconds.max(row.seconds_watched);
    entry.completed = entry.completed || row.completed;
    if row.updated_at.is_some() {
        entry.updated_at = row.updated_at;
    }
}

/// Apply a local playback observation (heartbeat or completion) and return the
/// resulting record. `completed` can only raise the flag.
pub fn apply_local(
    map: &mut ProgressMap,
    lesson_id: &str,
    seconds: u64,
    completed: bool,
) -> ProgressRecord {
    let entry = map.entry(lesson_id.to_string()).or_default();
    entry.seconds = entry.seconds.max(seconds);
    entry.completed = entry.completed || completed;
    entry.clone()
}
