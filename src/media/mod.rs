//! Playback controllers. The platform (video element, adaptive-stream engine,
//! audio graph) sits behind traits; everything here is single-threaded and
//! driven by the host's event loop.

pub mod ambient;
mod source;
pub mod video;

pub use ambient::{AMBIENT_FIXED_GAIN, AmbientKind, MAIN_FIXED_VOLUME, MeditationItem, MeditationPlayer};
pub use source::{PLAY_URL_KEYS, VideoSource, find_url, is_hls_url, resolve_play_source};
pub use video::{PlayerOutput, SourceKind, VideoPlayer};

/// `m:ss` label for a position in seconds. Non-finite or negative values read `0:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
