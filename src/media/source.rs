use serde_json::Value;

/// Keys searched for a playable URL, in priority order.
pub const PLAY_URL_KEYS: [&str; 6] = ["url", "src", "playback", "mp4", "hls", "cloudflare"];

/// A playable location and how it must be played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    pub url: String,
    /// Adaptive (HLS playlist) rather than a direct file.
    pub is_hls: bool,
}

impl VideoSource {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let is_hls = is_hls_url(&url);
        VideoSource { url, is_hls }
    }
}

/// Depth-first search for the first non-empty string.
///
/// Strings match directly, arrays are searched element by element, objects
/// key by key in [`PLAY_URL_KEYS`] order with each key's whole subtree
/// searched before the next key.
pub fn find_url(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(find_url),
        Value::Object(map) => PLAY_URL_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(find_url),
        _ => None,
    }
}

/// Resolve the payload of `GET /lessons/{id}/play`. The search starts at the
/// `cloudflare` object when the payload has a truthy one.
pub fn resolve_play_source(payload: &Value) -> Option<VideoSource> {
    let root = match payload.get("cloudflare") {
        Some(cf) if is_truthy(cf) => cf,
        _ => payload,
    };
    let url = find_url(root)?;
    Some(VideoSource::new(url))
}

/// True when the URL path, ignoring query and fragment, names an HLS playlist.
pub fn is_hls_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".m3u8")
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_cloudflare_hls() {
        let src = resolve_play_source(&json!({ "cloudflare": { "hls": "https://x/a.m3u8" } }));
        assert_eq!(
            src,
            Some(VideoSource {
                url: "https://x/a.m3u8".into(),
                is_hls: true
            })
        );
    }

    #[test]
    fn direct_mp4() {
        let src = resolve_play_source(&json!({ "mp4": "https://x/a.mp4" }));
        assert_eq!(
            src,
            Some(VideoSource {
                url: "https://x/a.mp4".into(),
                is_hls: false
            })
        );
    }

    #[test]
    fn priority_beats_depth() {
        // `src` outranks `hls`, so its deep match wins over the shallow one
        let payload = json!({
            "hls": "https://x/shallow.m3u8",
            "src": { "playback": [null, { "url": "https://x/deep.mp4" }] }
        });
        assert_eq!(find_url(&payload), Some("https://x/deep.mp4"));

        // subtrees under unknown keys are never searched
        let payload = json!({
            "hls": "https://x/shallow.m3u8",
            "src": { "list": [{ "url": "https://x/hidden.mp4" }] }
        });
        assert_eq!(find_url(&payload), Some("https://x/shallow.m3u8"));
    }

    #[test]
    fn empty_and_unknown_keys_are_skipped() {
        let payload = json!({ "url": "", "poster": "https://x/p.jpg", "playback": ["", "https://x/b.mp4"] });
        assert_eq!(find_url(&payload), Some("https://x/b.mp4"));
        assert_eq!(find_url(&json!({ "poster": "https://x/p.jpg" })), None);
        assert_eq!(resolve_play_source(&json!(null)), None);
    }

    #[test]
    fn falsy_cloudflare_searches_root() {
        let payload = json!({ "cloudflare": null, "url": "https://x/v.mp4" });
        assert_eq!(resolve_play_source(&payload).unwrap().url, "https://x/v.mp4");
    }

    #[test]
    fn hls_detection_ignores_query() {
        assert!(is_hls_url("https://x/a.M3U8?token=1"));
        assert!(!is_hls_url("https://x/a.mp4?format=m3u8"));
        assert!(!is_hls_url("https://x/a.m3u8.mp4"));
    }
}
