//! Error types the callers branch on.
//!
//! Plumbing (config, storage, startup) uses `anyhow`; the REST client and the
//! media controllers return these so the UI layer can tell a transient
//! network failure from a server rejection or a broken audio graph.

use thiserror::Error;

/// Failure of a single REST call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server answered with a non-2xx status.
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        /// Parsed JSON body, the raw text as a JSON string, or null when empty
        payload: serde_json::Value,
    },

    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 2xx response whose body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Build a status error from a failed response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let payload = if body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(body)
                .unwrap_or_else(|_| serde_json::Value::String(body.to_string()))
        };
        let message = payload
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("API Error {}", status));
        ApiError::Status {
            status,
            message,
            payload,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) => None,
        }
    }

    /// Value of a string field in the error payload, e.g. the `error` token
    /// returned by the reset-password endpoint.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        match self {
            ApiError::Status { payload, .. } => payload.get(field).and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// Failure inside a media controller or its platform backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Adaptive-stream engine could not be constructed or could not load the source.
    #[error("failed to attach stream: {0}")]
    AttachFailed(String),

    /// Audio context or routing graph could not be established.
    #[error("audio graph error: {0}")]
    AudioGraph(String),

    /// The underlying media element rejected an operation.
    #[error("media element error: {0}")]
    Element(String),

    /// `play()` was interrupted by a pause or source change. Never reported to the user.
    #[error("playback aborted")]
    Aborted,
}

/// Failure to open a lesson. Only the metadata request is fatal; a missing
/// playback payload still yields a lesson without a video.
#[derive(Error, Debug)]
pub enum LessonLoadError {
    #[error("lesson {0} not found")]
    NotFound(String),

    #[error("failed to load lesson: {0}")]
    Fetch(#[source] ApiError),
}

impl LessonLoadError {
    pub fn from_api(lesson_id: &str, err: ApiError) -> Self {
        match err.status() {
            Some(404) => LessonLoadError::NotFound(lesson_id.to_string()),
            _ => LessonLoadError::Fetch(err),
        }
    }
}
