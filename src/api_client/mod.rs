mod models;

pub use models::*;

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::progress::BackendLessonProgress;

pub const DEFAULT_BASE_URL: &str = "https://api.savoa.kz/api";

#[derive(Clone, Debug)]
pub struct SavoaClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl SavoaClient {
    /// Create a new client with the given base URL (e.g. "https://api.savoa.kz/api").
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating SavoaClient");
        Ok(SavoaClient {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            token: None,
            client,
        })
    }

    /// Return a client with the provided session token set (Bearer)
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Return a client without credentials, sharing the connection pool.
    pub fn anonymous(&self) -> Self {
        SavoaClient {
            base_url: self.base_url.clone(),
            token: None,
            client: self.client.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn auth_header(&self) -> Option<(String, String)> {
        self.token
            .as_ref()
            .map(|t| ("Authorization".to_string(), format!("Bearer {}", t)))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let mut req = req.header("Accept", "application/json");
        if let Some((k, v)) = self.auth_header() {
            req = req.header(&k, &v);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "request rejected");
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
        let body = if body.trim().is_empty() { "null" } else { body };
        match serde_json::from_str::<T>(body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                let snippet_len = body.len().min(2000);
                let snippet = body.get(..snippet_len).unwrap_or(body);
                tracing::error!(error = %e, body_snippet = %snippet, "failed to parse response");
                Err(e.into())
            }
        }
    }

    /// GET /progress
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_progress(&self) -> Result<Vec<BackendLessonProgress>, ApiError> {
        let url = self.url("/progress");
        tracing::debug!(%url, "GET progress");
        let body = self.send(self.client.get(&url)).await?;
        let parsed: Option<ProgressEnvelope> = Self::decode(&body)?;
        Ok(parsed.map(|p| p.progress).unwrap_or_default())
    }

    /// POST /lessons/{id}/progress
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn push_progress(
        &self,
        lesson_id: &str,
        seconds_watched: u64,
        completed: Option<bool>,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("/lessons/{}/progress", lesson_id));
        tracing::debug!(%url, seconds_watched, ?completed, "POST progress");
        let body = PushProgressBody {
            seconds_watched,
            completed,
        };
        self.send(self.client.post(&url).json(&body)).await?;
        Ok(())
    }

    /// GET /lessons/{id}
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_lesson(&self, lesson_id: &str) -> Result<LessonMeta, ApiError> {
        let url = self.url(&format!("/lessons/{}", lesson_id));
        tracing::debug!(%url, "GET lesson");
        let body = self.send(self.client.get(&url)).await?;
        Self::decode(&body)
    }

    /// GET /lessons/{id}/play
    ///
    /// The payload is untyped; see [`crate::media::resolve_play_source`].
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_lesson_play(&self, lesson_id: &str) -> Result<serde_json::Value, ApiError> {
        let url = self.url(&format!("/lessons/{}/play", lesson_id));
        tracing::debug!(%url, "GET lesson play");
        let body = self.send(self.client.get(&url)).await?;
        Self::decode(&body)
    }

    /// GET /course/weeks
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_course_weeks(&self) -> Result<Vec<WeekResponse>, ApiError> {
        let url = self.url("/course/weeks");
        tracing::debug!(%url, "GET course weeks");
        let body = self.send(self.client.get(&url)).await?;
        let parsed: Option<Vec<WeekResponse>> = Self::decode(&body)?;
        Ok(parsed.unwrap_or_default())
    }

    /// GET /theory-lessons
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_theory_lessons(&self) -> Result<Vec<TheoryLesson>, ApiError> {
        let url = self.url("/theory-lessons");
        tracing::debug!(%url, "GET theory lessons");
        let body = self.send(self.client.get(&url)).await?;
        let parsed: Option<Vec<TheoryLesson>> = Self::decode(&body)?;
        Ok(parsed.unwrap_or_default())
    }

    /// POST /auth/login (no auth required)
    #[tracing::instrument(level = "debug", skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = self.url("/auth/login");
        let body = self
            .send(self.client.post(&url).json(&LoginBody { login, password }))
            .await?;
        Self::decode(&body)
    }

    /// GET /me
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_me(&self) -> Result<User, ApiError> {
        let url = self.url("/me");
        let body = self.send(self.client.get(&url)).await?;
        Self::decode(&body)
    }

    /// POST /auth/forgot-password (no auth required)
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let url = self.url("/auth/forgot-password");
        self.send(self.client.post(&url).json(&ForgotPasswordBody { email }))
            .await?;
        Ok(())
    }

    /// POST /auth/reset-password (no auth required)
    #[tracing::instrument(level = "debug", skip(self, token, new_password))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let url = self.url("/auth/reset-password");
        self.send(
            self.client
                .post(&url)
                .json(&ResetPasswordBody { token, new_password }),
        )
        .await?;
        Ok(())
    }
}

/// Internal serde helpers
pub mod de {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Int(i64),
        Float(f64),
        Str(String),
    }

    /// Accept an identifier given either as a string or as a number.
    pub fn id_from_str_or_num<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match NumOrStr::deserialize(deserializer)? {
            NumOrStr::Int(n) => n.to_string(),
            NumOrStr::Float(f) => f.to_string(),
            NumOrStr::Str(s) => s,
        })
    }

    /// Whole non-negative seconds from a number or numeric string; null, negatives
    /// and garbage become 0, fractions are floored.
    pub fn seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val: Option<NumOrStr> = Option::deserialize(deserializer)?;
        let raw = match val {
            None => 0.0,
            Some(NumOrStr::Int(n)) => n as f64,
            Some(NumOrStr::Float(f)) => f,
            Some(NumOrStr::Str(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        };
        Ok(crate::progress::normalize_seconds(raw))
    }

    /// `null` reads as `false`.
    pub fn bool_or_null<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
    }

    /// `null` reads as an empty list.
    pub fn vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// RFC 3339 or naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` (taken as UTC); anything else is None.
    pub fn opt_datetime_lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val: Option<String> = Option::deserialize(deserializer)?;
        Ok(val.and_then(|s| parse_timestamp(s.trim())))
    }

    pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
        if s.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SavoaClient {
        SavoaClient::new(server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_token("tok")
    }

    #[test]
    fn build_url_trims_trailing_slash() {
        let c = SavoaClient::new("https://api.savoa.kz/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.url("/progress"), "https://api.savoa.kz/api/progress");
        assert_eq!(c.url("lessons/7"), "https://api.savoa.kz/api/lessons/7");
    }

    #[test]
    fn lesson_meta_deserialize_example() {
        let json = r#"{
            "id": 42,
            "title": "Breathing basics",
            "description": null,
            "duration": 312.5,
            "thumbnail_url": "https://cdn/x.jpg",
            "completed": null,
            "is_locked": true,
            "week_id": "w1"
        }"#;
        let meta: LessonMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id, "42");
        assert!(meta.is_locked);
        assert!(!meta.completed);
        assert_eq!(meta.duration, Some(312.5));
        assert_eq!(meta.extra.get("week_id"), Some(&json!("w1")));
    }

    #[test]
    fn progress_rows_are_lenient() {
        let json = r#"{ "progress": [
            { "lesson_id": "L1", "seconds_watched": 40.9, "completed": false, "updated_at": "2025-03-01T10:00:00Z" },
            { "lesson_id": 7, "seconds_watched": -3, "completed": null, "updated_at": "garbage" },
            { "lesson_id": "L3" }
        ] }"#;
        let env: ProgressEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.progress.len(), 3);
        assert_eq!(env.progress[0].seconds_watched, 40);
        assert!(env.progress[0].updated_at.is_some());
        assert_eq!(env.progress[1].lesson_id, "7");
        assert_eq!(env.progress[1].seconds_watched, 0);
        assert_eq!(env.progress[1].updated_at, None);
        assert!(!env.progress[2].completed);
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let dt = de::parse_timestamp("2025-03-01 10:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-03-01T10:00:00+00:00");
        assert!(de::parse_timestamp("").is_none());
    }

    #[tokio::test]
    async fn get_progress_sends_bearer_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/progress"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "progress": [{ "lesson_id": "L1", "seconds_watched": 30, "completed": true }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client_for(&server).get_progress().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lesson_id, "L1");
        assert!(rows[0].completed);
    }

    #[tokio::test]
    async fn get_progress_without_list_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/progress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        assert!(client_for(&server).get_progress().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_progress_heartbeat_sends_null_completed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/lessons/L1/progress"))
            .and(body_json(json!({ "seconds_watched": 25, "completed": null })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .push_progress("L1", 25, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_status_carries_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lessons/nope"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "lesson not found" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).get_lesson("nope").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "lesson not found");
    }

    #[tokio::test]
    async fn anonymous_client_sends_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/forgot-password"))
            .and(body_json(json!({ "email": "a@b.c" })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server).anonymous();
        assert!(!client.has_token());
        client.forgot_password("a@b.c").await.unwrap();
        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("authorization").is_none());
    }
}
