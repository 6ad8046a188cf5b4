use std::sync::atomic::{AtomicU64, Ordering};

use crate::api_client::{LessonMeta, SavoaClient};
use crate::error::LessonLoadError;
use crate::media::{VideoSource, resolve_play_source};
use crate::progress::ProgressMap;

/// A lesson ready to be shown: metadata, completion and the playable source.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonDetail {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub notes: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Server flag (ignored while locked) OR local progress.
    pub completed: bool,
    pub is_locked: bool,
    /// None when locked or when the backend returned no usable URL.
    pub video: Option<VideoSource>,
}

impl LessonDetail {
    fn from_meta(meta: LessonMeta, progress: &ProgressMap, video: Option<VideoSource>) -> Self {
        let locally_completed = progress.get(&meta.id).is_some_and(|r| r.completed);
        LessonDetail {
            completed: (!meta.is_locked && meta.completed) || locally_completed,
            id: meta.id,
            title: meta.title,
            description: meta.description,
            duration: meta.duration,
            notes: meta.notes,
            thumbnail_url: meta.thumbnail_url,
            is_locked: meta.is_locked,
            video,
        }
    }

    /// Re-apply local progress, e.g. after the progress map changed.
    pub fn with_progress(mut self, progress: &ProgressMap) -> Self {
        self.completed = self.completed || progress.get(&self.id).is_some_and(|r| r.completed);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(LessonDetail),
    /// A newer `load` started before this one finished; the result was dropped.
    Superseded,
}

/// Loads lesson screens. Only the most recent `load` call delivers a result.
pub struct LessonLoader {
    client: SavoaClient,
    generation: AtomicU64,
}

impl LessonLoader {
    pub fn new(client: SavoaClient) -> Self {
        LessonLoader {
            client,
            generation: AtomicU64::new(0),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    #[tracing::instrument(level = "debug", skip(self, progress))]
    pub async fn load(
        &self,
        lesson_id: &str,
        progress: &ProgressMap,
    ) -> Result<LoadOutcome, LessonLoadError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let meta = match self.client.get_lesson(lesson_id).await {
            Ok(meta) => meta,
            Err(e) if !self.is_current(generation) => {
                tracing::debug!(error = %e, "superseded lesson load failed");
                return Ok(LoadOutcome::Superseded);
            }
            Err(e) => return Err(LessonLoadError::from_api(lesson_id, e)),
        };
        if !self.is_current(generation) {
            return Ok(LoadOutcome::Superseded);
        }

        let video = if meta.is_locked {
            tracing::debug!(lesson_id, "lesson locked, skipping play request");
            None
        } else {
            match self.client.get_lesson_play(lesson_id).await {
                Ok(payload) => {
                    let source = resolve_play_source(&payload);
                    if source.is_none() {
                        tracing::warn!(lesson_id, "play payload contains no playable url");
                    }
                    source
                }
                Err(e) => {
                    tracing::warn!(lesson_id, error = %e, "failed to fetch play source");
                    None
                }
            }
        };
        if !self.is_current(generation) {
            return Ok(LoadOutcome::Superseded);
        }

        Ok(LoadOutcome::Loaded(LessonDetail::from_meta(
            meta, progress, video,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressRecord;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn loader_for(server: &MockServer) -> LessonLoader {
        LessonLoader::new(
            SavoaClient::new(server.uri(), Duration::from_secs(5))
                .unwrap()
                .with_token("tok"),
        )
    }

    fn loaded(outcome: LoadOutcome) -> LessonDetail {
        match outcome {
            LoadOutcome::Loaded(detail) => detail,
            LoadOutcome::Superseded => panic!("load was superseded"),
        }
    }

    #[tokio::test]
    async fn cloudflare_keys_follow_priority_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lessons/L1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "L1", "title": "Breath", "completed": false, "is_locked": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lessons/L1/play"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cloudflare": { "hls": "https://cdn/x/manifest.m3u8", "mp4": "https://cdn/x.mp4" }
            })))
            .mount(&server)
            .await;

        let mut progress = ProgressMap::new();
        progress.insert(
            "L1".into(),
            ProgressRecord {
                seconds: 100,
                completed: true,
                updated_at: None,
            },
        );

        let detail = loaded(loader_for(&server).load("L1", &progress).await.unwrap());
        assert_eq!(detail.title.as_deref(), Some("Breath"));
        assert!(detail.completed);
        let video = detail.video.unwrap();
        assert_eq!(video.url, "https://cdn/x.mp4");
        assert!(!video.is_hls);
    }

    #[tokio::test]
    async fn locked_lesson_skips_play_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lessons/L2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "L2", "is_locked": true })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lessons/L2/play"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": "x.mp4" })))
            .expect(0)
            .mount(&server)
            .await;

        let detail = loaded(
            loader_for(&server)
                .load("L2", &ProgressMap::new())
                .await
                .unwrap(),
        );
        assert!(detail.is_locked);
        assert_eq!(detail.video, None);
    }

    #[tokio::test]
    async fn locked_lesson_ignores_server_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lessons/L4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "L4", "is_locked": true, "completed": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lessons/L5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "L5", "is_locked": true, "completed": false
            })))
            .mount(&server)
            .await;

        let mut progress = ProgressMap::new();
        progress.insert(
            "L5".into(),
            ProgressRecord {
                seconds: 30,
                completed: true,
                updated_at: None,
            },
        );

        let loader = loader_for(&server);
        assert!(!loaded(loader.load("L4", &progress).await.unwrap()).completed);
        assert!(loaded(loader.load("L5", &progress).await.unwrap()).completed);
    }

    #[tokio::test]
    async fn play_failure_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lessons/L3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 3 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lessons/L3/play"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let detail = loaded(
            loader_for(&server)
                .load("L3", &ProgressMap::new())
                .await
                .unwrap(),
        );
        assert_eq!(detail.id, "3");
        assert_eq!(detail.video, None);
    }

    #[tokio::test]
    async fn missing_lesson_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lessons/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = loader_for(&server)
            .load("nope", &ProgressMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LessonLoadError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn newer_load_supersedes_older() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lessons/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "slow", "is_locked": true }))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lessons/fast"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "fast", "is_locked": true })),
            )
            .mount(&server)
            .await;

        let loader = Arc::new(loader_for(&server));
        let slow = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load("slow", &ProgressMap::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = loader.load("fast", &ProgressMap::new()).await.unwrap();

        assert_eq!(loaded(fast).id, "fast");
        assert_eq!(slow.await.unwrap().unwrap(), LoadOutcome::Superseded);
    }
}
