use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::{
    BackendLessonProgress, ProgressMap, ProgressRecord, apply_local, completed_count,
    merge_progress, normalize_seconds,
};
use crate::api_client::SavoaClient;
use crate::error::ApiError;
use crate::storage::{self, LocalStore, PROGRESS_KEY};

/// Remote side of progress reconciliation.
#[async_trait::async_trait]
pub trait ProgressRemote: Send + Sync {
    async fn fetch_progress(&self) -> Result<Vec<BackendLessonProgress>, ApiError>;
    async fn push_progress(
        &self,
        lesson_id: &str,
        seconds_watched: u64,
        completed: Option<bool>,
    ) -> Result<(), ApiError>;
}

#[async_trait::async_trait]
impl ProgressRemote for SavoaClient {
    async fn fetch_progress(&self) -> Result<Vec<BackendLessonProgress>, ApiError> {
        self.get_progress().await
    }

    async fn push_progress(
        &self,
        lesson_id: &str,
        seconds_watched: u64,
        completed: Option<bool>,
    ) -> Result<(), ApiError> {
        SavoaClient::push_progress(self, lesson_id, seconds_watched, completed).await
    }
}

/// Offline-first lesson progress shared by every screen.
///
/// The local cache answers all reads. Mutations update it first, persist it,
/// then push to the server in a detached task whose failure is only logged;
/// the next heartbeat carries a fresher value anyway. Local writes are
/// serialized in call order by the state mutex.
pub struct ProgressSync {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn ProgressRemote>,
    state: Mutex<ProgressMap>,
    map_tx: watch::Sender<ProgressMap>,
    ready_tx: watch::Sender<bool>,
}

impl ProgressSync {
    /// Open the repository from the local cache. A corrupt cache starts empty.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn load(store: Arc<dyn LocalStore>, remote: Arc<dyn ProgressRemote>) -> Self {
        let map = match storage::load_json::<ProgressMap>(store.as_ref(), PROGRESS_KEY).await {
            Ok(map) => map.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "local progress unreadable, starting empty");
                ProgressMap::new()
            }
        };
        tracing::debug!(lessons = map.len(), "loaded local progress");
        let (map_tx, _) = watch::channel(map.clone());
        let (ready_tx, _) = watch::channel(false);
        ProgressSync {
            store,
            remote,
            state: Mutex::new(map),
            map_tx,
            ready_tx,
        }
    }

    /// Fetch the server snapshot and merge it into the local map.
    ///
    /// Network and decode failures are logged and swallowed; the local map
    /// stays authoritative. The sync is marked ready on every path.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn pull_and_merge(&self) {
        match self.remote.fetch_progress().await {
            Ok(rows) => {
                let mut map = self.state.lock().await;
                let merged = merge_progress(&map, &rows);
                *map = merged;
                self.persist(&map).await;
                self.map_tx.send_replace(map.clone());
                tracing::info!(rows = rows.len(), lessons = map.len(), "merged server progress");
            }
            Err(e) => {
                tracing::warn!(error = %e, "progress pull failed, keeping local state");
            }
        }
        self.ready_tx.send_replace(true);
    }

    /// Record playback position. Local update is immediate; the push is detached.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn heartbeat(&self, lesson_id: &str, seconds: f64) -> JoinHandle<()> {
        let seconds = normalize_seconds(seconds);
        self.write_local(lesson_id, seconds, false).await;
        self.spawn_push(lesson_id, seconds, None)
    }

    /// Mark a lesson finished. The only way `completed` becomes true locally.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn complete(&self, lesson_id: &str, seconds: f64) -> JoinHandle<()> {
        let seconds = normalize_seconds(seconds);
        self.write_local(lesson_id, seconds, true).await;
        self.spawn_push(lesson_id, seconds, Some(true))
    }

    async fn write_local(&self, lesson_id: &str, seconds: u64, completed: bool) -> ProgressRecord {
        let mut map = self.state.lock().await;
        let record = apply_local(&mut map, lesson_id, seconds, completed);
        self.persist(&map).await;
        self.map_tx.send_replace(map.clone());
        record
    }

    async fn persist(&self, map: &ProgressMap) {
        if let Err(e) = storage::save_json(self.store.as_ref(), PROGRESS_KEY, map).await {
            tracing::warn!(error = %e, "failed to persist local progress");
        }
    }

    fn spawn_push(&self, lesson_id: &str, seconds: u64, completed: Option<bool>) -> JoinHandle<()> {
        let remote = Arc::clone(&self.remote);
        let lesson_id = lesson_id.to_string();
        tokio::spawn(async move {
            match remote.push_progress(&lesson_id, seconds, completed).await {
                Ok(()) => tracing::debug!(%lesson_id, seconds, "progress pushed"),
                Err(e) => {
                    tracing::warn!(%lesson_id, seconds, error = %e, "progress push failed")
                }
            }
        })
    }

    /// Current map.
    pub fn snapshot(&self) -> ProgressMap {
        self.map_tx.borrow().clone()
    }

    pub fn get(&self, lesson_id: &str) -> Option<ProgressRecord> {
        self.map_tx.borrow().get(lesson_id).cloned()
    }

    pub fn completed_count(&self) -> usize {
        completed_count(&self.map_tx.borrow())
    }

    /// Receive every new map after a mutation or merge.
    pub fn subscribe(&self) -> watch::Receiver<ProgressMap> {
        self.map_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Resolve once the first pull attempt finished, successful or not.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Mutex as StdMutex;

    /// Remote double recording pushes and replaying a fixed snapshot.
    #[derive(Default)]
    pub(crate) struct FakeRemote {
        pub rows: StdMutex<Option<Vec<BackendLessonProgress>>>,
        pub pushes: StdMutex<Vec<(String, u64, Option<bool>)>>,
        pub fail_push: bool,
    }

    impl FakeRemote {
        pub fn with_rows(rows: Vec<BackendLessonProgress>) -> Self {
            FakeRemote {
                rows: StdMutex::new(Some(rows)),
                ..Default::default()
            }
        }

        pub fn pushes(&self) -> Vec<(String, u64, Option<bool>)> {
            self.pushes.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ProgressRemote for FakeRemote {
        async fn fetch_progress(&self) -> Result<Vec<BackendLessonProgress>, ApiError> {
            match self.rows.lock().unwrap().clone() {
                Some(rows) => Ok(rows),
                None => Err(ApiError::from_response(503, "")),
            }
        }

        async fn push_progress(
            &self,
            lesson_id: &str,
            seconds_watched: u64,
            completed: Option<bool>,
        ) -> Result<(), ApiError> {
            self.pushes
                .lock()
                .unwrap()
                .push((lesson_id.to_string(), seconds_watched, completed));
            if self.fail_push {
                Err(ApiError::from_response(500, r#"{"message":"boom"}"#))
            } else {
                Ok(())
            }
        }
    }

    fn row(id: &str, seconds: u64, completed: bool) -> BackendLessonProgress {
        BackendLessonProgress {
            lesson_id: id.into(),
            seconds_watched: seconds,
            completed,
            updated_at: None,
        }
    }

    async fn sync_with(
        store: Arc<MemoryStore>,
        remote: Arc<FakeRemote>,
    ) -> ProgressSync {
        ProgressSync::load(store, remote).await
    }

    #[tokio::test]
    async fn heartbeat_updates_local_persists_and_pushes() {
        let store = Arc::new(MemoryStore::default());
        let remote = Arc::new(FakeRemote::default());
        let sync = sync_with(store.clone(), remote.clone()).await;

        sync.heartbeat("L1", 40.8).await.await.unwrap();

        assert_eq!(sync.get("L1").unwrap().seconds, 40);
        let persisted: ProgressMap = storage::load_json(store.as_ref(), PROGRESS_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted["L1"].seconds, 40);
        assert_eq!(remote.pushes(), vec![("L1".to_string(), 40, None)]);
    }

    #[tokio::test]
    async fn heartbeat_never_lowers_seconds() {
        let sync = sync_with(Arc::default(), Arc::default()).await;
        sync.heartbeat("L1", 50.0).await;
        sync.heartbeat("L1", 20.0).await;
        assert_eq!(sync.get("L1").unwrap().seconds, 50);
    }

    #[tokio::test]
    async fn push_failure_keeps_local_state() {
        let remote = Arc::new(FakeRemote {
            fail_push: true,
            ..Default::default()
        });
        let sync = sync_with(Arc::default(), remote.clone()).await;
        sync.complete("L1", 300.0).await.await.unwrap();
        let rec = sync.get("L1").unwrap();
        assert!(rec.completed);
        assert_eq!(rec.seconds, 300);
        assert_eq!(remote.pushes(), vec![("L1".to_string(), 300, Some(true))]);
    }

    #[tokio::test]
    async fn completion_survives_stale_server_snapshot() {
        let remote = Arc::new(FakeRemote::with_rows(vec![row("L1", 10, false)]));
        let sync = sync_with(Arc::default(), remote).await;
        sync.complete("L1", 120.0).await;
        sync.pull_and_merge().await;
        let rec = sync.get("L1").unwrap();
        assert!(rec.completed);
        assert_eq!(rec.seconds, 120);
        assert_eq!(sync.completed_count(), 1);
    }

    #[tokio::test]
    async fn pull_merges_into_loaded_cache() {
        let store = Arc::new(MemoryStore::default());
        store
            .set(PROGRESS_KEY, r#"{"L1":{"seconds":40,"completed":false}}"#)
            .await
            .unwrap();
        let remote = Arc::new(FakeRemote::with_rows(vec![
            row("L1", 999, true),
            row("L2", 15, false),
        ]));
        let sync = sync_with(store.clone(), remote).await;
        assert!(!sync.is_ready());

        sync.pull_and_merge().await;

        assert!(sync.is_ready());
        assert_eq!(sync.get("L1").unwrap().seconds, 999);
        assert!(sync.get("L1").unwrap().completed);
        assert_eq!(sync.get("L2").unwrap().seconds, 15);
        let raw = store.get(PROGRESS_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"L2\""));
    }

    #[tokio::test]
    async fn failed_pull_still_marks_ready() {
        let remote = Arc::new(FakeRemote::default());
        let sync = sync_with(Arc::default(), remote).await;
        sync.heartbeat("L1", 7.0).await;
        sync.pull_and_merge().await;
        sync.wait_ready().await;
        assert!(sync.is_ready());
        assert_eq!(sync.get("L1").unwrap().seconds, 7);
    }

    #[tokio::test]
    async fn corrupt_cache_starts_empty() {
        let store = Arc::new(MemoryStore::default());
        store.set(PROGRESS_KEY, "[[[").await.unwrap();
        let sync = sync_with(store, Arc::default()).await;
        assert!(sync.snapshot().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_completed_count_change() {
        let sync = sync_with(Arc::default(), Arc::default()).await;
        let mut rx = sync.subscribe();
        sync.complete("L1", 1.0).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(completed_count(&rx.borrow_and_update()), 1);
    }

    #[tokio::test]
    async fn interleaved_operations_keep_seconds_monotonic() {
        let remote = Arc::new(FakeRemote::with_rows(vec![row("L1", 35, false)]));
        let sync = sync_with(Arc::default(), remote).await;
        let mut last = 0;
        for step in 0..6 {
            match step % 3 {
                0 => drop(sync.heartbeat("L1", (step * 10) as f64).await),
                1 => sync.pull_and_merge().await,
                _ => drop(sync.complete("L1", 5.0).await),
            }
            let now = sync.get("L1").unwrap().seconds;
            assert!(now >= last, "regressed from {last} to {now}");
            last = now;
        }
        assert!(sync.get("L1").unwrap().completed);
    }

    #[tokio::test]
    async fn syncs_against_rest_backend() {
        use serde_json::json;
        use std::time::Duration;
        use wiremock::matchers::{body_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/progress"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/progress"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "progress": [{
                    "lesson_id": "L1",
                    "seconds_watched": 999,
                    "completed": true,
                    "updated_at": "2025-03-01T10:00:00Z"
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/lessons/L1/progress"))
            .and(body_json(json!({ "seconds_watched": 1000, "completed": true })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::default());
        store
            .set(PROGRESS_KEY, r#"{"L1":{"seconds":40,"completed":false}}"#)
            .await
            .unwrap();
        let client = SavoaClient::new(server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_token("tok");
        let sync = ProgressSync::load(store, Arc::new(client)).await;

        sync.pull_and_merge().await;
        assert!(sync.is_ready());
        assert_eq!(sync.get("L1").unwrap().seconds, 40);

        sync.pull_and_merge().await;
        let rec = sync.get("L1").unwrap();
        assert_eq!(rec.seconds, 999);
        assert!(rec.completed);

        sync.complete("L1", 1000.4).await.await.unwrap();
        assert_eq!(sync.get("L1").unwrap().seconds, 1000);
        server.verify().await;
    }
}
