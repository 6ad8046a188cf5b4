// Locally persisted client state. The trait is the seam; sqlite backs the
// binary, the in-memory store backs tests and hosts without a database.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::{Serialize, de::DeserializeOwned};

/// Storage key of the lesson progress map.
pub const PROGRESS_KEY: &str = "savoa_progress_v1";
/// Storage key of the session bearer token.
pub const AUTH_TOKEN_KEY: &str = "savoa_auth_token";

#[async_trait::async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Read and decode a JSON value. A missing key is `Ok(None)`; a value that
/// fails to decode is an error so callers decide whether to reset it.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    match store.get(key).await? {
        None => Ok(None),
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
    }
}

pub async fn save_json<T: Serialize>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn json_helpers_round_trip_through_store() {
        let store = MemoryStore::default();
        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1u32);
        save_json(&store, "k", &value).await.unwrap();
        let back: Option<BTreeMap<String, u32>> = load_json(&store, "k").await.unwrap();
        assert_eq!(back, Some(value));
        let missing: Option<u32> = load_json(&store, "other").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn corrupt_json_is_an_error() {
        let store = MemoryStore::default();
        store.set("k", "{not json").await.unwrap();
        assert!(load_json::<u32>(&store, "k").await.is_err());
    }
}
