//! Durable key-value boundary.
//!
//! Everything persisted by the reader goes through [`KeyValueStore`]: the
//! feed cache document and the player's state documents, each stored as one
//! JSON string under a fixed key.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> anyhow::Result<()>;
}

/// Process-local store, used by tests and as a scratch backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Reads the JSON object stored under `key`.
///
/// Absent or malformed documents read as an empty object.
pub async fn get_state(store: &dyn KeyValueStore, key: &str) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(Map::new());
    };

    match serde_json::from_str::<Map<String, Value>>(&raw) {
        Ok(state) => Ok(state),
        Err(e) => {
            warn!("Ignoring malformed state document '{}': {}", key, e);
            Ok(Map::new())
        }
    }
}

/// Shallow-merges `patch` over the object stored under `key` and writes the
/// result back. Returns the merged object.
pub async fn set_state(
    store: &dyn KeyValueStore,
    key: &str,
    patch: Map<String, Value>,
) -> anyhow::Result<Map<String, Value>> {
    let mut state = get_state(store, key).await?;
    state.extend(patch);
    store.set(key, serde_json::to_string(&state)?).await?;
    Ok(state)
}
