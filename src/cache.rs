use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::KeyValueStore;

/// Key the whole cache document lives under.
pub const CACHE_KEY: &str = "cache";

/// Last successfully fetched body of one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "text")]
    pub raw_text: String,
    #[serde(rename = "date")]
    pub fetched_at: DateTime<Utc>,
}

/// Feed URL -> entry. Ordered so that serialization is deterministic.
pub type CacheDocument = BTreeMap<String, CacheEntry>;

/// Reads and writes the cache document as a single JSON value.
#[derive(Clone)]
pub struct FeedCache {
    store: Arc<dyn KeyValueStore>,
}

impl FeedCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Never fails: an absent, corrupt or unreadable document is an empty cache.
    pub async fn load(&self) -> CacheDocument {
        match self.try_load().await {
            Ok(document) => document,
            Err(e) => {
                warn!("Failed to read feed cache, starting empty: {}", e);
                CacheDocument::new()
            }
        }
    }

    /// Like [`load`](Self::load), but a failed store read is an error.
    ///
    /// Absent and malformed documents still come back as an empty cache,
    /// since overwriting them loses nothing.
    pub async fn try_load(&self) -> anyhow::Result<CacheDocument> {
        let Some(raw) = self.store.get(CACHE_KEY).await? else {
            debug!("No feed cache stored yet");
            return Ok(CacheDocument::new());
        };

        match serde_json::from_str(&raw) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!("Discarding malformed feed cache: {}", e);
                Ok(CacheDocument::new())
            }
        }
    }

    pub async fn save(&self, document: &CacheDocument) -> anyhow::Result<()> {
        let raw = serde_json::to_string(document)?;
        self.store.set(CACHE_KEY, raw).await
    }
}
