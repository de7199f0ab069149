use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheDocument, CacheEntry, FeedCache};
use crate::config::Subscription;
use crate::fetcher::FeedFetcher;

/// Cache entries older than this are refetched.
pub const STALE_AFTER: Duration = Duration::hours(1);

/// What to do with a stale entry whose refetch failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Drop the subscription for this cycle
    #[default]
    Skip,
    /// Serve the stale text, leaving the entry as it was
    ServeStale,
}

/// Raw feed text available for one subscription in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedText {
    pub url: String,
    pub raw_text: String,
}

/// Decides per subscription whether to reuse the cache or fetch.
pub struct FetchScheduler {
    fetcher: Arc<dyn FeedFetcher>,
    cache: FeedCache,
    stale_policy: StalePolicy,
}

impl FetchScheduler {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, cache: FeedCache) -> Self {
        Self {
            fetcher,
            cache,
            stale_policy: StalePolicy::default(),
        }
    }

    pub fn with_stale_policy(mut self, stale_policy: StalePolicy) -> Self {
        self.stale_policy = stale_policy;
        self
    }

    pub async fn resolve(&self, subscriptions: &[Subscription]) -> Vec<FeedText> {
        self.resolve_at(subscriptions, Utc::now()).await
    }

    /// Runs one resolution cycle as of `now`.
    ///
    /// The cache document is loaded once and saved once, after every
    /// subscription has been handled. If the load itself fails the cycle
    /// runs against an empty cache and the save is skipped. Subscriptions are processed in order,
    /// one fetch at a time. Failed fetches are logged and leave the cache
    /// entry for that URL untouched.
    pub async fn resolve_at(
        &self,
        subscriptions: &[Subscription],
        now: DateTime<Utc>,
    ) -> Vec<FeedText> {
        // A document that could not be read must not be overwritten
        let (mut document, writable) = match self.cache.try_load().await {
            Ok(document) => (document, true),
            Err(e) => {
                warn!("Failed to read feed cache, treating it as empty: {}", e);
                (CacheDocument::new(), false)
            }
        };
        let mut results = Vec::with_capacity(subscriptions.len());
        let mut fetched = 0;

        for subscription in subscriptions {
            let url = &subscription.url;

            let needs_fetch = match document.get(url) {
                None => true,
                Some(entry) => now - entry.fetched_at > STALE_AFTER,
            };

            if needs_fetch {
                match self.fetcher.fetch_text(url).await {
                    Ok(raw_text) => {
                        document.insert(
                            url.clone(),
                            CacheEntry {
                                raw_text,
                                fetched_at: now,
                            },
                        );
                        fetched += 1;
                    }
                    Err(e) => {
                        warn!("Failed to fetch {}: {}", url, e);
                        if self.stale_policy == StalePolicy::Skip || !document.contains_key(url) {
                            continue;
                        }
                        info!("Serving stale cache entry for {}", url);
                    }
                }
            } else {
                debug!("Using cached feed for {}", url);
            }

            if let Some(entry) = document.get(url) {
                results.push(FeedText {
                    url: url.clone(),
                    raw_text: entry.raw_text.clone(),
                });
            }
        }

        if !writable {
            warn!("Skipping feed cache write after failed read");
        } else if let Err(e) = self.cache.save(&document).await {
            error!("Failed to persist feed cache: {}", e);
        }

        info!(
            "Resolved {} of {} subscriptions ({} fetched)",
            results.len(),
            subscriptions.len(),
            fetched
        );
        results
    }
}
