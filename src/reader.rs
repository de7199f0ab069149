use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::aggregator::merge;
use crate::config::Subscription;
use crate::parser::{parse, Post};
use crate::scheduler::FetchScheduler;

/// Turns the configured subscriptions into one newest-first episode list.
pub struct RssReader {
    subscriptions: Vec<Subscription>,
    scheduler: FetchScheduler,
    // Held for the whole cycle so two cycles never share a cache document
    cycle: Mutex<()>,
}

impl RssReader {
    pub fn new(subscriptions: Vec<Subscription>, scheduler: FetchScheduler) -> Self {
        Self {
            subscriptions,
            scheduler,
            cycle: Mutex::new(()),
        }
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub async fn get_items(&self) -> Vec<Post> {
        self.get_items_at(Utc::now()).await
    }

    pub async fn get_items_at(&self, now: DateTime<Utc>) -> Vec<Post> {
        let _cycle = self.cycle.lock().await;

        let feeds = self.scheduler.resolve_at(&self.subscriptions, now).await;

        let per_feed: Vec<Vec<Post>> = feeds
            .into_iter()
            .filter_map(|feed| match parse(&feed.raw_text) {
                Ok(posts) => Some(posts),
                Err(e) => {
                    warn!("Failed to parse feed {}: {}", feed.url, e);
                    None
                }
            })
            .collect();

        let posts = merge(per_feed);
        info!("Loaded {} episodes", posts.len());
        posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FeedCache;
    use crate::fetcher::{FeedFetcher, FetchError};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StaticFetcher {
        bodies: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(bodies: &[(&str, &str)]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedFetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies
                .get(url)
                .cloned()
                .ok_or(FetchError::HttpStatus(404))
        }
    }

    const RSS: &str = r#"<rss><channel>
        <item><title>rss-jan</title><pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate></item>
        <item><title>rss-mar</title><pubDate>Fri, 01 Mar 2024 00:00:00 +0000</pubDate></item>
    </channel></rss>"#;

    const ATOM: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
        <entry><title>atom-feb</title><updated>2024-02-01T00:00:00Z</updated></entry>
        <entry><title>atom-undated</title></entry>
    </feed>"#;

    fn reader(fetcher: Arc<StaticFetcher>, urls: &[&str]) -> RssReader {
        let scheduler = FetchScheduler::new(fetcher, FeedCache::new(Arc::new(MemoryStore::new())));
        RssReader::new(urls.iter().map(|u| Subscription::new(*u)).collect(), scheduler)
    }

    fn titles(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.title.as_str()).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_merges_feeds_newest_first() {
        let fetcher = Arc::new(StaticFetcher::new(&[("https://r", RSS), ("https://a", ATOM)]));
        let reader = reader(fetcher, &["https://r", "https://a"]);

        let posts = reader.get_items_at(now()).await;

        assert_eq!(
            titles(&posts),
            vec!["rss-mar", "atom-feb", "rss-jan", "atom-undated"]
        );
    }

    #[tokio::test]
    async fn test_malformed_feed_is_isolated() {
        let fetcher = Arc::new(StaticFetcher::new(&[
            ("https://bad", "<rss><item></rss>"),
            ("https://r", RSS),
        ]));
        let reader = reader(fetcher, &["https://bad", "https://r"]);

        let posts = reader.get_items_at(now()).await;

        assert_eq!(titles(&posts), vec!["rss-mar", "rss-jan"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_isolated() {
        let fetcher = Arc::new(StaticFetcher::new(&[("https://a", ATOM)]));
        let reader = reader(fetcher, &["https://missing", "https://a"]);

        let posts = reader.get_items_at(now()).await;

        assert_eq!(titles(&posts), vec!["atom-feb", "atom-undated"]);
    }

    #[tokio::test]
    async fn test_second_cycle_within_an_hour_uses_cache() {
        let fetcher = Arc::new(StaticFetcher::new(&[("https://r", RSS)]));
        let reader = reader(fetcher.clone(), &["https://r"]);

        let first = reader.get_items_at(now()).await;
        let second = reader.get_items_at(now() + Duration::minutes(30)).await;

        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_cycles_are_serialized() {
        let fetcher = Arc::new(StaticFetcher::new(&[("https://r", RSS)]));
        let reader = Arc::new(reader(fetcher.clone(), &["https://r"]));

        let (a, b) = tokio::join!(reader.get_items_at(now()), reader.get_items_at(now()));

        assert_eq!(a, b);
        // The second cycle sees the entry written by the first
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_subscriptions() {
        let fetcher = Arc::new(StaticFetcher::new(&[]));
        let reader = reader(fetcher, &[]);

        assert!(reader.get_items_at(now()).await.is_empty());
        assert!(reader.subscriptions().is_empty());
    }
}
