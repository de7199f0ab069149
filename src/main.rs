use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podcast_reader::cache::FeedCache;
use podcast_reader::config::Config;
use podcast_reader::db::Database;
use podcast_reader::fetcher::HttpFetcher;
use podcast_reader::reader::RssReader;
use podcast_reader::routes::{self, AppState};
use podcast_reader::scheduler::FetchScheduler;
use podcast_reader::store::KeyValueStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podcast_reader=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "subscriptions.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} subscriptions from {}",
        config.subscriptions.len(),
        config_path
    );

    // Initialize key-value store
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:podcast_reader.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("Database initialized ({} stored keys)", db.key_count().await?);

    let store: Arc<dyn KeyValueStore> = Arc::new(db);

    // Wire the feed pipeline
    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
    let scheduler = FetchScheduler::new(Arc::new(fetcher), FeedCache::new(store.clone()))
        .with_stale_policy(config.stale_policy);
    let reader = Arc::new(RssReader::new(config.subscriptions.clone(), scheduler));

    let state = Arc::new(AppState { reader, store });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server starting on http://{}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
