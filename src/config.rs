use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use crate::scheduler::StalePolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the HTTP surface binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upper bound for a single feed fetch, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub stale_policy: StalePolicy,
    pub subscriptions: Vec<Subscription>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

/// One configured feed source.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub url: String,
}

impl Subscription {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        assert_eq!(default_listen_addr(), "0.0.0.0:3000");
        assert_eq!(default_fetch_timeout(), 30);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            listen_addr = "127.0.0.1:8080"
            fetch_timeout_secs = 10
            stale_policy = "serve_stale"

            [[subscriptions]]
            url = "https://feeds.megaphone.fm/theyard"

            [[subscriptions]]
            url = "https://example.org/podcast.xml"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.stale_policy, StalePolicy::ServeStale);
        assert_eq!(config.subscriptions.len(), 2);
        assert_eq!(
            config.subscriptions[0],
            Subscription::new("https://feeds.megaphone.fm/theyard")
        );
        assert_eq!(config.subscriptions[1].url, "https://example.org/podcast.xml");
    }

    #[test]
    fn test_load_config_with_defaults() {
        let content = r#"
            [[subscriptions]]
            url = "https://example.com/feed.xml"
        "#;

        let config = Config::from_str(content).unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.stale_policy, StalePolicy::Skip);
        assert_eq!(config.subscriptions.len(), 1);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/subscriptions.toml");
        let err = result.unwrap_err();
        assert!(err
            .to_string()
            .contains("reading /nonexistent/path/subscriptions.toml"));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(err.to_string().starts_with("parsing "));
    }

    #[test]
    fn test_load_config_missing_url() {
        let content = r#"
            [[subscriptions]]
            # Missing url field
        "#;

        let result = Config::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_stale_policy_rejected() {
        let content = r#"
            stale_policy = "sometimes"
            subscriptions = []
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_empty_subscriptions_list() {
        let content = "subscriptions = []";

        let config = Config::from_str(content).unwrap();
        assert!(config.subscriptions.is_empty());
    }

    #[test]
    fn test_duplicate_urls_are_kept() {
        let content = r#"
            [[subscriptions]]
            url = "https://example.com/feed.xml"

            [[subscriptions]]
            url = "https://example.com/feed.xml"
        "#;

        let config = Config::from_str(content).unwrap();
        assert_eq!(config.subscriptions.len(), 2);
    }
}
