//! Instance configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Instance configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Deadline of parse requests asking for the default timeout.
    /// Zero means no deadline.
    #[serde(with = "duration_ms")]
    pub preparse_timeout: Duration,
    /// Deadline of thumbnail requests asking for the default timeout.
    #[serde(with = "duration_ms")]
    pub thumbnail_timeout: Duration,
    /// Worker threads of the default preparser.
    pub preparse_threads: usize,
    /// Worker threads of the default thumbnailer; 0 disables thumbnails.
    pub thumbnail_threads: usize,
    /// Directory depth below which the default preparser stops descending.
    pub max_subtree_depth: usize,
    /// File names looked up beside an item when fetching local art.
    pub fetch_art_names: Vec<String>,
    /// User agent string sent by network fetchers.
    pub user_agent: String,
}

impl InstanceConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for batch tools: no thumbnails, short timeouts.
    pub fn headless() -> Self {
        Self {
            preparse_timeout: Duration::from_secs(2),
            thumbnail_timeout: Duration::from_secs(2),
            thumbnail_threads: 0,
            ..Self::default()
        }
    }

    pub fn with_preparse_timeout(mut self, timeout: Duration) -> Self {
        self.preparse_timeout = timeout;
        self
    }

    pub fn with_thumbnail_timeout(mut self, timeout: Duration) -> Self {
        self.thumbnail_timeout = timeout;
        self
    }

    /// Set worker thread counts.
    pub fn with_threads(mut self, preparse: usize, thumbnail: usize) -> Self {
        self.preparse_threads = preparse;
        self.thumbnail_threads = thumbnail;
        self
    }

    pub fn with_max_subtree_depth(mut self, depth: usize) -> Self {
        self.max_subtree_depth = depth;
        self
    }

    pub fn with_fetch_art_names(mut self, names: Vec<String>) -> Self {
        self.fetch_art_names = names;
        self
    }

    /// Set user agent.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            preparse_timeout: Duration::from_secs(5),
            thumbnail_timeout: Duration::from_secs(10),
            preparse_threads: 2,
            thumbnail_threads: 1,
            max_subtree_depth: 64,
            fetch_art_names: ["cover", "folder", "front", "albumart"]
                .iter()
                .flat_map(|stem| ["jpg", "png"].map(|ext| format!("{}.{}", stem, ext)))
                .collect(),
            user_agent: user_agent(),
        }
    }
}

/// Default user agent string.
pub fn user_agent() -> String {
    format!("OxideMedia/{}", env!("CARGO_PKG_VERSION"))
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InstanceConfig::default();
        assert_eq!(config.preparse_timeout, Duration::from_secs(5));
        assert_eq!(config.thumbnail_timeout, Duration::from_secs(10));
        assert_eq!(config.max_subtree_depth, 64);
        assert!(config.fetch_art_names.contains(&"cover.jpg".to_string()));
        assert!(config.user_agent.starts_with("OxideMedia/"));
    }

    #[test]
    fn test_headless_config() {
        let config = InstanceConfig::headless();
        assert_eq!(config.thumbnail_threads, 0);
        assert_eq!(config.preparse_threads, 2);
    }

    #[test]
    fn test_config_builder() {
        let config = InstanceConfig::new()
            .with_threads(4, 0)
            .with_preparse_timeout(Duration::ZERO)
            .with_user_agent("probe/1");
        assert_eq!(config.preparse_threads, 4);
        assert!(config.preparse_timeout.is_zero());
        assert_eq!(config.user_agent, "probe/1");
    }

    #[test]
    fn test_partial_json() {
        let config: InstanceConfig =
            serde_json::from_str(r#"{"preparse_timeout": 1500, "max_subtree_depth": 3}"#).unwrap();
        assert_eq!(config.preparse_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_subtree_depth, 3);
        assert_eq!(config.thumbnail_threads, 1);

        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains(r#""thumbnail_timeout":10000"#));
    }
}
