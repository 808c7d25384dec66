//! Filtering configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::rewrite::RewriteTable;
use crate::services::ServiceEntry;
use crate::Result;

/// Default size of each classifier cache, in bytes.
pub const DEFAULT_CACHE_SIZE: u32 = 1024 * 1024;

/// Default lifetime of cached classifier verdicts, in minutes.
pub const DEFAULT_CACHE_TIME: u32 = 30;

/// Called after the configuration was changed through a filter.
pub type ConfigHook = Arc<dyn Fn() + Send + Sync>;

/// Config holds the filtering settings shared by all requests.
///
/// Loaded from YAML:
///
/// ```yaml
/// parental_enabled: false
/// safesearch_enabled: true
/// safebrowsing_enabled: false
/// safebrowsing_cache_size: 1048576
/// safesearch_cache_size: 1048576
/// parental_cache_size: 1048576
/// cache_time: 30
/// rewrites:
///   - domain: nas.home.example
///     answer: 192.168.1.10
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parental_enabled: bool,
    #[serde(rename = "safesearch_enabled")]
    pub safe_search_enabled: bool,
    #[serde(rename = "safebrowsing_enabled")]
    pub safe_browsing_enabled: bool,

    /// Safe browsing cache size, in bytes
    pub safebrowsing_cache_size: u32,
    /// Safe search cache size, in bytes
    pub safesearch_cache_size: u32,
    /// Parental control cache size, in bytes
    pub parental_cache_size: u32,
    /// Lifetime of cached verdicts, in minutes
    pub cache_time: u32,

    pub rewrites: RewriteTable,

    /// Called when the configuration is changed through a filter
    #[serde(skip)]
    pub config_modified: Option<ConfigHook>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parental_enabled: false,
            safe_search_enabled: false,
            safe_browsing_enabled: false,
            safebrowsing_cache_size: DEFAULT_CACHE_SIZE,
            safesearch_cache_size: DEFAULT_CACHE_SIZE,
            parental_cache_size: DEFAULT_CACHE_SIZE,
            cache_time: DEFAULT_CACHE_TIME,
            rewrites: RewriteTable::default(),
            config_modified: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("parental_enabled", &self.parental_enabled)
            .field("safe_search_enabled", &self.safe_search_enabled)
            .field("safe_browsing_enabled", &self.safe_browsing_enabled)
            .field("safebrowsing_cache_size", &self.safebrowsing_cache_size)
            .field("safesearch_cache_size", &self.safesearch_cache_size)
            .field("parental_cache_size", &self.parental_cache_size)
            .field("cache_time", &self.cache_time)
            .field("rewrites", &self.rewrites)
            .field("config_modified", &self.config_modified.is_some())
            .finish()
    }
}

impl Config {
    /// Parse a YAML configuration. Rewrite entries are normalized.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(s)?;
        config.rewrites.prepare()?;
        Ok(config)
    }

    /// Load a YAML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&data)?;
        log::debug!("Loaded filtering config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Serialize to YAML. The change hook is not included.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub(crate) fn notify_modified(&self) {
        if let Some(hook) = &self.config_modified {
            hook();
        }
    }
}

/// Per-request filtering settings.
#[derive(Debug, Clone, Default)]
pub struct RequestFilteringSettings {
    pub filtering_enabled: bool,
    pub safe_search_enabled: bool,
    pub safe_browsing_enabled: bool,
    pub parental_enabled: bool,

    /// Tags of the client, matched against `$ctag` rules
    pub client_tags: Vec<String>,

    /// Blocked services, checked in order
    pub services_rules: Vec<ServiceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::RewriteEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert!(!config.parental_enabled);
        assert_eq!(config.safebrowsing_cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(config.cache_time, DEFAULT_CACHE_TIME);
        assert!(config.rewrites.is_empty());
    }

    #[test]
    fn test_yaml_keys() {
        let yaml = r#"
parental_enabled: true
safesearch_enabled: true
safebrowsing_enabled: false
safebrowsing_cache_size: 2048
safesearch_cache_size: 4096
parental_cache_size: 8192
cache_time: 10
rewrites:
  - domain: NAS.Home.Example
    answer: 192.168.1.10
  - domain: "*.lan.example"
    answer: nas.home.example
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert!(config.parental_enabled);
        assert!(config.safe_search_enabled);
        assert!(!config.safe_browsing_enabled);
        assert_eq!(config.safebrowsing_cache_size, 2048);
        assert_eq!(config.safesearch_cache_size, 4096);
        assert_eq!(config.parental_cache_size, 8192);
        assert_eq!(config.cache_time, 10);
        assert_eq!(
            config.rewrites.entries()[0],
            RewriteEntry::new("nas.home.example", "192.168.1.10").unwrap()
        );

        let out = config.to_yaml().unwrap();
        assert!(out.contains("safesearch_enabled: true"));
        assert!(out.contains("parental_cache_size: 8192"));
        assert!(!out.contains("config_modified"));

        let back = Config::from_yaml_str(&out).unwrap();
        assert_eq!(back.rewrites, config.rewrites);
        assert_eq!(back.cache_time, 10);
    }

    #[test]
    fn test_invalid_rewrite() {
        let yaml = "rewrites:\n  - domain: \"bad host\"\n    answer: 1.2.3.4\n";
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let config = Config {
            config_modified: Some(Arc::new(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        config.notify_modified();
        config.clone().notify_modified();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
