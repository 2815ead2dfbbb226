//! Page cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_INDEX_TTL_SECONDS: u64 = 20;
const DEFAULT_KEY_PREFIX: &str = "index_page";
const DEFAULT_MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lifetime of a stored index page.
    pub index_ttl: Duration,
    pub key_prefix: String,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_ttl: Duration::from_secs(DEFAULT_INDEX_TTL_SECONDS),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            index_ttl: Duration::from_secs(settings.index_ttl_seconds.get()),
            key_prefix: settings.key_prefix.clone(),
            max_entries: settings.max_entries.get(),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Capacity of the LRU, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
