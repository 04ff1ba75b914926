//! Bridge configuration.

use std::time::Duration;

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::pool::{DEFAULT_POOL_SIZE, DEFAULT_POOL_TIMEOUT};

/// Default page size for listings.
pub const DEFAULT_LIMIT: u32 = 80;

/// Tunables for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Pool size above which expired connections are pruned.
    pub pool_size: usize,
    /// How long an idle connection stays reusable.
    pub pool_timeout: Duration,
    pub metadata_ttl: Duration,
    pub data_ttl: Duration,
    /// Per-cache size above which expired entries are swept.
    pub cache_max_entries: usize,
    pub default_limit: u32,
    /// When true, documents may not carry fields the schema does not know.
    pub strict: bool,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = timeout;
        self
    }

    pub fn metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    pub fn data_ttl(mut self, ttl: Duration) -> Self {
        self.data_ttl = ttl;
        self
    }

    pub fn cache_max_entries(mut self, max: usize) -> Self {
        self.cache_max_entries = max;
        self
    }

    pub fn default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    /// Reject unknown document fields during validation.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            pool_timeout: DEFAULT_POOL_TIMEOUT,
            metadata_ttl: DEFAULT_TTL,
            data_ttl: DEFAULT_TTL,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            default_limit: DEFAULT_LIMIT,
            strict: false,
        }
    }
}
