//! TTL caches for remote metadata and read results.
//!
//! Entries expire after a fixed TTL and are evicted lazily on access, or in
//! bulk when an insert pushes the table past its soft size limit. There is no
//! write-triggered invalidation: a read right after a write may see the
//! pre-write value until the entry expires.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::types::{ModelMetadata, RecordId};

/// Default lifetime of cached metadata and read results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Soft entry limit that triggers a sweep of expired entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent key/value table with per-entry expiry.
///
/// Mutations on one key are exclusive; distinct keys live in independent
/// shards and do not serialize against each other.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
        if self.entries.len() > self.max_entries {
            self.entries.retain(|_, entry| entry.expires_at > now);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Cached `fields_get` results, keyed by model name.
#[derive(Debug)]
pub struct MetadataCache {
    table: TtlCache<String, Arc<ModelMetadata>>,
}

impl MetadataCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            table: TtlCache::new(ttl, max_entries),
        }
    }

    pub fn get_fields(&self, model: &str) -> Option<Arc<ModelMetadata>> {
        let hit = self.table.get(&model.to_string());
        tracing::debug!(model, hit = hit.is_some(), "metadata cache lookup");
        hit
    }

    pub fn set_fields(&self, model: &str, metadata: Arc<ModelMetadata>) {
        self.table.insert(model.to_string(), metadata);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

/// Cached `read` results, keyed by model, ids and field set.
#[derive(Debug)]
pub struct DataCache {
    table: TtlCache<String, Arc<Vec<Map<String, Value>>>>,
}

impl DataCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            table: TtlCache::new(ttl, max_entries),
        }
    }

    pub fn get_data(
        &self,
        model: &str,
        ids: &[RecordId],
        fields: &[String],
    ) -> Option<Arc<Vec<Map<String, Value>>>> {
        let key = data_key(model, ids, fields);
        let hit = self.table.get(&key);
        tracing::debug!(model, ids = ids.len(), hit = hit.is_some(), "data cache lookup");
        hit
    }

    pub fn set_data(
        &self,
        model: &str,
        ids: &[RecordId],
        fields: &[String],
        records: Arc<Vec<Map<String, Value>>>,
    ) {
        self.table.insert(data_key(model, ids, fields), records);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for DataCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

/// Deterministic key over model name, sorted ids and sorted field names.
pub fn data_key(model: &str, ids: &[RecordId], fields: &[String]) -> String {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let mut fields: Vec<&str> = fields.iter().map(String::as_str).collect();
    fields.sort_unstable();
    fields.dedup();

    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    for id in &ids {
        hasher.update(id.to_le_bytes());
    }
    hasher.update([0u8]);
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
