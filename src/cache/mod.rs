//! Query cache for the read-only collections the server pushes changes for.
//!
//! Entries are keyed like `job/{id}` or `datasets/sparql/{endpoint}`, carry
//! the time they were fetched and a freshness window, and can be
//! invalidated one by one or by key prefix. Invalidation keeps the data
//! around (it is still readable) but marks it stale so the next read
//! refetches it.

mod global;
mod reference;

pub use global::{download_matches, DatasetListing};
pub use reference::ReferenceData;

use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::CacheConfig;

/// Dataset backends with their own download and dataset listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Sparql,
    Timbuctoo,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sparql => f.write_str("sparql"),
            Backend::Timbuctoo => f.write_str("timbuctoo"),
        }
    }
}

/// Identifies one cached query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Job(String),
    Methods,
    Linksets(String),
    Lenses(String),
    Clusterings(String),
    Downloads(Backend),
    /// Datasets of one SPARQL endpoint or Timbuctoo GraphQL endpoint
    Datasets(Backend, String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Job(id) => write!(f, "job/{}", id),
            CacheKey::Methods => f.write_str("methods"),
            CacheKey::Linksets(job) => write!(f, "linksets/{}", job),
            CacheKey::Lenses(job) => write!(f, "lenses/{}", job),
            CacheKey::Clusterings(job) => write!(f, "clusterings/{}", job),
            CacheKey::Downloads(backend) => write!(f, "downloads/{}", backend),
            CacheKey::Datasets(backend, endpoint) => write!(f, "datasets/{}/{}", backend, endpoint),
        }
    }
}

struct CacheEntry {
    value: Box<dyn Any + Send + Sync>,
    fetched_at: Instant,
    ttl: Duration,
    invalidated: bool,
}

impl CacheEntry {
    fn is_stale(&self) -> bool {
        self.invalidated || self.fetched_at.elapsed() > self.ttl
    }
}

/// Process-wide cache of fetched collections
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Freshness window for a key
    pub fn ttl_for(&self, key: &CacheKey) -> Duration {
        match key {
            CacheKey::Job(_) => self.config.job_ttl,
            CacheKey::Methods => self.config.methods_ttl,
            CacheKey::Downloads(_) => self.config.downloads_ttl,
            CacheKey::Datasets(..) => self.config.datasets_ttl,
            _ => self.config.status_ttl,
        }
    }

    pub fn insert<T>(&self, key: &CacheKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: Box::new(value),
                fetched_at: Instant::now(),
                ttl: self.ttl_for(key),
                invalidated: false,
            },
        );
    }

    /// Cached value, fresh or not. `None` when missing or of another type.
    pub fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.entries
            .get(&key.to_string())
            .and_then(|entry| entry.value.downcast_ref::<T>().cloned())
    }

    /// Cached value only while it is fresh
    pub fn get_fresh<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.entries
            .get(&key.to_string())
            .filter(|entry| !entry.is_stale())
            .and_then(|entry| entry.value.downcast_ref::<T>().cloned())
    }

    /// Patch a cached value in place. Does nothing and returns `false` when
    /// there is no entry of that type. The fetch time is left alone.
    pub fn update<T, F>(&self, key: &CacheKey, f: F) -> bool
    where
        T: 'static,
        F: FnOnce(&mut T),
    {
        match self.entries.get_mut(&key.to_string()) {
            Some(mut entry) => match entry.value.downcast_mut::<T>() {
                Some(value) => {
                    f(value);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(&key.to_string())
    }

    /// Missing entries count as stale
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.entries
            .get(&key.to_string())
            .map_or(true, |entry| entry.is_stale())
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        match self.entries.get_mut(&key.to_string()) {
            Some(mut entry) => {
                entry.invalidated = true;
                debug!("Invalidated {}", key);
                true
            }
            None => false,
        }
    }

    /// Invalidate every entry whose key starts with `prefix`; returns how many
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(prefix) {
                entry.invalidated = true;
                count += 1;
            }
        }
        if count > 0 {
            debug!("Invalidated {} entries under {}", count, prefix);
        }
        count
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(&key.to_string()).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_as_paths() {
        assert_eq!(CacheKey::Job("abc".into()).to_string(), "job/abc");
        assert_eq!(CacheKey::Downloads(Backend::Sparql).to_string(), "downloads/sparql");
        assert_eq!(
            CacheKey::Datasets(Backend::Timbuctoo, "https://example.org/graphql".into()).to_string(),
            "datasets/timbuctoo/https://example.org/graphql"
        );
    }

    #[test]
    fn listings_get_their_own_freshness_window() {
        let cache = QueryCache::default();
        assert_eq!(cache.ttl_for(&CacheKey::Downloads(Backend::Sparql)), Duration::from_secs(15 * 60));
        assert_eq!(
            cache.ttl_for(&CacheKey::Datasets(Backend::Timbuctoo, "g".into())),
            Duration::from_secs(5 * 60)
        );
        assert_eq!(cache.ttl_for(&CacheKey::Lenses("job1".into())), Duration::from_secs(60));
    }

    #[test]
    fn invalidated_entries_stay_readable_but_stale() {
        let cache = QueryCache::default();
        let key = CacheKey::Linksets("job1".into());
        assert!(cache.is_stale(&key));

        cache.insert(&key, vec![1, 2, 3]);
        assert!(!cache.is_stale(&key));
        assert_eq!(cache.get_fresh::<Vec<i32>>(&key), Some(vec![1, 2, 3]));

        assert!(cache.invalidate(&key));
        assert!(cache.is_stale(&key));
        assert_eq!(cache.get_fresh::<Vec<i32>>(&key), None);
        assert_eq!(cache.get::<Vec<i32>>(&key), Some(vec![1, 2, 3]));
    }

    #[test]
    fn expired_entries_are_stale() {
        let cache = QueryCache::new(CacheConfig::default().with_status_ttl(Duration::ZERO));
        let key = CacheKey::Lenses("job1".into());
        cache.insert(&key, 1u8);
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.is_stale(&key));
    }

    #[test]
    fn prefix_invalidation_only_hits_matching_keys() {
        let cache = QueryCache::default();
        cache.insert(&CacheKey::Downloads(Backend::Sparql), 1u8);
        cache.insert(&CacheKey::Downloads(Backend::Timbuctoo), 2u8);
        cache.insert(&CacheKey::Methods, 3u8);

        assert_eq!(cache.invalidate_prefix("downloads/"), 2);
        assert!(cache.is_stale(&CacheKey::Downloads(Backend::Timbuctoo)));
        assert!(!cache.is_stale(&CacheKey::Methods));
    }

    #[test]
    fn update_requires_matching_type() {
        let cache = QueryCache::default();
        let key = CacheKey::Methods;
        cache.insert(&key, String::from("a"));

        assert!(!cache.update::<u8, _>(&key, |v| *v += 1));
        assert!(cache.update::<String, _>(&key, |v| v.push('b')));
        assert_eq!(cache.get::<String>(&key).as_deref(), Some("ab"));
        assert!(!cache.update::<String, _>(&CacheKey::Job("x".into()), |_| {}));
    }
}
