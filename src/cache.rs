//! Bounded in-memory response caches.
//!
//! Two instances exist at runtime: first-page feed responses keyed by the
//! league-filter set, and translated strings keyed by language pair plus the
//! exact source text. Both evict least-recently-used entries once full.
//!
//! Entries are whole values replaced on write, never merged, so a plain
//! mutex around the LRU is enough. The lock is never held across an await.

use lru::LruCache;
use std::collections::BTreeSet;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::news::Page;
use crate::translate::LanguageCode;

/// Default capacity for cached first pages.
pub const FEED_CACHE_CAPACITY: usize = 100;
/// Default capacity for cached translations.
pub const TRANSLATION_CACHE_CAPACITY: usize = 500;

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Thread-safe LRU cache with an optional per-entry time-to-live.
pub struct ResponseCache<K: Hash + Eq, V: Clone> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<K: Hash + Eq, V: Clone> ResponseCache<K, V> {
    /// A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, Entry<V>>> {
        // A poisoned cache only means a panic mid-insert; the LRU itself stays consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a clone of the value and marks it most-recently-used.
    ///
    /// Expired entries are evicted and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.stored_at.elapsed() >= ttl),
        };
        if expired {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        self.lock().put(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().pop(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Canonical key for a league-filter combination.
///
/// Ids are de-duplicated and sorted before joining, so `{b, a}` and `{a, b, a}`
/// map to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedCacheKey(String);

impl FeedCacheKey {
    pub fn from_league_ids<'a, I>(ids: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let canonical: BTreeSet<&str> = ids.into_iter().map(String::as_str).collect();
        Self(canonical.into_iter().collect::<Vec<_>>().join(","))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationKey {
    pub source: LanguageCode,
    pub target: LanguageCode,
    pub text: String,
}

impl TranslationKey {
    pub fn new(source: &LanguageCode, target: &LanguageCode, text: &str) -> Self {
        Self {
            source: source.clone(),
            target: target.clone(),
            text: text.to_string(),
        }
    }
}

pub type FeedCache = ResponseCache<FeedCacheKey, Page>;
pub type TranslationCache = ResponseCache<TranslationKey, String>;
