//! Classifier caches and lookup statistics.
//!
//! A [`FilterContext`] is owned by whoever creates it. Filters that want to
//! share caches across instances can use [`FilterContext::shared`].

use once_cell::sync::OnceCell;
use quick_cache::sync::Cache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::FilterResult;

/// Rough memory taken by one cached verdict, used to turn cache sizes in
/// bytes into entry counts.
const ESTIMATED_ENTRY_SIZE: usize = 256;

/// Process-wide context.
static SHARED: OnceCell<Arc<FilterContext>> = OnceCell::new();

/// The external classifiers a context keeps caches and stats for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    SafeBrowsing,
    Parental,
    SafeSearch,
}

impl ClassifierKind {
    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::SafeBrowsing => "safe browsing",
            ClassifierKind::Parental => "parental",
            ClassifierKind::SafeSearch => "safe search",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lookup statistics of one classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupStats {
    /// Number of lookups
    pub requests: u64,
    /// Lookups answered from the cache
    pub cache_hits: u64,
    /// Lookups currently in progress
    pub pending: i64,
    /// Highest number of lookups in progress at once
    pub pending_max: i64,
}

/// Lookup statistics of all classifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub safe_browsing: LookupStats,
    pub parental: LookupStats,
    pub safe_search: LookupStats,
}

/// Live counters behind a [`LookupStats`].
#[derive(Debug, Default)]
pub struct LookupCounters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    pending: AtomicI64,
    pending_max: AtomicI64,
}

impl LookupCounters {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a lookup as started. The lookup ends when the guard is dropped.
    pub(crate) fn begin(&self) -> PendingGuard<'_> {
        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending_max.fetch_max(pending, Ordering::SeqCst);
        PendingGuard { counters: self }
    }

    pub fn snapshot(&self) -> LookupStats {
        LookupStats {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::SeqCst),
            pending_max: self.pending_max.load(Ordering::SeqCst),
        }
    }

    fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.pending_max
            .store(self.pending.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

pub(crate) struct PendingGuard<'a> {
    counters: &'a LookupCounters,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.counters.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct CachedVerdict {
    result: FilterResult,
    stored: Instant,
}

/// VerdictCache keeps classifier results per host for a limited time.
pub struct VerdictCache {
    cache: Cache<String, CachedVerdict>,
    capacity: usize,
    ttl: Duration,
}

impl VerdictCache {
    /// Create a cache from a size in bytes. Returns `None` if the size is
    /// too small to hold a single entry.
    fn with_size(size_bytes: u32, ttl: Duration) -> Option<Self> {
        let capacity = size_bytes as usize / ESTIMATED_ENTRY_SIZE;
        if capacity == 0 {
            return None;
        }
        Some(Self {
            cache: Cache::new(capacity),
            capacity,
            ttl,
        })
    }

    /// Get a verdict that has not expired yet.
    ///
    /// Expired entries stay until the next insert for the host replaces them
    /// or the cache evicts them.
    pub fn get(&self, host: &str) -> Option<FilterResult> {
        self.cache
            .get(host)
            .filter(|entry| entry.stored.elapsed() <= self.ttl)
            .map(|entry| entry.result)
    }

    pub fn insert(&self, host: &str, result: FilterResult) {
        self.cache.insert(
            host.to_string(),
            CachedVerdict {
                result,
                stored: Instant::now(),
            },
        );
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.len() == 0
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

/// FilterContext holds the caches and counters of the external classifiers.
pub struct FilterContext {
    safe_browsing_cache: Option<VerdictCache>,
    parental_cache: Option<VerdictCache>,
    safe_search_cache: Option<VerdictCache>,
    safe_browsing: LookupCounters,
    parental: LookupCounters,
    safe_search: LookupCounters,
}

impl FilterContext {
    /// Create a context with caches sized by `config`.
    pub fn new(config: &Config) -> Self {
        let ttl = Duration::from_secs(u64::from(config.cache_time) * 60);
        Self {
            safe_browsing_cache: VerdictCache::with_size(config.safebrowsing_cache_size, ttl),
            parental_cache: VerdictCache::with_size(config.parental_cache_size, ttl),
            safe_search_cache: VerdictCache::with_size(config.safesearch_cache_size, ttl),
            safe_browsing: LookupCounters::default(),
            parental: LookupCounters::default(),
            safe_search: LookupCounters::default(),
        }
    }

    /// Get the process-wide context, creating it from `config` on first use.
    ///
    /// Once created the shared context is never replaced: cache sizes and
    /// TTL of later configs are ignored. Use [`FilterContext::new`] for a
    /// context with its own settings, or [`FilterContext::reset`] to empty
    /// the shared one.
    pub fn shared(config: &Config) -> Arc<FilterContext> {
        Arc::clone(SHARED.get_or_init(|| {
            log::debug!("Creating shared filter context");
            Arc::new(FilterContext::new(config))
        }))
    }

    /// The cache of a classifier, if caching is enabled for it.
    pub fn cache(&self, kind: ClassifierKind) -> Option<&VerdictCache> {
        match kind {
            ClassifierKind::SafeBrowsing => self.safe_browsing_cache.as_ref(),
            ClassifierKind::Parental => self.parental_cache.as_ref(),
            ClassifierKind::SafeSearch => self.safe_search_cache.as_ref(),
        }
    }

    /// The counters of a classifier.
    pub fn counters(&self, kind: ClassifierKind) -> &LookupCounters {
        match kind {
            ClassifierKind::SafeBrowsing => &self.safe_browsing,
            ClassifierKind::Parental => &self.parental,
            ClassifierKind::SafeSearch => &self.safe_search,
        }
    }

    /// Snapshot of all counters.
    pub fn stats(&self) -> Stats {
        Stats {
            safe_browsing: self.safe_browsing.snapshot(),
            parental: self.parental.snapshot(),
            safe_search: self.safe_search.snapshot(),
        }
    }

    /// Empty every cache and zero the counters.
    pub fn reset(&self) {
        for kind in [
            ClassifierKind::SafeBrowsing,
            ClassifierKind::Parental,
            ClassifierKind::SafeSearch,
        ] {
            if let Some(cache) = self.cache(kind) {
                cache.clear();
            }
            self.counters(kind).reset();
        }
    }
}
