//! External host classifiers: safe search, safe browsing and parental
//! control.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::context::{ClassifierKind, FilterContext};
use crate::{FilterResult, Reason, Result};

/// Classifier decides on a lower-case host.
///
/// An unmatched host is reported with the default result. Errors are
/// absorbed by the filtering pipeline, which then lets the query through.
pub trait Classifier: Send + Sync {
    fn classify(&self, host: &str) -> Result<FilterResult>;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> Result<FilterResult> + Send + Sync,
{
    fn classify(&self, host: &str) -> Result<FilterResult> {
        self(host)
    }
}

/// CachedClassifier puts the cache and counters of a [`FilterContext`] in
/// front of another classifier.
///
/// Successful verdicts are cached, matched or not; errors are not.
pub struct CachedClassifier<C> {
    inner: C,
    kind: ClassifierKind,
    context: Arc<FilterContext>,
}

impl<C: Classifier> CachedClassifier<C> {
    pub fn new(inner: C, kind: ClassifierKind, context: Arc<FilterContext>) -> Self {
        Self {
            inner,
            kind,
            context,
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }
}

impl<C: Classifier> Classifier for CachedClassifier<C> {
    fn classify(&self, host: &str) -> Result<FilterResult> {
        let counters = self.context.counters(self.kind);
        let cache = self.context.cache(self.kind);
        counters.record_request();

        if let Some(result) = cache.and_then(|c| c.get(host)) {
            counters.record_hit();
            log::debug!("{}: found in cache: {}: {}", self.kind, host, result.reason);
            return Ok(result);
        }

        let result = {
            let _pending = counters.begin();
            self.inner.classify(host)?
        };

        if let Some(cache) = cache {
            cache.insert(host, result.clone());
        }
        Ok(result)
    }
}

/// Search engine hosts and their enforced safe search host.
static SAFE_SEARCH_HOSTS: Lazy<AHashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("www.google.com", "forcesafesearch.google.com"),
        ("google.com", "forcesafesearch.google.com"),
        ("www.bing.com", "strict.bing.com"),
        ("bing.com", "strict.bing.com"),
        ("duckduckgo.com", "safe.duckduckgo.com"),
        ("www.duckduckgo.com", "safe.duckduckgo.com"),
        ("start.duckduckgo.com", "safe.duckduckgo.com"),
        ("www.youtube.com", "restrictmoderate.youtube.com"),
        ("m.youtube.com", "restrictmoderate.youtube.com"),
        ("youtubei.googleapis.com", "restrictmoderate.youtube.com"),
        ("youtube.googleapis.com", "restrictmoderate.youtube.com"),
        ("www.youtube-nocookie.com", "restrictmoderate.youtube.com"),
        ("yandex.ru", "familysearch.yandex.ru"),
        ("www.yandex.ru", "familysearch.yandex.ru"),
        ("yandex.com", "familysearch.yandex.ru"),
        ("www.yandex.com", "familysearch.yandex.ru"),
        ("pixabay.com", "safesearch.pixabay.com"),
        ("www.pixabay.com", "safesearch.pixabay.com"),
    ]
    .into_iter()
    .collect()
});

/// SafeSearchTable maps well-known search engine hosts to the host that
/// enforces safe search for them.
///
/// Regional Google hosts (`www.google.<tld>`, `www.google.co.<tld>`) map
/// to the Google safe search host as well.
///
/// # Examples
/// ```
/// use dnsfilter::classifier::{Classifier, SafeSearchTable};
/// use dnsfilter::Reason;
///
/// let res = SafeSearchTable.classify("www.bing.com").unwrap();
/// assert_eq!(res.reason, Reason::FilteredSafeSearch);
/// assert_eq!(res.canon_name, "strict.bing.com");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeSearchTable;

impl SafeSearchTable {
    /// The safe search host for `host`, if it is a known search engine.
    pub fn lookup(&self, host: &str) -> Option<&'static str> {
        if let Some(&safe) = SAFE_SEARCH_HOSTS.get(host) {
            return Some(safe);
        }

        let rest = host.strip_prefix("www.").unwrap_or(host);
        let tld = rest.strip_prefix("google.")?;
        let tld = tld.strip_prefix("co.").or_else(|| tld.strip_prefix("com.")).unwrap_or(tld);
        if !tld.is_empty() && !tld.contains('.') && tld.bytes().all(|b| b.is_ascii_lowercase()) {
            return Some("forcesafesearch.google.com");
        }
        None
    }
}

impl Classifier for SafeSearchTable {
    fn classify(&self, host: &str) -> Result<FilterResult> {
        Ok(match self.lookup(host) {
            Some(safe) => FilterResult {
                is_filtered: true,
                reason: Reason::FilteredSafeSearch,
                canon_name: safe.to_string(),
                ..Default::default()
            },
            None => FilterResult::default(),
        })
    }
}
