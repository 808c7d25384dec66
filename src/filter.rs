//! The filtering decision pipeline.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::classifier::{CachedClassifier, Classifier, SafeSearchTable};
use crate::config::{Config, RequestFilteringSettings};
use crate::context::{ClassifierKind, FilterContext, Stats};
use crate::manager::EngineManager;
use crate::matcher;
use crate::rewrite::RewriteEntry;
use crate::services::match_blocked_services;
use crate::storage::Filter;
use crate::{Error, FilterResult, Reason, RecordType, Result};

/// Registered classifiers, already wrapped with caching.
#[derive(Default)]
struct Classifiers {
    safe_search: Option<Arc<dyn Classifier>>,
    safe_browsing: Option<Arc<dyn Classifier>>,
    parental: Option<Arc<dyn Classifier>>,
}

/// DnsFilter decides whether DNS queries are blocked, rewritten or passed.
///
/// Checks run in this order, and the first one that matches decides:
/// 1. Rewrites
/// 2. Block rules, cancelled by a matching allow rule
/// 3. Blocked services
/// 4. Safe search
/// 5. Safe browsing
/// 6. Parental control
///
/// # Example
///
/// ```
/// use dnsfilter::{Config, DnsFilter, Filter, Reason, RecordType};
///
/// let filter = DnsFilter::new(Config::default());
/// filter
///     .set_filters(vec![Filter::inline("||ads.example.org^")], vec![], false)
///     .unwrap();
///
/// let mut settings = filter.request_settings();
/// settings.filtering_enabled = true;
///
/// let res = filter.check_host("ads.example.org", RecordType::A, &settings).unwrap();
/// assert_eq!(res.reason, Reason::FilteredBlackList);
/// ```
pub struct DnsFilter {
    config: RwLock<Config>,
    engines: EngineManager,
    context: Arc<FilterContext>,
    classifiers: RwLock<Classifiers>,
}

impl DnsFilter {
    /// Create a filter using the process-wide [`FilterContext`].
    pub fn new(config: Config) -> Self {
        let context = FilterContext::shared(&config);
        Self::with_context(config, context)
    }

    /// Create a filter with its own caches and counters.
    ///
    /// The built-in [`SafeSearchTable`] is registered as safe search
    /// classifier. No rules are installed until [`DnsFilter::set_filters`].
    pub fn with_context(config: Config, context: Arc<FilterContext>) -> Self {
        let filter = Self {
            config: RwLock::new(config),
            engines: EngineManager::new(),
            context,
            classifiers: RwLock::new(Classifiers::default()),
        };
        filter.set_safe_search(SafeSearchTable);
        filter
    }

    /// Check a host for the queried record type.
    ///
    /// An empty host gives the default result. Classifier errors are logged
    /// and let the query through. Fails only once the filter is closed.
    pub fn check_host(
        &self,
        host: &str,
        qtype: RecordType,
        settings: &RequestFilteringSettings,
    ) -> Result<FilterResult> {
        if self.engines.is_closed() {
            return Err(Error::Closed);
        }
        if host.is_empty() {
            return Ok(FilterResult::default());
        }
        let host = host.to_lowercase();

        let res = self.process_rewrites(&host, qtype);
        if res.matched() {
            return Ok(res);
        }

        if settings.filtering_enabled {
            let res = self.match_rules(&host, qtype, settings);
            if res.matched() {
                return Ok(res);
            }
        }

        if !settings.services_rules.is_empty() {
            let res = match_blocked_services(&host, &settings.services_rules);
            if res.matched() {
                return Ok(res);
            }
        }

        let classifiers = {
            let registered = self.classifiers.read();
            [
                (
                    settings.safe_search_enabled,
                    ClassifierKind::SafeSearch,
                    registered.safe_search.clone(),
                ),
                (
                    settings.safe_browsing_enabled,
                    ClassifierKind::SafeBrowsing,
                    registered.safe_browsing.clone(),
                ),
                (
                    settings.parental_enabled,
                    ClassifierKind::Parental,
                    registered.parental.clone(),
                ),
            ]
        };

        for (enabled, kind, classifier) in classifiers {
            let Some(classifier) = classifier.filter(|_| enabled) else {
                continue;
            };
            match classifier.classify(&host) {
                Ok(res) if res.matched() => return Ok(res),
                Ok(_) => {}
                Err(e) => {
                    log::info!("{} check failed for {}: {}", kind, host, e);
                    return Ok(FilterResult::default());
                }
            }
        }

        Ok(FilterResult::default())
    }

    /// Check a host against the block rules only.
    ///
    /// Allow rules are not consulted, so this reports what the block list
    /// alone says about the host.
    pub fn check_host_rules(
        &self,
        host: &str,
        qtype: RecordType,
        settings: &RequestFilteringSettings,
    ) -> Result<FilterResult> {
        if self.engines.is_closed() {
            return Err(Error::Closed);
        }
        if !settings.filtering_enabled || host.is_empty() {
            return Ok(FilterResult::default());
        }
        let host = host.to_lowercase();

        let engines = self.engines.snapshot();
        Ok(match engines.block.as_ref() {
            Some(block) => matcher::match_host(block.engine(), &host, qtype, &settings.client_tags),
            None => FilterResult::default(),
        })
    }

    fn process_rewrites(&self, host: &str, qtype: RecordType) -> FilterResult {
        self.config.read().rewrites.resolve(host, qtype)
    }

    fn match_rules(
        &self,
        host: &str,
        qtype: RecordType,
        settings: &RequestFilteringSettings,
    ) -> FilterResult {
        let engines = self.engines.snapshot();
        let Some(block) = engines.block.as_ref() else {
            return FilterResult::default();
        };

        let res = matcher::match_host(block.engine(), host, qtype, &settings.client_tags);
        if res.reason != Reason::FilteredBlackList {
            return res;
        }

        if let Some(allow) = engines.allow.as_ref() {
            let allowed = matcher::match_host(allow.engine(), host, qtype, &settings.client_tags);
            if allowed.matched() {
                log::debug!(
                    "Filtering: {} is blocked by '{}' but allowed by '{}'",
                    host,
                    res.rule,
                    allowed.rule
                );
                return FilterResult::default();
            }
        }
        res
    }

    /// Replace block and allow rule lists. See [`EngineManager::set_filters`].
    pub fn set_filters(
        &self,
        block: Vec<Filter>,
        allow: Vec<Filter>,
        background: bool,
    ) -> Result<()> {
        self.engines.set_filters(block, allow, background)
    }

    /// Start the background rebuild worker.
    pub fn start(&self) -> Result<()> {
        self.engines.start()
    }

    /// Stop the rebuild worker and drop the installed rules.
    pub fn close(&self) {
        self.engines.close();
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Change the configuration.
    ///
    /// Rewrite entries are normalized after `update` runs; if one is
    /// invalid the configuration is left as it was.
    pub fn update_config<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        let hook = {
            let mut config = self.config.write();
            let mut next = config.clone();
            update(&mut next);
            next.rewrites.prepare()?;
            *config = next;
            config.config_modified.clone()
        };
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    /// Replace the rewrite table.
    pub fn set_rewrites(&self, entries: Vec<RewriteEntry>) -> Result<()> {
        self.update_config(|config| config.rewrites = entries.into())
    }

    /// Normalize and add a rewrite entry. Returns false if it was already
    /// present; an invalid entry is an error.
    pub fn add_rewrite(&self, entry: RewriteEntry) -> Result<bool> {
        self.modify_rewrites(|config| config.rewrites.add(entry))
    }

    /// Remove a rewrite entry, compared once normalized. Returns false if it
    /// was not present.
    pub fn remove_rewrite(&self, entry: &RewriteEntry) -> Result<bool> {
        self.modify_rewrites(|config| config.rewrites.remove(entry))
    }

    fn modify_rewrites<F>(&self, modify: F) -> Result<bool>
    where
        F: FnOnce(&mut Config) -> Result<bool>,
    {
        let (changed, config) = {
            let mut config = self.config.write();
            let changed = modify(&mut config)?;
            (changed, config.clone())
        };
        if changed {
            config.notify_modified();
        }
        Ok(changed)
    }

    /// Request settings seeded from the configuration toggles.
    ///
    /// Rule filtering is off and there are no client tags or blocked
    /// services; callers fill those in.
    pub fn request_settings(&self) -> RequestFilteringSettings {
        let config = self.config.read();
        RequestFilteringSettings {
            safe_search_enabled: config.safe_search_enabled,
            safe_browsing_enabled: config.safe_browsing_enabled,
            parental_enabled: config.parental_enabled,
            ..Default::default()
        }
    }

    /// Register the safe search classifier.
    pub fn set_safe_search<C: Classifier + 'static>(&self, classifier: C) {
        let wrapped = self.wrap(classifier, ClassifierKind::SafeSearch);
        self.classifiers.write().safe_search = Some(wrapped);
    }

    /// Register the safe browsing classifier.
    pub fn set_safe_browsing<C: Classifier + 'static>(&self, classifier: C) {
        let wrapped = self.wrap(classifier, ClassifierKind::SafeBrowsing);
        self.classifiers.write().safe_browsing = Some(wrapped);
    }

    /// Register the parental control classifier.
    pub fn set_parental<C: Classifier + 'static>(&self, classifier: C) {
        let wrapped = self.wrap(classifier, ClassifierKind::Parental);
        self.classifiers.write().parental = Some(wrapped);
    }

    fn wrap<C>(&self, classifier: C, kind: ClassifierKind) -> Arc<dyn Classifier>
    where
        C: Classifier + 'static,
    {
        Arc::new(CachedClassifier::new(classifier, kind, Arc::clone(&self.context)))
    }

    /// Lookup statistics of the classifiers.
    pub fn stats(&self) -> Stats {
        self.context.stats()
    }

    /// The context holding classifier caches and counters.
    pub fn context(&self) -> &Arc<FilterContext> {
        &self.context
    }
}
