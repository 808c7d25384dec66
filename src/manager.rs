//! Block and allow rule engines with hot reload support.
//!
//! This module keeps the engine pair used by the filtering pipeline:
//! - Atomic replacement of the whole pair, readers never see a mixed pair
//! - Synchronous rebuilds that report errors to the caller
//! - Background rebuilds through a single pending slot, where a newer
//!   request replaces one that has not been picked up yet

use arc_swap::ArcSwap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::DnsEngine;
use crate::storage::{Filter, RuleStorage};
use crate::{Error, Result};

/// Name of the background rebuild thread.
const WORKER_NAME: &str = "dnsfilter-rebuild";

/// RuleEngine is a rule storage and the engine indexed from it.
pub struct RuleEngine {
    storage: RuleStorage,
    engine: DnsEngine,
}

impl RuleEngine {
    pub fn engine(&self) -> &DnsEngine {
        &self.engine
    }

    pub fn storage(&self) -> &RuleStorage {
        &self.storage
    }
}

/// Build a rule engine from filter sources.
///
/// Fails if a rule file cannot be read or a rule cannot be parsed.
pub fn build_engine(filters: &[Filter]) -> Result<RuleEngine> {
    let storage = RuleStorage::new(filters)?;
    let engine = DnsEngine::new(&storage)?;
    Ok(RuleEngine { storage, engine })
}

/// Engines is the installed block and allow pair.
///
/// A snapshot stays valid for as long as it is held, even if a newer pair
/// is installed in the meantime.
#[derive(Default)]
pub struct Engines {
    pub block: Option<RuleEngine>,
    pub allow: Option<RuleEngine>,
}

impl Engines {
    /// Build both engines. Nothing is returned unless both succeed.
    fn build(request: &RebuildRequest) -> Result<Self> {
        let block = build_engine(&request.block)?;
        let allow = build_engine(&request.allow)?;
        Ok(Self {
            block: Some(block),
            allow: Some(allow),
        })
    }
}

/// Filters for one rebuild.
#[derive(Debug, Clone)]
struct RebuildRequest {
    /// Submission order, a request never replaces a newer one
    seq: u64,
    block: Vec<Filter>,
    allow: Vec<Filter>,
}

#[derive(Default)]
struct Pending {
    request: Option<RebuildRequest>,
    /// The worker has taken a request and not finished it yet
    in_progress: bool,
    shutdown: bool,
}

struct Shared {
    engines: ArcSwap<Engines>,
    pending: Mutex<Pending>,
    ready: Condvar,
    /// Held for a whole build and install; holds the seq of the installed pair
    installed: Mutex<u64>,
    next_seq: AtomicU64,
    /// Mirrors `Pending::shutdown` for the query path
    closed: AtomicBool,
    /// Incremented on each installed pair
    generation: AtomicU64,
}

impl Shared {
    fn request(&self, block: Vec<Filter>, allow: Vec<Filter>) -> RebuildRequest {
        RebuildRequest {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
            block,
            allow,
        }
    }

    /// Build and install a pair. Builds run one at a time; a request older
    /// than the installed pair is dropped.
    fn rebuild(&self, request: &RebuildRequest) -> Result<()> {
        let mut installed = self.installed.lock();
        if request.seq < *installed {
            log::debug!(
                "Skipped rule rebuild {}, rebuild {} is already installed",
                request.seq,
                *installed
            );
            return Ok(());
        }

        let engines = Engines::build(request)?;
        self.engines.store(Arc::new(engines));
        *installed = request.seq;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "Installed rule engines from {} block and {} allow lists (generation {})",
            request.block.len(),
            request.allow.len(),
            generation
        );
        Ok(())
    }
}

/// EngineManager owns the current engine pair and the rebuild worker.
///
/// # Example
///
/// ```
/// use dnsfilter::{EngineManager, Filter};
///
/// let manager = EngineManager::new();
/// manager
///     .set_filters(vec![Filter::inline("||ads.example.org^")], vec![], false)
///     .unwrap();
///
/// let engines = manager.snapshot();
/// let block = engines.block.as_ref().unwrap();
/// assert!(block.engine().match_host("ads.example.org", &[] as &[&str]).is_some());
/// ```
pub struct EngineManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for EngineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineManager {
    /// Create a manager with no engines installed.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                engines: ArcSwap::from_pointee(Engines::default()),
                pending: Mutex::new(Pending::default()),
                ready: Condvar::new(),
                installed: Mutex::new(0),
                next_seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Get the current engine pair.
    pub fn snapshot(&self) -> Arc<Engines> {
        self.shared.engines.load_full()
    }

    /// Number of pairs installed so far.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Replace the block and allow rule sources.
    ///
    /// With `background` unset the engines are rebuilt on the calling thread
    /// and installed before returning; a failed rebuild leaves the current
    /// pair in place and returns the error.
    ///
    /// With `background` set the request is queued for the rebuild worker and
    /// this returns at once. A request still waiting in the queue is
    /// replaced. Worker errors are only logged.
    ///
    /// Requests are installed in the order they were submitted: a rebuild
    /// that finishes late never replaces rules from a later call.
    pub fn set_filters(
        &self,
        block: Vec<Filter>,
        allow: Vec<Filter>,
        background: bool,
    ) -> Result<()> {
        if background {
            let mut pending = self.shared.pending.lock();
            if pending.shutdown {
                return Err(Error::Closed);
            }
            let request = self.shared.request(block, allow);
            if pending.request.replace(request).is_some() {
                log::debug!("Dropped pending rule rebuild in favour of a newer one");
            }
            self.shared.ready.notify_one();
            return Ok(());
        }

        if self.is_closed() {
            return Err(Error::Closed);
        }
        let request = self.shared.request(block, allow);
        self.shared.rebuild(&request).map_err(|e| {
            log::error!("Can't initialize filtering subsystem: {}", e);
            e
        })
    }

    /// Whether [`EngineManager::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Start the rebuild worker. Calling it again has no effect.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        if self.shared.pending.lock().shutdown {
            return Err(Error::Closed);
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || run_worker(shared))?;
        *worker = Some(handle);
        log::debug!("Started rule rebuild worker");
        Ok(())
    }

    /// Stop the worker and install an empty pair.
    ///
    /// Readers holding a snapshot keep it until they drop it. Calling it
    /// again has no effect.
    pub fn close(&self) {
        {
            let mut pending = self.shared.pending.lock();
            if pending.shutdown {
                return;
            }
            pending.shutdown = true;
            pending.request = None;
            self.shared.closed.store(true, Ordering::Release);
            self.shared.ready.notify_all();
        }

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                log::error!("Rule rebuild worker panicked");
            }
        }

        // Waits for a synchronous rebuild in flight; none installs afterwards
        let mut installed = self.shared.installed.lock();
        *installed = u64::MAX;
        self.shared.engines.store(Arc::new(Engines::default()));
        log::debug!("Closed rule engines");
    }
}

impl Drop for EngineManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(shared: Arc<Shared>) {
    loop {
        let request = {
            let mut pending = shared.pending.lock();
            loop {
                if pending.shutdown {
                    return;
                }
                if let Some(request) = pending.request.take() {
                    pending.in_progress = true;
                    break request;
                }
                shared.ready.wait(&mut pending);
            }
        };

        if let Err(e) = shared.rebuild(&request) {
            log::error!("Can't apply filters: {}", e);
        }
        shared.pending.lock().in_progress = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const NO_TAGS: &[&str] = &[];

    fn blocks(manager: &EngineManager, host: &str) -> bool {
        let engines = manager.snapshot();
        match engines.block.as_ref() {
            Some(block) => block.engine().match_host(host, NO_TAGS).is_some(),
            None => false,
        }
    }

    /// Wait until the worker has nothing queued or running.
    fn wait_idle(manager: &EngineManager) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            {
                let pending = manager.shared.pending.lock();
                if pending.request.is_none() && !pending.in_progress {
                    return;
                }
            }
            assert!(Instant::now() < deadline, "worker did not go idle");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_for_generation(manager: &EngineManager, generation: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.generation() < generation {
            assert!(Instant::now() < deadline, "rebuild did not finish");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_empty_until_set() {
        let manager = EngineManager::new();
        assert!(manager.snapshot().block.is_none());
        assert!(manager.snapshot().allow.is_none());
        assert_eq!(manager.generation(), 0);
    }

    #[test]
    fn test_sync_rebuild() {
        let manager = EngineManager::new();
        manager
            .set_filters(vec![Filter::inline("||one.example^")], vec![], false)
            .unwrap();
        assert!(blocks(&manager, "one.example"));
        assert_eq!(manager.generation(), 1);

        manager
            .set_filters(vec![Filter::inline("||two.example^")], vec![], false)
            .unwrap();
        assert!(!blocks(&manager, "one.example"));
        assert!(blocks(&manager, "two.example"));
    }

    #[test]
    fn test_malformed_rebuild_keeps_engines() {
        let manager = EngineManager::new();
        manager
            .set_filters(vec![Filter::inline("||one.example^")], vec![], false)
            .unwrap();

        let err = manager
            .set_filters(vec![Filter::inline("||two.example^$bogus")], vec![], false)
            .unwrap_err();
        assert!(matches!(err, Error::RuleParse { .. }));

        // The allow side failing aborts the whole rebuild too
        let err = manager
            .set_filters(
                vec![Filter::inline("||two.example^")],
                vec![Filter::inline("@@||bad host^")],
                false,
            )
            .unwrap_err();
        assert!(matches!(err, Error::RuleParse { .. }));

        assert!(blocks(&manager, "one.example"));
        assert!(!blocks(&manager, "two.example"));
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_background_requests_coalesce() {
        let manager = EngineManager::new();
        for name in ["one", "two", "three"] {
            let rules = format!("||{}.example^", name);
            manager
                .set_filters(vec![Filter::inline(rules)], vec![], true)
                .unwrap();
        }
        assert!(manager.snapshot().block.is_none());

        manager.start().unwrap();
        wait_for_generation(&manager, 1);

        assert!(blocks(&manager, "three.example"));
        assert!(!blocks(&manager, "one.example"));
        assert!(!blocks(&manager, "two.example"));

        // Nothing else was queued
        thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_queued_rebuild_does_not_replace_newer_sync() {
        let manager = EngineManager::new();
        manager
            .set_filters(vec![Filter::inline("||stale.example^")], vec![], true)
            .unwrap();
        manager
            .set_filters(vec![Filter::inline("||fresh.example^")], vec![], false)
            .unwrap();

        manager.start().unwrap();
        wait_idle(&manager);

        assert!(blocks(&manager, "fresh.example"));
        assert!(!blocks(&manager, "stale.example"));
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_slow_background_rebuild_does_not_replace_newer_sync() {
        let big: String = (0..200_000)
            .map(|i| format!("||host{}.stale.example^\n", i))
            .collect();

        let manager = EngineManager::new();
        manager.start().unwrap();
        manager
            .set_filters(vec![Filter::inline(big)], vec![], true)
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        manager
            .set_filters(vec![Filter::inline("||fresh.example^")], vec![], false)
            .unwrap();
        assert!(blocks(&manager, "fresh.example"));

        wait_idle(&manager);
        assert!(blocks(&manager, "fresh.example"));
        assert!(!blocks(&manager, "host1.stale.example"));
    }

    #[test]
    fn test_is_closed_does_not_take_queue_lock() {
        let manager = EngineManager::new();
        let _queue = manager.shared.pending.lock();
        assert!(!manager.is_closed());
    }

    #[test]
    fn test_background_after_start() {
        let manager = EngineManager::new();
        manager.start().unwrap();
        manager.start().unwrap();

        manager
            .set_filters(vec![Filter::inline("||late.example^")], vec![], true)
            .unwrap();
        wait_for_generation(&manager, 1);
        assert!(blocks(&manager, "late.example"));
    }

    #[test]
    fn test_snapshot_outlives_install() {
        let manager = EngineManager::new();
        manager
            .set_filters(vec![Filter::inline("||old.example^")], vec![], false)
            .unwrap();

        let old = manager.snapshot();
        manager
            .set_filters(vec![Filter::inline("||new.example^")], vec![], false)
            .unwrap();

        let block = old.block.as_ref().unwrap();
        assert!(block.engine().match_host("old.example", NO_TAGS).is_some());
        assert!(!block.storage().is_empty());
    }

    #[test]
    fn test_close() {
        let manager = EngineManager::new();
        manager.start().unwrap();
        manager
            .set_filters(vec![Filter::inline("||one.example^")], vec![], false)
            .unwrap();

        assert!(!manager.is_closed());
        manager.close();
        manager.close();
        assert!(manager.is_closed());
        assert!(manager.snapshot().block.is_none());
        assert!(matches!(
            manager.set_filters(vec![], vec![], true),
            Err(Error::Closed)
        ));
        assert!(matches!(manager.start(), Err(Error::Closed)));
    }
}
