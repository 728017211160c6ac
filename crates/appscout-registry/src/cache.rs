//! Two-tier registry cache.
//!
//! Holds the current registry snapshot in memory and mirrors it into a
//! [`DurableStore`] under a single key. Resolution order on every read:
//! 1. Fresh in-memory snapshot
//! 2. Fresh durable record
//! 3. Rebuild, falling back to the (possibly expired) durable record when the
//!    rebuild fails or finds nothing
//!
//! Only one build runs at a time. Callers that arrive during a build wait for
//! it and reuse its outcome, whether that is a fresh registry, a stale
//! fallback or an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    DurableStore, GithubClient, GithubScanner, ProgressCallback, ProgressReporter, Registry,
    RegistryBuilder, RegistryConfig, RegistryEntry, RegistryError, RegistryKey, RepoScanner,
};

/// Durable form of a registry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Namespaced keys and their entries, in registration order.
    pub data: Vec<(RegistryKey, RegistryEntry)>,
    /// Build completion time, epoch milliseconds.
    pub timestamp: i64,
}

impl CacheRecord {
    pub fn from_registry(registry: &Registry, built_at: DateTime<Utc>) -> Self {
        Self {
            data: registry.to_pairs(),
            timestamp: built_at.timestamp_millis(),
        }
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        is_within_ttl(self.built_at(), now, ttl)
    }

    pub fn to_registry(&self) -> Registry {
        Registry::from_pairs(self.data.iter().cloned())
    }
}

fn is_within_ttl(built_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now.timestamp_millis().saturating_sub(built_at.timestamp_millis()) < ttl_ms
}

/// Lifecycle of the in-memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing loaded yet.
    Empty,
    /// A build is in progress.
    Loading,
    /// Snapshot within TTL.
    Ready { built_at: DateTime<Utc> },
    /// Snapshot past TTL; the next read rebuilds.
    Stale { built_at: DateTime<Utc> },
}

/// Result of the most recent build, shared with the callers that waited on it.
type BuildOutcome = Result<Arc<Registry>, Arc<RegistryError>>;

/// Clears the in-progress flag when a build ends, even by unwinding.
struct BuildingFlag<'a>(&'a AtomicBool);

impl<'a> BuildingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    registry: Arc<Registry>,
    built_at: DateTime<Utc>,
}

/// App registry with in-memory and durable caching.
///
/// Construct once and share (e.g. behind an `Arc`).
pub struct RegistryCache<S = GithubScanner> {
    config: Arc<RegistryConfig>,
    builder: RegistryBuilder<S>,
    store: Arc<dyn DurableStore>,
    snapshot: RwLock<Option<Snapshot>>,
    build_lock: Mutex<()>,
    /// Bumped each time a build finishes, successful or not.
    generation: AtomicU64,
    last_outcome: RwLock<Option<BuildOutcome>>,
    building: AtomicBool,
    progress: RwLock<Option<ProgressCallback>>,
}

impl RegistryCache<GithubScanner> {
    /// Create a cache scanning GitHub as described by `config`.
    pub fn new(config: RegistryConfig, store: Arc<dyn DurableStore>) -> Result<Self, RegistryError> {
        let config = Arc::new(config);
        let client = GithubClient::new(Arc::clone(&config))?;
        let scanner = Arc::new(GithubScanner::new(client));
        Ok(Self::from_parts(config, scanner, store))
    }
}

impl<S: RepoScanner> RegistryCache<S> {
    /// Create a cache over a custom scanner.
    pub fn with_scanner(config: RegistryConfig, scanner: Arc<S>, store: Arc<dyn DurableStore>) -> Self {
        Self::from_parts(Arc::new(config), scanner, store)
    }

    fn from_parts(config: Arc<RegistryConfig>, scanner: Arc<S>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            builder: RegistryBuilder::new(scanner, config.batch_size),
            config,
            store,
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            last_outcome: RwLock::new(None),
            building: AtomicBool::new(false),
            progress: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Whether lookups can be served. Discovery needs no configuration.
    pub fn is_configured(&self) -> bool {
        true
    }

    /// Set (or clear) the observer for subsequent operations.
    pub async fn set_progress_callback(&self, callback: Option<ProgressCallback>) {
        *self.progress.write().await = callback;
    }

    async fn reporter(&self) -> ProgressReporter {
        ProgressReporter::from(self.progress.read().await.clone())
    }

    /// Current lifecycle state of the in-memory tier.
    pub async fn state(&self) -> CacheState {
        if self.building.load(Ordering::Acquire) {
            return CacheState::Loading;
        }
        match self.snapshot.read().await.as_ref() {
            None => CacheState::Empty,
            Some(s) if is_within_ttl(s.built_at, Utc::now(), self.config.ttl) => {
                CacheState::Ready {
                    built_at: s.built_at,
                }
            }
            Some(s) => CacheState::Stale {
                built_at: s.built_at,
            },
        }
    }

    /// All known entries, one per app id.
    pub async fn fetch_registry(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let progress = self.reporter().await;
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(registry) = self.fresh_snapshot().await {
            progress.report("Using cached data");
            return Ok(registry.unique_entries());
        }
        let registry = self.load_or_build(seen, &progress).await?;
        Ok(registry.unique_entries())
    }

    /// The registry snapshot, loading or building it if missing or expired.
    pub async fn registry(&self) -> Result<Arc<Registry>, RegistryError> {
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(registry) = self.fresh_snapshot().await {
            return Ok(registry);
        }
        let progress = self.reporter().await;
        self.load_or_build(seen, &progress).await
    }

    /// Resolve an app id and optional browser pathname to its repository.
    ///
    /// `Ok(None)` means no known repository; only a failed registry load
    /// with nothing cached is an error.
    pub async fn resolve(
        &self,
        app_id: &str,
        pathname: Option<&str>,
    ) -> Result<Option<RegistryEntry>, RegistryError> {
        let registry = self.registry().await?;
        let entry = registry.resolve(app_id, pathname).cloned();
        debug!(app_id, pathname, found = entry.is_some(), "resolved app");
        Ok(entry)
    }

    /// Drop both cache tiers and rebuild.
    pub async fn refresh(&self) -> Result<(), RegistryError> {
        let progress = self.reporter().await;
        let _guard = self.build_lock.lock().await;
        self.clear_tiers().await;
        self.run_build(&progress).await?;
        Ok(())
    }

    /// Drop both cache tiers without rebuilding.
    pub async fn clear(&self) {
        let _guard = self.build_lock.lock().await;
        self.clear_tiers().await;
    }

    async fn clear_tiers(&self) {
        *self.snapshot.write().await = None;
        *self.last_outcome.write().await = None;
        if let Err(e) = self.store.remove(&self.config.cache_key).await {
            warn!(error = %e, "failed to clear durable registry cache");
        }
    }

    async fn fresh_snapshot(&self) -> Option<Arc<Registry>> {
        let guard = self.snapshot.read().await;
        let snapshot = guard.as_ref()?;
        is_within_ttl(snapshot.built_at, Utc::now(), self.config.ttl)
            .then(|| Arc::clone(&snapshot.registry))
    }

    /// `seen` is the build generation observed before the caller found the
    /// snapshot missing or expired.
    async fn load_or_build(
        &self,
        seen: u64,
        progress: &ProgressReporter,
    ) -> Result<Arc<Registry>, RegistryError> {
        let _guard = self.build_lock.lock().await;

        // A build finished while we waited; its outcome stands even if it
        // was a stale fallback or a failure
        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(outcome) = self.last_outcome.read().await.clone() {
                debug!("sharing outcome of concurrent registry build");
                return outcome.map_err(RegistryError::Shared);
            }
        }

        if let Some(registry) = self.fresh_snapshot().await {
            return Ok(registry);
        }

        self.run_build(progress).await
    }

    /// Rebuild and publish the outcome to waiting callers. Caller holds
    /// `build_lock`.
    async fn run_build(&self, progress: &ProgressReporter) -> Result<Arc<Registry>, RegistryError> {
        let outcome = {
            let _building = BuildingFlag::raise(&self.building);
            self.rebuild_locked(progress).await.map_err(Arc::new)
        };
        *self.last_outcome.write().await = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        outcome.map_err(RegistryError::Shared)
    }

    /// Steps 2 and 3 of the resolution order. Caller holds `build_lock`.
    async fn rebuild_locked(&self, progress: &ProgressReporter) -> Result<Arc<Registry>, RegistryError> {
        let stored = self.load_record().await;

        if let Some(record) = stored.as_ref().filter(|r| r.is_fresh(Utc::now(), self.config.ttl)) {
            info!(keys = record.data.len(), "loading registry from durable cache");
            progress.report("Loaded from cache");
            return Ok(self.adopt(record.to_registry(), record.built_at()).await);
        }

        let registry = match (self.builder.build(progress).await, stored) {
            (Ok(registry), Some(record)) if registry.is_empty() => {
                info!("no results from API, using stale cache");
                progress.report("Using stale cache (no API results)");
                return Ok(self.adopt(record.to_registry(), record.built_at()).await);
            }
            (Ok(registry), _) => registry,
            (Err(e), Some(record)) => {
                warn!(error = %e, "registry build failed, using stale cache");
                progress.report("Using stale cache (API error)");
                return Ok(self.adopt(record.to_registry(), record.built_at()).await);
            }
            (Err(e), None) => return Err(e),
        };

        let built_at = Utc::now();
        self.save_record(&CacheRecord::from_registry(&registry, built_at))
            .await;
        Ok(self.adopt(registry, built_at).await)
    }

    async fn adopt(&self, registry: Registry, built_at: DateTime<Utc>) -> Arc<Registry> {
        let registry = Arc::new(registry);
        *self.snapshot.write().await = Some(Snapshot {
            registry: Arc::clone(&registry),
            built_at,
        });
        registry
    }

    async fn load_record(&self) -> Option<CacheRecord> {
        let raw = match self.store.get(&self.config.cache_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read durable registry cache");
                return None;
            }
        };
        match serde_json::from_str::<CacheRecord>(&raw) {
            Ok(record) if record.timestamp > 0 => Some(record),
            Ok(_) => {
                warn!("durable registry cache has no timestamp, ignoring");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to parse durable registry cache");
                None
            }
        }
    }

    async fn save_record(&self, record: &CacheRecord) {
        let result = match serde_json::to_string(record) {
            Ok(json) => self.store.set(&self.config.cache_key, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to save durable registry cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::builder::RepoScan;
    use crate::{MemoryStore, ModuleRoute, RepoRef};

    const KEY: &str = crate::config::DEFAULT_CACHE_KEY;

    /// Scanner returning a fixed outcome and counting listings.
    struct StubScanner {
        outcome: StubOutcome,
        listings: AtomicUsize,
        store: Option<Arc<MemoryStore>>,
        key_present_during_listing: StdMutex<Vec<bool>>,
    }

    #[derive(Clone, Copy)]
    enum StubOutcome {
        Apps,
        Nothing,
        Fail,
    }

    impl StubScanner {
        fn new(outcome: StubOutcome) -> Self {
            Self {
                outcome,
                listings: AtomicUsize::new(0),
                store: None,
                key_present_during_listing: StdMutex::new(Vec::new()),
            }
        }

        fn watching(mut self, store: Arc<MemoryStore>) -> Self {
            self.store = Some(store);
            self
        }
    }

    #[async_trait]
    impl RepoScanner for StubScanner {
        async fn list_repositories(
            &self,
            _progress: &ProgressReporter,
        ) -> Result<Vec<RepoRef>, RegistryError> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            if let Some(store) = &self.store {
                let present = store.get(KEY).await.unwrap().is_some();
                self.key_present_during_listing.lock().unwrap().push(present);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            match self.outcome {
                StubOutcome::Apps => Ok(vec![RepoRef::new("org", "advisor")]),
                StubOutcome::Nothing => Ok(vec![]),
                StubOutcome::Fail => Err(RegistryError::RateLimited {
                    endpoint: "/orgs/org/repos".into(),
                }),
            }
        }

        async fn scan(&self, _repo: &RepoRef) -> RepoScan {
            RepoScan {
                app_name: Some("advisor".into()),
                modules: vec![
                    ModuleRoute {
                        module_id: "advisor".into(),
                        pathnames: vec!["/insights/advisor".into()],
                    },
                    ModuleRoute {
                        module_id: "advisor-systems".into(),
                        pathnames: vec!["/insights/advisor/systems".into()],
                    },
                ],
            }
        }
    }

    fn stale_record() -> CacheRecord {
        CacheRecord {
            data: vec![
                (
                    RegistryKey::app_name("rbac"),
                    RegistryEntry::new("rbac", "RedHatInsights/insights-rbac-ui"),
                ),
                (
                    RegistryKey::path("/iam/user-access"),
                    RegistryEntry::new("rbac", "RedHatInsights/insights-rbac-ui"),
                ),
            ],
            timestamp: (Utc::now() - chrono::Duration::days(30)).timestamp_millis(),
        }
    }

    async fn seeded_store(record: &CacheRecord) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .set(KEY, &serde_json::to_string(record).unwrap())
            .await
            .unwrap();
        store
    }

    fn cache(scanner: Arc<StubScanner>, store: Arc<MemoryStore>) -> RegistryCache<StubScanner> {
        RegistryCache::with_scanner(RegistryConfig::default(), scanner, store)
    }

    async fn recorder(cache: &RegistryCache<StubScanner>) -> Arc<StdMutex<Vec<String>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache
            .set_progress_callback(Some(Arc::new(move |s: &str| {
                sink.lock().unwrap().push(s.to_string());
            })))
            .await;
        seen
    }

    #[test]
    fn test_record_json_shape() {
        let mut registry = Registry::new();
        registry.register(
            RegistryKey::path("/insights/advisor"),
            RegistryEntry::new("advisor", "org/advisor"),
        );
        let built_at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let record = CacheRecord::from_registry(&registry, built_at);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": [["path:/insights/advisor", {"appId": "advisor", "githubRepo": "org/advisor"}]],
                "timestamp": 1_700_000_000_000i64
            })
        );
        let decoded: CacheRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_record_freshness() {
        let now = Utc::now();
        let ttl = Duration::from_secs(60);
        let mut record = CacheRecord {
            data: vec![],
            timestamp: (now - chrono::Duration::seconds(30)).timestamp_millis(),
        };
        assert!(record.is_fresh(now, ttl));
        record.timestamp = (now - chrono::Duration::seconds(61)).timestamp_millis();
        assert!(!record.is_fresh(now, ttl));
    }

    #[tokio::test]
    async fn test_build_persists_and_short_circuits() {
        let store = Arc::new(MemoryStore::new());
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        let cache = cache(Arc::clone(&scanner), Arc::clone(&store));
        assert_eq!(cache.state().await, CacheState::Empty);

        let first = cache.fetch_registry().await.unwrap();
        assert_eq!(
            first,
            vec![
                RegistryEntry::new("advisor", "org/advisor"),
                RegistryEntry::new("advisor-systems", "org/advisor"),
            ]
        );

        let seen = recorder(&cache).await;
        let second = cache.fetch_registry().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(scanner.listings.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["Using cached data"]);
        assert!(matches!(cache.state().await, CacheState::Ready { .. }));

        let raw = store.get(KEY).await.unwrap().unwrap();
        let record: CacheRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.data.len(), 3);
        assert!(record.is_fresh(Utc::now(), cache.config().ttl));
    }

    #[tokio::test]
    async fn test_fresh_durable_record_skips_build() {
        let mut record = stale_record();
        record.timestamp = Utc::now().timestamp_millis();
        let store = seeded_store(&record).await;
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        let cache = cache(Arc::clone(&scanner), store);
        let seen = recorder(&cache).await;

        let entries = cache.fetch_registry().await.unwrap();
        assert_eq!(
            entries,
            vec![RegistryEntry::new("rbac", "RedHatInsights/insights-rbac-ui")]
        );
        assert_eq!(scanner.listings.load(Ordering::SeqCst), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["Loaded from cache"]);
    }

    #[tokio::test]
    async fn test_empty_build_falls_back_to_stale_record() {
        let store = seeded_store(&stale_record()).await;
        let scanner = Arc::new(StubScanner::new(StubOutcome::Nothing));
        let cache = cache(Arc::clone(&scanner), Arc::clone(&store));
        let seen = recorder(&cache).await;

        let entries = cache.fetch_registry().await.unwrap();
        assert_eq!(
            entries,
            vec![RegistryEntry::new("rbac", "RedHatInsights/insights-rbac-ui")]
        );
        assert_eq!(
            seen.lock().unwrap().last().map(String::as_str),
            Some("Using stale cache (no API results)")
        );

        // The stale record is kept, not overwritten by the empty build
        let raw = store.get(KEY).await.unwrap().unwrap();
        let record: CacheRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.data, stale_record().data);
    }

    #[tokio::test]
    async fn test_failed_build_falls_back_to_stale_record() {
        let store = seeded_store(&stale_record()).await;
        let scanner = Arc::new(StubScanner::new(StubOutcome::Fail));
        let cache = cache(scanner, store);
        let seen = recorder(&cache).await;

        let entry = cache
            .resolve("anything", Some("/iam/user-access/users"))
            .await
            .unwrap();
        assert_eq!(
            entry,
            Some(RegistryEntry::new("rbac", "RedHatInsights/insights-rbac-ui"))
        );
        assert_eq!(
            seen.lock().unwrap().last().map(String::as_str),
            Some("Using stale cache (API error)")
        );
    }

    #[tokio::test]
    async fn test_failed_build_without_record_propagates() {
        let scanner = Arc::new(StubScanner::new(StubOutcome::Fail));
        let cache = cache(scanner, Arc::new(MemoryStore::new()));

        let err = cache.fetch_registry().await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(cache.resolve("advisor", None).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_build_without_record_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let scanner = Arc::new(StubScanner::new(StubOutcome::Nothing));
        let cache = cache(scanner, Arc::clone(&store));

        assert!(cache.fetch_registry().await.unwrap().is_empty());
        assert!(store.get(KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_record_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, "{ definitely not json").await.unwrap();
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        let cache = cache(Arc::clone(&scanner), store);

        let entries = cache.fetch_registry().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(scanner.listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        let cache = cache(Arc::clone(&scanner), Arc::new(MemoryStore::new()));

        let (a, b, c) = tokio::join!(
            cache.fetch_registry(),
            cache.resolve("advisor", Some("/insights/advisor/systems")),
            cache.fetch_registry(),
        );
        assert_eq!(a.unwrap(), c.unwrap());
        assert_eq!(b.unwrap().unwrap().app_id, "advisor-systems");
        assert_eq!(scanner.listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_stale_fallback() {
        for outcome in [StubOutcome::Fail, StubOutcome::Nothing] {
            let store = seeded_store(&stale_record()).await;
            let scanner = Arc::new(StubScanner::new(outcome));
            let cache = cache(Arc::clone(&scanner), store);

            let (a, b, c) = tokio::join!(
                cache.fetch_registry(),
                cache.resolve("rbac", Some("/iam/user-access")),
                cache.fetch_registry(),
            );
            let expected = vec![RegistryEntry::new("rbac", "RedHatInsights/insights-rbac-ui")];
            assert_eq!(a.unwrap(), expected);
            assert_eq!(c.unwrap(), expected);
            assert_eq!(b.unwrap().unwrap().app_id, "rbac");
            assert_eq!(scanner.listings.load(Ordering::SeqCst), 1);

            // The fallback is still expired, so the next read tries again
            cache.fetch_registry().await.unwrap();
            assert_eq!(scanner.listings.load(Ordering::SeqCst), 2);
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let scanner = Arc::new(StubScanner::new(StubOutcome::Fail));
        let cache = cache(Arc::clone(&scanner), Arc::new(MemoryStore::new()));

        let (a, b, c) = tokio::join!(
            cache.fetch_registry(),
            cache.resolve("advisor", None),
            cache.fetch_registry(),
        );
        assert!(a.unwrap_err().is_rate_limited());
        assert!(b.unwrap_err().is_rate_limited());
        assert!(c.unwrap_err().is_rate_limited());
        assert_eq!(scanner.listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_loading_only_during_build() {
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        let cache = cache(scanner, Arc::new(MemoryStore::new()));

        // Holding the lock without building, as clear() does, is not loading
        {
            let _held = cache.build_lock.lock().await;
            assert_eq!(cache.state().await, CacheState::Empty);
        }

        let (built, during) = tokio::join!(cache.fetch_registry(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache.state().await
        });
        built.unwrap();
        assert_eq!(during, CacheState::Loading);
        assert!(matches!(cache.state().await, CacheState::Ready { .. }));
    }

    #[tokio::test]
    async fn test_refresh_clears_durable_record_before_rebuild() {
        let store = Arc::new(MemoryStore::new());
        let scanner =
            Arc::new(StubScanner::new(StubOutcome::Apps).watching(Arc::clone(&store)));
        let cache = cache(Arc::clone(&scanner), Arc::clone(&store));

        cache.fetch_registry().await.unwrap();
        assert!(store.get(KEY).await.unwrap().is_some());

        cache.refresh().await.unwrap();

        assert_eq!(scanner.listings.load(Ordering::SeqCst), 2);
        assert_eq!(
            *scanner.key_present_during_listing.lock().unwrap(),
            vec![false, false]
        );
        assert!(store.get(KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_drops_both_tiers() {
        let store = Arc::new(MemoryStore::new());
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        let cache = cache(Arc::clone(&scanner), Arc::clone(&store));

        cache.fetch_registry().await.unwrap();
        cache.clear().await;

        assert_eq!(cache.state().await, CacheState::Empty);
        assert!(store.get(KEY).await.unwrap().is_none());

        cache.fetch_registry().await.unwrap();
        assert_eq!(scanner.listings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_stale() {
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        let cache = RegistryCache::with_scanner(
            RegistryConfig::default().with_ttl(Duration::ZERO),
            Arc::clone(&scanner),
            Arc::new(MemoryStore::new()),
        );

        cache.fetch_registry().await.unwrap();
        assert!(matches!(cache.state().await, CacheState::Stale { .. }));

        cache.fetch_registry().await.unwrap();
        assert_eq!(scanner.listings.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_is_configured() {
        let scanner = Arc::new(StubScanner::new(StubOutcome::Apps));
        assert!(cache(scanner, Arc::new(MemoryStore::new())).is_configured());
    }
}
