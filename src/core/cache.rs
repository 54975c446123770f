//! Response cache keyed by operation and parameters.
//!
//! Every entry carries a version. Invalidation bumps the version instead of
//! dropping data, so readers keep seeing the last value while a refetch runs.
//! Data is fresh only when it was fetched at the current version and inside the
//! freshness window. At most one request per key is in flight; callers
//! arriving meanwhile share its outcome, and an invalidation aborts the
//! running request so its waiters move on to the replacement. Entries nobody
//! has used for the collection window are dropped.

use crate::core::ent::*;
use crate::core::error::{ApiError, ApiResult};
use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryRoot {
    Service,
    Services,
    Events,
}

impl QueryRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryRoot::Service => "service",
            QueryRoot::Services => "services",
            QueryRoot::Events => "service-events",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Service {
        id: String,
    },
    Services {
        page: u32,
        limit: u32,
        filters: ServiceFilters,
    },
    Events {
        service_id: String,
        page: u32,
        limit: u32,
    },
}

impl QueryKey {
    pub fn service(id: impl Into<String>) -> Self {
        QueryKey::Service { id: id.into() }
    }

    pub fn services(page: u32, limit: u32, filters: ServiceFilters) -> Self {
        QueryKey::Services {
            page,
            limit,
            filters,
        }
    }

    pub fn events(service_id: impl Into<String>, page: u32, limit: u32) -> Self {
        QueryKey::Events {
            service_id: service_id.into(),
            page,
            limit,
        }
    }

    pub fn root(&self) -> QueryRoot {
        match self {
            QueryKey::Service { .. } => QueryRoot::Service,
            QueryKey::Services { .. } => QueryRoot::Services,
            QueryKey::Events { .. } => QueryRoot::Events,
        }
    }
}

// Canonical form, also used as the log label.
impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Service { id } => write!(f, "service/{}", id),
            QueryKey::Services {
                page,
                limit,
                filters,
            } => {
                write!(f, "services?page={}&limit={}", page, limit)?;
                if let Some(status) = filters.status {
                    write!(f, "&status={}", status)?;
                }
                if let Some(name_like) = &filters.name_like {
                    write!(f, "&name_like={}", name_like)?;
                }
                if let Some(kind) = filters.service_type {
                    write!(f, "&type={}", kind)?;
                }
                Ok(())
            }
            QueryKey::Events {
                service_id,
                page,
                limit,
            } => write!(
                f,
                "service-events/{}?page={}&limit={}",
                service_id, page, limit
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Service(Service),
    Services(Page<Service>),
    Events(Page<Event>),
}

impl QueryData {
    pub fn into_service(self) -> ApiResult<Service> {
        match self {
            QueryData::Service(service) => Ok(service),
            other => Err(mismatch("service", &other)),
        }
    }

    pub fn into_services(self) -> ApiResult<Page<Service>> {
        match self {
            QueryData::Services(page) => Ok(page),
            other => Err(mismatch("services page", &other)),
        }
    }

    pub fn into_events(self) -> ApiResult<Page<Event>> {
        match self {
            QueryData::Events(page) => Ok(page),
            other => Err(mismatch("events page", &other)),
        }
    }
}

fn mismatch(expected: &str, found: &QueryData) -> ApiError {
    let found = match found {
        QueryData::Service(_) => "service",
        QueryData::Services(_) => "services page",
        QueryData::Events(_) => "events page",
    };
    ApiError::Decode(format!("expected {} in cache, found {}", expected, found))
}

/// Idle entries outlive their last use by this long unless configured.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(300);

/// A request shared by every caller of one key. Resolves to `None` when an
/// invalidation aborted it before it settled.
pub type SharedFetch = Shared<BoxFuture<'static, Option<ApiResult<QueryData>>>>;

pub enum Lookup {
    /// Served from cache, no request needed.
    Fresh(QueryData),
    /// Joined a request that was already in flight.
    Joined(SharedFetch),
    /// Started a new request.
    Started(SharedFetch),
}

struct InFlight {
    version: u64,
    fetch: SharedFetch,
    abort: AbortHandle,
}

struct Entry {
    data: Option<QueryData>,
    data_version: u64,
    updated_at: Option<Instant>,
    version: u64,
    in_flight: Option<InFlight>,
    observers: usize,
    last_used: Instant,
}

impl Entry {
    fn new() -> Entry {
        Entry {
            data: None,
            data_version: 0,
            updated_at: None,
            version: 0,
            in_flight: None,
            observers: 0,
            last_used: Instant::now(),
        }
    }

    fn is_fresh(&self, stale_time: Duration) -> bool {
        self.data.is_some()
            && self.data_version == self.version
            && self
                .updated_at
                .map_or(false, |at| at.elapsed() < stale_time)
    }

    fn current_fetch(&self) -> Option<&SharedFetch> {
        match &self.in_flight {
            Some(in_flight) if in_flight.version == self.version => Some(&in_flight.fetch),
            _ => None,
        }
    }

    fn is_idle(&self, gc_time: Duration) -> bool {
        self.observers == 0 && self.in_flight.is_none() && self.last_used.elapsed() >= gc_time
    }
}

fn sweep(entries: &mut HashMap<QueryKey, Entry>, gc_time: Duration) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_idle(gc_time));
    before - entries.len()
}

type Entries = Mutex<HashMap<QueryKey, Entry>>;

#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<Entries>,
    stale_time: Duration,
    gc_time: Duration,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> QueryCache {
        QueryCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
            stale_time,
            gc_time: DEFAULT_GC_TIME,
        }
    }

    /// How long an entry with no observers and no request survives its last use.
    pub fn with_gc_time(mut self, gc_time: Duration) -> QueryCache {
        self.gc_time = gc_time;
        self
    }

    /// Resolves `key` against the cache. With `force` the freshness check is
    /// skipped, but a request already in flight for the current version is
    /// still joined instead of duplicated.
    pub fn lookup<F>(&self, key: &QueryKey, force: bool, fetcher: F) -> Lookup
    where
        F: FnOnce() -> BoxFuture<'static, ApiResult<QueryData>>,
    {
        let mut entries = self.entries.lock();
        sweep(&mut entries, self.gc_time);
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.last_used = Instant::now();
        if !force && entry.is_fresh(self.stale_time) {
            if let Some(data) = &entry.data {
                return Lookup::Fresh(data.clone());
            }
        }
        if let Some(fetch) = entry.current_fetch() {
            return Lookup::Joined(fetch.clone());
        }

        let version = entry.version;
        let request = fetcher();
        let (abort, registration) = AbortHandle::new_pair();
        let weak = Arc::downgrade(&self.entries);
        let settle_key = key.clone();
        let fetch = async move {
            let Ok(result) = Abortable::new(request, registration).await else {
                return None;
            };
            settle(&weak, &settle_key, version, &result);
            Some(result)
        }
        .boxed()
        .shared();
        entry.in_flight = Some(InFlight {
            version,
            fetch: fetch.clone(),
            abort,
        });
        Lookup::Started(fetch)
    }

    /// Resolves `key` to a value, following an aborted request to the one
    /// that replaced it. The flag tells whether this call issued the request
    /// whose outcome is returned.
    pub async fn fetch<F>(&self, key: &QueryKey, force: bool, fetcher: F) -> (ApiResult<QueryData>, bool)
    where
        F: Fn() -> BoxFuture<'static, ApiResult<QueryData>>,
    {
        loop {
            let (fetch, started) = match self.lookup(key, force, &fetcher) {
                Lookup::Fresh(data) => return (Ok(data), false),
                Lookup::Joined(fetch) => (fetch, false),
                Lookup::Started(fetch) => (fetch, true),
            };
            match fetch.await {
                Some(result) => return (result, started),
                None => tracing::debug!("request for {} superseded", key),
            }
        }
    }

    /// Last stored value for `key`, fresh or not.
    pub fn peek(&self, key: &QueryKey) -> Option<QueryData> {
        self.entries
            .lock()
            .get(key)
            .and_then(|entry| entry.data.clone())
    }

    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.entries
            .lock()
            .get(key)
            .map_or(false, |entry| entry.is_fresh(self.stale_time))
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.entries
            .lock()
            .get(key)
            .map_or(false, |entry| entry.in_flight.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries that have been idle for the collection window. Returns
    /// how many were removed.
    pub fn collect_garbage(&self) -> usize {
        sweep(&mut self.entries.lock(), self.gc_time)
    }

    pub fn invalidate_root(&self, root: QueryRoot) -> usize {
        self.invalidate_where(|key| key.root() == root)
    }

    pub fn invalidate_key(&self, key: &QueryKey) -> usize {
        self.invalidate_where(|candidate| candidate == key)
    }

    fn invalidate_where(&self, matches: impl Fn(&QueryKey) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if matches(key) {
                entry.version += 1;
                if let Some(superseded) = entry.in_flight.take() {
                    superseded.abort.abort();
                }
                count += 1;
            }
        }
        count
    }

    /// Registers interest in `key` until the returned guard is dropped.
    pub fn observe(&self, key: QueryKey) -> ActiveQuery {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.observers += 1;
        entry.last_used = Instant::now();
        drop(entries);
        ActiveQuery {
            entries: Arc::downgrade(&self.entries),
            key,
        }
    }

    pub fn active_keys(&self) -> Vec<QueryKey> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.observers > 0)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

fn settle(entries: &Weak<Entries>, key: &QueryKey, version: u64, result: &ApiResult<QueryData>) {
    let Some(entries) = entries.upgrade() else {
        return;
    };
    let mut entries = entries.lock();
    let Some(entry) = entries.get_mut(key) else {
        return;
    };
    if matches!(&entry.in_flight, Some(in_flight) if in_flight.version == version) {
        entry.in_flight = None;
    }
    entry.last_used = Instant::now();
    // An older request finishing late must not clobber newer data.
    if let Ok(data) = result {
        if entry.data.is_none() || version >= entry.data_version {
            entry.data = Some(data.clone());
            entry.data_version = version;
            entry.updated_at = Some(Instant::now());
        }
    }
}

/// Keeps a key in the set refetched by background revalidation.
pub struct ActiveQuery {
    entries: Weak<Entries>,
    key: QueryKey,
}

impl ActiveQuery {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for ActiveQuery {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            if let Some(entry) = entries.lock().get_mut(&self.key) {
                entry.observers = entry.observers.saturating_sub(1);
                entry.last_used = Instant::now();
            }
        }
    }
}

impl fmt::Debug for ActiveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveQuery").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample(id: &str) -> QueryData {
        QueryData::Service(Service {
            id: id.to_string(),
            name: format!("Service {}", id),
            status: ServiceStatus::Online,
            service_type: ServiceType::Api,
        })
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        id: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, ApiResult<QueryData>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::task::yield_now().await;
                Ok(sample(id))
            }
            .boxed()
        }
    }

    async fn resolve(lookup: Lookup) -> ApiResult<QueryData> {
        match lookup {
            Lookup::Fresh(data) => Ok(data),
            Lookup::Joined(fetch) | Lookup::Started(fetch) => fetch.await.expect("request was aborted"),
        }
    }

    struct Live(Arc<AtomicUsize>);

    impl Drop for Live {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    // Each call answers with "v{n}" after a short delay and tracks how many
    // requests are running at once.
    fn tracked_fetch(
        calls: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, ApiResult<QueryData>> + Clone + Send + Sync + 'static {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let live = live.clone();
            let peak = peak.clone();
            async move {
                let running = live.fetch_add(1, Ordering::SeqCst) + 1;
                let _live = Live(live);
                peak.fetch_max(running, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(sample(&format!("v{}", n)))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_request() {
        let cache = QueryCache::new(Duration::from_secs(15));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::service("s1");

        let first = cache.lookup(&key, false, counting_fetch(&calls, "s1"));
        let second = cache.lookup(&key, false, counting_fetch(&calls, "s1"));
        assert!(matches!(first, Lookup::Started(_)));
        assert!(matches!(second, Lookup::Joined(_)));

        let (a, b) = tokio::join!(resolve(first), resolve(second));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let third = cache.lookup(&key, false, counting_fetch(&calls, "s1"));
        assert!(matches!(third, Lookup::Fresh(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidation_keeps_data_but_forces_refetch() {
        let cache = QueryCache::new(Duration::from_secs(15));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::services(1, 20, ServiceFilters::default());
        let other = QueryKey::service("s1");

        resolve(cache.lookup(&key, false, counting_fetch(&calls, "a")))
            .await
            .unwrap();
        resolve(cache.lookup(&other, false, counting_fetch(&calls, "b")))
            .await
            .unwrap();

        assert_eq!(cache.invalidate_root(QueryRoot::Services), 1);
        assert!(!cache.is_fresh(&key));
        assert!(cache.is_fresh(&other));
        assert!(cache.peek(&key).is_some());

        let again = cache.lookup(&key, false, counting_fetch(&calls, "a"));
        assert!(matches!(again, Lookup::Started(_)));
        resolve(again).await.unwrap();
        assert!(cache.is_fresh(&key));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalidation_aborts_the_running_request() {
        let cache = QueryCache::new(Duration::from_secs(15));
        let key = QueryKey::service("s1");
        let calls = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let fetcher = tracked_fetch(calls.clone(), live.clone(), peak.clone());

        let waiter = {
            let cache = cache.clone();
            let key = key.clone();
            let fetcher = fetcher.clone();
            tokio::spawn(async move { cache.fetch(&key, false, fetcher).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.is_fetching(&key));
        assert_eq!(live.load(Ordering::SeqCst), 1);

        cache.invalidate_key(&key);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (ours, _) = cache.fetch(&key, false, fetcher).await;
        let (theirs, started) = waiter.await.unwrap();

        assert_eq!(ours.unwrap(), sample("v2"));
        assert_eq!(theirs.unwrap(), sample("v2"));
        assert!(started);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(cache.is_fresh(&key));
    }

    #[tokio::test]
    async fn test_aborted_request_leaves_no_data() {
        let cache = QueryCache::new(Duration::from_secs(15));
        let key = QueryKey::service("s1");
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = tracked_fetch(calls, Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));

        let Lookup::Started(before) = cache.lookup(&key, false, &fetcher) else {
            panic!("expected a new request");
        };
        cache.invalidate_key(&key);
        assert!(!cache.is_fetching(&key));
        assert_eq!(before.await, None);
        assert_eq!(cache.peek(&key), None);
    }

    #[tokio::test]
    async fn test_idle_entries_are_collected() {
        let cache = QueryCache::new(Duration::from_millis(1)).with_gc_time(Duration::from_millis(200));
        let calls = Arc::new(AtomicUsize::new(0));
        let kept = QueryKey::services(1, 20, ServiceFilters::default());
        let _active = cache.observe(kept.clone());

        for i in 0..100 {
            let filters = ServiceFilters {
                name_like: Some(format!("term {}", i)),
                ..ServiceFilters::default()
            };
            resolve(cache.lookup(&QueryKey::services(1, 20, filters), false, counting_fetch(&calls, "s1")))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 101);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let fresh = QueryKey::service("s1");
        resolve(cache.lookup(&fresh, false, counting_fetch(&calls, "s1")))
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.active_keys(), vec![kept]);
        assert_eq!(cache.peek(&fresh), Some(sample("s1")));
        assert_eq!(cache.collect_garbage(), 0);
    }

    #[tokio::test]
    async fn test_failures_keep_previous_data() {
        let cache = QueryCache::new(Duration::ZERO);
        let key = QueryKey::service("s1");
        let calls = Arc::new(AtomicUsize::new(0));
        resolve(cache.lookup(&key, false, counting_fetch(&calls, "s1")))
            .await
            .unwrap();

        let failed = cache.lookup(&key, false, || {
            async { Err::<QueryData, _>(ApiError::Network("connection refused".to_string())) }.boxed()
        });
        assert!(resolve(failed).await.is_err());
        assert_eq!(cache.peek(&key), Some(sample("s1")));
        assert!(!cache.is_fetching(&key));
    }

    #[test]
    fn test_observers_are_released_on_drop() {
        let cache = QueryCache::new(Duration::from_secs(15));
        let key = QueryKey::events("s1", 1, 20);
        let guard = cache.observe(key.clone());
        let second = cache.observe(key.clone());
        assert_eq!(cache.active_keys(), vec![key.clone()]);
        drop(guard);
        assert_eq!(cache.active_keys(), vec![key]);
        drop(second);
        assert!(cache.active_keys().is_empty());
    }

    #[test]
    fn test_canonical_keys() {
        let filters = ServiceFilters {
            status: Some(ServiceStatus::Online),
            name_like: Some("Serv".to_string()),
            service_type: None,
        };
        assert_eq!(
            QueryKey::services(2, 20, filters).to_string(),
            "services?page=2&limit=20&status=online&name_like=Serv"
        );
        assert_eq!(
            QueryKey::events("s1", 1, 20).to_string(),
            "service-events/s1?page=1&limit=20"
        );
    }
}
