//! TTL response cache with a pluggable backing store.
//!
//! - **[`CacheKey`]** addresses one normalized response:
//!   `(resource_type, site_id, backend, resource_id | "all", query)`.
//!   Keys render with the resource type and site first, so every entry of
//!   one `(resource_type, site_id)` pair shares a string prefix and can be
//!   dropped in one `delete_prefix` call.
//!
//! - **[`CacheStore`]** is the storage seam. [`MemoryStore`] is the
//!   process-local implementation; a shared network store plugs in by
//!   implementing the same trait.
//!
//! - **[`Cache`]** wraps a store and never fails: store errors are logged
//!   and degrade to a miss (reads) or a no-op (writes, invalidation).
//!
//! Every invalidation advances a [`Generation`]. A read takes one before it
//! goes to the network and writes back through [`Cache::set_if_current`],
//! which refuses the write once the pair has been invalidated since.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::profile::BackendKind;

/// Id component used for collection (list) reads.
pub const ALL: &str = "all";

/// Memory-store size past which writes sweep out expired entries.
const SWEEP_THRESHOLD: usize = 1024;

// ── CacheKey ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub resource_type: String,
    pub site_id: String,
    pub backend: BackendKind,
    /// `None` renders as [`ALL`].
    pub resource_id: Option<String>,
    /// Canonical (sorted) query string, empty when there are no params.
    pub query: String,
}

/// Escape the separator characters so components cannot run together.
fn escape(component: &str) -> String {
    component
        .replace('%', "%25")
        .replace(':', "%3A")
        .replace('?', "%3F")
}

impl CacheKey {
    pub fn new(
        backend: BackendKind,
        site_id: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Self {
        Self {
            resource_type: resource_type.to_owned(),
            site_id: site_id.to_owned(),
            backend,
            resource_id: resource_id.map(str::to_owned),
            query: String::new(),
        }
    }

    /// Attach request params; order does not matter.
    pub fn with_query(mut self, params: &[(String, String)]) -> Self {
        let mut pairs: Vec<_> = params
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect();
        pairs.sort();
        self.query = pairs.join("&");
        self
    }

    /// Prefix shared by every key of one `(resource_type, site_id)` pair.
    pub fn scope_prefix(resource_type: &str, site_id: &str) -> String {
        format!("{}{}:", Self::resource_prefix(resource_type), escape(site_id))
    }

    /// Prefix shared by every key of one resource type, across sites.
    pub fn resource_prefix(resource_type: &str) -> String {
        format!("{}:", escape(resource_type))
    }

    /// The (escaped) site component of a rendered key.
    pub fn site_segment(rendered: &str) -> Option<&str> {
        rendered.split(':').nth(1)
    }

    /// `resource:site:backend:id[?query]`
    pub fn render(&self) -> String {
        let id = self.resource_id.as_deref().unwrap_or(ALL);
        let mut key = format!(
            "{}{}:{}",
            Self::scope_prefix(&self.resource_type, &self.site_id),
            self.backend,
            escape(id)
        );
        if !self.query.is_empty() {
            key.push('?');
            key.push_str(&self.query);
        }
        key
    }
}

// ── CacheStore ──────────────────────────────────────────────────────

/// The backing store could not be reached or refused the operation.
#[derive(Debug, Clone, Error)]
#[error("cache store unavailable: {0}")]
pub struct StoreError(pub String);

/// Key-value storage with per-entry TTL.
///
/// Implementations must never return an entry once its TTL has elapsed.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError>;

    /// Remove one key; `true` if it was present.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every key starting with `prefix`, returning how many went.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Remove every key `matches` accepts, returning how many went.
    async fn delete_matching(
        &self,
        matches: &(dyn for<'k> Fn(&'k str) -> bool + Sync),
    ) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Process-local store on a `DashMap`, expiring entries against a [`Clock`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }

    fn remove_where(&self, matches: impl Fn(&str) -> bool) -> usize {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches(e.key().as_str()))
            .map(|e| e.key().clone())
            .collect();
        doomed
            .iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .count()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        if self.entries.len() >= SWEEP_THRESHOLD {
            self.purge_expired();
        }
        let expires_at = self.clock.now() + ttl;
        self.entries
            .insert(key.to_owned(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        Ok(self.remove_where(|key| key.starts_with(prefix)))
    }

    async fn delete_matching(
        &self,
        matches: &(dyn for<'k> Fn(&'k str) -> bool + Sync),
    ) -> Result<usize, StoreError> {
        Ok(self.remove_where(matches))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }
}

// ── Generations ─────────────────────────────────────────────────────

/// What one invalidation covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Scope {
    Pair { resource_type: String, site_id: String },
    Resource(String),
    Site(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair {
                resource_type,
                site_id,
            } => write!(f, "{resource_type}@{site_id}"),
            Self::Resource(resource_type) => write!(f, "{resource_type}@*"),
            Self::Site(site_id) => write!(f, "*@{site_id}"),
        }
    }
}

/// Invalidation counters covering one `(resource_type, site_id)` pair.
///
/// Two snapshots compare equal only if nothing touching the pair was
/// invalidated (or the cache cleared) between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    epoch: u64,
    pair: u64,
    resource: u64,
    site: u64,
}

// ── Cache ───────────────────────────────────────────────────────────

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    /// Write-backs refused or undone because an invalidation overtook them.
    pub stale_writes: u64,
    pub store_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
    stale_writes: AtomicU64,
    store_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Infallible cache facade over an optional [`CacheStore`].
#[derive(Debug)]
pub struct Cache {
    store: Option<Arc<dyn CacheStore>>,
    counters: Counters,
    /// Advanced by [`Cache::clear`].
    epoch: AtomicU64,
    generations: DashMap<Scope, u64>,
}

impl Cache {
    fn with_store(store: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            store,
            counters: Counters::default(),
            epoch: AtomicU64::new(0),
            generations: DashMap::new(),
        }
    }

    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_store(Some(store))
    }

    /// A cache backed by a fresh [`MemoryStore`].
    pub fn memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStore::new(clock)))
    }

    /// A cache that stores nothing; every lookup misses.
    pub fn disabled() -> Self {
        Self::with_store(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let store = self.store.as_ref()?;
        let rendered = key.render();

        match store.get(&rendered).await {
            Ok(Some(value)) => {
                trace!(key = %rendered, "cache hit");
                Counters::bump(&self.counters.hits);
                Some(value)
            }
            Ok(None) => {
                trace!(key = %rendered, "cache miss");
                Counters::bump(&self.counters.misses);
                None
            }
            Err(e) => {
                warn!(key = %rendered, error = %e, "cache read failed, treating as miss");
                Counters::bump(&self.counters.store_errors);
                Counters::bump(&self.counters.misses);
                None
            }
        }
    }

    /// Store `value` for `ttl`. A zero TTL stores nothing.
    pub async fn set(&self, key: &CacheKey, value: Value, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if ttl.is_zero() {
            return;
        }
        self.write(store.as_ref(), &key.render(), value, ttl).await;
    }

    /// Like [`Cache::set`], but only if `(key.resource_type, key.site_id)`
    /// is still at `since`.
    ///
    /// An invalidation that lands while the write is in flight is caught by
    /// a second check, and the entry just written is removed again.
    pub async fn set_if_current(
        &self,
        key: &CacheKey,
        value: Value,
        ttl: Duration,
        since: Generation,
    ) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if ttl.is_zero() {
            return;
        }
        let rendered = key.render();
        let current = || self.generation(&key.resource_type, &key.site_id) == since;

        if !current() {
            debug!(key = %rendered, "invalidated during fetch, not caching");
            Counters::bump(&self.counters.stale_writes);
            return;
        }
        if !self.write(store.as_ref(), &rendered, value, ttl).await || current() {
            return;
        }

        debug!(key = %rendered, "invalidated during write, dropping entry");
        Counters::bump(&self.counters.stale_writes);
        if let Err(e) = store.delete(&rendered).await {
            warn!(key = %rendered, error = %e, "could not drop stale cache entry");
            Counters::bump(&self.counters.store_errors);
        }
    }

    async fn write(
        &self,
        store: &dyn CacheStore,
        rendered: &str,
        value: Value,
        ttl: Duration,
    ) -> bool {
        match store.set(rendered, value, ttl).await {
            Ok(()) => {
                trace!(key = %rendered, ttl_secs = ttl.as_secs(), "cache write");
                Counters::bump(&self.counters.writes);
                true
            }
            Err(e) => {
                warn!(key = %rendered, error = %e, "cache write failed, skipping");
                Counters::bump(&self.counters.store_errors);
                false
            }
        }
    }

    /// Snapshot the invalidation state of `(resource_type, site_id)`.
    pub fn generation(&self, resource_type: &str, site_id: &str) -> Generation {
        let of = |scope: Scope| self.generations.get(&scope).map_or(0, |g| *g);
        Generation {
            epoch: self.epoch.load(Ordering::SeqCst),
            pair: of(Scope::Pair {
                resource_type: resource_type.to_owned(),
                site_id: site_id.to_owned(),
            }),
            resource: of(Scope::Resource(resource_type.to_owned())),
            site: of(Scope::Site(site_id.to_owned())),
        }
    }

    /// Drop every entry of `(resource_type, site_id)`: exact ids, the
    /// `"all"` aggregate and parameterized variants, on every backend.
    pub async fn invalidate(&self, resource_type: &str, site_id: &str) {
        self.drop_scope(Scope::Pair {
            resource_type: resource_type.to_owned(),
            site_id: site_id.to_owned(),
        })
        .await;
    }

    /// Drop every entry of `resource_type`, on every site.
    pub async fn invalidate_resource(&self, resource_type: &str) {
        self.drop_scope(Scope::Resource(resource_type.to_owned()))
            .await;
    }

    /// Drop every entry filed under `site_id`, whatever the resource type.
    pub async fn invalidate_site(&self, site_id: &str) {
        self.drop_scope(Scope::Site(site_id.to_owned())).await;
    }

    async fn drop_scope(&self, scope: Scope) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        Counters::bump(&self.counters.invalidations);
        // Advance first: a write-back racing the delete must see it.
        *self.generations.entry(scope.clone()).or_insert(0) += 1;

        let result = match &scope {
            Scope::Pair {
                resource_type,
                site_id,
            } => {
                store
                    .delete_prefix(&CacheKey::scope_prefix(resource_type, site_id))
                    .await
            }
            Scope::Resource(resource_type) => {
                store
                    .delete_prefix(&CacheKey::resource_prefix(resource_type))
                    .await
            }
            Scope::Site(site_id) => {
                let segment = escape(site_id);
                let on_site = |key: &str| CacheKey::site_segment(key) == Some(segment.as_str());
                store.delete_matching(&on_site).await
            }
        };

        match result {
            Ok(removed) => debug!(%scope, removed, "cache invalidated"),
            Err(e) => {
                warn!(%scope, error = %e, "cache invalidation failed");
                Counters::bump(&self.counters.store_errors);
            }
        }
    }

    pub async fn clear(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = store.clear().await {
            warn!(error = %e, "cache clear failed");
            Counters::bump(&self.counters.store_errors);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            stale_writes: self.counters.stale_writes.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
        }
    }
}
