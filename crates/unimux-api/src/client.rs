// ── Client orchestrator ──
//
// Composes the per-call pipeline: resolve site → translate → cache check →
// rate-limit → dispatch → retry loop → normalize → cache write/invalidate.
// The rate limiter and cache are owned objects injected at construction,
// never process-wide state, so two clients never share a window or cache
// unless the caller hands them the same `Arc`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{Cache, CacheKey, CacheStats, CacheStore};
use crate::clock::{Clock, TokioClock};
use crate::config::{CacheConfig, ClientConfig};
use crate::error::Error;
use crate::normalize::ApiResponse;
use crate::profile::{
    BackendKind, BackendProfile, DEFAULT_SITE_ALIAS, LogicalEndpoint, SITES_RESOURCE,
};
use crate::rate_limit::RateLimiter;
use crate::retry::{self, Failure, RetryDecision, RetryPolicy, SendPhase};
use crate::transport::TransportConfig;

/// Keys tried, in order, when reading a site's identifier.
const SITE_ID_KEYS: [&str; 3] = ["id", "siteId", "_id"];

/// Resource fetched per site by [`Client::warm_cache`].
const DEVICES_RESOURCE: &str = "devices";

/// What [`Client::warm_cache`] loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub sites: usize,
    pub devices: usize,
    /// Sites whose devices could not be fetched.
    pub failed: usize,
}

// ── Request ─────────────────────────────────────────────────────────

/// One logical call: method, target, and optional params, body, TTL and
/// deadline.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    endpoint: LogicalEndpoint,
    params: Vec<(String, String)>,
    body: Option<Value>,
    ttl: Option<Duration>,
    deadline: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, resource_type: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: LogicalEndpoint::new(resource_type, site, None),
            params: Vec::new(),
            body: None,
            ttl: None,
            deadline: None,
        }
    }

    pub fn get(resource_type: impl Into<String>, site: impl Into<String>) -> Self {
        Self::new(Method::GET, resource_type, site)
    }

    pub fn post(resource_type: impl Into<String>, site: impl Into<String>) -> Self {
        Self::new(Method::POST, resource_type, site)
    }

    pub fn put(resource_type: impl Into<String>, site: impl Into<String>) -> Self {
        Self::new(Method::PUT, resource_type, site)
    }

    pub fn patch(resource_type: impl Into<String>, site: impl Into<String>) -> Self {
        Self::new(Method::PATCH, resource_type, site)
    }

    pub fn delete(resource_type: impl Into<String>, site: impl Into<String>) -> Self {
        Self::new(Method::DELETE, resource_type, site)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.endpoint.resource_id = Some(id.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Cache this read for `ttl` instead of the configured TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Give up once `deadline` has elapsed, at whichever suspension point
    /// the call is parked on.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &LogicalEndpoint {
        &self.endpoint
    }

    fn is_mutation(&self) -> bool {
        !retry::is_read(&self.method)
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Builds a [`Client`], optionally with injected collaborators.
///
/// Anything not injected is created from the [`ClientConfig`].
#[derive(Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    clock: Option<Arc<dyn Clock>>,
    cache: Option<Arc<Cache>>,
    store: Option<Arc<dyn CacheStore>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing cache, e.g. between clients of the same process.
    pub fn cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Back the cache with `store` instead of process memory.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Use a preconfigured HTTP client; TLS and timeout settings from the
    /// config are then ignored.
    pub fn http(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Validate the configuration and assemble the client.
    ///
    /// Every `Configuration` error the client can raise is raised here.
    pub fn build(self) -> Result<Client, Error> {
        let config = self.config;
        let profile = BackendProfile::from_config(&config.backend, &config.api_key)?;
        let kind = profile.kind();

        if config.timeout.is_zero() {
            return Err(Error::config("request timeout must be non-zero"));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock));

        let rate_limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => Arc::new(
                RateLimiter::new(Arc::clone(&clock))
                    .with_limit(kind, config.effective_rate_limit())?,
            ),
        };

        let cache = match (config.cache.enabled, self.cache, self.store) {
            (false, _, _) => Arc::new(Cache::disabled()),
            (true, Some(cache), _) => cache,
            (true, None, Some(store)) => Arc::new(Cache::new(store)),
            (true, None, None) => Arc::new(Cache::memory(Arc::clone(&clock))),
        };

        let http = match self.http {
            Some(http) => http,
            None => TransportConfig::new(config.backend.tls(), config.timeout).build_client()?,
        };

        debug!(
            backend = %kind,
            base_url = %profile.base_url(),
            cache = cache.is_enabled(),
            "client built"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                profile,
                api_key: config.api_key,
                retry: config.retry,
                rate_limiter,
                cache,
                ttls: config.cache,
                clock,
                default_site: OnceCell::new(),
                log_requests: config.log_requests,
            }),
        })
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Backend-agnostic API client.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Clones share the profile,
/// rate limiter, cache and resolved default site.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    profile: BackendProfile,
    api_key: SecretString,
    retry: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<Cache>,
    ttls: CacheConfig,
    clock: Arc<dyn Clock>,
    /// Site id behind the `"default"` alias, looked up once on cloud variants.
    default_site: OnceCell<String>,
    log_requests: bool,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            clock: None,
            cache: None,
            store: None,
            rate_limiter: None,
            http: None,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.inner.profile.kind()
    }

    pub fn profile(&self) -> &BackendProfile {
        &self.inner.profile
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // ── Entry point ─────────────────────────────────────────────────

    /// Execute one logical call and return the normalized response.
    ///
    /// GETs are served from the cache when fresh. Mutations invalidate the
    /// `(resource_type, site)` entries before returning, whether they
    /// succeeded, failed, or ran out of deadline.
    pub async fn request(&self, req: Request) -> Result<ApiResponse, Error> {
        let result = match req.deadline {
            None => self.execute(&req).await,
            Some(deadline) => {
                if let Ok(result) = tokio::time::timeout(deadline, self.execute(&req)).await {
                    result
                } else {
                    if req.is_mutation() {
                        let site = self.cache_site(&req.endpoint);
                        self.inner
                            .cache
                            .invalidate(&req.endpoint.resource_type, &site)
                            .await;
                    }
                    Err(Error::Connection {
                        message: format!("deadline of {}ms exceeded", deadline.as_millis()),
                    })
                }
            }
        };

        result.map_err(|e| e.redact(self.inner.api_key.expose_secret()))
    }

    async fn execute(&self, req: &Request) -> Result<ApiResponse, Error> {
        let endpoint = if req.endpoint.is_site_collection() {
            LogicalEndpoint {
                site_id: String::new(),
                ..req.endpoint.clone()
            }
        } else {
            LogicalEndpoint {
                site_id: self.resolve_site(&req.endpoint.site_id).await?,
                ..req.endpoint.clone()
            }
        };

        if req.method == Method::GET {
            self.read(req, &endpoint).await
        } else if req.is_mutation() {
            let result = self.dispatch(req, &endpoint).await;
            self.inner
                .cache
                .invalidate(&endpoint.resource_type, &endpoint.site_id)
                .await;
            result
        } else {
            self.dispatch(req, &endpoint).await
        }
    }

    async fn read(&self, req: &Request, endpoint: &LogicalEndpoint) -> Result<ApiResponse, Error> {
        let inner = &*self.inner;
        let key = CacheKey::new(
            inner.profile.kind(),
            &endpoint.site_id,
            &endpoint.resource_type,
            endpoint.resource_id.as_deref(),
        )
        .with_query(&req.params);

        if let Some(hit) = inner.cache.get(&key).await {
            return Ok(inner.profile.normalize(hit));
        }

        // Taken before the fetch; a mutation finishing meanwhile wins.
        let generation = inner
            .cache
            .generation(&endpoint.resource_type, &endpoint.site_id);
        let response = self.dispatch(req, endpoint).await?;
        let ttl = req
            .ttl
            .unwrap_or_else(|| inner.ttls.ttl_for(&endpoint.resource_type));
        inner
            .cache
            .set_if_current(&key, response.clone().into_value(), ttl, generation)
            .await;

        Ok(response)
    }

    // ── Dispatch + retry loop ───────────────────────────────────────

    async fn dispatch(
        &self,
        req: &Request,
        endpoint: &LogicalEndpoint,
    ) -> Result<ApiResponse, Error> {
        let inner = &*self.inner;
        let kind = inner.profile.kind();
        let (url, headers) = inner.profile.translate(endpoint)?;
        let mut attempt: u32 = 0;

        loop {
            inner.rate_limiter.acquire(kind).await;

            let decision = match self.send_once(req, &url, &headers, attempt).await {
                Attempt::Done(result) => return result,
                Attempt::Status {
                    status,
                    headers: resp_headers,
                    body,
                } => inner.retry.decide(
                    &req.method,
                    &Failure::Status {
                        status,
                        headers: &resp_headers,
                        body: &body,
                    },
                    attempt,
                    rand::random::<f64>(),
                ),
                Attempt::Transport { message, phase } => inner.retry.decide(
                    &req.method,
                    &Failure::Transport {
                        message: &message,
                        phase,
                    },
                    attempt,
                    rand::random::<f64>(),
                ),
            };

            match decision {
                RetryDecision::Retry { delay } => {
                    warn!(
                        method = %req.method,
                        path = url.path(),
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying request"
                    );
                    inner.clock.sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Fail { error } => return Err(error),
            }
        }
    }

    /// One HTTP exchange, classified for the retry policy.
    async fn send_once(
        &self,
        req: &Request,
        url: &Url,
        headers: &HeaderMap,
        attempt: u32,
    ) -> Attempt {
        let inner = &*self.inner;
        let started = tokio::time::Instant::now();

        let mut builder = inner
            .http
            .request(req.method.clone(), url.clone())
            .headers(headers.clone());
        if !req.params.is_empty() {
            builder = builder.query(&req.params);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_builder() => {
                return Attempt::Done(Err(Error::Validation {
                    status: 0,
                    message: format!("could not build request: {e}"),
                }));
            }
            Err(e) => {
                let message = Error::connection(&e).message().to_owned();
                let phase = if e.is_connect() {
                    SendPhase::NotSent
                } else {
                    SendPhase::Sent
                };
                self.log_failure(&req.method, url, &message, attempt);
                return Attempt::Transport { message, phase };
            }
        };

        let status = resp.status();
        let resp_headers = resp.headers().clone();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                let message = Error::connection(&e).message().to_owned();
                self.log_failure(&req.method, url, &message, attempt);
                return Attempt::Transport {
                    message,
                    phase: SendPhase::Sent,
                };
            }
        };
        self.log_exchange(&req.method, url, status, started, attempt);

        if status.is_success() {
            let parsed = parse_body(status, &body).map(|raw| inner.profile.normalize(raw));
            return Attempt::Done(parsed);
        }

        Attempt::Status {
            status,
            headers: resp_headers,
            body,
        }
    }

    fn log_exchange(
        &self,
        method: &Method,
        url: &Url,
        status: StatusCode,
        started: tokio::time::Instant,
        attempt: u32,
    ) {
        if !self.inner.log_requests {
            return;
        }
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = status.as_u16();

        if status >= 400 {
            warn!(%method, path = url.path(), status, duration_ms, attempt, "api request failed");
        } else {
            debug!(%method, path = url.path(), status, duration_ms, attempt, "api request");
        }
    }

    fn log_failure(&self, method: &Method, url: &Url, message: &str, attempt: u32) {
        if self.inner.log_requests {
            warn!(
                %method,
                path = url.path(),
                attempt,
                error = message,
                "api request failed to complete"
            );
        }
    }

    // ── Sites ───────────────────────────────────────────────────────

    /// Map `site` onto the identifier this backend expects.
    ///
    /// Cloud variants look `"default"` up once and remember the answer for
    /// the lifetime of the client. Anything else passes through.
    pub async fn resolve_site(&self, site: &str) -> Result<String, Error> {
        if site != DEFAULT_SITE_ALIAS || !self.kind().resolves_site_alias() {
            return Ok(site.to_owned());
        }
        self.inner
            .default_site
            .get_or_try_init(|| self.lookup_default_site())
            .await
            .cloned()
    }

    async fn lookup_default_site(&self) -> Result<String, Error> {
        let endpoint = LogicalEndpoint::new(SITES_RESOURCE, String::new(), None);
        let sites = self
            .dispatch(&Request::get(SITES_RESOURCE, String::new()), &endpoint)
            .await?;

        let site_id = default_site_id(sites.items()).ok_or_else(|| Error::NotFound {
            status: 0,
            message: format!("no site matches the '{DEFAULT_SITE_ALIAS}' alias"),
        })?;

        info!(backend = %self.kind(), %site_id, "resolved default site alias");
        Ok(site_id)
    }

    /// Site component used in cache keys, without touching the network.
    fn cache_site(&self, endpoint: &LogicalEndpoint) -> String {
        if endpoint.is_site_collection() {
            return String::new();
        }
        self.cached_site_id(&endpoint.site_id)
    }

    /// `site` with the default alias swapped for its resolved id, if known.
    fn cached_site_id(&self, site: &str) -> String {
        if site == DEFAULT_SITE_ALIAS && self.kind().resolves_site_alias() {
            if let Some(resolved) = self.inner.default_site.get() {
                return resolved.clone();
            }
        }
        site.to_owned()
    }

    // ── Cache control ───────────────────────────────────────────────

    /// Drop every cached response for `(resource_type, site)`.
    pub async fn invalidate(&self, resource_type: &str, site: &str) {
        let endpoint = LogicalEndpoint::new(resource_type, site, None);
        let site = self.cache_site(&endpoint);
        self.inner.cache.invalidate(resource_type, &site).await;
    }

    /// Drop every cached response for `resource_type`, on every site.
    pub async fn invalidate_resource(&self, resource_type: &str) {
        self.inner.cache.invalidate_resource(resource_type).await;
    }

    /// Drop every cached response filed under `site`.
    pub async fn invalidate_site(&self, site: &str) {
        let site = self.cached_site_id(site);
        self.inner.cache.invalidate_site(&site).await;
    }

    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await;
    }

    /// Prefetch the site listing, each site, and each site's devices.
    ///
    /// Only a failure to list sites is an error. A site whose devices
    /// cannot be fetched is logged and counted in [`WarmReport::failed`].
    pub async fn warm_cache(&self) -> Result<WarmReport, Error> {
        let inner = &*self.inner;
        let kind = inner.profile.kind();
        let generation = inner.cache.generation(SITES_RESOURCE, "");
        let sites = self
            .request(Request::get(SITES_RESOURCE, String::new()))
            .await?;

        let ttl = inner.ttls.ttl_for(SITES_RESOURCE);
        let mut report = WarmReport::default();

        for site in sites.items() {
            let Some(site_id) = site_id_of(site) else {
                continue;
            };
            let key = CacheKey::new(kind, "", SITES_RESOURCE, Some(site_id));
            let value = ApiResponse::new(site.clone()).into_value();
            inner
                .cache
                .set_if_current(&key, value, ttl, generation)
                .await;
            report.sites += 1;

            match self.request(Request::get(DEVICES_RESOURCE, site_id)).await {
                Ok(devices) => report.devices += devices.items().len(),
                Err(e) => {
                    warn!(%site_id, error = %e, "could not warm devices");
                    report.failed += 1;
                }
            }
        }

        info!(
            backend = %kind,
            sites = report.sites,
            devices = report.devices,
            failed = report.failed,
            "cache warmed"
        );
        Ok(report)
    }

    // ── Verb helpers ────────────────────────────────────────────────

    pub async fn get(
        &self,
        resource_type: &str,
        site: &str,
        id: Option<&str>,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse, Error> {
        let mut req = Request::get(resource_type, site);
        if let Some(id) = id {
            req = req.id(id);
        }
        for (key, value) in params {
            req = req.param(*key, *value);
        }
        self.request(req).await
    }

    pub async fn post(&self, resource_type: &str, site: &str, body: Value) -> Result<ApiResponse, Error> {
        self.request(Request::post(resource_type, site).body(body))
            .await
    }

    pub async fn put(
        &self,
        resource_type: &str,
        site: &str,
        id: &str,
        body: Value,
    ) -> Result<ApiResponse, Error> {
        self.request(Request::put(resource_type, site).id(id).body(body))
            .await
    }

    pub async fn delete(&self, resource_type: &str, site: &str, id: &str) -> Result<ApiResponse, Error> {
        self.request(Request::delete(resource_type, site).id(id))
            .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Outcome of a single exchange.
enum Attempt {
    /// Final: success, or a failure the retry policy has no say in.
    Done(Result<ApiResponse, Error>),
    Status {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    },
    Transport {
        message: String,
        phase: SendPhase,
    },
}

/// Decode a success body. Empty bodies (204, bare 200) read as `{}`.
fn parse_body(status: StatusCode, body: &str) -> Result<Value, Error> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(body).map_err(|e| Error::Server {
        status: status.as_u16(),
        message: format!("response body is not valid JSON: {e}"),
    })
}

/// Pick the site behind the `"default"` alias from a site listing.
///
/// Matches `internalReference`, then `name` / `meta.name`; a listing with
/// exactly one site resolves to that site.
fn default_site_id(sites: &[Value]) -> Option<String> {
    let is_default = |site: &Value| {
        if site.get("internalReference").and_then(Value::as_str) == Some(DEFAULT_SITE_ALIAS) {
            return true;
        }
        [site.get("name"), site.pointer("/meta/name")]
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .any(|name| name.eq_ignore_ascii_case(DEFAULT_SITE_ALIAS))
    };

    let site = sites.iter().find(|&s| is_default(s)).or(match sites {
        [only] => Some(only),
        _ => None,
    })?;

    site_id_of(site).map(str::to_owned)
}

fn site_id_of(site: &Value) -> Option<&str> {
    SITE_ID_KEYS
        .iter()
        .find_map(|key| site.get(*key).and_then(Value::as_str))
}
