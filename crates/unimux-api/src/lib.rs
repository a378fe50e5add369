// unimux-api: one async client for the cloud-stable, cloud-early-access and
// local-gateway variants of the UniFi controller API.
//
// Callers address resources logically (resource type, site, optional id)
// and always get `{data, meta}` back. Path layout, envelopes, rate limits,
// retries and caching are handled here.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod normalize;
pub mod profile;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use cache::{Cache, CacheKey, CacheStats, CacheStore, Generation, MemoryStore, StoreError};
pub use client::{Client, ClientBuilder, Request, WarmReport};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{BackendConfig, CacheConfig, ClientConfig};
pub use error::{Error, ErrorKind};
pub use normalize::{ApiResponse, EnvelopeShape};
pub use profile::{BackendKind, BackendProfile, LogicalEndpoint};
pub use rate_limit::{RateLimit, RateLimiter};
pub use retry::{RetryDecision, RetryPolicy};
pub use transport::{TlsMode, TransportConfig};

pub use reqwest::Method;
