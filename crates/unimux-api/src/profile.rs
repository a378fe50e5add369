// Backend profiles: one closed set of API surface variants.
//
// Each variant bundles its base path, auth header and response envelope.
// The profile is chosen once when the client is built and never changes
// afterwards, so no call site ever branches on the backend again.

use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use url::Url;

use crate::config::BackendConfig;
use crate::error::Error;
use crate::normalize::{self, ApiResponse, EnvelopeShape};

/// Header carrying the API key on every variant.
pub const AUTH_HEADER: &str = "X-API-Key";

/// Site alias accepted everywhere. Cloud variants resolve it to a real id.
pub const DEFAULT_SITE_ALIAS: &str = "default";

/// Resource type addressing the site collection itself.
pub const SITES_RESOURCE: &str = "sites";

/// Path prefix of the Network application behind a UniFi OS gateway.
pub const GATEWAY_PROXY_PREFIX: &str = "/proxy/network/integration/v1";

/// The three wire-incompatible variants of the controller API.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// `api.ui.com/v1`, `{data, httpStatusCode, traceId}` envelope.
    CloudStable,
    /// `api.ui.com/ea`, bare bodies.
    CloudEarlyAccess,
    /// Gateway proxy, `{data, count, totalCount}` envelope.
    LocalGateway,
}

impl BackendKind {
    /// Path prefix appended to the configured host.
    pub fn path_prefix(self) -> &'static str {
        match self {
            Self::CloudStable => "/v1",
            Self::CloudEarlyAccess => "/ea",
            Self::LocalGateway => GATEWAY_PROXY_PREFIX,
        }
    }

    pub fn envelope_shape(self) -> EnvelopeShape {
        match self {
            Self::CloudStable => EnvelopeShape::CloudStable,
            Self::CloudEarlyAccess => EnvelopeShape::Bare,
            Self::LocalGateway => EnvelopeShape::Paged,
        }
    }

    /// Whether the `"default"` site alias must be looked up.
    ///
    /// The gateway accepts `default` verbatim; cloud variants only accept
    /// controller-assigned site ids.
    pub fn resolves_site_alias(self) -> bool {
        !matches!(self, Self::LocalGateway)
    }
}

// ── LogicalEndpoint ─────────────────────────────────────────────────

/// Backend-agnostic request target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalEndpoint {
    pub resource_type: String,
    pub site_id: String,
    pub resource_id: Option<String>,
}

impl LogicalEndpoint {
    pub fn new(
        resource_type: impl Into<String>,
        site_id: impl Into<String>,
        resource_id: Option<&str>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            site_id: site_id.into(),
            resource_id: resource_id.map(str::to_owned),
        }
    }

    /// `true` when this targets the site collection rather than a
    /// site-scoped resource.
    pub fn is_site_collection(&self) -> bool {
        self.resource_type == SITES_RESOURCE
    }
}

// ── BackendProfile ──────────────────────────────────────────────────

/// Static description of one backend variant, immutable after construction.
#[derive(Debug, Clone)]
pub struct BackendProfile {
    kind: BackendKind,
    /// Always ends with `/` so relative segments append cleanly.
    base_url: Url,
    auth_header_name: HeaderName,
    auth_value: HeaderValue,
}

impl BackendProfile {
    /// Build the profile for `config`, validating backend-required fields.
    ///
    /// A missing gateway host or an unparseable URL is a configuration
    /// error, raised here so it never shows up on a per-request path.
    pub fn from_config(config: &BackendConfig, api_key: &SecretString) -> Result<Self, Error> {
        let kind = config.kind();

        let root = match config {
            BackendConfig::CloudStable { url } | BackendConfig::CloudEarlyAccess { url } => {
                if url.trim().is_empty() {
                    return Err(Error::config(format!("{kind}: cloud API URL is empty")));
                }
                Url::parse(url.trim())?
            }
            BackendConfig::LocalGateway { host, port, .. } => {
                let host = host
                    .as_deref()
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| Error::config("local-gateway requires a gateway host"))?;
                if *port == 0 {
                    return Err(Error::config("local-gateway port must be non-zero"));
                }
                Self::gateway_root(host, *port)?
            }
        };

        let base_url = Self::normalize_base_url(root, kind)?;

        let auth_header_name = HeaderName::from_static("x-api-key");
        let mut auth_value = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|_| Error::config("API key contains characters not allowed in a header"))?;
        auth_value.set_sensitive(true);

        Ok(Self {
            kind,
            base_url,
            auth_header_name,
            auth_value,
        })
    }

    /// `host` is usually a bare address. A full `scheme://host[:port]` is
    /// taken as-is, with `port` filling in only when the URL names none.
    fn gateway_root(host: &str, port: u16) -> Result<Url, Error> {
        if !host.contains("://") {
            return Ok(Url::parse(&format!("https://{host}:{port}"))?);
        }
        let mut url = Url::parse(host)?;
        if url.port().is_none() && url.port_or_known_default() != Some(port) {
            url.set_port(Some(port))
                .map_err(|()| Error::config(format!("{host} cannot carry a port")))?;
        }
        Ok(url)
    }

    /// Append the variant's path prefix unless the URL already carries it.
    ///
    /// `https://api.ui.com`          -> `https://api.ui.com/v1/`
    /// `https://10.0.0.1:443`        -> `https://10.0.0.1/proxy/network/integration/v1/`
    fn normalize_base_url(mut url: Url, kind: BackendKind) -> Result<Url, Error> {
        if url.cannot_be_a_base() {
            return Err(Error::config(format!("{url} cannot be used as a base URL")));
        }

        let path = url.path().trim_end_matches('/').to_owned();
        let prefix = kind.path_prefix();

        if path.ends_with(prefix) {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}{prefix}/"));
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(url)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth_header_name(&self) -> &str {
        // Header names are case-insensitive; report the canonical spelling.
        AUTH_HEADER
    }

    pub fn envelope_shape(&self) -> EnvelopeShape {
        self.kind.envelope_shape()
    }

    /// Relative path segments for `endpoint`.
    ///
    /// Site-scoped: `sites/{site}/{resource}[/{id}]`
    /// Site collection: `sites[/{id}]`
    pub fn path_segments(endpoint: &LogicalEndpoint) -> Vec<&str> {
        let mut segments = vec![SITES_RESOURCE];
        if !endpoint.is_site_collection() {
            segments.push(&endpoint.site_id);
            segments.extend(
                endpoint
                    .resource_type
                    .split('/')
                    .filter(|s| !s.is_empty()),
            );
        }
        if let Some(id) = endpoint.resource_id.as_deref() {
            segments.push(id);
        }
        segments
    }

    /// Translate a logical endpoint into a concrete URL plus request headers.
    ///
    /// Segments are percent-encoded individually, so ids containing `/` or
    /// `?` cannot escape their position in the path.
    pub fn translate(&self, endpoint: &LogicalEndpoint) -> Result<(Url, HeaderMap), Error> {
        if endpoint.resource_type.trim().is_empty() {
            return Err(Error::Validation {
                status: 0,
                message: "resource type must not be empty".into(),
            });
        }
        if !endpoint.is_site_collection() && endpoint.site_id.is_empty() {
            return Err(Error::Validation {
                status: 0,
                message: format!("site id required for '{}'", endpoint.resource_type),
            });
        }

        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::config("base URL cannot carry a path"))?;
            segments.pop_if_empty();
            segments.extend(Self::path_segments(endpoint));
        }

        let mut headers = HeaderMap::new();
        headers.insert(self.auth_header_name.clone(), self.auth_value.clone());
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok((url, headers))
    }

    /// Unwrap a response body according to this variant's envelope.
    pub fn normalize(&self, raw: Value) -> ApiResponse {
        normalize::normalize(raw, self.envelope_shape())
    }
}
