//! Configuration for unimux.
//!
//! TOML profiles merged with `UNIMUX_` environment variables, API-key
//! resolution, and translation to `unimux_api::ClientConfig`. The CLI adds
//! flag-aware overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use unimux_api::config::{DEFAULT_CLOUD_URL, DEFAULT_GATEWAY_PORT};
use unimux_api::{
    BackendConfig, BackendKind, CacheConfig, ClientConfig, RateLimit, RetryPolicy, TlsMode,
};

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "UNIMUX_";

/// Fallback API key variable, consulted after a profile's `api_key_env`.
pub const API_KEY_ENV: &str = "UNIMUX_API_KEY";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "UNIMUX_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Settings shared by every profile unless the profile overrides them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_true")]
    pub log_requests: bool,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// TTL for resource types missing from `ttls`, seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Per-resource TTLs, seconds.
    #[serde(default = "default_ttls")]
    pub ttls: BTreeMap<String, u64>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            log_requests: true,
            cache_enabled: true,
            cache_ttl: default_cache_ttl(),
            ttls: default_ttls(),
        }
    }
}

fn default_output() -> String {
    "json".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_cache_ttl() -> u64 {
    60
}

/// Cache lifetimes by resource type, seconds.
///
/// Fast-moving state (clients, events) expires quickly; configuration
/// objects are kept for five minutes.
pub fn default_ttls() -> BTreeMap<String, u64> {
    [
        ("sites", 300),
        ("devices", 60),
        ("clients", 30),
        ("networks", 300),
        ("wlans", 300),
        ("firewall_rules", 300),
        ("port_forwards", 300),
        ("dpi_stats", 120),
        ("topology", 60),
        ("alerts", 30),
        ("events", 30),
    ]
    .into_iter()
    .map(|(resource, secs)| (resource.to_owned(), secs))
    .collect()
}

/// A named backend profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Cloud API base URL; defaults to `https://api.ui.com`.
    pub url: Option<String>,

    /// Gateway address (local-gateway only).
    pub host: Option<String>,

    /// Gateway HTTPS port (local-gateway only).
    pub port: Option<u16>,

    /// Site id, or `default`.
    #[serde(default = "default_site")]
    pub site: String,

    /// API key (plaintext, prefer `api_key_env`).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Skip certificate verification (local-gateway only).
    pub insecure: Option<bool>,

    /// Path to a custom CA certificate (local-gateway only).
    pub ca_cert: Option<PathBuf>,

    pub timeout: Option<u64>,

    pub max_retries: Option<u32>,

    /// Requests allowed per `rate_limit_period`; unset keeps the backend
    /// default.
    pub rate_limit_requests: Option<u32>,

    /// Rate-limit window, seconds.
    pub rate_limit_period: Option<u64>,

    pub cache_enabled: Option<bool>,

    /// Per-resource TTL overrides, merged over `defaults.ttls`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ttls: BTreeMap<String, u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            host: None,
            port: None,
            site: default_site(),
            api_key: None,
            api_key_env: None,
            insecure: None,
            ca_cert: None,
            timeout: None,
            max_retries: None,
            rate_limit_requests: None,
            rate_limit_period: None,
            cache_enabled: None,
            ttls: BTreeMap::new(),
        }
    }
}

fn default_backend() -> BackendKind {
    BackendKind::CloudStable
}
fn default_site() -> String {
    "default".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `UNIMUX_CONFIG`, else platform conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "unimux", "unimux").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("unimux");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// A missing file is not an error; defaults and environment still apply.
/// Nested keys use `__` in variable names, e.g.
/// `UNIMUX_DEFAULTS__TIMEOUT=10` or `UNIMUX_PROFILES__LAB__HOST=10.0.0.1`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve an API key from the credential chain.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_api_key_with(profile, profile_name, |var| std::env::var(var).ok())
}

/// [`resolve_api_key`] with an explicit environment lookup.
///
/// Order: the profile's `api_key_env` variable, `UNIMUX_API_KEY`, then the
/// plaintext `api_key`. Blank values are skipped.
pub fn resolve_api_key_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let non_blank = |v: &String| !v.trim().is_empty();

    // 1. Profile's api_key_env → env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Some(val) = env(env_name).filter(non_blank) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global variable
    if let Some(val) = env(API_KEY_ENV).filter(non_blank) {
        return Ok(SecretString::from(val));
    }

    // 3. Plaintext in config
    if let Some(key) = profile.api_key.clone().filter(non_blank) {
        return Ok(SecretString::from(key));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

/// Backend selection for `profile`, TLS settings included.
pub fn backend_config(profile: &Profile) -> BackendConfig {
    let cloud_url = || {
        profile
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_CLOUD_URL.into())
    };

    match profile.backend {
        BackendKind::CloudStable => BackendConfig::CloudStable { url: cloud_url() },
        BackendKind::CloudEarlyAccess => BackendConfig::CloudEarlyAccess { url: cloud_url() },
        BackendKind::LocalGateway => {
            let tls = if profile.insecure.unwrap_or(false) {
                TlsMode::DangerAcceptInvalid
            } else if let Some(ref ca_path) = profile.ca_cert {
                TlsMode::CustomCa(ca_path.clone())
            } else {
                TlsMode::System
            };
            BackendConfig::LocalGateway {
                host: profile.host.clone(),
                port: profile.port.unwrap_or(DEFAULT_GATEWAY_PORT),
                tls,
            }
        }
    }
}

/// Cache settings: `defaults` TTLs with the profile's overrides on top.
pub fn cache_config(profile: &Profile, defaults: &Defaults) -> CacheConfig {
    let ttls = defaults
        .ttls
        .iter()
        .chain(&profile.ttls)
        .map(|(resource, secs)| (resource.clone(), Duration::from_secs(*secs)))
        .collect();

    CacheConfig {
        enabled: profile.cache_enabled.unwrap_or(defaults.cache_enabled),
        default_ttl: Duration::from_secs(defaults.cache_ttl),
        ttls,
    }
}

/// Build a `ClientConfig` from a profile with an already-resolved key.
pub fn client_config(
    profile: &Profile,
    defaults: &Defaults,
    api_key: SecretString,
) -> Result<ClientConfig, ConfigError> {
    let timeout = profile.timeout.unwrap_or(defaults.timeout);
    if timeout == 0 {
        return Err(ConfigError::Validation {
            field: "timeout".into(),
            reason: "must be at least one second".into(),
        });
    }

    let rate_limit = match (profile.rate_limit_requests, profile.rate_limit_period) {
        (None, None) => None,
        (requests, period) => {
            let limit = RateLimit::new(
                requests.unwrap_or_else(|| RateLimit::default_for(profile.backend).limit),
                Duration::from_secs(period.unwrap_or(60)),
            );
            if limit.limit == 0 || limit.period.is_zero() {
                return Err(ConfigError::Validation {
                    field: "rate_limit".into(),
                    reason: "requests and period must both be non-zero".into(),
                });
            }
            Some(limit)
        }
    };

    let mut config = ClientConfig::new(backend_config(profile), api_key);
    config.timeout = Duration::from_secs(timeout);
    config.retry = RetryPolicy::new(profile.max_retries.unwrap_or(defaults.max_retries));
    config.rate_limit = rate_limit;
    config.cache = cache_config(profile, defaults);
    config.log_requests = defaults.log_requests;
    Ok(config)
}

/// Build a `ClientConfig` from a profile, resolving its API key.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let api_key = resolve_api_key(profile, profile_name)?;
    client_config(profile, defaults, api_key)
}
