//! CLI configuration -- thin wrapper around `unimux_config`.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--backend, --host, --api-key, etc.).

use secrecy::SecretString;

use unimux_api::{BackendKind, CacheConfig, ClientConfig};

use crate::cli::{BackendArg, GlobalOpts};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use unimux_config::{Config, Profile, config_path, load_config, save_config};

/// A fully resolved invocation target.
#[derive(Debug)]
pub struct Resolved {
    pub client: ClientConfig,
    /// Site id or alias the command addresses.
    pub site: String,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::CloudStable => Self::CloudStable,
            BackendArg::CloudEarlyAccess => Self::CloudEarlyAccess,
            BackendArg::LocalGateway => Self::LocalGateway,
        }
    }
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Pick the profile to use. An explicit `--profile` must exist; the
/// implicit default may be absent, in which case flags carry everything.
pub fn select_profile(global: &GlobalOpts, config: &Config) -> Result<(String, Profile), CliError> {
    let name = active_profile_name(global, config);
    match config.profiles.get(&name) {
        Some(profile) => Ok((name, profile.clone())),
        None if global.profile.is_some() => Err(CliError::ProfileNotFound {
            available: available_profiles(config),
            name,
        }),
        None => Ok((name, Profile::default())),
    }
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config
            .profiles
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Apply flag overrides onto a profile. Flags win over file values.
pub fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(backend) = global.backend {
        profile.backend = backend.into();
    }
    if let Some(ref url) = global.url {
        profile.url = Some(url.clone());
    }
    if let Some(ref host) = global.host {
        profile.host = Some(host.clone());
    }
    if let Some(port) = global.port {
        profile.port = Some(port);
    }
    if let Some(ref site) = global.site {
        profile.site.clone_from(site);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    if global.no_cache {
        profile.cache_enabled = Some(false);
    }
}

/// Load the config file and turn the active profile plus flags into a
/// `ClientConfig`.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let config = load_config()?;
    resolve_with(global, &config)
}

pub fn resolve_with(global: &GlobalOpts, config: &Config) -> Result<Resolved, CliError> {
    let (name, mut profile) = select_profile(global, config)?;
    apply_overrides(&mut profile, global);

    let api_key = match global.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => SecretString::from(key.to_owned()),
        None => unimux_config::resolve_api_key(&profile, &name)?,
    };

    let mut client = unimux_config::client_config(&profile, &config.defaults, api_key)?;
    if global.no_cache {
        client.cache = CacheConfig::disabled();
    }

    Ok(Resolved {
        client,
        site: profile.site,
    })
}
