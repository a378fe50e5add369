//! Config subcommand handlers.

use std::fmt::Write as _;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the plaintext API key.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let d = &cfg.defaults;
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", d.output);
    let _ = writeln!(out, "timeout = {}", d.timeout);
    let _ = writeln!(out, "max_retries = {}", d.max_retries);
    let _ = writeln!(out, "log_requests = {}", d.log_requests);
    let _ = writeln!(out, "cache_enabled = {}", d.cache_enabled);
    let _ = writeln!(out, "cache_ttl = {}", d.cache_ttl);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "backend = \"{}\"", p.backend);
        if let Some(ref url) = p.url {
            let _ = writeln!(out, "url = \"{url}\"");
        }
        if let Some(ref host) = p.host {
            let _ = writeln!(out, "host = \"{host}\"");
        }
        if let Some(port) = p.port {
            let _ = writeln!(out, "port = {port}");
        }
        let _ = writeln!(out, "site = \"{}\"", p.site);
        if p.api_key.is_some() {
            let _ = writeln!(out, "api_key = \"****\"");
        }
        if let Some(ref env) = p.api_key_env {
            let _ = writeln!(out, "api_key_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(requests) = p.rate_limit_requests {
            let _ = writeln!(out, "rate_limit_requests = {requests}");
        }
    }

    out.trim_end().to_owned()
}

/// Profile built from the global flags, for `config init`.
///
/// The API key flag is never written; profiles point at a variable instead.
fn profile_from_flags(global: &GlobalOpts) -> Profile {
    let mut profile = Profile {
        api_key_env: Some(unimux_config::API_KEY_ENV.into()),
        ..Profile::default()
    };
    config::apply_overrides(&mut profile, global);
    profile
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            output::print_output(&format_config_redacted(&cfg));
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = config::config_path();
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!("{} already exists (use --force to overwrite)", path.display()),
                });
            }

            let name = global.profile.clone().unwrap_or_else(|| "default".into());
            let mut cfg = Config {
                default_profile: Some(name.clone()),
                ..Config::default()
            };
            cfg.profiles.insert(name.clone(), profile_from_flags(global));

            let written = config::save_config(&cfg)?;
            eprintln!("Wrote profile '{name}' to {}", written.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_view_hides_plaintext_key() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                api_key: Some("super-secret".into()),
                host: Some("10.0.0.1".into()),
                ..Profile::default()
            },
        );

        let shown = format_config_redacted(&cfg);
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("api_key = \"****\""));
        assert!(shown.contains("[profiles.lab]"));
        assert!(shown.contains("host = \"10.0.0.1\""));
    }
}
