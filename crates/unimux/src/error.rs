//! CLI error types with miette diagnostics.
//!
//! Maps `unimux_api::Error` kinds and configuration failures into
//! user-facing errors with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use unimux_api::ErrorKind;
use unimux_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const RATE_LIMITED: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Upstream API ─────────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(unimux::auth_failed),
        help(
            "Verify the API key (--api-key, UNIMUX_API_KEY, or the profile's api_key / api_key_env).\n\
             Cloud keys are issued at unifi.ui.com; gateway keys under Settings > Integrations."
        )
    )]
    AuthFailed { message: String },

    #[error("Permission denied: {message}")]
    #[diagnostic(
        code(unimux::permission_denied),
        help("The API key is valid but not allowed to access this resource.")
    )]
    PermissionDenied { message: String },

    #[error("Not found: {message}")]
    #[diagnostic(
        code(unimux::not_found),
        help("Check the resource type, site and id. List sites with: unimux get sites")
    )]
    NotFound { message: String },

    #[error("Request rejected: {message}")]
    #[diagnostic(code(unimux::rejected))]
    Rejected { message: String },

    #[error("Rate limited: {message}")]
    #[diagnostic(
        code(unimux::rate_limited),
        help("{hint}\nLower rate_limit_requests in the profile to stay under the budget.")
    )]
    RateLimited { message: String, hint: String },

    #[error("Server error: {message}")]
    #[diagnostic(code(unimux::server_error))]
    Server { message: String },

    #[error("Could not reach the API: {message}")]
    #[diagnostic(
        code(unimux::connection_failed),
        help(
            "Check the host and network path.\n\
             Self-signed gateway certificates need --insecure (-k) or ca_cert in the profile.\n\
             Slow controllers may need a larger --timeout."
        )
    )]
    ConnectionFailed { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(unimux::invalid_config),
        help("Run: unimux config show")
    )]
    InvalidConfig { message: String },

    #[error("No API key configured for profile '{profile}'")]
    #[diagnostic(
        code(unimux::no_credentials),
        help(
            "Pass --api-key, set UNIMUX_API_KEY, or add api_key_env to the profile.\n\
             Create a profile with: unimux config init"
        )
    )]
    NoCredentials { profile: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(unimux::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: unimux config init --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(unimux::config))]
    Config(ConfigError),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(unimux::validation))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(unimux::json), help("Check the JSON body and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(unimux::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::RateLimited { .. } => exit_code::RATE_LIMITED,
            Self::InvalidConfig { .. }
            | Self::ProfileNotFound { .. }
            | Self::Config(_)
            | Self::Validation { .. } => exit_code::USAGE,
            Self::Rejected { .. }
            | Self::Server { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

// ── Library error mapping ────────────────────────────────────────────

impl From<unimux_api::Error> for CliError {
    fn from(err: unimux_api::Error) -> Self {
        let message = err.message().to_owned();
        match err.kind() {
            ErrorKind::Authentication => Self::AuthFailed { message },
            ErrorKind::Permission => Self::PermissionDenied { message },
            ErrorKind::NotFound => Self::NotFound { message },
            ErrorKind::Validation => Self::Rejected { message },
            ErrorKind::RateLimit => {
                let hint = err.retry_after().map_or_else(
                    || "The API did not say when to retry.".to_owned(),
                    |d| format!("The API asked to retry after {}s.", d.as_secs()),
                );
                Self::RateLimited { message, hint }
            }
            ErrorKind::Server => Self::Server { message },
            ErrorKind::Connection => Self::ConnectionFailed { message },
            ErrorKind::Configuration => Self::InvalidConfig { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
