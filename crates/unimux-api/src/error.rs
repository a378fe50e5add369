// Error taxonomy shared by all three backend variants.
//
// Every failure the client can surface is one of a small closed set of
// kinds. HTTP statuses are folded into that set by `from_response`; the
// caller never has to know which wire variant produced the error.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Longest slice of a raw response body echoed into an error message.
const BODY_PREVIEW_LEN: usize = 200;

/// Placeholder substituted wherever the API key would appear in a message.
const REDACTED: &str = "[REDACTED]";

/// Discriminant of [`Error`], handy for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Permission,
    NotFound,
    Validation,
    RateLimit,
    Server,
    Connection,
    Configuration,
}

/// Top-level error type for the `unimux-api` crate.
///
/// `Configuration` is only ever produced while building a client. All other
/// variants are per-call. Messages are redacted before they leave the
/// client, so they are safe to log or display. A `status` of 0 marks an
/// error raised locally, before anything was dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── Credentials ─────────────────────────────────────────────────
    /// The controller rejected the API key (HTTP 401). Never retried.
    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    /// The API key is valid but lacks rights for this resource (HTTP 403).
    #[error("Permission denied (HTTP {status}): {message}")]
    Permission { status: u16, message: String },

    // ── Caller mistakes ─────────────────────────────────────────────
    #[error("Resource not found (HTTP {status}): {message}")]
    NotFound { status: u16, message: String },

    /// 400 and every other 4xx without a dedicated kind.
    #[error("Request rejected (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    // ── Transient ───────────────────────────────────────────────────
    /// HTTP 429, surfaced once the retry budget is spent.
    #[error("Rate limited{}: {message}", retry_after_suffix(.retry_after))]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// 5xx, or a success status whose body could not be decoded.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// No usable HTTP response: DNS, refused connection, TLS, timeout.
    #[error("Connection failed: {message}")]
    Connection { message: String },

    // ── Startup ─────────────────────────────────────────────────────
    /// Missing or invalid backend field, caught when the client is built.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" -- retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Server { .. } => ErrorKind::Server,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// HTTP status code, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Permission { status, .. }
            | Self::NotFound { status, .. }
            | Self::Validation { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::RateLimit { .. } => Some(429),
            Self::Connection { .. } | Self::Configuration { .. } => None,
        }
    }

    /// Server-advertised back-off, only present on [`Error::RateLimit`].
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns `true` for the kinds the client retries locally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. } | Self::Server { .. } | Self::Connection { .. }
        )
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Authentication { message, .. }
            | Self::Permission { message, .. }
            | Self::NotFound { message, .. }
            | Self::Validation { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Server { message, .. }
            | Self::Connection { message }
            | Self::Configuration { message } => message,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a `Connection` error from a transport failure.
    pub(crate) fn connection(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Connection { message }
    }

    /// Strip every occurrence of `secret` from the message.
    pub(crate) fn redact(mut self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        let message = match &mut self {
            Self::Authentication { message, .. }
            | Self::Permission { message, .. }
            | Self::NotFound { message, .. }
            | Self::Validation { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Server { message, .. }
            | Self::Connection { message }
            | Self::Configuration { message } => message,
        };
        if message.contains(secret) {
            *message = message.replace(secret, REDACTED);
        }
        self
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::config(format!("invalid URL: {err}"))
    }
}

// ── Response mapping ────────────────────────────────────────────────

/// Error body shapes seen across the three variants.
///
/// Cloud: `{"code": "...", "message": "..."}`
/// Gateway: `{"statusCode": 400, "statusName": "...", "message": "..."}`
/// Older gateway firmware: `{"error": {"code": N, "message": "..."}}`
#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

fn body_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(trimmed) {
        if let Some(message) = parsed.message.filter(|m| !m.is_empty()) {
            return message;
        }
        match parsed.error {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return s,
            Some(serde_json::Value::Object(inner)) => {
                if let Some(serde_json::Value::String(s)) = inner.get("message") {
                    return s.clone();
                }
            }
            _ => {}
        }
    }

    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_owned();
    }

    match trimmed.char_indices().nth(BODY_PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

/// Map a non-success HTTP response onto the error taxonomy.
///
/// Total: every status lands on some kind. Unknown 4xx become
/// `Validation`, anything else unexpected becomes `Server`.
pub fn from_response(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Error {
    let message = body_message(status, body);
    let code = status.as_u16();

    match status {
        StatusCode::UNAUTHORIZED => Error::Authentication {
            status: code,
            message,
        },
        StatusCode::FORBIDDEN => Error::Permission {
            status: code,
            message,
        },
        StatusCode::NOT_FOUND => Error::NotFound {
            status: code,
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit {
            message,
            retry_after,
        },
        s if s.is_client_error() => Error::Validation {
            status: code,
            message,
        },
        _ => Error::Server {
            status: code,
            message,
        },
    }
}
