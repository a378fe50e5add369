// Shared transport configuration for building reqwest::Client instances.
//
// All three backend variants share TLS and timeout settings through this
// module. Auth headers are not baked into the client; each request carries
// the headers produced by `BackendProfile::translate`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("unimux/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed gateways).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    pub fn new(tls: TlsMode, timeout: Duration) -> Self {
        Self { tls, timeout }
    }

    /// Build a `reqwest::Client` from this config.
    ///
    /// Failures here (unreadable CA file, bad PEM) are configuration
    /// errors: they surface when the client is constructed.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path).map_err(|e| {
                    Error::config(format!(
                        "failed to read CA cert {}: {e}",
                        path.display()
                    ))
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::config(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_ca_file_is_a_configuration_error() {
        let config = TransportConfig::new(
            TlsMode::CustomCa("/nonexistent/unimux-ca.pem".into()),
            Duration::from_secs(5),
        );
        let err = config.build_client().err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Configuration));
    }

    #[test]
    fn insecure_mode_builds() {
        let config = TransportConfig::new(TlsMode::DangerAcceptInvalid, Duration::from_secs(5));
        assert!(config.build_client().is_ok());
    }
}
