// HTTP client construction for the snapshot endpoints.
//
// TLS trust and request timeouts are decided once, here, from whatever
// the caller resolved out of its profile.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("rescuelink/", env!("CARGO_PKG_VERSION"));

/// How server certificates are trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    #[default]
    System,
    /// Trust an extra root from a PEM file, on top of the system store.
    CustomCa(PathBuf),
    /// Accept any certificate. Only for development backends.
    DangerAcceptInvalid,
}

/// Settings shared by every HTTP request to one backend.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Whole-request deadline, connect through body.
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
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout.min(Duration::from_secs(10)))
            .user_agent(USER_AGENT);

        let builder = match &self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(path) => builder.add_root_certificate(load_root(path)?),
            TlsMode::DangerAcceptInvalid => {
                tracing::warn!("TLS certificate verification is disabled");
                builder.danger_accept_invalid_certs(true)
            }
        };

        builder
            .build()
            .map_err(|e| Error::Tls(format!("cannot build HTTP client: {e}")))
    }
}

fn load_root(path: &Path) -> Result<reqwest::Certificate, Error> {
    let pem = std::fs::read(path)
        .map_err(|e| Error::Tls(format!("cannot read CA file {}: {e}", path.display())))?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| Error::Tls(format!("{} is not a PEM certificate: {e}", path.display())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_trusts_the_system_store() {
        let transport = TransportConfig::default();
        assert_eq!(transport.tls, TlsMode::System);
        assert!(transport.build_client().is_ok());
    }

    #[test]
    fn missing_ca_file_is_a_tls_error() {
        let transport = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/nonexistent/rescuelink-ca.pem")),
            ..TransportConfig::default()
        };
        let err = transport.build_client().unwrap_err();
        assert!(matches!(err, Error::Tls(ref m) if m.contains("cannot read CA file")));
    }
}
