// ── Core error types ──
//
// User-facing errors from rescuelink-core. Consumers never see HTTP
// status codes or JSON parse failures directly: the
// `From<rescuelink_api::Error>` impl translates transport-layer errors
// into the handful of categories the UI reacts to.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to push channel at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Session rejected by the backend. Stops the sync layer.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    /// A snapshot fetch failed. Scoped to one poll cycle.
    #[error("Snapshot fetch failed: {message}")]
    Fetch {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    /// A frame or record could not be interpreted. Scoped to one message.
    #[error("Malformed message: {message}")]
    Parse { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Sync layer is not started")]
    NotStarted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` when the session itself was refused and retrying is pointless.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<rescuelink_api::Error> for CoreError {
    fn from(err: rescuelink_api::Error) -> Self {
        use rescuelink_api::Error as Api;

        if err.is_auth_rejected() {
            return CoreError::AuthenticationFailed {
                message: err.to_string(),
            };
        }

        match err {
            Api::Transport(ref e) => {
                if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Fetch {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::Http { status, message } => CoreError::Fetch {
                message,
                status: Some(status),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: "<push channel>".into(),
                reason,
            },
            Api::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: "<push channel>".into(),
                reason: format!("closed with code {code}: {reason}"),
            },
            Api::Deserialization { message, .. } => CoreError::Parse { message },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            Api::Tls(message) => CoreError::Config { message },
            // Auth variants are handled above.
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth_failure() {
        let err: CoreError = rescuelink_api::Error::Unauthorized {
            status: 401,
            message: "expired".into(),
        }
        .into();
        assert!(err.is_auth());
    }

    #[test]
    fn http_status_is_kept_on_fetch_errors() {
        let err: CoreError = rescuelink_api::Error::Http {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Fetch { status: Some(502), .. }));
        assert!(!err.is_auth());
    }

    #[test]
    fn bad_payload_is_a_parse_error() {
        let err: CoreError = rescuelink_api::Error::Deserialization {
            message: "expected list".into(),
            body: "{}".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Parse { .. }));
    }
}
