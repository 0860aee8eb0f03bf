//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use rescuelink_config::ConfigError;
use rescuelink_core::CoreError;
use thiserror::Error;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the backend at {url}")]
    #[diagnostic(
        code(rescuelink::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Snapshot fetch failed: {message}")]
    #[diagnostic(code(rescuelink::fetch_failed))]
    Fetch { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("The backend rejected the session token for profile '{profile}'")]
    #[diagnostic(
        code(rescuelink::auth_failed),
        help(
            "Sign in again and store the new token with:\n  \
             rescuelink config set-token <TOKEN> --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No session token configured for profile '{profile}'")]
    #[diagnostic(
        code(rescuelink::no_token),
        help(
            "Pass --token, set RESCUELINK_TOKEN, or store one with:\n  \
             rescuelink config set-token <TOKEN>"
        )
    )]
    NoToken { profile: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(rescuelink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: rescuelink config init --api-url <URL> --push-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(rescuelink::no_config),
        help(
            "Create a profile with: rescuelink config init --api-url <URL> --push-url <URL>\n\
             Or pass --api-url and --push-url.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rescuelink::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(rescuelink::config))]
    Config(ConfigError),

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(rescuelink::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode output: {0}")]
    #[diagnostic(code(rescuelink::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoToken { .. } => exit_code::AUTH,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile to an auth failure.
    pub fn for_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { .. } => Self::AuthFailed {
                profile: profile.to_owned(),
            },
            other => other,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoToken { profile } => CliError::NoToken { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                profile: "current".into(),
            },
            CoreError::Fetch { message, status } => CliError::Fetch {
                message: status.map_or_else(|| message.clone(), |s| format!("HTTP {s}: {message}")),
            },
            CoreError::Parse { message } => CliError::Fetch { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::NotStarted => CliError::Internal("sync layer is not started".into()),
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
