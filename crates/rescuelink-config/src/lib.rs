//! Shared configuration for the RescueLink console.
//!
//! TOML profiles overlaid with `RESCUELINK_` environment variables, token
//! resolution (env var + keyring + plaintext), and translation to
//! `rescuelink_core::SyncConfig`. The binary adds flag-aware overrides on
//! top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use rescuelink_core::{ConflictPolicy, RetryPolicy, SyncConfig, TlsVerification};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Keyring service name; entries are keyed `{profile}/token`.
pub const KEYRING_SERVICE: &str = "rescuelink";

/// Points every loader at an explicit file instead of the platform path.
pub const CONFIG_PATH_ENV: &str = "RESCUELINK_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no session token configured for profile '{profile}'")]
    NoToken { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

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
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Values a profile falls back to.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: explicit choice, then `default_profile`.
    pub fn active_profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    /// Sorted, comma-separated profile names, for diagnostics.
    pub fn profile_names(&self) -> String {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        if names.is_empty() {
            "(none)".into()
        } else {
            names.join(", ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub insecure: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            insecure: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_secs() -> u64 {
    60
}

/// A named backend profile. Unset fields fall back to [`Defaults`] and
/// then to `SyncConfig`'s own defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// REST base URL (e.g., "https://rescuelink.example/api/v1/").
    pub api_url: String,

    /// WebSocket endpoint (e.g., "wss://rescuelink.example/ws").
    pub push_url: String,

    pub push_enabled: Option<bool>,
    pub polling_enabled: Option<bool>,

    /// Seconds between snapshot fetches; 0 disables interval polling.
    pub poll_interval_secs: Option<u64>,

    pub max_reconnect_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,

    pub conflict_policy: Option<ConflictPolicy>,
    pub prune_missing: Option<bool>,

    pub timeout_secs: Option<u64>,

    /// Session token (plaintext -- prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the session token.
    pub token_env: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept self-signed certificates.
    pub insecure: Option<bool>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `RESCUELINK_CONFIG`, then platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "rescuelink", "rescuelink").map_or_else(
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
    p.push("rescuelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Nested keys use a double underscore, e.g.
/// `RESCUELINK_PROFILES__HOME__POLL_INTERVAL_SECS=15`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RESCUELINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is invalid.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
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

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve the session token: `token_env`, then the system keyring,
/// then plaintext in the profile.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
        debug!(env = %env_name, "token_env is not set");
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken {
        profile: profile_name.into(),
    })
}

/// Store a session token in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

// ── SyncConfig translation ──────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build a `SyncConfig` from a profile and the file-wide defaults.
pub fn profile_to_sync_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url)?;
    let push_url = parse_url("push_url", &profile.push_url)?;
    if !matches!(push_url.scheme(), "ws" | "wss") {
        return Err(ConfigError::Validation {
            field: "push_url".into(),
            reason: format!("expected a ws:// or wss:// URL, got '{push_url}'"),
        });
    }

    let mut config = SyncConfig::new(api_url, push_url);

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout_secs.unwrap_or(defaults.timeout_secs));
    config.poll_interval = Duration::from_secs(
        profile
            .poll_interval_secs
            .unwrap_or(defaults.poll_interval_secs),
    );
    if let Some(enabled) = profile.push_enabled {
        config.push_enabled = enabled;
    }
    if let Some(enabled) = profile.polling_enabled {
        config.polling_enabled = enabled;
    }

    let base = RetryPolicy::default();
    config.retry = RetryPolicy {
        initial_delay: profile
            .backoff_base_ms
            .map_or(base.initial_delay, Duration::from_millis),
        max_delay: profile
            .backoff_cap_ms
            .map_or(base.max_delay, Duration::from_millis),
        max_attempts: profile.max_reconnect_attempts.unwrap_or(base.max_attempts),
    };
    if config.retry.initial_delay > config.retry.max_delay {
        return Err(ConfigError::Validation {
            field: "backoff_base_ms".into(),
            reason: "must not exceed backoff_cap_ms".into(),
        });
    }

    if let Some(policy) = profile.conflict_policy {
        config.conflict_policy = policy;
    }
    if let Some(prune) = profile.prune_missing {
        config.prune_missing = prune;
    }

    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────
