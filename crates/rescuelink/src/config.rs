//! Flag-aware profile resolution.
//!
//! The single boundary where CLI flags, the config file and the keyring
//! are folded into a `SyncConfig` and a session token.

use rescuelink_config::{self as config, Config, Profile};
use rescuelink_core::SyncConfig;
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a command needs to talk to the backend.
pub struct Resolved {
    pub profile_name: String,
    pub sync: SyncConfig,
    pub token: SecretString,
}

/// Apply flag overrides (flag > env > profile) on top of `profile`.
fn with_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if let Some(ref url) = global.push_url {
        profile.push_url.clone_from(url);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    profile
}

/// Pick the profile: a configured one, or one built from flags alone.
fn select_profile(global: &GlobalOpts, cfg: &Config) -> Result<(String, Profile), CliError> {
    let name = cfg.active_profile_name(global.profile.as_deref());

    if let Some(profile) = cfg.profiles.get(&name) {
        return Ok((name, with_overrides(profile.clone(), global)));
    }

    match (&global.api_url, &global.push_url) {
        (Some(_), Some(_)) => Ok((name, with_overrides(Profile::default(), global))),
        _ if global.profile.is_some() => Err(CliError::ProfileNotFound {
            name,
            available: cfg.profile_names(),
        }),
        _ => Err(CliError::NoConfig {
            path: config::config_path().display().to_string(),
        }),
    }
}

/// Resolve the active profile, its `SyncConfig` and the session token.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = config::load_config()?;
    let (profile_name, profile) = select_profile(global, &cfg)?;
    let sync = config::profile_to_sync_config(&profile, &cfg.defaults)?;

    // 1. CLI flag / RESCUELINK_TOKEN, then the profile's chain
    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => config::resolve_token(&profile, &profile_name)?,
    };

    tracing::debug!(profile = %profile_name, api = %sync.api_url, push = %sync.push_url, "profile resolved");
    Ok(Resolved {
        profile_name,
        sync,
        token,
    })
}
