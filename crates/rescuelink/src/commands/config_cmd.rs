//! Config subcommand handlers.

use rescuelink_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, InitArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
    cfg
}

fn missing(field: &str, flag: &str) -> CliError {
    CliError::Validation {
        field: field.into(),
        reason: format!("{flag} is required"),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init(init) => init_profile(&init, global),

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config()?);
            let out = match global.output {
                OutputFormat::Table => toml::to_string_pretty(&cfg).map_err(|e| {
                    CliError::Internal(format!("failed to render config: {e}"))
                })?,
                OutputFormat::Json => serde_json::to_string_pretty(&cfg)?,
                OutputFormat::JsonCompact => serde_json::to_string(&cfg)?,
                OutputFormat::Plain => {
                    let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
                    names.sort_unstable();
                    names.join("\n")
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.active_profile_name(None);
            let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
            names.sort_unstable();
            let out = names
                .iter()
                .map(|name| {
                    if *name == default {
                        format!("* {name}")
                    } else {
                        format!("  {name}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: cfg.profile_names(),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetToken { token } => {
            let cfg = config::load_config()?;
            let name = cfg.active_profile_name(global.profile.as_deref());
            config::store_token(&name, &token)?;
            if !global.quiet {
                eprintln!("Token for profile '{name}' stored in the system keyring");
            }
            Ok(())
        }
    }
}

/// Create or update a profile from flags. Non-interactive so it works in
/// provisioning scripts.
fn init_profile(args: &InitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load_config()?;
    let name = args
        .name
        .clone()
        .or_else(|| global.profile.clone())
        .unwrap_or_else(|| "default".into());

    let mut profile = cfg.profiles.get(&name).cloned().unwrap_or_default();
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if let Some(ref url) = global.push_url {
        profile.push_url.clone_from(url);
    }
    if profile.api_url.is_empty() {
        return Err(missing("api_url", "--api-url"));
    }
    if profile.push_url.is_empty() {
        return Err(missing("push_url", "--push-url"));
    }
    if args.poll_interval.is_some() {
        profile.poll_interval_secs = args.poll_interval;
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if args.token_env.is_some() {
        profile.token_env.clone_from(&args.token_env);
    }

    // Validate before anything is written.
    config::profile_to_sync_config(&profile, &cfg.defaults)?;

    if let Some(ref token) = global.token {
        if args.keyring {
            config::store_token(&name, token)?;
            profile.token = None;
        } else {
            profile.token = Some(token.clone());
        }
    }

    let first = cfg.profiles.is_empty();
    cfg.profiles.insert(name.clone(), profile);
    if first || !cfg.profiles.contains_key(&cfg.active_profile_name(None)) {
        cfg.default_profile = Some(name.clone());
    }

    let path = config::save_config(&cfg)?;
    if !global.quiet {
        eprintln!("Profile '{name}' written to {}", path.display());
    }
    Ok(())
}
