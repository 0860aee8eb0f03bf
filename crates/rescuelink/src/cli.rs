//! Clap derive structures for the `rescuelink` console.

use clap::{Args, Parser, Subcommand, ValueEnum};
use rescuelink_core::{Collection, Role, Severity, Viewer};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rescuelink -- live alert and device feed for RescueLink operators
#[derive(Debug, Parser)]
#[command(
    name = "rescuelink",
    version,
    about = "Watch RescueLink alerts and devices in real time",
    long_about = "Headless operator console for the RescueLink backend.\n\n\
        Keeps a live, deduplicated view of alerts and devices using the push\n\
        channel, with periodic snapshot polling as a fallback.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "RESCUELINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// REST base URL (overrides profile)
    #[arg(long, env = "RESCUELINK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// WebSocket push URL (overrides profile)
    #[arg(long, env = "RESCUELINK_PUSH_URL", global = true)]
    pub push_url: Option<String>,

    /// Session token (overrides profile, env and keyring)
    #[arg(long, env = "RESCUELINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RESCUELINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "RESCUELINK_INSECURE", global = true)]
    pub insecure: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one id per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream live sync events until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Fetch one snapshot and print it
    #[command(alias = "ls")]
    Snapshot(SnapshotArgs),

    /// Manage the configuration file and stored tokens
    Config(ConfigArgs),
}

// ── Scope ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    /// Sees only owned devices
    User,
    Operator,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Operator => Role::Operator,
            RoleArg::Admin => Role::Admin,
        }
    }
}

/// Who the records are shown to.
#[derive(Debug, Args)]
pub struct ScopeArgs {
    /// Role to scope the view to
    #[arg(long, default_value = "operator")]
    pub role: RoleArg,

    /// Device ids owned by a `user` role (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub owned: Vec<String>,
}

impl ScopeArgs {
    pub fn viewer(&self) -> Viewer {
        Viewer::new(self.role.into(), self.owned.iter().cloned())
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CollectionArg {
    Alerts,
    Devices,
}

impl From<CollectionArg> for Collection {
    fn from(collection: CollectionArg) -> Self {
        match collection {
            CollectionArg::Alerts => Collection::Alerts,
            CollectionArg::Devices => Collection::Devices,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
}

impl From<SeverityArg> for Severity {
    fn from(severity: SeverityArg) -> Self {
        match severity {
            SeverityArg::Low => Severity::Low,
            SeverityArg::Medium => Severity::Medium,
            SeverityArg::High => Severity::High,
        }
    }
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Only print these event types (repeatable; default: all)
    #[arg(long = "topic", short = 't')]
    pub topics: Vec<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<u64>,

    /// Poll every N seconds alongside the push channel (0 = fallback only)
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

// ── Snapshot ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Which collection to print
    #[arg(default_value = "alerts")]
    pub collection: CollectionArg,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Hide resolved records
    #[arg(long)]
    pub unresolved: bool,

    /// Minimum severity to show
    #[arg(long)]
    pub min_severity: Option<SeverityArg>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile
    Init(InitArgs),

    /// Display the loaded configuration (tokens redacted)
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a session token in the system keyring
    SetToken {
        /// Token value
        token: String,
    },
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Profile name to write (default: --profile or "default")
    #[arg(long)]
    pub name: Option<String>,

    /// Seconds between snapshot fetches
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Store --token in the system keyring instead of the file
    #[arg(long)]
    pub keyring: bool,

    /// Read the token from this environment variable at run time
    #[arg(long)]
    pub token_env: Option<String>,
}
