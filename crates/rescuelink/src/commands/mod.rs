//! Command handlers.

pub mod config_cmd;
pub mod snapshot;
pub mod watch;
