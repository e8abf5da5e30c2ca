//! Reconcile command

pub mod handler;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

pub use handler::handle_reconcile_command;

#[derive(Args, Debug)]
pub struct ReconcileCommands {
    /// Client Company Location ID of the group to reconcile
    #[arg(short = 'l', long, visible_alias = "parent-id", alias = "parent_id", value_name = "KEY")]
    pub location_id: String,

    /// HubSpot private app token (defaults to HUBSPOT_API_ACCESS_TOKEN)
    #[arg(long, alias = "api_access_token", value_name = "TOKEN")]
    pub api_access_token: Option<String>,

    /// Config file (defaults to <config dir>/parent-sync/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Read and plan, but do not write anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// The full result as pretty-printed JSON
    Json,
}
