//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

use commands::reconcile::ReconcileCommands;

/// Keep HubSpot parent companies in line with their location groups
#[derive(Parser, Debug)]
#[command(name = "parent-sync")]
#[command(about = "Reconcile HubSpot parent/child companies by Client Company Location ID", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Log at debug level and show every edge decision
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the parent company and associations of one location key
    Reconcile(ReconcileCommands),
}
