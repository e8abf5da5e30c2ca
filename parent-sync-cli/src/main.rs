mod api;
mod cli;
mod config;
mod services;

use clap::Parser;
use colored::*;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "parent_sync=debug"
    } else {
        "parent_sync=info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let outcome = match cli.command {
        Commands::Reconcile(args) => {
            cli::commands::reconcile::handle_reconcile_command(args, cli.verbose).await
        }
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            std::process::exit(cli::commands::reconcile::handler::EXIT_FAILED);
        }
    }
}
