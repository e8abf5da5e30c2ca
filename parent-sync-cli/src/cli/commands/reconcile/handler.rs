//! Reconcile command handler

use anyhow::{Context, Result};
use colored::*;
use log::debug;
use std::fmt::Write;

use super::{OutputFormat, ReconcileCommands};
use crate::api::HubSpotClient;
use crate::config::{self, Config};
use crate::services::reconcile::{
    EdgeOperation, Orchestrator, ParentAction, ReconciliationResult, RunMode,
};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_EDGE_FAILURES: i32 = 2;

/// Run one reconciliation and print its report. Returns the process exit code.
pub async fn handle_reconcile_command(args: ReconcileCommands, verbose: bool) -> Result<i32> {
    if args.no_color {
        colored::control::set_override(false);
    }

    let settings = Config::load(args.config.as_deref())?;
    let token = config::resolve_access_token(
        args.api_access_token,
        std::env::var(config::ACCESS_TOKEN_ENV).ok(),
    )?;

    let client = HubSpotClient::new(
        &settings.hubspot.base_url,
        &token,
        settings.timeout(),
        settings.schema(),
        settings.resilience(verbose),
    )
    .context("Failed to set up the HubSpot client")?;
    debug!("Using HubSpot API at {}", client.base_url());

    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Apply
    };
    let result = Orchestrator::new(&client, mode).run(&args.location_id).await;

    let stats = client.rate_limit_stats().await;
    debug!(
        "Rate limiter: {} requests, {} waited",
        stats.requests_acquired, stats.requests_waited
    );

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result)
                .context("Failed to serialize the reconciliation result")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", render_text(&result, verbose)),
    }

    Ok(exit_code(&result))
}

pub fn exit_code(result: &ReconciliationResult) -> i32 {
    if result.error.is_some() {
        EXIT_FAILED
    } else if !result.edge_failures().is_empty() {
        EXIT_EDGE_FAILURES
    } else {
        EXIT_OK
    }
}

fn render_text(result: &ReconciliationResult, verbose: bool) -> String {
    let mut out = String::new();
    let dry_run = result.mode.is_dry_run();

    let _ = writeln!(
        out,
        "Location key {}{}",
        result.location_key.bright_cyan().bold(),
        if dry_run { " (dry run)".yellow().to_string() } else { String::new() }
    );

    if !result.child_ids.is_empty() {
        let _ = writeln!(
            out,
            "  Children: {} ({})",
            result.child_ids.len(),
            result.child_ids.join(", ").dimmed()
        );
    }

    if let Some(name) = &result.resolved_name {
        let _ = writeln!(out, "  Name:     {}", name.bold());
    }

    if let Some(action) = &result.parent_action {
        let id = result.parent_id.as_deref().unwrap_or("(new)");
        let detail = match action {
            ParentAction::Renamed { previous_name } | ParentAction::WouldRename { previous_name } => {
                format!("{}, was '{}'", action.label(), previous_name)
            }
            _ => action.label().to_string(),
        };
        let detail = if action.wrote() {
            detail.green().to_string()
        } else {
            detail
        };
        let _ = writeln!(out, "  Parent:   {} ({})", id, detail);
    }

    if let Some(diff) = &result.associations {
        let (adds, removes) = if diff.applied {
            (diff.added.len(), diff.removed.len())
        } else {
            (diff.to_add.len(), diff.to_remove.len())
        };
        let _ = writeln!(
            out,
            "  Links:    {} {}, {} retained, {} failed",
            format!("+{}", adds).green(),
            format!("-{}", removes).red(),
            diff.retained.len(),
            diff.failures.len()
        );

        if verbose {
            if diff.applied {
                for edge in &diff.added {
                    let _ = writeln!(out, "    added {}", edge);
                }
                for edge in &diff.removed {
                    let _ = writeln!(out, "    removed {}", edge);
                }
            } else {
                for edge in &diff.to_add {
                    let _ = writeln!(out, "    would add {}", edge);
                }
                for edge in &diff.to_remove {
                    let _ = writeln!(out, "    would remove {}", edge);
                }
            }
            for kept in &diff.retained {
                let _ = writeln!(out, "    kept {} ({:?})", kept.edge, kept.reason);
            }
        }

        for failure in &diff.failures {
            let operation = match failure.operation {
                EdgeOperation::Add => "add",
                EdgeOperation::Remove => "remove",
            };
            let _ = writeln!(
                out,
                "    {} {} {}: {}",
                "failed".red(),
                operation,
                failure.edge,
                failure.error
            );
        }

        let integrity = result.integrity_failures().count();
        if diff.has_failures() && integrity > 0 {
            let _ = writeln!(
                out,
                "  {} link(s) point at other parent records and need manual review",
                integrity
            );
        }
    }

    let status = match &result.error {
        Some(failure) => format!("{} {}", "FAILED".red().bold(), failure),
        None if !result.edge_failures().is_empty() => format!(
            "{} with {} edge failures",
            "COMPLETED".yellow().bold(),
            result.edge_failures().len()
        ),
        None if dry_run => format!("{} (nothing written)", "PLANNED".green().bold()),
        None => format!("{} ({} writes)", "OK".green().bold(), result.write_count()),
    };
    let _ = writeln!(out, "{}", status);

    out
}
