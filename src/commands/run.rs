//! `netkeep run`

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use crate::Context;
use crate::cli::RunArgs;
use crate::commands;
use crate::config::NetkeepConfig;
use crate::engine::{AlertStatus, DeviceOutcome, DeviceReport, RunSummary};
use crate::progress::BarProgress;
use crate::ui;

pub fn run(ctx: &Context, args: RunArgs) -> Result<ExitCode> {
    let config = NetkeepConfig::load()?;
    let orchestrator = commands::build_orchestrator(&config, args.jobs)?;
    let progress = BarProgress::new(ctx.quiet);

    let result = match &args.device {
        Some(name) => orchestrator.run_device(name, &progress),
        None => orchestrator.run_all(&progress),
    };
    orchestrator.shutdown();
    let summary = result?;

    if summary.total() == 0 {
        ui::warn("No devices configured. Add one with `netkeep devices add`.");
        return Ok(ExitCode::SUCCESS);
    }

    if !ctx.quiet {
        print_summary(&summary, ctx.verbose > 0);
    }

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_summary(summary: &RunSummary, show_diffs: bool) {
    ui::header("Backup Run");
    for report in &summary.reports {
        print_report(report, show_diffs);
    }

    ui::section("Summary");
    ui::kv("devices", &summary.total().to_string());
    ui::kv("backed up", &summary.succeeded.to_string());
    ui::kv("changed", &summary.changed.to_string());
    if summary.first_backups > 0 {
        ui::kv("first backups", &summary.first_backups.to_string());
    }
    if summary.failed() > 0 {
        ui::kv(
            "failed",
            &format!(
                "{} (capture {}, store {}, faulted {})",
                summary.failed(),
                summary.capture_failed,
                summary.store_failed,
                summary.faulted
            ),
        );
    }
    if summary.alerts_failed > 0 {
        ui::kv("alerts failed", &summary.alerts_failed.to_string());
    }
    if summary.pruned > 0 {
        ui::kv("pruned", &ui::plural(summary.pruned, "old backup"));
    }
    for (device, error) in &summary.prune_failures {
        ui::warn(&format!("Prune failed for {device}: {error}"));
    }

    println!();
    if summary.is_success() {
        ui::success("All devices backed up");
    } else {
        ui::error(&format!(
            "{} failed",
            ui::plural(summary.failed(), "device")
        ));
    }
}

fn print_report(report: &DeviceReport, show_diffs: bool) {
    let elapsed = format!("({:.1}s)", report.elapsed.as_secs_f64()).dimmed();
    match &report.outcome {
        DeviceOutcome::Success {
            record,
            diff,
            alert,
            ..
        } => {
            let label = report.outcome.label();
            let label = if report.outcome.has_changes() {
                label.yellow()
            } else {
                label.normal()
            };
            println!(
                "  {} {} {} {} {}",
                ui::mark(true),
                report.device.bold(),
                label,
                record.key.dimmed(),
                elapsed
            );
            if let Some(diff) = diff.as_ref().filter(|d| d.has_changes) {
                println!("      {}", diff.summary().dimmed());
                if show_diffs {
                    ui::diff(&diff.diff);
                }
            }
            if let AlertStatus::Failed(error) = alert {
                println!("      {} alert not delivered: {}", "⚠".yellow(), error);
            }
        }
        failed => {
            println!(
                "  {} {} {} {}",
                ui::mark(false),
                report.device.bold(),
                failed.label().red(),
                elapsed
            );
            if let Some(error) = failed.error() {
                println!("      {}", error.dimmed());
            }
        }
    }
}
