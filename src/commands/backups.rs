//! Inspecting stored backups: history, show, delete, diff, prune.

use anyhow::{Context as _, Result, bail};
use chrono::Local;
use colored::Colorize;

use crate::Context;
use crate::cli::PruneArgs;
use crate::commands;
use crate::config::NetkeepConfig;
use crate::store::{BackupRecord, BackupStore, FsBackupStore};
use crate::ui;

fn open() -> Result<FsBackupStore> {
    commands::open_store(&NetkeepConfig::load()?)
}

/// Look up a record by key, failing with the device's known keys as a hint.
fn find_record(store: &dyn BackupStore, device: &str, key: &str) -> Result<BackupRecord> {
    if let Some(record) = store.find(device, key)? {
        return Ok(record);
    }
    let history = store.history(device)?;
    if history.is_empty() {
        bail!("No backups stored for '{device}'");
    }
    bail!(
        "Backup '{key}' not found for '{device}' (latest: {})",
        history[0].key
    )
}

fn read_record(store: &dyn BackupStore, record: &BackupRecord) -> Result<String> {
    store
        .content(&record.device, record)?
        .with_context(|| format!("Backup {} of {} disappeared", record.key, record.device))
}

pub fn history(ctx: &Context, device: &str, json: bool) -> Result<()> {
    let store = open()?;
    let records = store.history(device)?;

    if json {
        let out = serde_json::to_string_pretty(&records).context("Failed to serialize history")?;
        println!("{out}");
        return Ok(());
    }

    if records.is_empty() {
        ui::warn(&format!("No backups stored for '{device}'"));
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!(
            "{device}: {}",
            ui::plural(records.len(), "backup")
        ));
    }
    for (i, record) in records.iter().enumerate() {
        let marker = if i == 0 { "latest".green() } else { "".normal() };
        println!(
            "  {:<24} {}  {:>9}  {}",
            record.key,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            ui::format_size(record.size),
            marker
        );
    }
    Ok(())
}

pub fn show(_ctx: &Context, device: &str, key: &str) -> Result<()> {
    let store = open()?;
    let record = find_record(&store, device, key)?;
    print!("{}", read_record(&store, &record)?);
    Ok(())
}

pub fn delete(ctx: &Context, device: &str, key: &str) -> Result<()> {
    let store = open()?;
    let record = find_record(&store, device, key)?;
    if !store.delete(device, &record)? {
        bail!("Backup {} of {device} disappeared", record.key);
    }
    if !ctx.quiet {
        ui::success(&format!("Deleted {} of {device}", record.key));
    }
    Ok(())
}

/// Diff two records of one device. Missing keys default to the two most
/// recent records.
pub fn diff(ctx: &Context, device: &str, old: Option<&str>, new: Option<&str>) -> Result<()> {
    let store = open()?;
    let (old, new) = select_pair(&store, device, old, new)?;

    let result = confdiff::compare(&read_record(&store, &old)?, &read_record(&store, &new)?);

    if !ctx.quiet {
        ui::header(&format!("{device}: {} → {}", old.key, new.key));
    }
    if !result.has_changes {
        ui::success("No configuration changes");
        return Ok(());
    }
    ui::info(&result.summary());
    println!();
    ui::diff(&result.diff);
    Ok(())
}

fn select_pair(
    store: &dyn BackupStore,
    device: &str,
    old: Option<&str>,
    new: Option<&str>,
) -> Result<(BackupRecord, BackupRecord)> {
    match (old, new) {
        (Some(old), Some(new)) => Ok((
            find_record(store, device, old)?,
            find_record(store, device, new)?,
        )),
        (Some(old), None) => {
            let old = find_record(store, device, old)?;
            let latest = store
                .latest(device)?
                .with_context(|| format!("No backups stored for '{device}'"))?;
            Ok((old, latest))
        }
        (None, _) => {
            let mut history = store.history(device)?.into_iter();
            match (history.next(), history.next()) {
                (Some(newest), Some(previous)) => Ok((previous, newest)),
                _ => bail!("'{device}' needs at least two backups to diff"),
            }
        }
    }
}

pub fn prune(ctx: &Context, args: PruneArgs) -> Result<()> {
    let config = NetkeepConfig::load()?;
    let store = commands::open_store(&config)?;
    let retention = match args.days {
        Some(0) => bail!("--days must be at least 1"),
        Some(days) => chrono::Duration::days(i64::from(days)),
        None => config.retention(),
    };
    let cutoff = Local::now().naive_local() - retention;
    log::debug!("Prune cutoff {cutoff}");

    if args.dry_run {
        let devices = match &args.device {
            Some(device) => vec![device.clone()],
            None => store.devices()?,
        };
        let mut count = 0;
        for device in devices {
            for record in store.history(&device)? {
                if record.timestamp < cutoff {
                    println!("  {} {}/{}", "would delete".yellow(), device, record.key);
                    count += 1;
                }
            }
        }
        ui::info(&format!("{} older than {cutoff}", ui::plural(count, "backup")));
        return Ok(());
    }

    let report = store.prune_older_than(cutoff, args.device.as_deref());
    if ctx.verbose > 0 {
        for record in &report.removed {
            ui::dim(&format!("deleted {}/{}", record.device, record.key));
        }
    }
    for (device, error) in &report.failures {
        ui::warn(&format!("{device}: {error}"));
    }
    if !ctx.quiet {
        ui::success(&format!(
            "Pruned {}",
            ui::plural(report.removed.len(), "backup")
        ));
    }
    if !report.failures.is_empty() {
        bail!(
            "Prune incomplete: {}",
            ui::plural(report.failures.len(), "failure")
        );
    }
    Ok(())
}
