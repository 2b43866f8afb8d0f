//! `netkeep status`: configured devices and what the store holds for them.

use anyhow::{Context as _, Result};
use chrono::NaiveDateTime;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::Context;
use crate::commands;
use crate::config::NetkeepConfig;
use crate::store::BackupStore;
use crate::ui;

#[derive(Debug, Serialize)]
struct StatusReport {
    /// Devices in config.toml
    devices: usize,
    /// Backups stored across every device directory
    backups: usize,
    entries: Vec<DeviceStatus>,
}

#[derive(Debug, Serialize)]
struct DeviceStatus {
    name: String,
    configured: bool,
    backups: usize,
    latest: Option<NaiveDateTime>,
}

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let config = NetkeepConfig::load()?;
    let store = commands::open_store(&config)?;
    let report = collect(&config, &store)?;

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{out}");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("netkeep Status");
    }
    ui::kv("devices", &report.devices.to_string());
    ui::kv("backups", &report.backups.to_string());
    ui::kv("backup dir", &store.root().display().to_string());

    if report.entries.is_empty() {
        return Ok(());
    }
    ui::section("Devices");
    for entry in &report.entries {
        let latest = match entry.latest {
            Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string().normal(),
            None => "never".yellow(),
        };
        let note = if entry.configured {
            "".normal()
        } else {
            "(not configured)".dimmed()
        };
        println!(
            "  {:<20} {:>9}  {}  {}",
            entry.name.bold(),
            ui::plural(entry.backups, "backup"),
            latest,
            note
        );
    }
    Ok(())
}

/// Configured devices plus any device that only exists in the store.
fn collect(config: &NetkeepConfig, store: &dyn BackupStore) -> Result<StatusReport> {
    let mut names: BTreeSet<String> = config.devices.keys().cloned().collect();
    names.extend(store.devices()?);

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let history = store.history(&name)?;
        entries.push(DeviceStatus {
            configured: config.devices.contains_key(&name),
            backups: history.len(),
            latest: history.first().map(|record| record.timestamp),
            name,
        });
    }

    Ok(StatusReport {
        devices: config.devices.len(),
        backups: entries.iter().map(|e| e.backups).sum(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceEntry;
    use crate::store::FsBackupStore;
    use chrono::NaiveDate;
    use sessionkit::Platform;
    use tempfile::TempDir;

    fn entry() -> DeviceEntry {
        DeviceEntry {
            address: "10.0.0.1".to_string(),
            port: 22,
            username: "backup".to_string(),
            password: None,
            identity_file: None,
            platform: Platform::CiscoIos,
            command: None,
        }
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_collect_counts_devices_and_backups() {
        let temp = TempDir::new().unwrap();
        for hour in [8, 9] {
            FsBackupStore::new(temp.path())
                .with_clock(move || at(hour))
                .append("r1", "hostname r1\n")
                .unwrap();
        }
        FsBackupStore::new(temp.path())
            .with_clock(|| at(7))
            .append("retired", "hostname retired\n")
            .unwrap();

        let mut config = NetkeepConfig::default();
        config.devices.insert("r1".to_string(), entry());
        config.devices.insert("r2".to_string(), entry());

        let report = collect(&config, &FsBackupStore::new(temp.path())).unwrap();
        assert_eq!(report.devices, 2);
        assert_eq!(report.backups, 3);

        let names: Vec<&str> = report.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["r1", "r2", "retired"]);

        let r1 = &report.entries[0];
        assert!(r1.configured);
        assert_eq!(r1.backups, 2);
        assert_eq!(r1.latest, Some(at(9)));

        let r2 = &report.entries[1];
        assert_eq!(r2.backups, 0);
        assert_eq!(r2.latest, None);

        assert!(!report.entries[2].configured);
    }

    #[test]
    fn test_collect_empty() {
        let temp = TempDir::new().unwrap();
        let report = collect(
            &NetkeepConfig::default(),
            &FsBackupStore::new(temp.path().join("missing")),
        )
        .unwrap();
        assert_eq!(report.devices, 0);
        assert_eq!(report.backups, 0);
        assert!(report.entries.is_empty());
    }
}
