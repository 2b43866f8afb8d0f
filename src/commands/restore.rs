//! `netkeep restore`

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use dialoguer::Confirm;

use crate::Context;
use crate::commands;
use crate::config::NetkeepConfig;
use crate::ui;

pub fn run(ctx: &Context, device: &str, key: &str, yes: bool) -> Result<()> {
    let config = NetkeepConfig::load()?;
    let target = config.find_target(device)?;
    let orchestrator = commands::build_orchestrator(&config, None)?;

    let record = orchestrator
        .store()
        .find(device, key)?
        .with_context(|| format!("Backup '{key}' not found for '{device}'"))?;

    let platform = target.descriptor.platform;
    if !ctx.quiet {
        ui::header(&format!("Restore {device}"));
        ui::kv("address", &target.descriptor.endpoint());
        ui::kv("platform", platform.tag());
        ui::kv("backup", &record.key);
        ui::kv("save with", platform.save_command());
        println!();
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Push {} to {}? This overwrites the running configuration",
                record.key,
                device.bold()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirmed {
            bail!("Restore cancelled");
        }
    }

    let result = orchestrator.restore(&target, &record);
    orchestrator.shutdown();
    let pushed = result?;

    if !ctx.quiet {
        ui::success(&format!(
            "Restored {} to {device} ({} pushed, `{}` issued)",
            record.key,
            ui::plural(pushed, "line"),
            platform.save_command()
        ));
    }
    Ok(())
}
