//! `netkeep devices list|add|edit|rm`

use anyhow::{Result, bail};
use colored::Colorize;

use crate::Context;
use crate::cli::{AddDeviceArgs, EditDeviceArgs};
use crate::config::{DeviceEntry, NetkeepConfig};
use crate::paths;
use crate::store;
use crate::ui;

pub fn list(ctx: &Context) -> Result<()> {
    let config = NetkeepConfig::load()?;

    if config.devices.is_empty() {
        ui::warn("No devices configured");
        ui::dim(&format!("Config file: {}", paths::config_file()?.display()));
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!(
            "{} configured",
            ui::plural(config.devices.len(), "device")
        ));
    }
    for target in config.targets() {
        let d = &target.descriptor;
        let auth = if d.credentials.password.is_some() {
            "password"
        } else if d.credentials.identity_file.is_some() {
            "key file"
        } else {
            "agent"
        };
        println!(
            "  {:<20} {:<22} {:<12} {}",
            d.name.bold(),
            d.endpoint(),
            d.platform.tag(),
            format!("{} ({auth})", d.credentials.username).dimmed()
        );
        if ctx.verbose > 0 {
            ui::dim(&format!("capture: {}", target.command));
        }
    }
    Ok(())
}

pub fn add(ctx: &Context, args: AddDeviceArgs) -> Result<()> {
    let mut config = NetkeepConfig::load()?;
    let name = args.name.clone();
    add_entry(&mut config, args)?;
    config.save()?;

    if !ctx.quiet {
        ui::success(&format!("Added device {name}"));
    }
    Ok(())
}

pub fn edit(ctx: &Context, args: EditDeviceArgs) -> Result<()> {
    let mut config = NetkeepConfig::load()?;
    let name = args.name.clone();
    let changed = edit_entry(&mut config, args)?;
    config.save()?;

    if !ctx.quiet {
        ui::success(&format!("Updated device {name}"));
        ui::dim(&format!("changed: {}", changed.join(", ")));
    }
    Ok(())
}

pub fn rm(ctx: &Context, name: &str) -> Result<()> {
    let mut config = NetkeepConfig::load()?;
    remove_entry(&mut config, name)?;
    config.save()?;

    if !ctx.quiet {
        ui::success(&format!("Removed device {name}"));
        ui::dim("Stored backups were kept; use `netkeep prune` to expire them");
    }
    Ok(())
}

fn add_entry(config: &mut NetkeepConfig, args: AddDeviceArgs) -> Result<()> {
    store::validate_device_name(&args.name)?;
    if config.devices.contains_key(&args.name) {
        bail!("Device '{}' already exists", args.name);
    }

    config.devices.insert(
        args.name,
        DeviceEntry {
            address: args.address,
            port: args.port,
            username: args.username,
            password: args.password,
            identity_file: args.identity_file,
            platform: args.platform,
            command: args.command,
        },
    );
    config.validate()
}

/// Apply the given fields to an existing entry. Returns the names of the
/// fields that were set.
fn edit_entry(config: &mut NetkeepConfig, args: EditDeviceArgs) -> Result<Vec<&'static str>> {
    let Some(entry) = config.devices.get_mut(&args.name) else {
        bail!("Device '{}' not found", args.name);
    };

    let mut changed = Vec::new();
    if let Some(address) = args.address {
        entry.address = address;
        changed.push("address");
    }
    if let Some(username) = args.username {
        entry.username = username;
        changed.push("username");
    }
    if let Some(platform) = args.platform {
        entry.platform = platform;
        changed.push("platform");
    }
    if let Some(port) = args.port {
        entry.port = port;
        changed.push("port");
    }
    if let Some(password) = args.password {
        entry.password = Some(password);
        entry.identity_file = None;
        changed.push("password");
    }
    if let Some(identity_file) = args.identity_file {
        entry.identity_file = Some(identity_file);
        entry.password = None;
        changed.push("identity_file");
    }
    if let Some(command) = args.command {
        entry.command = Some(command);
        changed.push("command");
    } else if args.default_command {
        entry.command = None;
        changed.push("command");
    }

    if changed.is_empty() {
        bail!("Nothing to change for '{}'", args.name);
    }
    config.validate()?;
    Ok(changed)
}

fn remove_entry(config: &mut NetkeepConfig, name: &str) -> Result<()> {
    if config.devices.remove(name).is_none() {
        bail!("Device '{name}' not found");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit::Platform;

    fn args(name: &str) -> AddDeviceArgs {
        AddDeviceArgs {
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            username: "backup".to_string(),
            platform: Platform::Huawei,
            port: 22,
            password: None,
            identity_file: Some("~/.ssh/netkeep".to_string()),
            command: None,
        }
    }

    #[test]
    fn test_add_then_remove() {
        let mut config = NetkeepConfig::default();
        add_entry(&mut config, args("core1")).unwrap();

        let target = config.find_target("core1").unwrap();
        assert_eq!(target.descriptor.platform, Platform::Huawei);
        assert_eq!(target.command, "display current-configuration");

        remove_entry(&mut config, "core1").unwrap();
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut config = NetkeepConfig::default();
        add_entry(&mut config, args("core1")).unwrap();
        assert!(add_entry(&mut config, args("core1")).is_err());
        assert_eq!(config.devices.len(), 1);
    }

    #[test]
    fn test_add_rejects_unsafe_name() {
        let mut config = NetkeepConfig::default();
        assert!(add_entry(&mut config, args("../etc")).is_err());
        assert!(config.devices.is_empty());
    }

    fn edit_args(name: &str) -> EditDeviceArgs {
        EditDeviceArgs {
            name: name.to_string(),
            address: None,
            username: None,
            platform: None,
            port: None,
            password: None,
            identity_file: None,
            command: None,
            default_command: false,
        }
    }

    #[test]
    fn test_edit_changes_only_given_fields() {
        let mut config = NetkeepConfig::default();
        add_entry(&mut config, args("core1")).unwrap();

        let changed = edit_entry(
            &mut config,
            EditDeviceArgs {
                address: Some("10.0.0.9".to_string()),
                platform: Some(Platform::CiscoIos),
                ..edit_args("core1")
            },
        )
        .unwrap();
        assert_eq!(changed, vec!["address", "platform"]);

        let entry = &config.devices["core1"];
        assert_eq!(entry.address, "10.0.0.9");
        assert_eq!(entry.username, "backup");
        assert_eq!(entry.port, 22);
        assert_eq!(entry.identity_file.as_deref(), Some("~/.ssh/netkeep"));
        let target = config.find_target("core1").unwrap();
        assert_eq!(target.command, "show running-config");
    }

    #[test]
    fn test_edit_switches_login_method() {
        let mut config = NetkeepConfig::default();
        add_entry(&mut config, args("core1")).unwrap();

        edit_entry(
            &mut config,
            EditDeviceArgs {
                password: Some("s3cret".to_string()),
                ..edit_args("core1")
            },
        )
        .unwrap();
        let entry = &config.devices["core1"];
        assert_eq!(entry.password.as_deref(), Some("s3cret"));
        assert!(entry.identity_file.is_none());
    }

    #[test]
    fn test_edit_command_override_and_reset() {
        let mut config = NetkeepConfig::default();
        add_entry(&mut config, args("core1")).unwrap();

        edit_entry(
            &mut config,
            EditDeviceArgs {
                command: Some("display saved-configuration".to_string()),
                ..edit_args("core1")
            },
        )
        .unwrap();
        assert_eq!(
            config.find_target("core1").unwrap().command,
            "display saved-configuration"
        );

        edit_entry(
            &mut config,
            EditDeviceArgs {
                default_command: true,
                ..edit_args("core1")
            },
        )
        .unwrap();
        assert!(config.devices["core1"].command.is_none());
    }

    #[test]
    fn test_edit_rejects_unknown_and_empty_edits() {
        let mut config = NetkeepConfig::default();
        assert!(edit_entry(&mut config, edit_args("nope")).is_err());

        add_entry(&mut config, args("core1")).unwrap();
        assert!(edit_entry(&mut config, edit_args("core1")).is_err());
        assert!(
            edit_entry(
                &mut config,
                EditDeviceArgs {
                    address: Some("  ".to_string()),
                    ..edit_args("core1")
                },
            )
            .is_err()
        );
    }

    #[test]
    fn test_remove_unknown() {
        let mut config = NetkeepConfig::default();
        assert!(remove_entry(&mut config, "nope").is_err());
    }
}
