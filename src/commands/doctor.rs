use anyhow::Result;
use colored::Colorize;
use std::fs;
use std::path::Path;
use std::process::{Command, ExitCode, Stdio};

use crate::Context;
use crate::config::NetkeepConfig;
use crate::paths;
use crate::ui;

struct Issue {
    category: &'static str,
    summary: String,
    detail: Option<String>,
    fix: Option<String>,
}

pub fn run(_ctx: &Context) -> Result<ExitCode> {
    ui::header("netkeep Health Check");

    let mut issues: Vec<Issue> = Vec::new();

    let config = check_config(&mut issues);
    check_ssh(config.as_ref(), &mut issues);
    if let Some(config) = &config {
        check_backup_dir(config, &mut issues);
    }

    println!();
    if issues.is_empty() {
        ui::success("Ready to back up");
        Ok(ExitCode::SUCCESS)
    } else {
        print_issue_summary(&issues);
        Ok(ExitCode::FAILURE)
    }
}

fn print_issue_summary(issues: &[Issue]) {
    ui::header(&format!("{} Found", ui::plural(issues.len(), "Issue")));

    for (i, issue) in issues.iter().enumerate() {
        let num = i + 1;
        println!(
            "  {}  {} {}",
            format!("{num}.").bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(detail) = &issue.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        println!();
    }
}

fn check_config(issues: &mut Vec<Issue>) -> Option<NetkeepConfig> {
    ui::section("Configuration");

    let path = match paths::config_file() {
        Ok(path) => path,
        Err(e) => {
            issues.push(Issue {
                category: "Configuration",
                summary: "Cannot resolve the config directory".to_string(),
                detail: Some(e.to_string()),
                fix: Some(format!("Set {}", paths::ENV_CONFIG_DIR)),
            });
            return None;
        }
    };

    if !path.exists() {
        println!("  {} {} {}", "○".dimmed(), path.display(), "(not created yet)".dimmed());
    }

    match NetkeepConfig::load_from(&path) {
        Ok(config) => {
            ui::check(
                true,
                &path.display().to_string(),
                &ui::plural(config.devices.len(), "device"),
            );
            if config.devices.is_empty() {
                issues.push(Issue {
                    category: "Configuration",
                    summary: "No devices configured".to_string(),
                    detail: None,
                    fix: Some("netkeep devices add <name> <address> -u <user>".to_string()),
                });
            }
            Some(config)
        }
        Err(e) => {
            ui::check(false, &path.display().to_string(), "(invalid)");
            issues.push(Issue {
                category: "Configuration",
                summary: format!("{} cannot be loaded", path.display()),
                detail: Some(format!("{e:#}")),
                fix: Some("Fix the reported field and rerun `netkeep doctor`".to_string()),
            });
            None
        }
    }
}

fn check_ssh(config: Option<&NetkeepConfig>, issues: &mut Vec<Issue>) {
    ui::section("Required Commands");

    let needs_sshpass = config.is_some_and(|c| c.devices.values().any(|d| d.password.is_some()));
    let mut commands = vec![("ssh", "-V", "SSH client", "Install OpenSSH client")];
    if needs_sshpass {
        commands.push((
            "sshpass",
            "-V",
            "Password authentication",
            "Install sshpass, or switch devices to identity_file",
        ));
    }

    for (cmd, version_flag, desc, install_hint) in commands {
        match command_version(cmd, version_flag) {
            Some(version) => ui::check(true, cmd, &version),
            None => {
                ui::check(false, cmd, &format!("{desc} (missing)"));
                issues.push(Issue {
                    category: "Required Commands",
                    summary: format!("{cmd} is not installed"),
                    detail: Some(format!("{desc} needs `{cmd}` on PATH")),
                    fix: Some(install_hint.to_string()),
                });
            }
        }
    }
}

/// First line of `cmd <flag>` output (ssh prints its version on stderr).
fn command_version(cmd: &str, flag: &str) -> Option<String> {
    let output = Command::new(cmd)
        .arg(flag)
        .stdin(Stdio::null())
        .output()
        .ok()?;
    let text = if output.stderr.is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    let first = String::from_utf8_lossy(&text).lines().next()?.trim().to_string();
    Some(first)
}

fn check_backup_dir(config: &NetkeepConfig, issues: &mut Vec<Issue>) {
    ui::section("Backup Store");

    let dir = match config.backup_dir() {
        Ok(dir) => dir,
        Err(e) => {
            issues.push(Issue {
                category: "Backup Store",
                summary: "Cannot resolve the backup directory".to_string(),
                detail: Some(e.to_string()),
                fix: Some("Set backup.dir in config.toml".to_string()),
            });
            return;
        }
    };

    match probe_writable(&dir) {
        Ok(()) => ui::check(true, &dir.display().to_string(), "(writable)"),
        Err(e) => {
            ui::check(false, &dir.display().to_string(), "(not writable)");
            issues.push(Issue {
                category: "Backup Store",
                summary: format!("{} is not writable", dir.display()),
                detail: Some(e.to_string()),
                fix: Some("Fix permissions or point backup.dir elsewhere".to_string()),
            });
        }
    }
}

fn probe_writable(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(".netkeep-doctor");
    fs::write(&probe, b"ok")?;
    fs::remove_file(&probe)
}
