mod cli;
mod commands;
mod config;
mod engine;
mod notify;
mod paths;
mod progress;
mod store;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, DevicesCommand};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Run(args) => commands::run::run(&ctx, args),
        Command::History { device, json } => {
            commands::backups::history(&ctx, &device, json).map(ok)
        }
        Command::Show { device, key } => commands::backups::show(&ctx, &device, &key).map(ok),
        Command::Delete { device, key } => commands::backups::delete(&ctx, &device, &key).map(ok),
        Command::Diff { device, old, new } => {
            commands::backups::diff(&ctx, &device, old.as_deref(), new.as_deref()).map(ok)
        }
        Command::Prune(args) => commands::backups::prune(&ctx, args).map(ok),
        Command::Restore { device, key, yes } => {
            commands::restore::run(&ctx, &device, &key, yes).map(ok)
        }
        Command::Devices(cmd) => match cmd {
            DevicesCommand::List => commands::devices::list(&ctx),
            DevicesCommand::Add(args) => commands::devices::add(&ctx, args),
            DevicesCommand::Edit(args) => commands::devices::edit(&ctx, args),
            DevicesCommand::Rm { name } => commands::devices::rm(&ctx, &name),
        }
        .map(ok),
        Command::Status { json } => commands::status::run(&ctx, json).map(ok),
        Command::Doctor => commands::doctor::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "netkeep", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn ok(_: ()) -> ExitCode {
    ExitCode::SUCCESS
}
