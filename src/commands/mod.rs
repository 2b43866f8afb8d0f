//! Command implementations.

pub mod backups;
pub mod devices;
pub mod doctor;
pub mod restore;
pub mod run;
pub mod status;

use anyhow::Result;
use sessionkit::{CommandExecutor, SessionManager, SshTransport};
use std::sync::Arc;

use crate::config::{FileRegistry, NetkeepConfig};
use crate::engine::Orchestrator;
use crate::notify::MultiSink;
use crate::paths;
use crate::store::FsBackupStore;

/// Backup store rooted at the configured directory.
pub fn open_store(config: &NetkeepConfig) -> Result<FsBackupStore> {
    let root = config.backup_dir()?;
    log::debug!("Backup store at {}", root.display());
    Ok(FsBackupStore::new(root))
}

/// Orchestrator wired to the ssh transport and the config file registry.
pub fn build_orchestrator(config: &NetkeepConfig, jobs: Option<usize>) -> Result<Orchestrator> {
    let transport = SshTransport::new(config.ssh_settings());
    let sessions = SessionManager::new(Box::new(transport), config.backoff_policy());
    let alerts = MultiSink::from_settings(&config.alerts);
    log::debug!("Alert sinks: {:?}", alerts.names());

    Ok(Orchestrator::new(
        CommandExecutor::new(sessions),
        Arc::new(open_store(config)?),
        Box::new(alerts),
        Box::new(FileRegistry::new(paths::config_file()?)),
    )
    .with_jobs(jobs.unwrap_or(config.run.jobs))
    .with_retention(config.retention()))
}
