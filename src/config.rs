//! netkeep configuration and device registry.
//!
//! Everything lives in one TOML file:
//!
//! ```toml
//! [backup]
//! dir = "~/netkeep/backups"
//! retention_days = 30
//!
//! [connection]
//! retry_count = 3
//! retry_delay_secs = 2
//! backoff = "linear"
//!
//! [run]
//! jobs = 4
//!
//! [alerts]
//! webhook_url = "https://hooks.example.net/netkeep"
//!
//! [devices.core-sw1]
//! address = "10.0.0.1"
//! username = "backup"
//! identity_file = "~/.ssh/netkeep"
//! platform = "cisco_ios"
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use sessionkit::{
    BackoffPolicy, BackoffStrategy, Credentials, DEFAULT_PORT, DeviceDescriptor, Platform,
    SshSettings,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;
use crate::store;

// ============================================================================
// Schema
// ============================================================================

/// Root of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetkeepConfig {
    pub backup: BackupSettings,
    pub connection: ConnectionSettings,
    pub run: RunSettings,
    pub alerts: AlertSettings,
    pub devices: BTreeMap<String, DeviceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Backup root (default: `<data_dir>/backups`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Records older than this are pruned after every run
    pub retention_days: u32,
    /// Capture command for every device without its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            dir: None,
            retention_days: 30,
            command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub backoff: BackoffStrategy,
    pub max_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Extra `-o` options for ssh, e.g. `StrictHostKeyChecking=accept-new`
    pub ssh_options: Vec<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_secs: 2,
            backoff: BackoffStrategy::Linear,
            max_delay_secs: 60,
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
            probe_timeout_secs: 5,
            ssh_options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Devices captured in parallel
    pub jobs: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            webhook_timeout_secs: 10,
        }
    }
}

/// One `[devices.<name>]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub platform: Platform,
    /// Capture command override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// ============================================================================
// Loading and saving
// ============================================================================

impl NetkeepConfig {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config format in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&paths::config_file()?)
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
    }

    /// Reject values the rest of the program cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.run.jobs == 0 {
            bail!("run.jobs must be at least 1");
        }
        if self.backup.retention_days == 0 {
            bail!("backup.retention_days must be at least 1");
        }
        if self.connection.retry_count == 0 {
            bail!("connection.retry_count must be at least 1");
        }
        for (name, entry) in &self.devices {
            store::validate_device_name(name)
                .with_context(|| format!("Invalid device name '{name}'"))?;
            if entry.address.trim().is_empty() {
                bail!("Device '{name}' has no address");
            }
            if entry.username.trim().is_empty() {
                bail!("Device '{name}' has no username");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Derived settings
    // ========================================================================

    /// Resolved backup root.
    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup.dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::default_backup_dir(),
        }
    }

    /// Connect retry policy.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.connection.retry_count,
            base_delay: Duration::from_secs(self.connection.retry_delay_secs),
            strategy: self.connection.backoff,
            max_delay: Duration::from_secs(self.connection.max_delay_secs),
        }
    }

    /// Settings for the ssh transport.
    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            connect_timeout: Duration::from_secs(self.connection.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.connection.command_timeout_secs),
            probe_timeout: Duration::from_secs(self.connection.probe_timeout_secs),
            ssh_options: self.connection.ssh_options.clone(),
            ..SshSettings::default()
        }
    }

    /// Retention window.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.backup.retention_days))
    }

    /// Every configured device, ordered by name.
    pub fn targets(&self) -> Vec<DeviceTarget> {
        self.devices
            .iter()
            .map(|(name, entry)| self.target(name, entry))
            .collect()
    }

    /// One configured device.
    pub fn find_target(&self, name: &str) -> Result<DeviceTarget> {
        let entry = self
            .devices
            .get(name)
            .with_context(|| format!("Device '{name}' not found"))?;
        Ok(self.target(name, entry))
    }

    fn target(&self, name: &str, entry: &DeviceEntry) -> DeviceTarget {
        let credentials = Credentials {
            username: entry.username.clone(),
            password: entry.password.clone(),
            identity_file: entry.identity_file.as_deref().map(paths::expand),
        };
        let mut descriptor =
            DeviceDescriptor::new(name, entry.address.clone(), credentials, entry.platform);
        descriptor.port = entry.port;

        let command = entry
            .command
            .clone()
            .or_else(|| self.backup.command.clone())
            .unwrap_or_else(|| entry.platform.capture_command().to_string());

        DeviceTarget {
            descriptor,
            command,
        }
    }
}

// ============================================================================
// Device registry
// ============================================================================

/// A device plus the command that captures its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub descriptor: DeviceDescriptor,
    pub command: String,
}

impl DeviceTarget {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Source of the device list, read fresh on every run.
pub trait DeviceRegistry: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceTarget>>;
}

/// Registry backed by the `[devices]` table of a config file.
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DeviceRegistry for FileRegistry {
    fn list_devices(&self) -> Result<Vec<DeviceTarget>> {
        Ok(NetkeepConfig::load_from(&self.path)?.targets())
    }
}

impl DeviceRegistry for Vec<DeviceTarget> {
    fn list_devices(&self) -> Result<Vec<DeviceTarget>> {
        Ok(self.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
