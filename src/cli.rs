use clap::{Parser, Subcommand};
use clap_complete::Shell;
use sessionkit::Platform;

#[derive(Parser)]
#[command(name = "netkeep")]
#[command(version)]
#[command(about = "Back up, diff and restore network device configurations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Back up every configured device (or one with --device)
    Run(RunArgs),

    /// List stored backups of a device, newest first
    History {
        /// Device name
        device: String,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a stored backup
    Show {
        /// Device name
        device: String,
        /// Backup key (e.g. 20240304_102133)
        key: String,
    },

    /// Delete a stored backup
    Delete {
        /// Device name
        device: String,
        /// Backup key
        key: String,
    },

    /// Diff two stored backups (defaults to the two most recent)
    Diff {
        /// Device name
        device: String,
        /// Older backup key
        old: Option<String>,
        /// Newer backup key
        new: Option<String>,
    },

    /// Delete backups older than the retention window
    Prune(PruneArgs),

    /// Push a stored backup back to its device and save it
    Restore {
        /// Device name
        device: String,
        /// Backup key
        key: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage the device registry
    #[command(subcommand)]
    Devices(DevicesCommand),

    /// Show configured devices and stored backup counts
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that backups can run on this machine
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run / Prune
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    /// Only back up this device (no pruning)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Number of devices to back up in parallel (overrides run.jobs)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Parser)]
pub struct PruneArgs {
    /// Retention in days (overrides backup.retention_days)
    #[arg(long)]
    pub days: Option<u32>,

    /// Only prune this device
    #[arg(short, long)]
    pub device: Option<String>,

    /// Show what would be deleted
    #[arg(long)]
    pub dry_run: bool,
}

// ============================================================================
// Devices
// ============================================================================

#[derive(Subcommand)]
pub enum DevicesCommand {
    /// List configured devices
    List,

    /// Add a device
    Add(AddDeviceArgs),

    /// Change fields of an existing device
    Edit(EditDeviceArgs),

    /// Remove a device (stored backups are kept)
    Rm {
        /// Device name
        name: String,
    },
}

#[derive(Parser)]
pub struct AddDeviceArgs {
    /// Device name, used as the backup directory name
    pub name: String,

    /// Hostname or IP address
    pub address: String,

    /// Login user
    #[arg(short, long)]
    pub username: String,

    /// Platform tag (cisco_ios, cisco_nxos, cisco_asa, huawei, hp_comware, hp_procurve, juniper, generic)
    #[arg(long, default_value = "generic", value_parser = parse_platform)]
    pub platform: Platform,

    /// SSH port
    #[arg(short, long, default_value_t = sessionkit::DEFAULT_PORT)]
    pub port: u16,

    /// Password (stored in the config file; prefer --identity-file)
    #[arg(long, conflicts_with = "identity_file")]
    pub password: Option<String>,

    /// Private key file
    #[arg(short, long)]
    pub identity_file: Option<String>,

    /// Capture command override
    #[arg(short, long)]
    pub command: Option<String>,
}

#[derive(Parser)]
pub struct EditDeviceArgs {
    /// Device name
    pub name: String,

    /// New hostname or IP address
    #[arg(long)]
    pub address: Option<String>,

    /// New login user
    #[arg(short, long)]
    pub username: Option<String>,

    /// New platform tag
    #[arg(long, value_parser = parse_platform)]
    pub platform: Option<Platform>,

    /// New SSH port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Switch to password login
    #[arg(long, conflicts_with = "identity_file")]
    pub password: Option<String>,

    /// Switch to key login with this private key file
    #[arg(short, long)]
    pub identity_file: Option<String>,

    /// New capture command override
    #[arg(short, long, conflicts_with = "default_command")]
    pub command: Option<String>,

    /// Go back to the platform's capture command
    #[arg(long)]
    pub default_command: bool,
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse()
}
