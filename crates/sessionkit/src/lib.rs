//! # sessionkit
//!
//! Reliable remote command-line sessions for network devices.
//!
//! This crate provides:
//! - A [`Transport`] seam with a system-ssh implementation and a scripted mock
//! - A [`SessionManager`] that keeps at most one live session per device,
//!   probes cached sessions before reuse and reconnects with backoff
//! - A [`CommandExecutor`] that retries once after a transient mid-command
//!   failure
//! - Per-platform conventions ([`Platform`]) such as the command that saves
//!   the running configuration
//!
//! ## Example
//!
//! ```no_run
//! use sessionkit::{
//!     BackoffPolicy, CommandExecutor, Credentials, DeviceDescriptor, Platform, SessionManager,
//!     SshTransport,
//! };
//!
//! let sessions = SessionManager::new(
//!     Box::new(SshTransport::default()),
//!     BackoffPolicy::default(),
//! );
//! let executor = CommandExecutor::new(sessions);
//!
//! let device = DeviceDescriptor::new(
//!     "core-sw1",
//!     "10.0.0.1",
//!     Credentials::password("admin", "secret"),
//!     Platform::CiscoIos,
//! );
//! let config = executor
//!     .execute(&device, device.platform.capture_command(), true)
//!     .expect("capture failed");
//! println!("{} characters", config.len());
//! executor.shutdown();
//! ```
//!
//! ## Errors
//!
//! Authentication failures are never retried. Transport failures are
//! retried per the [`BackoffPolicy`] and carry a typed `transient` flag set
//! where the transport raised them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod manager;
pub mod mock;
pub mod platform;
pub mod retry;
pub mod transport;
pub mod types;

pub use error::{ConnectFailure, Error, ErrorCategory, Result, TransportKind};
pub use executor::CommandExecutor;
pub use manager::{DeviceLease, SessionManager};
pub use platform::Platform;
pub use retry::{BackoffPolicy, BackoffStrategy, RecordingSleeper, Sleeper, ThreadSleeper};
pub use transport::ssh::{SshSettings, SshTransport};
pub use transport::{Session, Transport};
pub use types::{CommandOutput, Credentials, DEFAULT_PORT, DeviceDescriptor};
