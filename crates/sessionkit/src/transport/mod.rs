//! Remote session transport abstraction.
//!
//! The [`Transport`] trait opens sessions; a [`Session`] is one live
//! command-line connection to one device. Implementations:
//! - [`ssh::SshTransport`]: the system `ssh` client
//! - [`crate::mock::MockTransport`]: scripted outcomes for tests

pub mod ssh;

use crate::error::Result;
use crate::types::DeviceDescriptor;

/// Opens sessions to devices.
pub trait Transport: Send + Sync {
    /// Open a new session, returning once the device shows its first prompt.
    fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn Session>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// One live command-line session.
///
/// A session is owned by exactly one device slot and never shared; it runs
/// one command at a time.
pub trait Session: Send {
    /// Send a command and return its output up to the next prompt.
    fn send_command(&mut self, command: &str) -> Result<String>;

    /// Enter configuration mode, send each line, and leave configuration mode.
    fn send_config_set(&mut self, lines: &[String]) -> Result<String>;

    /// Minimal exchange that succeeds only if the device answers with a prompt.
    fn probe(&mut self) -> Result<()>;

    /// Close the session, ignoring errors.
    fn close(&mut self);
}
