//! Core types for device sessions.

use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Login credentials for a device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login user
    pub username: String,
    /// Password (None for key-based login)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Private key file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
}

impl Credentials {
    /// Credentials for key-based login.
    pub fn key(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            identity_file: None,
        }
    }

    /// Credentials for password login.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            identity_file: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("identity_file", &self.identity_file)
            .finish()
    }
}

/// Immutable snapshot of one registry entry.
///
/// `name` is the unique key; every session and backup is addressed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Unique device name
    pub name: String,
    /// Hostname or IP address
    pub address: String,
    /// SSH port
    pub port: u16,
    /// Login credentials
    pub credentials: Credentials,
    /// Firmware family
    pub platform: Platform,
}

impl DeviceDescriptor {
    /// Create a descriptor on the default port.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        credentials: Credentials,
        platform: Platform,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: DEFAULT_PORT,
            credentials,
            platform,
        }
    }

    /// `address` or `address:port` when the port is not the default.
    pub fn endpoint(&self) -> String {
        if self.port == DEFAULT_PORT {
            self.address.clone()
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Text printed by the device, prompt and echo removed
    pub text: String,
}

impl CommandOutput {
    /// Wrap command text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Length of the output in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether the device printed nothing.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Take the text.
    pub fn into_text(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::password("admin", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_endpoint() {
        let mut device =
            DeviceDescriptor::new("r1", "10.0.0.1", Credentials::key("admin"), Platform::CiscoIos);
        assert_eq!(device.endpoint(), "10.0.0.1");
        device.port = 2222;
        assert_eq!(device.endpoint(), "10.0.0.1:2222");
    }

    #[test]
    fn test_command_output_length() {
        let out = CommandOutput::new("héllo");
        assert_eq!(out.len(), 5);
        assert!(!out.is_empty());
        assert!(CommandOutput::default().is_empty());
    }
}
