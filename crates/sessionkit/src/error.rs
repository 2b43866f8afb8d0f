//! Error types for remote session operations.
//!
//! Errors are categorized once, where the transport raises them, so that the
//! connection manager and executor never have to inspect messages. Transport
//! and execution errors carry an explicit `transient` flag.

use std::fmt;
use thiserror::Error;

/// Categories of session errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credentials rejected by the device (never retried)
    Authentication,
    /// Network-level failure opening or keeping a session
    Transport,
    /// Session fault while a command was running
    Execution,
    /// Local misconfiguration (missing client binary, bad descriptor)
    Configuration,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether a failed connect attempt in this category is worth repeating.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Authentication | Self::Configuration)
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Authentication => "Check the device username, password or identity file",
            Self::Transport => "Check reachability: routing, firewall, device powered on",
            Self::Execution => "The session dropped mid-command; check device load and timeouts",
            Self::Configuration => "Check the local ssh client installation and device entry",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Kind of transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// No answer within the allowed time
    Timeout,
    /// Peer refused the connection
    Refused,
    /// Connection reset by peer
    Reset,
    /// Session closed underneath us
    Closed,
    /// Host could not be resolved or reached
    Unreachable,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Refused => "connection refused",
            Self::Reset => "connection reset",
            Self::Closed => "connection closed",
            Self::Unreachable => "host unreachable",
        };
        f.write_str(name)
    }
}

/// Why a connect gave up after exhausting its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The last attempt timed out
    Timeout,
    /// The last attempt failed for another transport reason
    Transport,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Transport => f.write_str("transport"),
        }
    }
}

/// Errors that can occur while connecting to or talking with a device.
#[derive(Debug, Error)]
pub enum Error {
    /// Device rejected the credentials
    #[error("[{device}] authentication rejected: {message}")]
    Authentication {
        /// Device name
        device: String,
        /// Detail reported by the transport
        message: String,
    },

    /// Transport failure raised by the session layer
    #[error("[{device}] {kind}: {message}")]
    Transport {
        /// Device name
        device: String,
        /// What went wrong on the wire
        kind: TransportKind,
        /// Detail reported by the transport
        message: String,
        /// Whether reconnecting may succeed
        transient: bool,
    },

    /// A session did not answer its liveness probe
    #[error("[{device}] liveness probe failed: {message}")]
    ProbeFailed {
        /// Device name
        device: String,
        /// Detail reported by the transport
        message: String,
    },

    /// Every connect attempt failed
    #[error("[{device}] connection failed after {attempts} attempt(s) ({kind}): {message}")]
    Connection {
        /// Device name
        device: String,
        /// Classification of the last failure
        kind: ConnectFailure,
        /// Attempts made
        attempts: u32,
        /// Message of the last failure
        message: String,
    },

    /// A command failed while the session was up
    #[error("[{device}] command `{command}` failed: {message}")]
    Execution {
        /// Device name
        device: String,
        /// The command that was running
        command: String,
        /// Detail reported by the session
        message: String,
        /// Whether reconnecting may succeed
        transient: bool,
    },

    /// Local configuration problem
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// A transient transport error.
    pub fn transient(device: &str, kind: TransportKind, message: impl Into<String>) -> Self {
        Self::Transport {
            device: device.to_string(),
            kind,
            message: message.into(),
            transient: true,
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Transport { .. } | Self::ProbeFailed { .. } | Self::Connection { .. } => {
                ErrorCategory::Transport
            }
            Self::Execution { .. } => ErrorCategory::Execution,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Other,
        }
    }

    /// Whether a connect attempt failing with this error should be repeated.
    ///
    /// Transport and execution errors follow their `transient` flag; the
    /// other variants follow their category. Local I/O errors are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { transient, .. } | Self::Execution { transient, .. } => *transient,
            Self::Io(_) => false,
            _ => self.category().is_retryable(),
        }
    }

    /// Whether the session that raised this error may work again after a reconnect.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { transient, .. } | Self::Execution { transient, .. } => *transient,
            Self::ProbeFailed { .. } => true,
            _ => false,
        }
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportKind::Timeout,
                ..
            } | Self::Connection {
                kind: ConnectFailure::Timeout,
                ..
            }
        )
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
