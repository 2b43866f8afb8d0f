//! Change alerts.
//!
//! Delivery is best-effort: a failed alert is logged by the caller and never
//! marks a backup as failed.

use confdiff::DiffResult;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::AlertSettings;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(String),

    #[error("webhook returned HTTP {0}")]
    Status(u16),

    #[error("{failed} of {total} alert sinks failed: {message}")]
    Partial {
        failed: usize,
        total: usize,
        message: String,
    },
}

impl From<ureq::Error> for NotifyError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Status(code),
            other => Self::Http(other.to_string()),
        }
    }
}

/// Payload describing a detected configuration change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeAlert {
    pub device: String,
    pub summary: String,
    pub added: usize,
    pub removed: usize,
    pub diff: String,
}

impl ChangeAlert {
    pub fn new(device: &str, result: &DiffResult) -> Self {
        Self {
            device: device.to_string(),
            summary: result.summary(),
            added: result.added,
            removed: result.removed,
            diff: result.diff.clone(),
        }
    }
}

/// Somewhere change alerts go.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, alert: &ChangeAlert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log.
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, alert: &ChangeAlert) -> Result<(), NotifyError> {
        log::warn!("[{}] configuration changed: {}", alert.device, alert.summary);
        log::debug!("[{}] diff:\n{}", alert.device, alert.diff);
        Ok(())
    }
}

/// POSTs alerts as JSON.
pub struct WebhookSink {
    url: String,
    agent: ureq::Agent,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            url: url.into(),
            agent,
        }
    }
}

impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn notify(&self, alert: &ChangeAlert) -> Result<(), NotifyError> {
        self.agent
            .post(&self.url)
            .header("User-Agent", "netkeep")
            .send_json(alert)?;
        log::debug!("[{}] alert posted to {}", alert.device, self.url);
        Ok(())
    }
}

/// Fans an alert out to several sinks.
///
/// Every sink is tried even when an earlier one fails.
pub struct MultiSink {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    /// Sinks described by the `[alerts]` section.
    pub fn from_settings(settings: &AlertSettings) -> Self {
        let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
        if settings.enabled {
            sinks.push(Box::new(LogSink));
            if let Some(url) = &settings.webhook_url {
                sinks.push(Box::new(WebhookSink::new(
                    url.clone(),
                    Duration::from_secs(settings.webhook_timeout_secs),
                )));
            }
        }
        Self::new(sinks)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

impl AlertSink for MultiSink {
    fn name(&self) -> &str {
        "multi"
    }

    fn notify(&self, alert: &ChangeAlert) -> Result<(), NotifyError> {
        let errors: Vec<String> = self
            .sinks
            .iter()
            .filter_map(|sink| {
                sink.notify(alert)
                    .err()
                    .map(|e| format!("{}: {e}", sink.name()))
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Partial {
                failed: errors.len(),
                total: self.sinks.len(),
                message: errors.join("; "),
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
