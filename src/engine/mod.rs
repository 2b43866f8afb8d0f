//! Backup engine for netkeep
//!
//! The engine drives every configured device through the same pipeline:
//! 1. Capture - Run the platform's capture command over a managed session
//! 2. Store - Append the capture to the backup store
//! 3. Diff - Compare with the previous backup, ignoring volatile lines
//! 4. Alert - Notify when the configuration changed
//!
//! Retention pruning runs once per run, after all devices are done.

pub mod orchestrator;

pub use orchestrator::{
    AlertStatus, DeviceOutcome, DeviceReport, NoProgress, Orchestrator, RunProgress, RunSummary,
};
