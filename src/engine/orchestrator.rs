//! Per-device backup pipeline and whole-fleet runs.
//!
//! One device's pipeline is strictly sequential:
//! capture → baseline lookup → store → diff → alert.
//! Every failure is turned into a [`DeviceOutcome`] at this boundary, so a
//! broken device never stops the others. Retention pruning runs once, after
//! every pipeline of the run has finished.

use anyhow::{Context as AnyhowContext, Result};
use chrono::{Local, NaiveDateTime};
use confdiff::DiffResult;
use rayon::prelude::*;
use sessionkit::{CommandExecutor, ErrorCategory};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{DeviceRegistry, DeviceTarget};
use crate::notify::{AlertSink, ChangeAlert};
use crate::store::{BackupRecord, BackupStore, PruneReport};

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to the change alert of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertStatus {
    /// First capture, or nothing changed
    NotNeeded,
    Sent,
    /// Delivery failed; the backup itself is fine
    Failed(String),
}

/// Result of one device's pipeline.
///
/// The variants map to different remediation: fix reachability or
/// credentials, fix the backup disk, or look at the alert channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOutcome {
    Success {
        record: BackupRecord,
        /// Key of the record the capture was compared with
        baseline: Option<String>,
        /// `None` on a first capture or when the baseline was unreadable
        diff: Option<DiffResult>,
        alert: AlertStatus,
    },
    /// Could not connect or run the capture command
    CaptureFailed {
        category: ErrorCategory,
        error: String,
    },
    /// Captured, but the capture could not be stored
    StoreFailed { error: String },
    /// The pipeline panicked
    Faulted { error: String },
}

impl DeviceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn has_changes(&self) -> bool {
        matches!(
            self,
            Self::Success {
                diff: Some(DiffResult {
                    has_changes: true,
                    ..
                }),
                ..
            }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { baseline: None, .. } => "first backup",
            Self::Success { .. } if self.has_changes() => "changed",
            Self::Success { .. } => "unchanged",
            Self::CaptureFailed { .. } => "capture failed",
            Self::StoreFailed { .. } => "store failed",
            Self::Faulted { .. } => "faulted",
        }
    }

    /// Error text for failed outcomes.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::CaptureFailed { error, .. }
            | Self::StoreFailed { error }
            | Self::Faulted { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub device: String,
    pub outcome: DeviceOutcome,
    pub elapsed: Duration,
}

/// Aggregate result of [`Orchestrator::run_all`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One report per device, ordered by device name
    pub reports: Vec<DeviceReport>,
    pub succeeded: usize,
    pub changed: usize,
    pub first_backups: usize,
    pub capture_failed: usize,
    pub store_failed: usize,
    pub faulted: usize,
    pub alerts_failed: usize,
    pub pruned: usize,
    pub prune_failures: Vec<(String, String)>,
}

impl RunSummary {
    fn from_reports(mut reports: Vec<DeviceReport>, prune: PruneReport) -> Self {
        reports.sort_by(|a, b| a.device.cmp(&b.device));
        let mut summary = Self {
            pruned: prune.removed.len(),
            prune_failures: prune.failures,
            ..Self::default()
        };

        for report in &reports {
            match &report.outcome {
                DeviceOutcome::Success {
                    baseline, alert, ..
                } => {
                    summary.succeeded += 1;
                    if baseline.is_none() {
                        summary.first_backups += 1;
                    }
                    if report.outcome.has_changes() {
                        summary.changed += 1;
                    }
                    if matches!(alert, AlertStatus::Failed(_)) {
                        summary.alerts_failed += 1;
                    }
                }
                DeviceOutcome::CaptureFailed { .. } => summary.capture_failed += 1,
                DeviceOutcome::StoreFailed { .. } => summary.store_failed += 1,
                DeviceOutcome::Faulted { .. } => summary.faulted += 1,
            }
        }

        summary.reports = reports;
        summary
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn failed(&self) -> usize {
        self.capture_failed + self.store_failed + self.faulted
    }

    /// No device failed to capture or store.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress hooks for a run; called from worker threads.
pub trait RunProgress: Sync {
    fn on_run_start(&self, total: usize);

    fn on_device_complete(&self, report: &DeviceReport);

    fn on_run_complete(&self);
}

/// No-op progress.
pub struct NoProgress;

impl RunProgress for NoProgress {
    fn on_run_start(&self, _total: usize) {}

    fn on_device_complete(&self, _report: &DeviceReport) {}

    fn on_run_complete(&self) {}
}

// ============================================================================
// Orchestrator
// ============================================================================

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct Orchestrator {
    executor: CommandExecutor,
    store: Arc<dyn BackupStore>,
    alerts: Box<dyn AlertSink>,
    registry: Box<dyn DeviceRegistry>,
    jobs: usize,
    retention: chrono::Duration,
    clock: Clock,
}

impl Orchestrator {
    pub fn new(
        executor: CommandExecutor,
        store: Arc<dyn BackupStore>,
        alerts: Box<dyn AlertSink>,
        registry: Box<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            executor,
            store,
            alerts,
            registry,
            jobs: 4,
            retention: chrono::Duration::days(30),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Replace the clock used to compute the prune cutoff.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn store(&self) -> &dyn BackupStore {
        self.store.as_ref()
    }

    /// Devices currently in the registry.
    pub fn devices(&self) -> Result<Vec<DeviceTarget>> {
        self.registry
            .list_devices()
            .context("Failed to load device registry")
    }

    /// Run the pipeline for one device.
    ///
    /// Never fails: every error becomes part of the outcome.
    pub fn run_one(&self, target: &DeviceTarget) -> DeviceOutcome {
        let name = target.name();

        let captured = match self
            .executor
            .execute(&target.descriptor, &target.command, true)
        {
            Ok(output) => output.into_text(),
            Err(e) => {
                log::error!("[{name}] capture failed: {e}");
                return DeviceOutcome::CaptureFailed {
                    category: e.category(),
                    error: e.to_string(),
                };
            }
        };
        log::info!("[{name}] captured {} characters", captured.chars().count());

        // Baseline must be looked up before the new capture becomes "latest".
        let baseline = match self.store.latest(name) {
            Ok(baseline) => baseline,
            Err(e) => {
                log::error!("[{name}] baseline lookup failed: {e}");
                return DeviceOutcome::StoreFailed {
                    error: e.to_string(),
                };
            }
        };

        let record = match self.store.append(name, &captured) {
            Ok(record) => record,
            Err(e) => {
                log::error!("[{name}] store failed: {e}");
                return DeviceOutcome::StoreFailed {
                    error: e.to_string(),
                };
            }
        };
        log::info!("[{name}] stored {}", record.key);

        let Some(baseline) = baseline else {
            log::info!("[{name}] first backup, skipping diff");
            return DeviceOutcome::Success {
                record,
                baseline: None,
                diff: None,
                alert: AlertStatus::NotNeeded,
            };
        };

        let previous = match self.store.content(name, &baseline) {
            Ok(Some(text)) => text,
            Ok(None) => {
                log::warn!("[{name}] baseline {} disappeared, skipping diff", baseline.key);
                return DeviceOutcome::Success {
                    record,
                    baseline: Some(baseline.key),
                    diff: None,
                    alert: AlertStatus::NotNeeded,
                };
            }
            Err(e) => {
                log::warn!("[{name}] baseline {} unreadable, skipping diff: {e}", baseline.key);
                return DeviceOutcome::Success {
                    record,
                    baseline: Some(baseline.key),
                    diff: None,
                    alert: AlertStatus::NotNeeded,
                };
            }
        };

        let diff = confdiff::compare(&previous, &captured);
        let alert = if diff.has_changes {
            log::info!("[{name}] {}", diff.summary());
            match self.alerts.notify(&ChangeAlert::new(name, &diff)) {
                Ok(()) => AlertStatus::Sent,
                Err(e) => {
                    log::warn!("[{name}] alert delivery failed: {e}");
                    AlertStatus::Failed(e.to_string())
                }
            }
        } else {
            log::debug!("[{name}] no changes");
            AlertStatus::NotNeeded
        };

        DeviceOutcome::Success {
            record,
            baseline: Some(baseline.key),
            diff: Some(diff),
            alert,
        }
    }

    /// Run every device in the registry, then prune expired backups.
    ///
    /// The registry is read fresh on every call. Devices run on a bounded
    /// worker pool; a panic in one pipeline is caught and reported as
    /// [`DeviceOutcome::Faulted`].
    pub fn run_all(&self, progress: &dyn RunProgress) -> Result<RunSummary> {
        let targets = self.devices()?;
        log::info!("Running backups for {} device(s)", targets.len());
        let reports = self.run_targets(&targets, progress)?;

        let cutoff = (self.clock)() - self.retention;
        log::debug!("Pruning backups older than {cutoff}");
        let prune = self.store.prune_older_than(cutoff, None);
        for (device, error) in &prune.failures {
            log::warn!("[{device}] prune failed: {error}");
        }

        Ok(RunSummary::from_reports(reports, prune))
    }

    /// Run a single named device, without pruning.
    pub fn run_device(&self, name: &str, progress: &dyn RunProgress) -> Result<RunSummary> {
        let target = self
            .devices()?
            .into_iter()
            .find(|t| t.name() == name)
            .with_context(|| format!("Device '{name}' not found"))?;
        let reports = self.run_targets(std::slice::from_ref(&target), progress)?;
        Ok(RunSummary::from_reports(reports, PruneReport::default()))
    }

    fn run_targets(
        &self,
        targets: &[DeviceTarget],
        progress: &dyn RunProgress,
    ) -> Result<Vec<DeviceReport>> {
        progress.on_run_start(targets.len());
        let reports: Mutex<Vec<DeviceReport>> = Mutex::new(Vec::with_capacity(targets.len()));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .context("Failed to create backup thread pool")?;

        pool.install(|| {
            targets.par_iter().for_each(|target| {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_one(target)))
                    .unwrap_or_else(|payload| {
                        let error = panic_message(payload.as_ref());
                        log::error!("[{}] pipeline panicked: {error}", target.name());
                        self.executor.sessions().release(target.name());
                        DeviceOutcome::Faulted { error }
                    });

                let report = DeviceReport {
                    device: target.name().to_string(),
                    outcome,
                    elapsed: started.elapsed(),
                };
                progress.on_device_complete(&report);
                reports
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(report);
            });
        });

        progress.on_run_complete();
        Ok(reports.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    /// Push a stored record back to its device and save it.
    ///
    /// Returns the number of configuration lines pushed.
    pub fn restore(&self, target: &DeviceTarget, record: &BackupRecord) -> Result<usize> {
        let name = target.name();
        let content = self
            .store
            .content(name, record)?
            .with_context(|| format!("Backup {} of {name} no longer exists", record.key))?;

        let lines = target.descriptor.platform.restorable_lines(&content);
        if lines.is_empty() {
            anyhow::bail!("Backup {} of {name} has no configuration lines", record.key);
        }

        self.executor
            .push_config(&target.descriptor, &lines)
            .with_context(|| format!("Failed to restore {} to {name}", record.key))?;
        Ok(lines.len())
    }

    /// Release every cached session.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::store::{FsBackupStore, StoreError, StoreResult};
    use chrono::NaiveDate;
    use sessionkit::mock::{ConnectOutcome, MockTransport};
    use sessionkit::{
        BackoffPolicy, Credentials, DeviceDescriptor, Platform, RecordingSleeper, SessionManager,
    };
    use tempfile::TempDir;

    const CONFIG: &str = "\
hostname r1
!
interface GigabitEthernet0/1
 ip address 192.168.1.1 255.255.255.0
!
end";

    #[derive(Clone, Default)]
    struct RecordingSink {
        alerts: Arc<Mutex<Vec<ChangeAlert>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn alerts(&self) -> Vec<ChangeAlert> {
            self.alerts.lock().unwrap().clone()
        }
    }

    impl AlertSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn notify(&self, alert: &ChangeAlert) -> std::result::Result<(), NotifyError> {
            self.alerts.lock().unwrap().push(alert.clone());
            if self.fail {
                Err(NotifyError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    /// Store that refuses writes for one device and panics for another.
    struct FaultyStore {
        inner: FsBackupStore,
        refuse: &'static str,
        explode: &'static str,
    }

    impl BackupStore for FaultyStore {
        fn append(&self, device: &str, content: &str) -> StoreResult<BackupRecord> {
            if device == self.refuse {
                return Err(StoreError::Io {
                    path: format!("/backups/{device}").into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            assert_ne!(device, self.explode, "simulated store bug");
            self.inner.append(device, content)
        }

        fn history(&self, device: &str) -> StoreResult<Vec<BackupRecord>> {
            self.inner.history(device)
        }

        fn content(&self, device: &str, record: &BackupRecord) -> StoreResult<Option<String>> {
            self.inner.content(device, record)
        }

        fn delete(&self, device: &str, record: &BackupRecord) -> StoreResult<bool> {
            self.inner.delete(device, record)
        }

        fn prune_older_than(&self, cutoff: NaiveDateTime, device: Option<&str>) -> PruneReport {
            self.inner.prune_older_than(cutoff, device)
        }

        fn devices(&self) -> StoreResult<Vec<String>> {
            self.inner.devices()
        }
    }

    fn target(name: &str) -> DeviceTarget {
        DeviceTarget {
            descriptor: DeviceDescriptor::new(
                name,
                "192.0.2.1",
                Credentials::key("backup"),
                Platform::CiscoIos,
            ),
            command: "show running-config".to_string(),
        }
    }

    fn executor(mock: &MockTransport) -> CommandExecutor {
        CommandExecutor::new(
            SessionManager::new(
                Box::new(mock.clone()),
                BackoffPolicy::linear(3, Duration::from_secs(2)),
            )
            .with_sleeper(Box::new(RecordingSleeper::new())),
        )
    }

    struct Fixture {
        temp: TempDir,
        mock: MockTransport,
        sink: RecordingSink,
        orchestrator: Orchestrator,
    }

    fn fixture(devices: &[&str]) -> Fixture {
        fixture_with(devices, RecordingSink::default(), |temp| {
            Arc::new(FsBackupStore::new(temp.path()))
        })
    }

    fn fixture_with(
        devices: &[&str],
        sink: RecordingSink,
        store: impl FnOnce(&TempDir) -> Arc<dyn BackupStore>,
    ) -> Fixture {
        let temp = TempDir::new().unwrap();
        let mock = MockTransport::new();
        let targets: Vec<DeviceTarget> = devices.iter().map(|d| target(d)).collect();
        let orchestrator = Orchestrator::new(
            executor(&mock),
            store(&temp),
            Box::new(sink.clone()),
            Box::new(targets),
        )
        .with_jobs(2);
        Fixture {
            temp,
            mock,
            sink,
            orchestrator,
        }
    }

    #[test]
    fn test_first_capture_stores_one_record_without_alert() {
        let f = fixture(&["r1"]);
        f.mock.set_output("r1", CONFIG);

        let outcome = f.orchestrator.run_one(&target("r1"));
        assert!(matches!(
            outcome,
            DeviceOutcome::Success {
                baseline: None,
                diff: None,
                alert: AlertStatus::NotNeeded,
                ..
            }
        ));
        assert_eq!(outcome.label(), "first backup");
        assert_eq!(f.orchestrator.store().history("r1").unwrap().len(), 1);
        assert!(f.sink.alerts().is_empty());
    }

    #[test]
    fn test_identical_capture_is_stored_but_not_alerted() {
        let f = fixture(&["r1"]);
        f.mock.set_output("r1", CONFIG);

        f.orchestrator.run_one(&target("r1"));
        let outcome = f.orchestrator.run_one(&target("r1"));

        assert_eq!(outcome.label(), "unchanged");
        assert_eq!(f.orchestrator.store().history("r1").unwrap().len(), 2);
        assert!(f.sink.alerts().is_empty());
    }

    #[test]
    fn test_change_triggers_alert() {
        let f = fixture(&["r1"]);
        f.mock.set_output("r1", CONFIG);
        f.orchestrator.run_one(&target("r1"));

        f.mock.set_output("r1", CONFIG.replace("192.168.1.1", "192.168.1.2"));
        let outcome = f.orchestrator.run_one(&target("r1"));

        assert!(outcome.has_changes());
        let alerts = f.sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].device, "r1");
        assert_eq!((alerts[0].added, alerts[0].removed), (1, 1));
        assert_eq!(alerts[0].summary, "1 lines added, 1 lines removed");
    }

    #[test]
    fn test_volatile_only_change_is_not_alerted() {
        let f = fixture(&["r1"]);
        f.mock.set_output("r1", format!("! Last configuration change at 10:00:00\n{CONFIG}"));
        f.orchestrator.run_one(&target("r1"));

        f.mock.set_output("r1", format!("! Last configuration change at 11:30:00\n{CONFIG}"));
        let outcome = f.orchestrator.run_one(&target("r1"));

        assert_eq!(outcome.label(), "unchanged");
        assert!(f.sink.alerts().is_empty());
    }

    #[test]
    fn test_alert_failure_does_not_fail_backup() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let f = fixture_with(&["r1"], sink, |temp| Arc::new(FsBackupStore::new(temp.path())));
        f.mock.set_output("r1", CONFIG);
        f.orchestrator.run_one(&target("r1"));
        f.mock.set_output("r1", format!("{CONFIG}\nbanner motd ^hi^"));

        let outcome = f.orchestrator.run_one(&target("r1"));
        assert!(outcome.is_success());
        assert!(matches!(
            outcome,
            DeviceOutcome::Success {
                alert: AlertStatus::Failed(_),
                ..
            }
        ));
    }

    #[test]
    fn test_capture_failure_is_an_outcome() {
        let f = fixture(&["r1"]);
        f.mock.always_connect("r1", ConnectOutcome::RejectAuth);

        let outcome = f.orchestrator.run_one(&target("r1"));
        match outcome {
            DeviceOutcome::CaptureFailed { category, .. } => {
                assert_eq!(category, ErrorCategory::Authentication);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(f.orchestrator.store().history("r1").unwrap().is_empty());
        assert_eq!(f.mock.connect_attempts("r1"), 1);
    }

    #[test]
    fn test_run_all_continues_past_failing_device() {
        let f = fixture(&["r1", "r2"]);
        f.mock.always_connect("r1", ConnectOutcome::RejectAuth);
        f.mock.set_output("r2", CONFIG);

        let summary = f.orchestrator.run_all(&NoProgress).unwrap();

        assert_eq!(summary.total(), 2);
        assert_eq!(summary.capture_failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.first_backups, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.reports[0].device, "r1");
        assert_eq!(f.orchestrator.store().history("r2").unwrap().len(), 1);
    }

    #[test]
    fn test_store_failure_and_panic_are_isolated() {
        let f = fixture_with(&["full", "buggy", "ok"], RecordingSink::default(), |temp| {
            Arc::new(FaultyStore {
                inner: FsBackupStore::new(temp.path()),
                refuse: "full",
                explode: "buggy",
            })
        });
        for device in ["full", "buggy", "ok"] {
            f.mock.set_output(device, CONFIG);
        }

        let summary = f.orchestrator.run_all(&NoProgress).unwrap();

        assert_eq!(summary.store_failed, 1);
        assert_eq!(summary.faulted, 1);
        assert_eq!(summary.succeeded, 1);
        let labels: Vec<(&str, &str)> = summary
            .reports
            .iter()
            .map(|r| (r.device.as_str(), r.outcome.label()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("buggy", "faulted"),
                ("full", "store failed"),
                ("ok", "first backup")
            ]
        );
        assert!(!f.orchestrator.executor().sessions().has_session("buggy"));
    }

    #[test]
    fn test_run_all_prunes_after_capturing() {
        let old = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let f = fixture(&["r1"]);
        let seeded = FsBackupStore::new(f.temp.path()).with_clock(move || old);
        seeded.append("r1", CONFIG).unwrap();
        seeded.append("gone", CONFIG).unwrap();
        f.mock.set_output("r1", CONFIG);

        let summary = f.orchestrator.run_all(&NoProgress).unwrap();

        assert_eq!(summary.pruned, 2);
        let history = f.orchestrator.store().history("r1").unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].timestamp > old);
        // the old record was still the diff baseline for this run
        assert_eq!(summary.first_backups, 0);
    }

    #[test]
    fn test_run_device_unknown_name() {
        let f = fixture(&["r1"]);
        assert!(f.orchestrator.run_device("nope", &NoProgress).is_err());
    }

    #[test]
    fn test_restore_pushes_filtered_lines() {
        let f = fixture(&["r1"]);
        let content = format!("Building configuration...\n\nCurrent configuration : 99 bytes\n{CONFIG}");
        let record = f.orchestrator.store().append("r1", &content).unwrap();

        let pushed = f.orchestrator.restore(&target("r1"), &record).unwrap();

        assert_eq!(pushed, 3);
        assert_eq!(
            f.mock.config_sets("r1"),
            vec![vec![
                "hostname r1".to_string(),
                "interface GigabitEthernet0/1".to_string(),
                "ip address 192.168.1.1 255.255.255.0".to_string(),
            ]]
        );
        assert_eq!(f.mock.commands("r1"), vec!["write memory"]);
    }

    #[test]
    fn test_summary_counts_changes() {
        let f = fixture(&["r1", "r2"]);
        f.mock.set_output("r1", CONFIG);
        f.mock.set_output("r2", CONFIG);
        f.orchestrator.run_all(&NoProgress).unwrap();

        f.mock.set_output("r1", format!("{CONFIG}\nntp server 10.0.0.1"));
        let summary = f.orchestrator.run_all(&NoProgress).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.first_backups, 0);
        assert!(summary.is_success());
    }
}
