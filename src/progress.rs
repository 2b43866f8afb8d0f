//! Progress indicators for netkeep CLI.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::engine::{DeviceReport, RunProgress};

/// Progress bar over `len` devices.
///
/// Hidden when `quiet` is set so log output stays readable in cron jobs.
pub fn device_bar(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::hidden());
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// [`RunProgress`] drawn as a device progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: device_bar(0, quiet),
        }
    }
}

impl RunProgress for BarProgress {
    fn on_run_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message("backing up");
    }

    fn on_device_complete(&self, report: &DeviceReport) {
        self.bar.inc(1);
        self.bar
            .set_message(format!("{}: {}", report.device, report.outcome.label()));
    }

    fn on_run_complete(&self) {
        self.bar.finish_and_clear();
    }
}
