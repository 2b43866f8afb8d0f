//! Command execution with one reconnect-and-retry.

use crate::error::Result;
use crate::manager::SessionManager;
use crate::types::{CommandOutput, DeviceDescriptor};

/// Most attempts a single [`CommandExecutor::execute`] call makes.
pub const MAX_EXECUTE_ATTEMPTS: u32 = 2;

/// Runs commands on devices through a [`SessionManager`].
pub struct CommandExecutor {
    sessions: SessionManager,
}

impl CommandExecutor {
    /// Create an executor over a session manager.
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }

    /// The underlying session manager.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run `command` on `device`.
    ///
    /// When the session drops mid-command (a transient error) and
    /// `allow_retry` is set, the cached session is discarded, a new one is
    /// acquired and the command is sent once more. Any error that is
    /// returned leaves no cached session behind. Empty output is a valid
    /// result.
    pub fn execute(
        &self,
        device: &DeviceDescriptor,
        command: &str,
        allow_retry: bool,
    ) -> Result<CommandOutput> {
        let max_attempts = if allow_retry { MAX_EXECUTE_ATTEMPTS } else { 1 };

        self.sessions.with_device(device, |lease| {
            let mut attempt = 1;
            loop {
                let result = lease
                    .acquire()
                    .and_then(|session| session.send_command(command));

                match result {
                    Ok(text) => {
                        if text.trim().is_empty() {
                            log::warn!("[{}] `{}` returned no output", device.name, command);
                        }
                        return Ok(CommandOutput::new(text));
                    }
                    Err(e) => {
                        lease.release();
                        if e.is_transient() && attempt < max_attempts {
                            log::info!(
                                "[{}] `{}` failed ({}), reconnecting",
                                device.name,
                                command,
                                e
                            );
                            attempt += 1;
                            continue;
                        }
                        return Err(e);
                    }
                }
            }
        })
    }

    /// Push configuration lines and save them.
    ///
    /// Never retried: replaying part of a configuration twice is not safe.
    /// Platforms that save from inside configuration mode (Junos `commit`)
    /// get the save command appended to the set; the others save after
    /// leaving configuration mode. On failure the session is discarded.
    pub fn push_config(&self, device: &DeviceDescriptor, lines: &[String]) -> Result<String> {
        let platform = device.platform;
        let save = platform.save_command();

        self.sessions.with_device(device, |lease| {
            let result = lease.acquire().and_then(|session| {
                if platform.saves_in_config_mode() {
                    let mut lines = lines.to_vec();
                    lines.push(save.to_string());
                    session.send_config_set(&lines)
                } else {
                    let mut transcript = session.send_config_set(lines)?;
                    let saved = session.send_command(save)?;
                    if !saved.is_empty() {
                        transcript.push('\n');
                        transcript.push_str(&saved);
                    }
                    Ok(transcript)
                }
            });

            match &result {
                Ok(_) => log::info!(
                    "[{}] pushed {} line(s) and ran `{}`",
                    device.name,
                    lines.len(),
                    save
                ),
                Err(e) => {
                    log::warn!("[{}] configuration push failed: {}", device.name, e);
                    lease.release();
                }
            }
            result
        })
    }

    /// Close every cached session.
    pub fn shutdown(&self) {
        self.sessions.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportKind};
    use crate::mock::{ConnectOutcome, MockTransport, Reply};
    use crate::platform::Platform;
    use crate::retry::{BackoffPolicy, RecordingSleeper};
    use crate::types::Credentials;
    use std::time::Duration;

    fn device(name: &str, platform: Platform) -> DeviceDescriptor {
        DeviceDescriptor::new(name, "192.0.2.10", Credentials::key("admin"), platform)
    }

    fn executor(mock: &MockTransport) -> CommandExecutor {
        let sessions = SessionManager::new(
            Box::new(mock.clone()),
            BackoffPolicy::linear(3, Duration::from_millis(5)),
        )
        .with_sleeper(Box::new(RecordingSleeper::new()));
        CommandExecutor::new(sessions)
    }

    #[test]
    fn test_execute_returns_output() {
        let mock = MockTransport::new();
        mock.set_output("r1", "hostname r1\nend");
        let exec = executor(&mock);

        let out = exec
            .execute(&device("r1", Platform::CiscoIos), "show running-config", true)
            .unwrap();
        assert_eq!(out.text, "hostname r1\nend");
        assert_eq!(mock.commands("r1"), vec!["show running-config"]);
        assert!(exec.sessions().has_session("r1"));
    }

    #[test]
    fn test_empty_output_is_not_an_error() {
        let mock = MockTransport::new();
        let exec = executor(&mock);
        let out = exec
            .execute(&device("r1", Platform::CiscoIos), "show running-config", true)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_transient_failure_reconnects_once() {
        let mock = MockTransport::new();
        mock.set_output("r1", "hostname r1");
        mock.queue_replies("r1", [Reply::Drop(TransportKind::Reset)]);
        let exec = executor(&mock);

        let out = exec
            .execute(&device("r1", Platform::CiscoIos), "show running-config", true)
            .unwrap();
        assert_eq!(out.text, "hostname r1");
        assert_eq!(mock.connect_attempts("r1"), 2);
        assert_eq!(mock.commands("r1").len(), 2);
    }

    #[test]
    fn test_two_failures_leave_no_cached_session() {
        let mock = MockTransport::new();
        mock.queue_replies(
            "r1",
            [
                Reply::Drop(TransportKind::Timeout),
                Reply::Drop(TransportKind::Closed),
                Reply::Output("never reached".into()),
            ],
        );
        let exec = executor(&mock);

        let err = exec
            .execute(&device("r1", Platform::CiscoIos), "show running-config", true)
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(mock.commands("r1").len(), 2);
        assert!(!exec.sessions().has_session("r1"));
    }

    #[test]
    fn test_non_transient_failure_is_not_retried() {
        let mock = MockTransport::new();
        mock.queue_replies("r1", [Reply::Fault("% Invalid input".into())]);
        let exec = executor(&mock);

        let err = exec
            .execute(&device("r1", Platform::CiscoIos), "show bogus", true)
            .unwrap_err();
        assert!(matches!(err, Error::Execution { transient: false, .. }));
        assert_eq!(mock.commands("r1").len(), 1);
        assert_eq!(mock.connect_attempts("r1"), 1);
        assert!(!exec.sessions().has_session("r1"));
    }

    #[test]
    fn test_retry_disabled() {
        let mock = MockTransport::new();
        mock.queue_replies("r1", [Reply::Drop(TransportKind::Reset)]);
        let exec = executor(&mock);

        assert!(
            exec.execute(&device("r1", Platform::CiscoIos), "show version", false)
                .is_err()
        );
        assert_eq!(mock.commands("r1").len(), 1);
    }

    #[test]
    fn test_connect_failure_is_not_retried_by_executor() {
        let mock = MockTransport::new();
        mock.always_connect("r1", ConnectOutcome::RejectAuth);
        let exec = executor(&mock);

        let err = exec
            .execute(&device("r1", Platform::CiscoIos), "show running-config", true)
            .unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert_eq!(mock.connect_attempts("r1"), 1);
        assert!(mock.commands("r1").is_empty());
    }

    #[test]
    fn test_commands_on_one_device_never_overlap() {
        let mock = MockTransport::new();
        mock.set_output("r1", "hostname r1");
        mock.set_command_delay("r1", Duration::from_millis(50));
        let exec = executor(&mock);
        let r1 = device("r1", Platform::CiscoIos);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let out = exec.execute(&r1, "show running-config", true).unwrap();
                    assert_eq!(out.text, "hostname r1");
                });
            }
        });

        assert_eq!(mock.commands("r1").len(), 4);
        assert_eq!(mock.max_in_flight("r1"), 1);
        assert_eq!(mock.connect_attempts("r1"), 1);
    }

    #[test]
    fn test_slow_device_does_not_block_others() {
        let mock = MockTransport::new();
        mock.set_connect_delay("slow", Duration::from_millis(500));
        mock.set_output("fast", "hostname fast");
        let exec = executor(&mock);
        let slow = device("slow", Platform::CiscoIos);
        let fast = device("fast", Platform::CiscoIos);

        let fast_elapsed = std::thread::scope(|s| {
            let slow_run = s.spawn(|| exec.execute(&slow, "show running-config", true));
            // Let the slow connect start and take its device lock first.
            std::thread::sleep(Duration::from_millis(50));
            let started = std::time::Instant::now();
            exec.execute(&fast, "show running-config", true).unwrap();
            let elapsed = started.elapsed();
            slow_run.join().unwrap().unwrap();
            elapsed
        });

        assert!(
            fast_elapsed < Duration::from_millis(400),
            "fast device waited {fast_elapsed:?}"
        );
    }

    #[test]
    fn test_push_config_saves_after_config_mode() {
        let mock = MockTransport::new();
        let exec = executor(&mock);
        let lines = vec!["hostname r1".to_string(), "ip domain-name lab".to_string()];

        exec.push_config(&device("r1", Platform::CiscoIos), &lines)
            .unwrap();
        assert_eq!(mock.config_sets("r1"), vec![lines]);
        assert_eq!(mock.commands("r1"), vec!["write memory"]);
    }

    #[test]
    fn test_push_config_commits_inside_config_mode() {
        let mock = MockTransport::new();
        let exec = executor(&mock);
        let lines = vec!["set system host-name mx1".to_string()];

        exec.push_config(&device("mx1", Platform::Juniper), &lines)
            .unwrap();
        assert_eq!(
            mock.config_sets("mx1"),
            vec![vec![
                "set system host-name mx1".to_string(),
                "commit".to_string()
            ]]
        );
        assert!(mock.commands("mx1").is_empty());
    }

    #[test]
    fn test_push_config_failure_is_not_retried() {
        let mock = MockTransport::new();
        mock.queue_replies("r1", [Reply::Drop(TransportKind::Reset)]);
        let exec = executor(&mock);

        let result = exec.push_config(&device("r1", Platform::Huawei), &["sysname r1".to_string()]);
        assert!(result.is_err());
        assert_eq!(mock.commands("r1"), vec!["save"]);
        assert_eq!(mock.connect_attempts("r1"), 1);
        assert!(!exec.sessions().has_session("r1"));
    }
}
