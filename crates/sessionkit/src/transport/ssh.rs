//! Transport backed by the system `ssh` client.
//!
//! Each session is one `ssh -tt` child process. Its stdout is read on a
//! background thread and forwarded over a channel, so every read can be
//! bounded by a timeout. Password logins are wrapped in `sshpass -e`.

use crate::error::{Error, Result, TransportKind};
use crate::platform::Platform;
use crate::transport::{Session, Transport};
use crate::types::DeviceDescriptor;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// sshpass exit code for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// Settings shared by every session opened through [`SshTransport`].
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Time allowed from spawn to the first prompt
    pub connect_timeout: Duration,
    /// Time allowed for one command to return to the prompt
    pub command_timeout: Duration,
    /// Time allowed for a liveness probe
    pub probe_timeout: Duration,
    /// Extra `-o` options passed to ssh
    pub ssh_options: Vec<String>,
    /// ssh executable
    pub ssh_program: String,
    /// sshpass executable, used for password logins
    pub sshpass_program: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            ssh_options: Vec::new(),
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        }
    }
}

/// Transport that spawns the system ssh client.
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    settings: SshSettings,
}

impl SshTransport {
    /// Create a transport with the given settings.
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    /// Settings in use.
    pub fn settings(&self) -> &SshSettings {
        &self.settings
    }

    fn command_for(&self, device: &DeviceDescriptor) -> Command {
        let args = ssh_args(&self.settings, device);
        let mut cmd = match &device.credentials.password {
            Some(password) => {
                let mut cmd = Command::new(&self.settings.sshpass_program);
                cmd.arg("-e").arg(&self.settings.ssh_program);
                cmd.env("SSHPASS", password);
                cmd
            }
            None => Command::new(&self.settings.ssh_program),
        };
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Transport for SshTransport {
    fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn Session>> {
        log::debug!("[{}] spawning ssh to {}", device.name, device.endpoint());

        let mut child = self.command_for(device).spawn().map_err(|e| {
            let program = if device.credentials.password.is_some() {
                &self.settings.sshpass_program
            } else {
                &self.settings.ssh_program
            };
            if e.kind() == io::ErrorKind::NotFound {
                Error::Config(format!("{program} not found in PATH"))
            } else {
                Error::Config(format!("failed to spawn {program}: {e}"))
            }
        })?;

        let (stdin, output, stderr) = match take_pipes(&mut child) {
            Some(pipes) => pipes,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Config("ssh child has no stdio pipes".to_string()));
            }
        };

        let mut session = SshSession {
            device: device.name.clone(),
            platform: device.platform,
            child,
            stdin,
            output,
            stderr: Some(stderr),
            buffer: String::new(),
            prompt_stem: None,
            command_timeout: self.settings.command_timeout,
            probe_timeout: self.settings.probe_timeout,
        };

        session.wait_for_login(self.settings.connect_timeout)?;

        if let Some(pager) = device.platform.pager_command() {
            session.send_command(pager)?;
        }

        Ok(Box::new(session))
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}

fn take_pipes(
    child: &mut Child,
) -> Option<(ChildStdin, Receiver<String>, JoinHandle<String>)> {
    let stdin = child.stdin.take()?;
    let mut stdout = child.stdout.take()?;
    let mut stderr = child.stderr.take()?;

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match stdout.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx
                        .send(String::from_utf8_lossy(&chunk[..n]).into_owned())
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });

    let stderr_handle = thread::spawn(move || {
        let mut text = String::new();
        let _ = stderr.read_to_string(&mut text);
        text
    });

    Some((stdin, rx, stderr_handle))
}

/// Build the ssh argument list for a device.
fn ssh_args(settings: &SshSettings, device: &DeviceDescriptor) -> Vec<String> {
    let mut args = vec![
        "-tt".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", settings.connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
        "-p".to_string(),
        device.port.to_string(),
        "-l".to_string(),
        device.credentials.username.clone(),
    ];

    if device.credentials.password.is_none() {
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
    } else {
        args.push("-o".to_string());
        args.push("PubkeyAuthentication=no".to_string());
    }

    if let Some(identity) = &device.credentials.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }

    for option in &settings.ssh_options {
        args.push("-o".to_string());
        args.push(option.clone());
    }

    args.push(device.address.clone());
    args
}

/// Why a read stopped before a prompt appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStop {
    TimedOut,
    Closed,
}

/// A live `ssh -tt` session.
struct SshSession {
    device: String,
    platform: Platform,
    child: Child,
    stdin: ChildStdin,
    output: Receiver<String>,
    stderr: Option<JoinHandle<String>>,
    buffer: String,
    prompt_stem: Option<String>,
    command_timeout: Duration,
    probe_timeout: Duration,
}

impl SshSession {
    /// Read past the login banner to the first prompt that names the host,
    /// and remember that host for later prompt matching.
    fn wait_for_login(&mut self, timeout: Duration) -> Result<()> {
        match self.read_until_prompt(timeout) {
            Ok(banner) => {
                self.prompt_stem = last_line(&banner)
                    .and_then(|line| prompt_host(line, self.platform.prompt_terminators()));
                log::debug!(
                    "[{}] logged in, prompt stem {:?}",
                    self.device,
                    self.prompt_stem
                );
                Ok(())
            }
            Err(ReadStop::TimedOut) => {
                self.terminate();
                Err(Error::transient(
                    &self.device,
                    TransportKind::Timeout,
                    format!("no prompt within {}s", timeout.as_secs()),
                ))
            }
            Err(ReadStop::Closed) => {
                let code = self.child.wait().ok().and_then(|s| s.code());
                let stderr = self.collect_stderr();
                Err(classify_failure(&self.device, &stderr, code))
            }
        }
    }

    /// Discard output left over from an earlier exchange.
    fn drain(&mut self) {
        self.buffer.clear();
        loop {
            match self.output.try_recv() {
                Ok(chunk) => {
                    log::trace!("[{}] discarding {} stale bytes", self.device, chunk.len());
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()
    }

    /// Read until the buffered output ends in a prompt, then drain and return it.
    fn read_until_prompt(&mut self, timeout: Duration) -> std::result::Result<String, ReadStop> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.at_prompt() {
                return Ok(std::mem::take(&mut self.buffer));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReadStop::TimedOut);
            }
            match self.output.recv_timeout(remaining) {
                Ok(chunk) => self.buffer.push_str(&chunk),
                Err(RecvTimeoutError::Timeout) => return Err(ReadStop::TimedOut),
                Err(RecvTimeoutError::Disconnected) => return Err(ReadStop::Closed),
            }
        }
    }

    fn at_prompt(&self) -> bool {
        let Some(host) = last_line(&self.buffer)
            .and_then(|line| prompt_host(line, self.platform.prompt_terminators()))
        else {
            return false;
        };
        match &self.prompt_stem {
            Some(stem) => matches_stem(&host, stem),
            None => true,
        }
    }

    fn execution_error(&self, command: &str, stop: ReadStop) -> Error {
        let message = match stop {
            ReadStop::TimedOut => format!(
                "no prompt within {}s",
                self.command_timeout.as_secs()
            ),
            ReadStop::Closed => "session closed".to_string(),
        };
        Error::Execution {
            device: self.device.clone(),
            command: command.to_string(),
            message,
            transient: true,
        }
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn terminate(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Session for SshSession {
    fn send_command(&mut self, command: &str) -> Result<String> {
        log::trace!("[{}] > {}", self.device, command);
        self.drain();
        if let Err(e) = self.write_line(command) {
            return Err(Error::Execution {
                device: self.device.clone(),
                command: command.to_string(),
                message: e.to_string(),
                transient: true,
            });
        }
        let raw = self
            .read_until_prompt(self.command_timeout)
            .map_err(|stop| self.execution_error(command, stop))?;
        Ok(clean_output(&raw, command))
    }

    fn send_config_set(&mut self, lines: &[String]) -> Result<String> {
        let mut transcript = String::new();
        let enter = self.platform.config_enter();
        transcript.push_str(&self.send_command(enter)?);

        for line in lines {
            let output = self.send_command(line)?;
            if let Some(rejection) = rejected_line(&output) {
                let _ = self.send_command(self.platform.config_exit());
                return Err(Error::Execution {
                    device: self.device.clone(),
                    command: line.clone(),
                    message: rejection.to_string(),
                    transient: false,
                });
            }
            if !output.is_empty() {
                transcript.push('\n');
                transcript.push_str(&output);
            }
        }

        let exit = self.platform.config_exit();
        transcript.push_str(&self.send_command(exit)?);
        Ok(transcript)
    }

    fn probe(&mut self) -> Result<()> {
        self.drain();
        if let Err(e) = self.write_line("") {
            return Err(Error::ProbeFailed {
                device: self.device.clone(),
                message: e.to_string(),
            });
        }
        self.read_until_prompt(self.probe_timeout)
            .map(|_| ())
            .map_err(|stop| Error::ProbeFailed {
                device: self.device.clone(),
                message: match stop {
                    ReadStop::TimedOut => "no prompt".to_string(),
                    ReadStop::Closed => "session closed".to_string(),
                },
            })
    }

    fn close(&mut self) {
        let _ = self.write_line("exit");
        self.terminate();
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Last non-empty line of `text`, without carriage returns.
fn last_line(text: &str) -> Option<&str> {
    text.rsplit('\n')
        .map(|line| line.trim_end_matches('\r'))
        .find(|line| !line.trim().is_empty())
}

/// Host part of a CLI prompt, or `None` when `line` is not a prompt.
///
/// `core-sw1(config-if)#` → `core-sw1`, `<HW1>` → `HW1`, `[~HW1-Vlanif10]` →
/// `HW1-Vlanif10`. A prompt needs a host without whitespace in front of its
/// terminator, so banner rules like `#####` and sentences ending in `#` are
/// rejected.
fn prompt_host(line: &str, terminators: &[char]) -> Option<String> {
    let line = line.trim();
    if !line.ends_with(terminators) {
        return None;
    }
    let host = line
        .trim_end_matches(terminators)
        .trim_start_matches(['<', '['])
        .trim_start_matches(['~', '*']);
    let host = host.find('(').map_or(host, |end| &host[..end]);
    if host.is_empty()
        || host.contains(char::is_whitespace)
        || !host.chars().any(char::is_alphanumeric)
    {
        return None;
    }
    Some(host.to_string())
}

/// Whether a prompt host belongs to the device whose login prompt was `stem`.
///
/// Huawei views append `-<view>` to the host (`[HW1-Vlanif10]`), so the stem
/// may be followed by `-`, but never by more hostname characters: `core-sw10`
/// does not match `core-sw1`.
fn matches_stem(host: &str, stem: &str) -> bool {
    match host.strip_prefix(stem) {
        Some(rest) => rest.is_empty() || rest.starts_with('-'),
        None => false,
    }
}

/// Remove the command echo, the trailing prompt and carriage returns.
fn clean_output(raw: &str, command: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "");
    let mut lines: Vec<&str> = normalized.lines().collect();

    if lines
        .first()
        .is_some_and(|first| !command.is_empty() && first.trim_end().ends_with(command.trim()))
    {
        lines.remove(0);
    }
    while lines.last().is_some_and(|last| last.trim().is_empty()) {
        lines.pop();
    }
    lines.pop();

    lines.join("\n")
}

/// First line of device output that reports a rejected configuration line.
fn rejected_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| {
        line.starts_with("% Invalid")
            || line.starts_with("% Incomplete")
            || line.starts_with("% Ambiguous")
            || line.starts_with("Error:")
    })
}

/// Classify a session that ended before the first prompt.
///
/// The error category is decided here, once, from what ssh printed.
fn classify_failure(device: &str, stderr: &str, exit_code: Option<i32>) -> Error {
    let lower = stderr.to_lowercase();
    let message = stderr
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("session closed (exit code {code})"),
            None => "session closed".to_string(),
        });

    if exit_code == Some(SSHPASS_BAD_PASSWORD)
        || lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
    {
        return Error::Authentication {
            device: device.to_string(),
            message,
        };
    }

    if lower.contains("host key verification failed") {
        return Error::Config(format!("[{device}] {message}"));
    }

    let kind = if lower.contains("connection refused") {
        TransportKind::Refused
    } else if lower.contains("timed out") {
        TransportKind::Timeout
    } else if lower.contains("connection reset") {
        TransportKind::Reset
    } else if lower.contains("could not resolve")
        || lower.contains("name or service not known")
        || lower.contains("no route to host")
        || lower.contains("network is unreachable")
    {
        TransportKind::Unreachable
    } else {
        TransportKind::Closed
    };

    Error::transient(device, kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credentials;
    use std::path::PathBuf;

    fn device(password: Option<&str>) -> DeviceDescriptor {
        let mut credentials = Credentials::key("netops");
        credentials.password = password.map(str::to_string);
        let mut device =
            DeviceDescriptor::new("core-sw1", "10.1.1.1", credentials, Platform::CiscoIos);
        device.port = 2222;
        device
    }

    #[test]
    fn test_ssh_args_key_login() {
        let mut d = device(None);
        d.credentials.identity_file = Some(PathBuf::from("/keys/id_ed25519"));
        let settings = SshSettings {
            ssh_options: vec!["StrictHostKeyChecking=accept-new".to_string()],
            ..SshSettings::default()
        };
        let args = ssh_args(&settings, &d);

        assert_eq!(args[0], "-tt");
        assert!(args.contains(&"ConnectTimeout=30".to_string()));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.windows(2).any(|w| w == ["-l", "netops"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_ed25519"]));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("10.1.1.1"));
    }

    #[test]
    fn test_ssh_args_password_login_disables_batch_mode() {
        let args = ssh_args(&SshSettings::default(), &device(Some("secret")));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
        assert!(!args.iter().any(|a| a.contains("secret")));
    }

    #[test]
    fn test_classify_permission_denied() {
        let err = classify_failure(
            "r1",
            "netops@10.1.1.1: Permission denied (publickey,password).\n",
            Some(255),
        );
        assert!(matches!(err, Error::Authentication { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_sshpass_bad_password() {
        let err = classify_failure("r1", "", Some(SSHPASS_BAD_PASSWORD));
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[test]
    fn test_classify_transient_failures() {
        let cases = [
            ("ssh: connect to host 10.1.1.1 port 22: Connection refused", TransportKind::Refused),
            ("ssh: connect to host 10.1.1.1 port 22: Connection timed out", TransportKind::Timeout),
            ("Connection reset by 10.1.1.1 port 22", TransportKind::Reset),
            ("ssh: Could not resolve hostname r9: Name or service not known", TransportKind::Unreachable),
            ("", TransportKind::Closed),
        ];
        for (stderr, expected) in cases {
            match classify_failure("r1", stderr, Some(255)) {
                Error::Transport {
                    kind, transient, ..
                } => {
                    assert_eq!(kind, expected, "stderr: {stderr}");
                    assert!(transient);
                }
                other => panic!("unexpected error for {stderr:?}: {other}"),
            }
        }
    }

    #[test]
    fn test_classify_host_key_failure_is_configuration() {
        let err = classify_failure("r1", "Host key verification failed.", Some(255));
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_prompt_host() {
        let cisco = Platform::CiscoIos.prompt_terminators();
        assert_eq!(prompt_host("core-sw1#", cisco).as_deref(), Some("core-sw1"));
        assert_eq!(prompt_host("core-sw1> ", cisco).as_deref(), Some("core-sw1"));
        assert_eq!(prompt_host("r1(config-if)#", cisco).as_deref(), Some("r1"));
        assert_eq!(prompt_host(" ip address 10.0.0.1 255.255.255.0", cisco), None);

        let huawei = Platform::Huawei.prompt_terminators();
        assert_eq!(prompt_host("<HW1>", huawei).as_deref(), Some("HW1"));
        assert_eq!(
            prompt_host("[~HW1-Vlanif10]", huawei).as_deref(),
            Some("HW1-Vlanif10")
        );

        let juniper = Platform::Juniper.prompt_terminators();
        assert_eq!(
            prompt_host("backup@mx1> ", juniper).as_deref(),
            Some("backup@mx1")
        );
    }

    #[test]
    fn test_banner_lines_are_not_prompts() {
        let cisco = Platform::CiscoIos.prompt_terminators();
        assert_eq!(prompt_host("#################", cisco), None);
        assert_eq!(prompt_host("#### Authorized access only ####", cisco), None);
        assert_eq!(prompt_host("  description uplink to core #", cisco), None);
        assert_eq!(prompt_host("-->", cisco), None);
    }

    #[test]
    fn test_matches_stem_uses_full_hostname() {
        assert!(matches_stem("core-sw1", "core-sw1"));
        assert!(matches_stem("HW1-Vlanif10", "HW1"));
        assert!(!matches_stem("core-sw10", "core-sw1"));
        assert!(!matches_stem("core", "core-sw1"));
        assert!(!matches_stem("core-sw2", "core-sw1"));
    }

    /// Stand-in for `ssh` that prints a `#` rule banner, pauses, then logs
    /// in as `r1` and answers commands like an IOS exec prompt.
    #[cfg(unix)]
    const SCRIPTED_DEVICE: &str = r#"#!/bin/sh
printf '#################\r\n'
sleep 0.3
printf 'Authorized access only\r\nr1#'
while IFS= read -r line; do
  case "$line" in
    "show running-config")
      printf '%s\r\nhostname r1\r\ninterface Gi0/1\r\n ip address 10.0.0.1 255.255.255.0\r\nend\r\nr1#' "$line" ;;
    exit) exit 0 ;;
    *) printf '%s\r\nr1#' "$line" ;;
  esac
done
"#;

    #[cfg(unix)]
    #[test]
    fn test_session_reads_past_rule_banner() {
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        let temp = TempDir::new().unwrap();
        let script = temp.path().join("fake-ssh");
        std::fs::write(&script, SCRIPTED_DEVICE).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transport = SshTransport::new(SshSettings {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            ssh_program: script.display().to_string(),
            ..SshSettings::default()
        });
        let d = DeviceDescriptor::new(
            "r1",
            "10.0.0.1",
            Credentials::key("netops"),
            Platform::CiscoIos,
        );

        let mut session = transport.open(&d).unwrap();
        for _ in 0..3 {
            session.probe().unwrap();
            let config = session.send_command("show running-config").unwrap();
            assert_eq!(
                config,
                "hostname r1\ninterface Gi0/1\n ip address 10.0.0.1 255.255.255.0\nend"
            );
        }
        session.close();
    }

    #[test]
    fn test_last_line_skips_blank_tail() {
        assert_eq!(last_line("banner\r\nr1#\r\n\r\n"), Some("r1#"));
        assert_eq!(last_line("\n\n"), None);
    }

    #[test]
    fn test_clean_output_strips_echo_and_prompt() {
        let raw = "show running-config\r\nhostname r1\r\n!\r\nend\r\nr1#";
        assert_eq!(
            clean_output(raw, "show running-config"),
            "hostname r1\n!\nend"
        );
    }

    #[test]
    fn test_clean_output_empty_result() {
        assert_eq!(clean_output("terminal length 0\r\nr1#", "terminal length 0"), "");
    }

    #[test]
    fn test_rejected_line() {
        let output = "        ^\n% Invalid input detected at '^' marker.";
        assert_eq!(
            rejected_line(output),
            Some("% Invalid input detected at '^' marker.")
        );
        assert_eq!(rejected_line("r1(config-if)#"), None);
    }
}
