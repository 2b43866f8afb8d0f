//! Scripted transport for tests.
//!
//! Every device gets its own script: queued connect outcomes, probe
//! failures and command replies. Counters record what the session layer
//! actually did, so tests can assert attempt counts and teardown.
//! Optional delays make connects and commands slow, for tests that run
//! devices on several threads.

use crate::error::{Error, Result, TransportKind};
use crate::transport::{Session, Transport};
use crate::types::DeviceDescriptor;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Session opens and shows a prompt
    Accept,
    /// Credentials are rejected
    RejectAuth,
    /// Transport fails with a transient error
    Fail(TransportKind),
}

/// Scripted reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command prints this text
    Output(String),
    /// Session drops mid-command (transient)
    Drop(TransportKind),
    /// Command fails in a way reconnecting will not fix
    Fault(String),
}

#[derive(Debug, Default)]
struct Script {
    connects: VecDeque<ConnectOutcome>,
    sticky: Option<ConnectOutcome>,
    probe_failures: usize,
    replies: VecDeque<Reply>,
    output: String,
    connect_attempts: u32,
    probes: u32,
    commands: Vec<String>,
    config_sets: Vec<Vec<String>>,
    closed: u32,
    connect_delay: Duration,
    command_delay: Duration,
    in_flight: u32,
    max_in_flight: u32,
}

type Scripts = Arc<Mutex<HashMap<String, Script>>>;

/// Transport whose behavior is scripted per device name.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    scripts: Scripts,
}

impl MockTransport {
    /// Create a transport where every device connects and prints nothing.
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, device: &str) -> ScriptGuard<'_> {
        ScriptGuard {
            guard: lock(&self.scripts),
            device: device.to_string(),
        }
    }

    /// Output returned by every command without a queued reply.
    pub fn set_output(&self, device: &str, output: impl Into<String>) -> &Self {
        self.script(device).get().output = output.into();
        self
    }

    /// Queue outcomes for the next connect attempts.
    pub fn queue_connects(
        &self,
        device: &str,
        outcomes: impl IntoIterator<Item = ConnectOutcome>,
    ) -> &Self {
        self.script(device).get().connects.extend(outcomes);
        self
    }

    /// Every connect attempt without a queued outcome ends with `outcome`.
    pub fn always_connect(&self, device: &str, outcome: ConnectOutcome) -> &Self {
        self.script(device).get().sticky = Some(outcome);
        self
    }

    /// Fail the next `count` liveness probes.
    pub fn fail_probes(&self, device: &str, count: usize) -> &Self {
        self.script(device).get().probe_failures += count;
        self
    }

    /// Queue replies for the next commands.
    pub fn queue_replies(&self, device: &str, replies: impl IntoIterator<Item = Reply>) -> &Self {
        self.script(device).get().replies.extend(replies);
        self
    }

    /// Every connect attempt blocks for `delay` before its outcome.
    pub fn set_connect_delay(&self, device: &str, delay: Duration) -> &Self {
        self.script(device).get().connect_delay = delay;
        self
    }

    /// Every command blocks for `delay` before it replies.
    pub fn set_command_delay(&self, device: &str, delay: Duration) -> &Self {
        self.script(device).get().command_delay = delay;
        self
    }

    /// Most commands that were running on the device at the same time.
    pub fn max_in_flight(&self, device: &str) -> u32 {
        self.script(device).get().max_in_flight
    }

    /// Connect attempts made so far.
    pub fn connect_attempts(&self, device: &str) -> u32 {
        self.script(device).get().connect_attempts
    }

    /// Liveness probes run so far, including the one after each connect.
    pub fn probes(&self, device: &str) -> u32 {
        self.script(device).get().probes
    }

    /// Commands sent so far, in order.
    pub fn commands(&self, device: &str) -> Vec<String> {
        self.script(device).get().commands.clone()
    }

    /// Configuration sets pushed so far.
    pub fn config_sets(&self, device: &str) -> Vec<Vec<String>> {
        self.script(device).get().config_sets.clone()
    }

    /// Sessions closed so far.
    pub fn closed(&self, device: &str) -> u32 {
        self.script(device).get().closed
    }
}

fn lock(scripts: &Scripts) -> MutexGuard<'_, HashMap<String, Script>> {
    scripts.lock().unwrap_or_else(|e| e.into_inner())
}

struct ScriptGuard<'a> {
    guard: MutexGuard<'a, HashMap<String, Script>>,
    device: String,
}

impl ScriptGuard<'_> {
    fn get(&mut self) -> &mut Script {
        self.guard.entry(self.device.clone()).or_default()
    }
}

impl Transport for MockTransport {
    fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn Session>> {
        let (outcome, delay) = {
            let mut guard = self.script(&device.name);
            let script = guard.get();
            script.connect_attempts += 1;
            let outcome = script
                .connects
                .pop_front()
                .or_else(|| script.sticky.clone())
                .unwrap_or(ConnectOutcome::Accept);
            (outcome, script.connect_delay)
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        match outcome {
            ConnectOutcome::Accept => Ok(Box::new(MockSession {
                device: device.name.clone(),
                scripts: Arc::clone(&self.scripts),
                open: true,
            })),
            ConnectOutcome::RejectAuth => Err(Error::Authentication {
                device: device.name.clone(),
                message: "Permission denied".to_string(),
            }),
            ConnectOutcome::Fail(kind) => Err(Error::transient(
                &device.name,
                kind,
                format!("scripted {kind}"),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockSession {
    device: String,
    scripts: Scripts,
    open: bool,
}

impl MockSession {
    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut guard = lock(&self.scripts);
        f(guard.entry(self.device.clone()).or_default())
    }

    fn closed_error(&self, command: &str) -> Error {
        Error::Execution {
            device: self.device.clone(),
            command: command.to_string(),
            message: "session already closed".to_string(),
            transient: true,
        }
    }
}

impl Session for MockSession {
    fn send_command(&mut self, command: &str) -> Result<String> {
        if !self.open {
            return Err(self.closed_error(command));
        }
        let (reply, delay) = self.with_script(|script| {
            script.commands.push(command.to_string());
            script.in_flight += 1;
            script.max_in_flight = script.max_in_flight.max(script.in_flight);
            let reply = script
                .replies
                .pop_front()
                .unwrap_or_else(|| Reply::Output(script.output.clone()));
            (reply, script.command_delay)
        });
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.with_script(|script| script.in_flight -= 1);

        match reply {
            Reply::Output(text) => Ok(text),
            Reply::Drop(kind) => {
                self.open = false;
                Err(Error::Execution {
                    device: self.device.clone(),
                    command: command.to_string(),
                    message: kind.to_string(),
                    transient: true,
                })
            }
            Reply::Fault(message) => Err(Error::Execution {
                device: self.device.clone(),
                command: command.to_string(),
                message,
                transient: false,
            }),
        }
    }

    fn send_config_set(&mut self, lines: &[String]) -> Result<String> {
        if !self.open {
            return Err(self.closed_error("configure"));
        }
        self.with_script(|script| script.config_sets.push(lines.to_vec()));
        Ok(String::new())
    }

    fn probe(&mut self) -> Result<()> {
        let failed = self.with_script(|script| {
            script.probes += 1;
            if script.probe_failures > 0 {
                script.probe_failures -= 1;
                true
            } else {
                false
            }
        });
        if failed || !self.open {
            return Err(Error::ProbeFailed {
                device: self.device.clone(),
                message: "no prompt".to_string(),
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.with_script(|script| script.closed += 1);
    }
}
