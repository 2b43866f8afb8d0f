//! Connection manager: zero or one live session per device.
//!
//! Sessions live in per-device slots. Each slot has its own lock, so a slow
//! connect to one device never blocks another. The map of slots is only
//! locked long enough to find or create a slot.

use crate::error::{ConnectFailure, Error, Result};
use crate::retry::{BackoffPolicy, Sleeper, ThreadSleeper, with_retry};
use crate::transport::{Session, Transport};
use crate::types::DeviceDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Slot = Arc<Mutex<Option<Box<dyn Session>>>>;

/// Owns the device → session cache.
pub struct SessionManager {
    transport: Box<dyn Transport>,
    policy: BackoffPolicy,
    sleeper: Box<dyn Sleeper>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionManager {
    /// Create a manager that sleeps the current thread between attempts.
    pub fn new(transport: Box<dyn Transport>, policy: BackoffPolicy) -> Self {
        Self {
            transport,
            policy,
            sleeper: Box::new(ThreadSleeper),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the sleeper used for backoff delays.
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The connect retry policy.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Name of the underlying transport.
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    fn slot(&self, name: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    fn existing_slots(&self) -> Vec<(String, Slot)> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect()
    }

    /// Hold the device's lock for the duration of `f`.
    ///
    /// Everything `f` does through the [`DeviceLease`] (acquire, commands,
    /// release) is serialized against every other caller for the same
    /// device. Calling back into the manager for the same device from inside
    /// `f` deadlocks.
    pub fn with_device<R>(
        &self,
        device: &DeviceDescriptor,
        f: impl FnOnce(&mut DeviceLease<'_>) -> R,
    ) -> R {
        let slot = self.slot(&device.name);
        let mut guard = lock_slot(&slot);
        let mut lease = DeviceLease {
            manager: self,
            device,
            session: &mut guard,
        };
        f(&mut lease)
    }

    /// Make sure a live session for `device` is cached.
    pub fn acquire(&self, device: &DeviceDescriptor) -> Result<()> {
        self.with_device(device, |lease| lease.acquire().map(|_| ()))
    }

    /// Close and forget the session for `name`, if any.
    pub fn release(&self, name: &str) {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        if let Some(slot) = slot {
            close_slot(name, &mut lock_slot(&slot));
        }
    }

    /// Close every cached session.
    pub fn release_all(&self) {
        for (name, slot) in self.existing_slots() {
            close_slot(&name, &mut lock_slot(&slot));
        }
    }

    /// Whether a session for `name` is currently cached.
    pub fn has_session(&self, name: &str) -> bool {
        self.existing_slots()
            .into_iter()
            .find(|(slot_name, _)| slot_name == name)
            .is_some_and(|(_, slot)| lock_slot(&slot).is_some())
    }

    /// Names of devices with a cached session.
    pub fn live_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .existing_slots()
            .into_iter()
            .filter(|(_, slot)| lock_slot(slot).is_some())
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    /// Open a session, probe it, and retry per the backoff policy.
    fn connect(&self, device: &DeviceDescriptor) -> Result<Box<dyn Session>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let result = with_retry(&self.policy, self.sleeper.as_ref(), |attempt| {
            log::debug!(
                "[{}] connecting to {} via {} (attempt {}/{})",
                device.name,
                device.endpoint(),
                self.transport.name(),
                attempt,
                max_attempts
            );
            let mut session = self.transport.open(device)?;
            if let Err(e) = session.probe() {
                session.close();
                return Err(e);
            }
            Ok(session)
        });

        match result {
            Ok(session) => {
                log::info!("[{}] connected", device.name);
                Ok(session)
            }
            Err((e, _)) if !e.is_retryable() => {
                log::warn!("[{}] {}", device.name, e);
                Err(e)
            }
            Err((e, attempts)) => {
                let kind = if e.is_timeout() {
                    ConnectFailure::Timeout
                } else {
                    ConnectFailure::Transport
                };
                log::warn!(
                    "[{}] giving up after {} attempt(s): {}",
                    device.name,
                    attempts,
                    e
                );
                Err(Error::Connection {
                    device: device.name.clone(),
                    kind,
                    attempts,
                    message: e.to_string(),
                })
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Box<dyn Session>>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

fn close_slot(name: &str, slot: &mut Option<Box<dyn Session>>) {
    if let Some(mut session) = slot.take() {
        log::debug!("[{name}] closing session");
        session.close();
    }
}

/// Exclusive access to one device's session slot.
pub struct DeviceLease<'a> {
    manager: &'a SessionManager,
    device: &'a DeviceDescriptor,
    session: &'a mut Option<Box<dyn Session>>,
}

impl DeviceLease<'_> {
    /// Device this lease is for.
    pub fn device(&self) -> &DeviceDescriptor {
        self.device
    }

    /// Return a live session, connecting if needed.
    ///
    /// A cached session is probed first. If the probe fails the session is
    /// closed and a fresh one is opened, so callers never see a silently
    /// dead session.
    pub fn acquire(&mut self) -> Result<&mut Box<dyn Session>> {
        let session = match self.session.take() {
            Some(mut cached) => match cached.probe() {
                Ok(()) => cached,
                Err(e) => {
                    log::info!("[{}] cached session is stale: {}", self.device.name, e);
                    cached.close();
                    self.manager.connect(self.device)?
                }
            },
            None => self.manager.connect(self.device)?,
        };
        Ok(self.session.insert(session))
    }

    /// Close and forget the cached session.
    pub fn release(&mut self) {
        close_slot(&self.device.name, self.session);
    }

    /// Whether a session is cached.
    pub fn is_cached(&self) -> bool {
        self.session.is_some()
    }
}
