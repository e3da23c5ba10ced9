//! A recording integration for bus and server tests.

use async_trait::async_trait;
use hearth_protocol::ChangeEvent;
use hearth_server::{Integration, IntegrationError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// One callback seen by a [`RecordingIntegration`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// `on_device_state_change`.
    State(ChangeEvent),
    /// `on_device_connected`.
    Connected(String),
    /// `on_device_disconnected`.
    Disconnected(String),
}

/// Integration that records every callback it receives.
#[derive(Debug)]
pub struct RecordingIntegration {
    name: String,
    scope: Option<HashSet<String>>,
    fail_callbacks: bool,
    fail_initialize: bool,
    delay: Option<Duration>,
    panic_on_revision: Option<u64>,
    calls: Mutex<Vec<Recorded>>,
    changed: Notify,
    initialized: AtomicUsize,
    shut_down: AtomicBool,
}

impl RecordingIntegration {
    /// Creates an integration handling every device.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: None,
            fail_callbacks: false,
            fail_initialize: false,
            delay: None,
            panic_on_revision: None,
            calls: Mutex::new(Vec::new()),
            changed: Notify::new(),
            initialized: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Handles only the given serials.
    pub fn with_scope<I, S>(mut self, serials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Some(serials.into_iter().map(Into::into).collect());
        self
    }

    /// Records callbacks, then returns an error from each.
    pub fn failing(mut self) -> Self {
        self.fail_callbacks = true;
        self
    }

    /// Fails `initialize`.
    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Sleeps before recording each callback.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panics, without recording, on the state change with this revision.
    pub fn panicking_on_revision(mut self, revision: u64) -> Self {
        self.panic_on_revision = Some(revision);
        self
    }

    /// Everything recorded so far.
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().clone()
    }

    /// Recorded state changes.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Recorded::State(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Times `initialize` succeeded.
    pub fn initialize_count(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Returns true once `shutdown` ran.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` callbacks were recorded.
    ///
    /// # Panics
    ///
    /// Panics if they do not arrive within `timeout`.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> Vec<Recorded> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            {
                let calls = self.calls.lock();
                if calls.len() >= count {
                    return calls.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                panic!(
                    "{}: expected {count} calls, got {:?}",
                    self.name,
                    self.calls()
                );
            }
        }
    }

    async fn record(&self, call: Recorded) -> Result<(), IntegrationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(call);
        self.changed.notify_waiters();
        if self.fail_callbacks {
            Err(IntegrationError::Publish(format!("{} is failing", self.name)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Integration for RecordingIntegration {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles_device(&self, serial: &str) -> bool {
        self.scope
            .as_ref()
            .map_or(true, |scope| scope.contains(serial))
    }

    async fn initialize(&self) -> Result<(), IntegrationError> {
        if self.fail_initialize {
            return Err(IntegrationError::Connection(format!(
                "{} cannot connect",
                self.name
            )));
        }
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), IntegrationError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn on_device_state_change(&self, event: &ChangeEvent) -> Result<(), IntegrationError> {
        if self.panic_on_revision == Some(event.revision) {
            panic!("{} panicked on {} r{}", self.name, event.key, event.revision);
        }
        self.record(Recorded::State(event.clone())).await
    }

    async fn on_device_connected(&self, serial: &str) -> Result<(), IntegrationError> {
        self.record(Recorded::Connected(serial.to_string())).await
    }

    async fn on_device_disconnected(&self, serial: &str) -> Result<(), IntegrationError> {
        self.record(Recorded::Disconnected(serial.to_string())).await
    }
}
