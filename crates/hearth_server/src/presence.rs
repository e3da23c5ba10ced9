//! Device connectivity derived from poll activity.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// A connectivity transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    /// The device started talking to the server.
    Connected(String),
    /// The device has been silent for longer than the liveness window.
    Disconnected(String),
}

impl PresenceChange {
    /// Serial of the device.
    pub fn serial(&self) -> &str {
        match self {
            PresenceChange::Connected(serial) | PresenceChange::Disconnected(serial) => serial,
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    active_polls: usize,
    last_seen: Instant,
}

/// Tracks which devices are connected.
///
/// A device is connected while it holds an active poll or has polled within
/// the liveness window. Transitions are sent on the channel returned by
/// [`PresenceTracker::new`], in the order they happen.
#[derive(Debug)]
pub struct PresenceTracker {
    window: Duration,
    devices: Mutex<HashMap<String, DeviceState>>,
    changes: mpsc::UnboundedSender<PresenceChange>,
}

impl PresenceTracker {
    /// Creates a tracker and the receiving end of its transitions.
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<PresenceChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            window,
            devices: Mutex::new(HashMap::new()),
            changes,
        };
        (tracker, rx)
    }

    /// Liveness window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records the start of a poll.
    pub fn poll_started(&self, serial: &str) {
        let mut devices = self.devices.lock();
        let state = self.seen(&mut devices, serial);
        state.active_polls += 1;
    }

    /// Records the end of a poll.
    pub fn poll_finished(&self, serial: &str) {
        let mut devices = self.devices.lock();
        if let Some(state) = devices.get_mut(serial) {
            state.active_polls = state.active_polls.saturating_sub(1);
            state.last_seen = Instant::now();
        }
    }

    /// Records any other device activity, such as a write.
    pub fn touch(&self, serial: &str) {
        let mut devices = self.devices.lock();
        self.seen(&mut devices, serial);
    }

    /// Disconnects devices idle for longer than the window as of `now`.
    ///
    /// Returns the serials that were disconnected.
    pub fn sweep(&self, now: Instant) -> Vec<String> {
        let mut devices = self.devices.lock();
        let stale: Vec<String> = devices
            .iter()
            .filter(|(_, state)| {
                state.active_polls == 0 && now.saturating_duration_since(state.last_seen) > self.window
            })
            .map(|(serial, _)| serial.clone())
            .collect();

        for serial in &stale {
            devices.remove(serial);
            debug!(serial = %serial, "device disconnected");
            let _ = self.changes.send(PresenceChange::Disconnected(serial.clone()));
        }
        stale
    }

    /// Returns true if the device is connected.
    pub fn is_connected(&self, serial: &str) -> bool {
        self.devices.lock().contains_key(serial)
    }

    /// Number of connected devices.
    pub fn connected_count(&self) -> usize {
        self.devices.lock().len()
    }

    fn seen<'a>(
        &self,
        devices: &'a mut HashMap<String, DeviceState>,
        serial: &str,
    ) -> &'a mut DeviceState {
        let now = Instant::now();
        let state = devices.entry(serial.to_string()).or_insert_with(|| {
            debug!(serial = %serial, "device connected");
            let _ = self.changes.send(PresenceChange::Connected(serial.to_string()));
            DeviceState {
                active_polls: 0,
                last_seen: now,
            }
        });
        state.last_seen = now;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_connects_once() {
        let (tracker, mut rx) = PresenceTracker::new(Duration::from_secs(90));
        tracker.poll_started("A");
        tracker.poll_finished("A");
        tracker.poll_started("A");

        assert_eq!(rx.try_recv().unwrap(), PresenceChange::Connected("A".into()));
        assert!(rx.try_recv().is_err());
        assert!(tracker.is_connected("A"));
    }

    #[test]
    fn active_poll_is_never_swept() {
        let (tracker, mut rx) = PresenceTracker::new(Duration::from_millis(10));
        tracker.poll_started("A");
        rx.try_recv().unwrap();

        let later = Instant::now() + Duration::from_secs(60);
        assert!(tracker.sweep(later).is_empty());
        assert!(tracker.is_connected("A"));
    }

    #[test]
    fn idle_device_is_swept_after_window() {
        let (tracker, mut rx) = PresenceTracker::new(Duration::from_secs(90));
        tracker.poll_started("A");
        tracker.poll_finished("A");
        rx.try_recv().unwrap();

        assert!(tracker.sweep(Instant::now()).is_empty());

        let later = Instant::now() + Duration::from_secs(91);
        assert_eq!(tracker.sweep(later), vec!["A".to_string()]);
        assert_eq!(rx.try_recv().unwrap(), PresenceChange::Disconnected("A".into()));
        assert!(!tracker.is_connected("A"));
        assert_eq!(tracker.connected_count(), 0);
    }

    #[test]
    fn reconnect_after_sweep() {
        let (tracker, mut rx) = PresenceTracker::new(Duration::ZERO);
        tracker.touch("A");
        tracker.sweep(Instant::now() + Duration::from_secs(1));
        tracker.touch("A");

        let changes: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            changes,
            vec![
                PresenceChange::Connected("A".into()),
                PresenceChange::Disconnected("A".into()),
                PresenceChange::Connected("A".into()),
            ]
        );
    }

    #[test]
    fn poll_finished_for_unknown_device_is_ignored() {
        let (tracker, mut rx) = PresenceTracker::new(Duration::from_secs(1));
        tracker.poll_finished("ghost");
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.connected_count(), 0);
    }
}
