//! Server configuration.

use hearth_core::MergeRules;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Poll timeout used when the device does not ask for one.
    pub default_poll_timeout: Duration,
    /// Shortest poll timeout honoured.
    pub min_poll_timeout: Duration,
    /// Longest poll timeout honoured.
    pub max_poll_timeout: Duration,
    /// How long a device counts as connected after its last poll.
    pub liveness_window: Duration,
    /// How often stale devices are swept.
    pub presence_sweep_interval: Duration,
    /// Merge rules applied by the object store.
    pub merge_rules: MergeRules,
}

impl ServerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            default_poll_timeout: Duration::from_secs(30),
            min_poll_timeout: Duration::from_secs(1),
            max_poll_timeout: Duration::from_secs(120),
            liveness_window: Duration::from_secs(90),
            presence_sweep_interval: Duration::from_secs(15),
            merge_rules: MergeRules::default(),
        }
    }

    /// Sets the default poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.default_poll_timeout = timeout;
        self
    }

    /// Sets the honoured poll timeout range.
    pub fn with_poll_timeout_range(mut self, min: Duration, max: Duration) -> Self {
        self.min_poll_timeout = min;
        self.max_poll_timeout = max;
        self
    }

    /// Sets the liveness window.
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Sets the presence sweep interval.
    pub fn with_presence_sweep_interval(mut self, interval: Duration) -> Self {
        self.presence_sweep_interval = interval;
        self
    }

    /// Sets the merge rules.
    pub fn with_merge_rules(mut self, rules: MergeRules) -> Self {
        self.merge_rules = rules;
        self
    }

    /// Resolves the timeout of a poll.
    pub fn poll_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let requested = requested_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_poll_timeout);
        requested.clamp(self.min_poll_timeout, self.max_poll_timeout.max(self.min_poll_timeout))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.default_poll_timeout, Duration::from_secs(30));
        assert_eq!(config.liveness_window, Duration::from_secs(90));
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_poll_timeout(Duration::from_secs(10))
            .with_liveness_window(Duration::from_secs(5))
            .with_presence_sweep_interval(Duration::from_secs(1));

        assert_eq!(config.default_poll_timeout, Duration::from_secs(10));
        assert_eq!(config.liveness_window, Duration::from_secs(5));
        assert_eq!(config.presence_sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn poll_timeout_is_clamped() {
        let config = ServerConfig::new()
            .with_poll_timeout_range(Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(config.poll_timeout(None), Duration::from_secs(30));
        assert_eq!(config.poll_timeout(Some(5_000)), Duration::from_secs(5));
        assert_eq!(config.poll_timeout(Some(10)), Duration::from_secs(1));
        assert_eq!(config.poll_timeout(Some(600_000)), Duration::from_secs(60));
    }
}
