//! Configuration for the executor.

use std::time::Duration;

/// Tunables for [`crate::executor::apply`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interval between ownership-lease heartbeat refreshes.
    pub heartbeat_interval: Duration,
    /// Capacity of the bounded, drop-on-full progress-event channel created
    /// by [`crate::events::ChannelEventSink::new`].
    pub event_channel_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            event_channel_capacity: 256,
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }
}

/// Builder for [`ExecutorConfig`].
#[derive(Debug, Default)]
pub struct ExecutorConfigBuilder {
    heartbeat_interval: Option<Duration>,
    event_channel_capacity: Option<usize>,
}

impl ExecutorConfigBuilder {
    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the progress-event channel capacity.
    #[must_use]
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = Some(capacity);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig {
            heartbeat_interval: self.heartbeat_interval.unwrap_or(defaults.heartbeat_interval),
            event_channel_capacity: self.event_channel_capacity.unwrap_or(defaults.event_channel_capacity),
        }
    }
}
