//! Realtime event subsystem configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Controls the change watcher, heartbeat loop and broadcast bus.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Master switch; when off the coordinator starts nothing
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tail the data collections change feed
    #[serde(default)]
    pub change_feed_enabled: bool,

    /// Seconds between heartbeats to every connection
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds to wait before reopening a failed change feed
    #[serde(default = "default_watcher_retry_delay")]
    pub watcher_retry_delay_secs: u64,

    /// Upper bound in seconds on one wait for an inbound client frame
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Prefix of per-dashboard pub/sub channels
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Outbound messages buffered per connection before it counts as dead
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
}

impl EventsConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn watcher_retry_delay(&self) -> Duration {
        Duration::from_secs(self.watcher_retry_delay_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Validate event configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("events.heartbeat_interval_secs"));
        }
        if self.watcher_retry_delay_secs == 0 {
            return Err(ValidationError::InvalidInterval("events.watcher_retry_delay_secs"));
        }
        if self.read_timeout_secs == 0 {
            return Err(ValidationError::InvalidInterval("events.read_timeout_secs"));
        }
        if self.channel_prefix.is_empty()
            || self.channel_prefix.contains(['*', '?', '[', ']'])
        {
            return Err(ValidationError::InvalidChannelPrefix);
        }
        if self.client_queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            change_feed_enabled: false,
            heartbeat_interval_secs: default_heartbeat_interval(),
            watcher_retry_delay_secs: default_watcher_retry_delay(),
            read_timeout_secs: default_read_timeout(),
            channel_prefix: default_channel_prefix(),
            client_queue_capacity: default_client_queue_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_watcher_retry_delay() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    1
}

fn default_channel_prefix() -> String {
    "dashboard_events:".to_string()
}

fn default_client_queue_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_config_defaults() {
        let config = EventsConfig::default();
        assert!(config.enabled);
        assert!(!config.change_feed_enabled);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.watcher_retry_delay(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.channel_prefix, "dashboard_events:");
        assert_eq!(config.client_queue_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = EventsConfig {
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidInterval("events.heartbeat_interval_secs"))
        );
    }

    #[test]
    fn test_glob_in_channel_prefix_rejected() {
        let config = EventsConfig {
            channel_prefix: "dashboard_*".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidChannelPrefix));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let config = EventsConfig {
            client_queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidQueueCapacity));
    }
}
