//! Configuration for a dual-storage collection.

use dualstore_core::DEFAULT_REMOTE_ID_ATTRIBUTE;
use std::time::Duration;

/// Default time allowed for one remote dispatch.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the bootstrap event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base route of the remote collection (e.g. `/api/todos`).
    pub url: String,
    /// Payload field holding the remote id.
    pub remote_id_attribute: String,
    /// Upper bound on a single remote call. `None` waits forever.
    pub dispatch_timeout: Option<Duration>,
    /// Buffered events per bootstrap subscriber.
    pub event_capacity: usize,
    /// Object key wrapping the array returned by `read`, if any.
    pub response_envelope: Option<String>,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            remote_id_attribute: DEFAULT_REMOTE_ID_ATTRIBUTE.to_string(),
            dispatch_timeout: Some(DEFAULT_DISPATCH_TIMEOUT),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            response_envelope: None,
        }
    }

    /// Sets the payload field holding the remote id.
    pub fn with_remote_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.remote_id_attribute = attribute.into();
        self
    }

    /// Sets the dispatch timeout.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    /// Disables the dispatch timeout.
    pub fn without_dispatch_timeout(mut self) -> Self {
        self.dispatch_timeout = None;
        self
    }

    /// Sets the event channel capacity. Zero is raised to one.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Sets the key that wraps collection responses, e.g. `results`.
    pub fn with_response_envelope(mut self, key: impl Into<String>) -> Self {
        self.response_envelope = Some(key.into());
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("/api/todos")
            .with_remote_id_attribute("_id")
            .with_dispatch_timeout(Duration::from_secs(5))
            .with_event_capacity(8)
            .with_response_envelope("results");

        assert_eq!(config.url, "/api/todos");
        assert_eq!(config.remote_id_attribute, "_id");
        assert_eq!(config.dispatch_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.event_capacity, 8);
        assert_eq!(config.response_envelope.as_deref(), Some("results"));
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.remote_id_attribute, "id");
        assert_eq!(config.dispatch_timeout, Some(DEFAULT_DISPATCH_TIMEOUT));
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.response_envelope.is_none());
    }

    #[test]
    fn timeout_can_be_disabled() {
        let config = SyncConfig::new("/todos").without_dispatch_timeout();
        assert!(config.dispatch_timeout.is_none());
    }

    #[test]
    fn zero_capacity_is_raised() {
        assert_eq!(SyncConfig::new("/todos").with_event_capacity(0).event_capacity, 1);
    }
}
