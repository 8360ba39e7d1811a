use crate::common::DEFAULT_TTL_MONITOR_INTERVAL;
use std::time::Duration;

/// Settings of the embedded [super::MemoryDriver].
#[derive(Clone, Debug)]
pub struct MemoryDriverConfig {
    require_auth: bool,
    ttl_monitor_interval: Option<Duration>,
}

impl MemoryDriverConfig {
    pub fn new() -> Self {
        MemoryDriverConfig {
            require_auth: false,
            ttl_monitor_interval: Some(DEFAULT_TTL_MONITOR_INTERVAL),
        }
    }

    /// Rejects connections that carry no credential.
    pub fn require_auth(mut self, require_auth: bool) -> Self {
        self.require_auth = require_auth;
        self
    }

    /// How often expired documents are swept. `None` disables the background
    /// sweep; [super::MemoryDriver::purge_expired] still works.
    pub fn ttl_monitor_interval(mut self, interval: Option<Duration>) -> Self {
        self.ttl_monitor_interval = interval;
        self
    }

    pub fn is_auth_required(&self) -> bool {
        self.require_auth
    }

    pub fn monitor_interval(&self) -> Option<Duration> {
        self.ttl_monitor_interval
    }
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        MemoryDriverConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MemoryDriverConfig::default();
        assert!(!config.is_auth_required());
        assert_eq!(config.monitor_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn builder_style_setters() {
        let config = MemoryDriverConfig::new()
            .require_auth(true)
            .ttl_monitor_interval(None);
        assert!(config.is_auth_required());
        assert_eq!(config.monitor_interval(), None);
    }
}
