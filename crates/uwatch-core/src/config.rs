//! Supervisor configuration

use std::time::Duration;

use crate::launch::Role;

/// Default interval between parent liveness checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default grace period between the soft and the hard kill
pub const DEFAULT_DEATH_TIMEOUT: Duration = Duration::from_millis(1000);

/// Supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Orphan detection interval; zero disables polling
    pub poll_interval: Duration,

    /// Grace period after the soft kill; zero waits indefinitely
    pub death_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            death_timeout: DEFAULT_DEATH_TIMEOUT,
        }
    }
}

impl WatchConfig {
    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the death timeout
    pub fn with_death_timeout(mut self, timeout: Duration) -> Self {
        self.death_timeout = timeout;
        self
    }

    /// Effective configuration for an instance running in `role`.
    ///
    /// The outer instance never escalates: the hard kill belongs to the inner
    /// instance, which leads the group being killed.
    pub fn for_role(self, role: Role) -> Self {
        match role {
            Role::Outer => self.with_death_timeout(Duration::ZERO),
            Role::Inner => self,
        }
    }

    /// Whether orphan polling is enabled
    pub fn polls(&self) -> bool {
        !self.poll_interval.is_zero()
    }

    /// Whether a hard kill follows the soft kill
    pub fn escalates(&self) -> bool {
        !self.death_timeout.is_zero()
    }
}
