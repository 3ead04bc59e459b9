//! Transaction manager configuration.

use std::time::Duration;

/// Default time a committed transaction waits for its instructions.
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration for a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout given to submitted transactions that did not set their own.
    pub commit_timeout: Duration,

    /// Maximum number of expansion rounds before `submit` gives up.
    pub max_expansion_rounds: usize,

    /// Whether the manager applies READY/TIMED_OUT transactions itself.
    ///
    /// When disabled, finished transactions are parked until
    /// [`TransactionManager::apply`](crate::TransactionManager::apply).
    pub auto_apply: bool,

    /// Number of lifecycle events kept for polling.
    pub event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
            max_expansion_rounds: 256,
            auto_apply: true,
            event_history: 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default commit timeout.
    #[must_use]
    pub const fn commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Sets the expansion round limit.
    #[must_use]
    pub const fn max_expansion_rounds(mut self, rounds: usize) -> Self {
        self.max_expansion_rounds = rounds;
        self
    }

    /// Sets whether finished transactions are applied automatically.
    #[must_use]
    pub const fn auto_apply(mut self, value: bool) -> Self {
        self.auto_apply = value;
        self
    }

    /// Sets the event history size.
    #[must_use]
    pub const fn event_history(mut self, size: usize) -> Self {
        self.event_history = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.commit_timeout, Duration::from_millis(100));
        assert!(config.auto_apply);
        assert_eq!(config.max_expansion_rounds, 256);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .commit_timeout(Duration::from_millis(250))
            .auto_apply(false)
            .max_expansion_rounds(8);

        assert_eq!(config.commit_timeout, Duration::from_millis(250));
        assert!(!config.auto_apply);
        assert_eq!(config.max_expansion_rounds, 8);
    }
}
