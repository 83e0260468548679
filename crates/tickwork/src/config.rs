//! Ticker configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default polling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Longest interval the timer will wait; larger values are clamped
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default number of workers
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Default time to wait for busy workers on shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Ticker configuration
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tickwork::TickerConfig;
///
/// let config = TickerConfig::default()
///     .with_interval(Duration::from_secs(5))
///     .with_max_workers(5);
///
/// assert_eq!(config.queue_capacity(), 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickerConfig {
    /// Time between request attempts
    #[serde(with = "duration_millis", default = "default_interval")]
    pub interval: Duration,

    /// Number of workers processing responses
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Pending responses buffered between ticker and workers
    /// (None = same as `max_workers`)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// How long shutdown waits for busy workers before aborting them
    #[serde(with = "duration_millis", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl TickerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `TICKWORK_INTERVAL_MS`: Polling interval (default: 500)
    /// - `TICKWORK_MAX_WORKERS`: Worker count (default: 10)
    /// - `TICKWORK_QUEUE_CAPACITY`: Pending response buffer (default: worker count)
    /// - `TICKWORK_SHUTDOWN_TIMEOUT_MS`: Shutdown grace period (default: 30000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let mut config = Self::default();
        if let Some(ms) = parse("TICKWORK_INTERVAL_MS").filter(|ms| *ms > 0) {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse("TICKWORK_MAX_WORKERS") {
            config = config.with_max_workers(n as usize);
        }
        if let Some(n) = parse("TICKWORK_QUEUE_CAPACITY") {
            config = config.with_queue_capacity(n as usize);
        }
        if let Some(ms) = parse("TICKWORK_SHUTDOWN_TIMEOUT_MS") {
            config.shutdown_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Set the polling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the worker count
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    /// Set the pending response buffer size
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Effective pending response buffer size
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.max_workers).max(1)
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
