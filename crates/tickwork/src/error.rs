// Error types for the polling engine

use reqwest::StatusCode;
use thiserror::Error;

use crate::dispatch::DispatchSnapshot;
use crate::ticker::TickerReport;

/// Result type alias for ticker operations
pub type Result<T> = std::result::Result<T, TickerError>;

/// Configuration problems detected by `Ticker::start` before the loop runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No target request or URL was configured
    #[error("missing target: no URL or request configured")]
    MissingTarget,

    /// No response handler was configured
    #[error("missing handler: no response handler configured")]
    MissingHandler,

    /// The configured URL could not be parsed
    #[error("invalid target url '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },

    /// The polling interval is zero
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
}

/// A failed request attempt, handed to error hooks
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client failed (connect, TLS, body read, ...)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request did not complete within its timeout
    #[error("request timed out")]
    Timeout,

    /// The server answered with a 5xx status
    #[error("server error status: {0}")]
    ServerStatus(StatusCode),

    /// Error reported by a custom request executor
    #[error("executor error: {0}")]
    Executor(String),
}

impl FetchError {
    /// Create an executor error
    pub fn executor(msg: impl Into<String>) -> Self {
        FetchError::Executor(msg.into())
    }

    /// Whether this failure carries a response from the server
    pub fn is_server_status(&self) -> bool {
        matches!(self, FetchError::ServerStatus(_))
    }
}

/// Dispatcher errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The dispatcher has been stopped and no longer accepts responses
    #[error("dispatcher is stopped")]
    Stopped,

    /// Busy workers did not finish within the shutdown timeout
    #[error("graceful shutdown timed out with {remaining} worker(s) still busy")]
    ShutdownTimeout {
        remaining: usize,
        stats: DispatchSnapshot,
    },
}

/// Errors returned by `Ticker::start` and `RunningTicker::stop`
#[derive(Debug, Error)]
pub enum TickerError {
    /// Invalid configuration, the loop never started
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dispatcher failure during shutdown
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Handlers were still running when the shutdown timeout expired;
    /// `report` holds the counters reached before they were aborted
    #[error("ticker shutdown timed out with {remaining} handler(s) still running")]
    ShutdownTimeout { remaining: usize, report: TickerReport },

    /// The ticker was already stopped; a ticker runs at most once
    #[error("ticker was already stopped")]
    AlreadyStopped,

    /// The background task running the loop panicked or was aborted
    #[error("ticker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TickerError {
    /// The configuration error, if this is one
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            TickerError::Config(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::MissingTarget.to_string(),
            "missing target: no URL or request configured"
        );
        assert_eq!(
            ConfigError::MissingHandler.to_string(),
            "missing handler: no response handler configured"
        );
    }

    #[test]
    fn test_ticker_error_wraps_config() {
        let err: TickerError = ConfigError::MissingHandler.into();
        assert_eq!(err.as_config(), Some(&ConfigError::MissingHandler));
        assert!(TickerError::AlreadyStopped.as_config().is_none());
    }

    #[test]
    fn test_shutdown_timeout_keeps_report() {
        let report = TickerReport {
            ticks: 4,
            dispatched: 4,
            handled: 3,
            ..TickerReport::default()
        };
        let err = TickerError::ShutdownTimeout {
            remaining: 1,
            report,
        };
        assert_eq!(
            err.to_string(),
            "ticker shutdown timed out with 1 handler(s) still running"
        );
        assert!(err.as_config().is_none());
    }

    #[test]
    fn test_fetch_error_kind() {
        assert!(FetchError::ServerStatus(StatusCode::BAD_GATEWAY).is_server_status());
        assert!(!FetchError::executor("boom").is_server_status());
        assert_eq!(
            FetchError::ServerStatus(StatusCode::SERVICE_UNAVAILABLE).to_string(),
            "server error status: 503 Service Unavailable"
        );
    }
}
