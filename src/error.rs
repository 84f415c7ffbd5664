//! Unified error handling for the TWAP paper trader
//!
//! Every fallible operation in the crate returns [`TwapResult`]. Rejections that happen
//! synchronously at submission are carried by [`ValidationError`] so callers can tell
//! exactly which rule an order broke.

use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Reasons an order or query is refused before anything is applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("order_id must not be empty")]
    EmptyOrderId,

    #[error("order '{0}' already exists")]
    DuplicateOrderId(String),

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),

    #[error("execution window must be positive")]
    NonPositiveWindow,

    #[error("slice interval must be positive")]
    NonPositiveInterval,

    #[error("slice interval ({interval_secs}s) exceeds execution window ({window_secs}s)")]
    IntervalExceedsWindow { interval_secs: f64, window_secs: f64 },

    #[error("order needs {slices} slices, at most {max} allowed")]
    TooManySlices { slices: usize, max: usize },

    #[error("execution window of {window_secs}s ends past the supported time range")]
    WindowOutOfRange { window_secs: f64 },

    #[error("limit price must be positive, got {0}")]
    InvalidLimitPrice(f64),

    #[error("exchange '{0}' not supported")]
    UnsupportedExchange(String),

    #[error("symbol '{symbol}' not supported on {exchange}")]
    UnsupportedPair { exchange: String, symbol: String },

    #[error("invalid interval '{0}'")]
    InvalidInterval(String),

    #[error("invalid limit {0}, must be between 1 and 1000")]
    InvalidLimit(usize),

    #[error("order '{0}' is already terminal and cannot be cancelled")]
    OrderNotCancellable(String),
}

/// Main error type for the paper trader
#[derive(Debug, Error)]
pub enum TwapError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl TwapError {
    /// Check if the operation that produced this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, TwapError::FeedUnavailable(_) | TwapError::Upstream(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TwapError::Validation(_) => "validation",
            TwapError::FeedUnavailable(_) => "feed",
            TwapError::PriceUnavailable(_) => "price",
            TwapError::NotFound(_) => "not_found",
            TwapError::Unauthorized => "auth",
            TwapError::Upstream(_) => "upstream",
            TwapError::Config(_) => "config",
            TwapError::Io(_) => "io",
            TwapError::InvariantViolation(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for TwapError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TwapError::Upstream(format!("timeout: {}", err))
        } else if err.is_connect() {
            TwapError::FeedUnavailable(err.to_string())
        } else {
            TwapError::Upstream(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TwapError {
    fn from(err: serde_json::Error) -> Self {
        TwapError::Upstream(format!("JSON parse error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TwapError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TwapError::FeedUnavailable(err.to_string())
    }
}

/// Result type alias using TwapError
pub type TwapResult<T> = Result<T, TwapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TwapError::NotFound("order 'o1'".to_string());
        assert!(err.to_string().contains("o1"));

        let err: TwapError = ValidationError::DuplicateOrderId("o1".to_string()).into();
        assert_eq!(err.to_string(), "Validation failed: order 'o1' already exists");
    }

    #[test]
    fn test_error_category() {
        let err = TwapError::Validation(ValidationError::NonPositiveWindow);
        assert_eq!(err.category(), "validation");

        let err = TwapError::FeedUnavailable("closed".to_string());
        assert_eq!(err.category(), "feed");

        let err = TwapError::InvariantViolation("slice resolved twice".to_string());
        assert_eq!(err.category(), "internal");
    }

    #[test]
    fn test_retryable() {
        assert!(TwapError::FeedUnavailable("reset".to_string()).is_retryable());
        assert!(TwapError::Upstream("502".to_string()).is_retryable());
        assert!(!TwapError::Unauthorized.is_retryable());
        assert!(!TwapError::NotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: TwapError = io_err.into();
        assert!(matches!(err, TwapError::Io(_)));
    }
}
