use thiserror::Error;

/// Result type for rate limit operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur in the rate limiter
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Service {0} has no rate limit tiers")]
    EmptyTierSet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        RateLimitError::StoreUnavailable(err.to_string())
    }
}

impl RateLimitError {
    /// Errors caused by the caller or the configuration; retrying cannot help.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RateLimitError::InvalidArgument(_) | RateLimitError::UnknownService(_)
        )
    }

    /// Errors coming from the shared store; the caller may decide to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, RateLimitError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RateLimitError::InvalidArgument("x".into()).is_caller_error());
        assert!(RateLimitError::UnknownService("x".into()).is_caller_error());
        assert!(!RateLimitError::UnknownService("x".into()).is_transient());

        let store = RateLimitError::StoreUnavailable("down".into());
        assert!(store.is_transient());
        assert!(!store.is_caller_error());
    }

    #[test]
    fn test_redis_error_is_store_unavailable() {
        let err: RateLimitError =
            redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into();
        assert!(matches!(err, RateLimitError::StoreUnavailable(_)));
    }
}
