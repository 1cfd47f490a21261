use thiserror::Error;

/// Failure taxonomy for the cache engine.
///
/// Nothing here is allowed to reach the viewer: the interceptor downgrades
/// every variant to a log line and serves the request as if no cache existed.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying store cannot accept or serve entries right now
    /// (e.g. the indexed store is at capacity). Treated as a miss.
    #[error("cache store unavailable: {message}")]
    StoreUnavailable { message: String },
    /// A captured response could not be persisted (directory uncreatable,
    /// disk full). Logged; the current viewer already has their page.
    #[error("failed to persist captured response: {message}")]
    WriteFailure { message: String },
    /// The settings cannot describe a working engine (e.g. filesystem
    /// strategy without a cache root). Surfaces at construction time only.
    #[error("invalid cache configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::WriteFailure {
            message: message.into(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
