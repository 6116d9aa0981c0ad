//! Error types for the aggregation workers

/// Collector error type
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Core(#[from] logdrop_core::Error),

    #[error("Worker pass panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Alert delivery failed: {0}")]
    Alert(String),
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

impl CollectorError {
    pub fn alert<S: Into<String>>(msg: S) -> Self {
        CollectorError::Alert(msg.into())
    }

    /// Whether the worker must stop rather than retry next cycle
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CollectorError::Alert(_))
    }
}
