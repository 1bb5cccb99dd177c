use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The shared browser process could not be started. Nothing in the batch can run.
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("DOM access failed: {0}")]
    Dom(String),

    #[error("batch cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Transient, task-local failures that deserve another page session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Browser(_)
                | AppError::Navigation { .. }
                | AppError::Timeout { .. }
                | AppError::UpstreamStatus { .. }
                | AppError::Dom(_)
                | AppError::Internal(_)
        )
    }

    /// Failures that make every remaining task pointless.
    pub fn is_systemic(&self) -> bool {
        matches!(self, AppError::BrowserLaunch(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking browser call failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
