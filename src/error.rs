// Error types for the BGP route audit pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Invalid ASN: {0}")]
    InvalidAsn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Looking glass session error: {0}")]
    Session(String),

    #[error("Router API error: {0}")]
    RouterApi(String),

    #[error("Could not determine local ASN (router answered {0:?})")]
    UnknownLocalAsn(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Failed to execute command: {0}")]
    CommandExecution(String),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::RouterApi(e.to_string())
    }
}

impl AppError {
    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidPrefix(p) => {
                format!("'{}' is not a valid CIDR network. Host bits must be zero.", p)
            }
            AppError::InvalidAsn(a) => {
                format!("'{}' is not a valid ASN. Use a positive decimal number.", a)
            }
            AppError::Io(_) => {
                "File system error. Check permissions and disk space.".to_string()
            }
            AppError::Serialization(_) => {
                "Dataset format error. The JSON file may be truncated or hand-edited.".to_string()
            }
            AppError::Config(_) => {
                "Configuration error. Check your config file or command-line arguments.".to_string()
            }
            AppError::Session(_) => {
                "Looking glass session failed. Check that tmux and ssh are installed and the host is reachable.".to_string()
            }
            AppError::RouterApi(_) => {
                "Router API request failed. Check the hostname, API key and HTTPS settings.".to_string()
            }
            AppError::UnknownLocalAsn(_) => {
                "Could not determine system ASN. Usually due to self-signed SSL cert; try running with -k".to_string()
            }
            AppError::MissingInput(what) => {
                format!("Nothing to work on: {}", what)
            }
            AppError::CommandExecution(cmd) => {
                format!("Failed to execute command. Make sure {} is installed.", cmd)
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Session(_) | AppError::RouterApi(_))
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        delay.min(self.max_delay_ms as f64) as u64
    }
}

/// Retry a fallible operation with exponential backoff.
/// Errors that are not [`AppError::is_retryable`] are returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!("{} succeeded after {} attempt(s)", operation_name, attempt + 1);
                }
                return Ok(result);
            }
            Err(e) => {
                attempt += 1;

                if !e.is_retryable() {
                    tracing::error!("{} failed with non-retryable error: {}", operation_name, e);
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    tracing::error!("{} failed after {} attempts: {}", operation_name, attempt, e);
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                    operation_name,
                    attempt,
                    config.max_attempts,
                    e,
                    delay
                );

                tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
            }
        }
    }
}
