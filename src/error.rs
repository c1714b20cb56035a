//! Error types and handling for the metrics MCP server

use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the error code for MCP responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::SourceNotFound(_) => "source_not_found",
            AppError::InvalidData(_) => "invalid_data",
            AppError::InvalidPeriod(_) => "invalid_period",
            AppError::NotFound(_) => "not_found",
            AppError::MissingParameter(_) => "missing_parameter",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Io(_) => "io_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Process exit code used in CLI mode
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::MissingParameter(_) | AppError::InvalidInput(_) | AppError::InvalidPeriod(_) => 1,
            AppError::NotFound(_) => 3,
            AppError::InvalidData(_) | AppError::SourceNotFound(_) => 4,
            AppError::Io(_) | AppError::Internal(_) => 5,
        }
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert serde_json::Error to AppError
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidData(err.to_string())
    }
}

/// Reject empty or whitespace-only required parameters
pub fn require_param<'a>(name: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::MissingParameter(format!("{} parameter is required", name)));
    }
    Ok(trimmed)
}
