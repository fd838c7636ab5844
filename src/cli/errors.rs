//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::io;

use thiserror::Error;

use crate::http_server::ControlError;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file or flag error
    ConfigError,
    /// Runtime or signal setup failed
    IoError,
    /// The control server failed to start or stopped abnormally
    ServerFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "CTRL_CLI_CONFIG_ERROR",
            Self::IoError => "CTRL_CLI_IO_ERROR",
            Self::ServerFailed => "CTRL_CLI_SERVER_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug, Error)]
#[error("{}: {message}", .code.code())]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn server_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ServerFailed, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ControlError> for CliError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::Config(_) | ControlError::InvalidAddress(_) => {
                Self::config_error(e.to_string())
            }
            other => Self::server_failed(other.to_string()),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::config_error("bad port");
        assert_eq!(err.to_string(), "CTRL_CLI_CONFIG_ERROR: bad port");
    }

    #[test]
    fn test_control_error_mapping() {
        let err: CliError = ControlError::InvalidAddress("nowhere".into()).into();
        assert_eq!(err.code(), CliErrorCode::ConfigError);

        let err: CliError = ControlError::AlreadyServing.into();
        assert_eq!(err.code(), CliErrorCode::ServerFailed);
    }
}
