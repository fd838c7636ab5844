//! # Control Server Errors
//!
//! `RequestError` covers everything a handler can answer with; each variant
//! maps to one status code and renders as a status envelope.
//! `ControlError` covers construction and lifecycle failures returned to the
//! embedding process.

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::envelope::status_response;
use crate::observability::ParseLevelError;

/// Result type for lifecycle operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors answered to HTTP clients
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Structured body declared but empty
    #[error("Bad Request")]
    EmptyBody,

    /// Structured body could not be decoded
    #[error("{0}")]
    MalformedJson(String),

    /// Form submission could not be decoded
    #[error("{0}")]
    MalformedForm(String),

    #[error("missing level")]
    MissingLevel,

    #[error("{0}")]
    UnknownLevel(#[from] ParseLevelError),

    #[error("invalid duration {text:?}: {reason}")]
    InvalidDuration { text: String, reason: String },

    /// Query parameter with an unusable value
    #[error("invalid value {value:?} for parameter {name:?}")]
    InvalidQuery { name: String, value: String },

    #[error("{0}")]
    MethodNotAllowed(&'static str),

    #[error("Not Found")]
    NotFound,

    // ==================
    // Missing Capability (501)
    // ==================
    #[error("The callback function for getting the logging level is undefined.")]
    GetterUnavailable,

    #[error("The callback function for setting the logging level is undefined.")]
    SetterUnavailable,

    /// No collaborator installed for the endpoint
    #[error("{0}")]
    BackendUnavailable(String),

    // ==================
    // Server Errors (5xx)
    // ==================
    /// The embedding process's callback failed; text is passed through verbatim
    #[error("{0}")]
    Callback(String),

    #[error("{0}")]
    Serialization(String),
}

impl RequestError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::EmptyBody
            | RequestError::MalformedJson(_)
            | RequestError::MalformedForm(_)
            | RequestError::MissingLevel
            | RequestError::UnknownLevel(_)
            | RequestError::InvalidDuration { .. }
            | RequestError::InvalidQuery { .. } => StatusCode::BAD_REQUEST,

            RequestError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RequestError::NotFound => StatusCode::NOT_FOUND,

            RequestError::GetterUnavailable
            | RequestError::SetterUnavailable
            | RequestError::BackendUnavailable(_) => StatusCode::NOT_IMPLEMENTED,

            RequestError::Callback(_) | RequestError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the client sent something unusable
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        status_response(self.status_code(), self.to_string(), Vec::new())
    }
}

/// Construction and lifecycle errors
#[derive(Debug, Error)]
pub enum ControlError {
    /// Listener could not be bound
    #[error("failed to bind control server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("invalid handler path {0:?}")]
    InvalidPath(String),

    #[error("a handler is already registered for {0:?}")]
    DuplicatePath(String),

    /// Operation requires a server that has not started serving yet
    #[error("control server is already serving")]
    AlreadyServing,

    /// Serving stopped because shutdown was requested
    #[error("control server closed")]
    ServerClosed,

    #[error("shutdown deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ControlError {
    /// Whether this is the expected outcome of an intentional shutdown
    pub fn is_server_closed(&self) -> bool {
        matches!(self, ControlError::ServerClosed)
    }
}
