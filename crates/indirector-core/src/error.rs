//! Error types for the indirector

use thiserror::Error;

use crate::request::Method;

/// Result type alias using IndirectorError
pub type Result<T> = std::result::Result<T, IndirectorError>;

/// Errors that can occur while building or dispatching requests
///
/// The set of kinds is closed. The HTTP layer maps each kind to exactly one
/// status code; nothing below the router knows about status codes.
#[derive(Error, Debug)]
pub enum IndirectorError {
    /// Malformed method, key, name or payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller is not allowed to perform the operation
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Unknown indirection, unresolved environment or a find miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP verb has no operation mapping
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// None of the accepted formats is supported by the model
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    /// Payload content type has no deserializer
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The terminus lacks the operation, or remote access is disallowed
    #[error("Operation '{operation}' not supported by terminus '{terminus}' of indirection '{indirection}'")]
    OperationNotSupported {
        indirection: String,
        terminus: String,
        operation: Method,
    },

    /// I/O failure, corrupt stored data, remote backend failure or misconfiguration
    #[error("Terminus error{}: {message}", context_suffix(.indirection, .terminus))]
    Terminus {
        indirection: Option<String>,
        terminus: Option<String>,
        message: String,
    },

    /// Operation makes no sense for this source
    #[error("Dev error: {0}")]
    Dev(String),
}

fn context_suffix(indirection: &Option<String>, terminus: &Option<String>) -> String {
    match (indirection, terminus) {
        (Some(i), Some(t)) => format!(" in {}/{}", i, t),
        (Some(i), None) => format!(" in {}", i),
        (None, Some(t)) => format!(" in terminus {}", t),
        (None, None) => String::new(),
    }
}

impl IndirectorError {
    /// Create a terminus error without context
    pub fn terminus(message: impl Into<String>) -> Self {
        IndirectorError::Terminus {
            indirection: None,
            terminus: None,
            message: message.into(),
        }
    }

    /// Fill in missing indirection/terminus names for diagnostics
    ///
    /// Only terminus errors carry context; every other kind is returned as is
    /// so its kind survives propagation.
    pub fn annotate(self, indirection_name: &str, terminus_name: &str) -> Self {
        match self {
            IndirectorError::Terminus {
                indirection,
                terminus,
                message,
            } => IndirectorError::Terminus {
                indirection: indirection.or_else(|| Some(indirection_name.to_string())),
                terminus: terminus.or_else(|| Some(terminus_name.to_string())),
                message,
            },
            IndirectorError::OperationNotSupported {
                indirection,
                terminus,
                operation,
            } if indirection.is_empty() => IndirectorError::OperationNotSupported {
                indirection: indirection_name.to_string(),
                terminus,
                operation,
            },
            other => other,
        }
    }

    /// Short machine-readable name of the kind
    pub fn kind(&self) -> &'static str {
        match self {
            IndirectorError::Validation(_) => "VALIDATION",
            IndirectorError::Authorization(_) => "AUTHORIZATION",
            IndirectorError::NotFound(_) => "NOT_FOUND",
            IndirectorError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            IndirectorError::NotAcceptable(_) => "NOT_ACCEPTABLE",
            IndirectorError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            IndirectorError::OperationNotSupported { .. } => "OPERATION_NOT_SUPPORTED",
            IndirectorError::Terminus { .. } => "TERMINUS_ERROR",
            IndirectorError::Dev(_) => "DEV_ERROR",
        }
    }
}

impl From<std::io::Error> for IndirectorError {
    fn from(err: std::io::Error) -> Self {
        IndirectorError::terminus(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for IndirectorError {
    fn from(err: serde_json::Error) -> Self {
        IndirectorError::terminus(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for IndirectorError {
    fn from(err: serde_yaml::Error) -> Self {
        IndirectorError::terminus(format!("YAML error: {}", err))
    }
}
