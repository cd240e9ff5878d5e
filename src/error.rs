/*!
 * Error types for gridlink
 */

use std::fmt;
use std::io;
use thiserror::Error;

use crate::backend::DriverError;

pub use gridlink_core_resilience::ResilienceError as ConnectionError;

pub type Result<T> = std::result::Result<T, GridError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Error, Debug)]
pub enum GridError {
    /// Remote side unreachable even after one reconnect, or session closed
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A remote operation failed on a session that was confirmed live
    #[error("{component}: {source}")]
    Operation {
        component: String,
        #[source]
        source: DriverError,
    },

    /// Driver failure not yet attributed to a component.
    /// [`Session::with_session`](crate::session::Session::with_session)
    /// turns it into [`GridError::Operation`].
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// Bad arguments detected before any network call
    #[error("invalid arguments: {0}")]
    Validation(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GridError {
    /// Convenience constructor for [`GridError::Validation`]
    pub fn validation(message: impl Into<String>) -> Self {
        GridError::Validation(message.into())
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GridError::Connection(_) | GridError::Validation(_) | GridError::Config(_) => {
                EXIT_FATAL
            }
            GridError::Operation { .. } | GridError::Driver(_) | GridError::Io(_) => EXIT_PARTIAL,
        }
    }

    /// Check if this error is fatal (retrying the same call cannot help)
    pub fn is_fatal(&self) -> bool {
        match self {
            GridError::Connection(_) => true,
            GridError::Validation(_) => true,
            GridError::Config(_) => true,

            GridError::Operation { source, .. } | GridError::Driver(source) => {
                !source.is_retriable()
            }
            GridError::Io(_) => false,
        }
    }

    /// Component named by an operation error
    pub fn component(&self) -> Option<&str> {
        match self {
            GridError::Operation { component, .. } => Some(component),
            _ => None,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            GridError::Connection(_) => ErrorCategory::Network,
            GridError::Operation { source, .. } | GridError::Driver(source) => {
                if source.is_auth_error() {
                    ErrorCategory::Security
                } else {
                    ErrorCategory::Remote
                }
            }
            GridError::Validation(_) => ErrorCategory::Validation,
            GridError::Config(_) => ErrorCategory::Configuration,
            GridError::Io(_) => ErrorCategory::IoError,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Argument validation errors
    Validation,
    /// Local I/O errors
    IoError,
    /// Configuration errors
    Configuration,
    /// Connection establishment and liveness
    Network,
    /// Authentication/authorization errors
    Security,
    /// Remote operation failures
    Remote,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Security => write!(f, "security"),
            ErrorCategory::Remote => write!(f, "remote"),
        }
    }
}
