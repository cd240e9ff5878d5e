//! Error types for the driver layer
//!
//! Every remote client plugged in behind [`RemoteFs`](super::RemoteFs) reports
//! failures through [`DriverError`], so the session proxy and the operation
//! wrappers can classify them without knowing the client library.

use std::io;
use thiserror::Error;

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Unified error type for driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    /// I/O error while talking to the remote side or the local file system
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Remote path does not exist
    #[error("path not found on {driver}: {path}")]
    NotFound { path: String, driver: String },

    /// Remote path already exists
    #[error("path already exists: {path}")]
    AlreadyExists { path: String },

    /// Access denied
    #[error("permission denied for {path}: {message}")]
    PermissionDenied { path: String, message: String },

    /// Collection still has children
    #[error("collection not empty: {path}")]
    NotEmpty { path: String },

    /// Operation needs a file but the path is a collection
    #[error("{path} is a collection")]
    IsCollection { path: String },

    /// Operation needs a collection but the path is a file
    #[error("{path} is not a collection")]
    NotCollection { path: String },

    /// Path is malformed or not allowed for the operation
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Credentials were rejected
    #[error("authentication failed for {driver}: {message}")]
    AuthenticationFailed { driver: String, message: String },

    /// Transport could not be established or broke
    #[error("connection to {endpoint} failed: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    /// Driver does not implement the operation
    #[error("operation '{operation}' not supported by driver {driver}")]
    Unsupported { driver: String, operation: String },

    /// Any other driver-specific failure
    #[error("{driver} error: {message}")]
    Other { driver: String, message: String },
}

impl DriverError {
    /// Convenience constructor for [`DriverError::NotFound`]
    pub fn not_found(driver: &str, path: &str) -> Self {
        DriverError::NotFound {
            path: path.to_string(),
            driver: driver.to_string(),
        }
    }

    /// Convenience constructor for [`DriverError::Unsupported`]
    pub fn unsupported(driver: &str, operation: &str) -> Self {
        DriverError::Unsupported {
            driver: driver.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Convenience constructor for [`DriverError::Other`]
    pub fn other(driver: &str, message: impl Into<String>) -> Self {
        DriverError::Other {
            driver: driver.to_string(),
            message: message.into(),
        }
    }

    /// Check if this error is retriable (transient)
    pub fn is_retriable(&self) -> bool {
        match self {
            DriverError::ConnectionFailed { .. } => true,
            DriverError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Check if the transport itself is gone, as opposed to one item failing
    pub fn is_connection_lost(&self) -> bool {
        match self {
            DriverError::ConnectionFailed { .. } => true,
            DriverError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Check if this error indicates the path was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            DriverError::NotFound { .. } => true,
            DriverError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Remote or local path the error refers to, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            DriverError::NotFound { path, .. }
            | DriverError::AlreadyExists { path }
            | DriverError::PermissionDenied { path, .. }
            | DriverError::NotEmpty { path }
            | DriverError::IsCollection { path }
            | DriverError::NotCollection { path }
            | DriverError::InvalidPath { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Check if this error is an unsupported-operation error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DriverError::Unsupported { .. })
    }

    /// Check if this error is related to authentication
    pub fn is_auth_error(&self) -> bool {
        matches!(self, DriverError::AuthenticationFailed { .. })
    }

    /// Map a local I/O error on `path` into the closest driver error
    pub fn from_io(driver: &str, path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => DriverError::not_found(driver, path),
            io::ErrorKind::AlreadyExists => DriverError::AlreadyExists {
                path: path.to_string(),
            },
            io::ErrorKind::PermissionDenied => DriverError::PermissionDenied {
                path: path.to_string(),
                message: err.to_string(),
            },
            _ => DriverError::Io(err),
        }
    }
}
