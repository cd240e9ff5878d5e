//! Error types for the resilience primitives

use thiserror::Error;

/// Failures surfaced by a [`LivenessHandle`](crate::LivenessHandle)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// The handle was closed explicitly and will not reconnect
    #[error("connection to {endpoint} is closed")]
    Closed { endpoint: String },

    /// The first connection attempt failed
    #[error("could not connect to {endpoint}: {message}")]
    ConnectFailed { endpoint: String, message: String },

    /// The liveness probe failed and the single reconnect attempt failed too
    #[error("connection to {endpoint} lost ({probe}); reconnect failed: {reconnect}")]
    ReconnectFailed {
        endpoint: String,
        probe: String,
        reconnect: String,
    },
}

impl ResilienceError {
    /// Endpoint description the error refers to
    pub fn endpoint(&self) -> &str {
        match self {
            ResilienceError::Closed { endpoint }
            | ResilienceError::ConnectFailed { endpoint, .. }
            | ResilienceError::ReconnectFailed { endpoint, .. } => endpoint,
        }
    }

    /// True if the error comes from an explicit close rather than the network
    pub fn is_closed(&self) -> bool {
        matches!(self, ResilienceError::Closed { .. })
    }
}
