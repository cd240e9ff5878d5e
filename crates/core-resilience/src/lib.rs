//! Gridlink Core Resilience: pure-logic session resilience primitives
//!
//! # Overview
//!
//! This crate provides the building blocks the session proxy is made of:
//!
//! - **Liveness Handle**: owns one connection, probes it before every use,
//!   reconnects at most once, and closes idempotently
//! - **Batch Report**: ordered outputs plus an accumulated multi-line error
//!   message, so one failing item never aborts a batch
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Remote file systems or their client libraries
//! - Network protocols (SFTP, grid protocols)
//! - Application-specific concerns
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Operation wrappers              │
//! └─────────────┬───────────────────────────┘
//!               │ per item
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Batch Report                      │  ← Accumulate, never abort
//! │  (outputs + one line per failure)       │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Liveness Handle                   │  ← Probe, reconnect once
//! │  (Uninitialized → Connected → Closed)   │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!          Remote service
//! ```

pub mod batch;
pub mod error;
pub mod liveness;

// Re-export main types for convenience
pub use batch::{BatchReport, BatchStatus};
pub use error::ResilienceError;
pub use liveness::{Connector, LinkState, LinkStats, LivenessHandle};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use gridlink_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::batch::{BatchReport, BatchStatus};
    pub use super::error::ResilienceError;
    pub use super::liveness::{Connector, LinkState, LinkStats, LivenessHandle};
}
