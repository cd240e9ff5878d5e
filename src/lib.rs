/*!
 * gridlink - resilient client for remote grid file systems
 *
 * Wraps a remote grid namespace (SRB/iRODS style) behind a session that
 * probes its connection before every operation and reconnects once when the
 * transport went stale. On top of the session sit batch operation wrappers:
 * - list, get, put, copy, move, remove, mkdir, rmdir, chmod
 * - user metadata (attribute/value/units) read, attach and query
 * - remote command execution
 *
 * Item failures inside a batch are collected into a multi-line report
 * instead of aborting the batch. Remote clients plug in through the
 * [`backend::Driver`] and [`backend::RemoteFs`] traits.
 *
 * # Example
 *
 * ```
 * use gridlink::backend::MemoryDriver;
 * use gridlink::config::Account;
 * use gridlink::ops::{self, OpContext};
 * use gridlink::Session;
 * use std::sync::Arc;
 *
 * let driver = MemoryDriver::new();
 * driver.add_file("/tempZone/home/rods/a.txt", b"alpha");
 *
 * let mut session = Session::new(Arc::new(driver), Account::default());
 * let entries = ops::list(&mut session, "/tempZone/home/rods", ops::ListFilter::All).unwrap();
 * assert_eq!(entries[0].name, "a.txt");
 *
 * let report = ops::remove(
 *     &mut session,
 *     &mut OpContext::new(),
 *     &["/tempZone/home/rods/a.txt".to_string()],
 *     false,
 * )
 * .unwrap();
 * assert!(report.is_success());
 * session.close();
 * ```
 */

pub mod backend;
pub mod cli_style;
pub mod config;
pub mod confirm;
pub mod error;
pub mod logging;
pub mod ops;
pub mod session;

// Re-export commonly used types
pub use config::{Account, GridConfig};
pub use error::{ConnectionError, GridError, Result};
pub use gridlink_core_resilience::{BatchReport, BatchStatus, LinkState, LinkStats};
pub use ops::{Command, CommandOutcome, OpContext};
pub use session::Session;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
