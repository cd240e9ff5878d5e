//! Driver abstraction for remote grid file systems
//!
//! This module is the boundary where a concrete remote client plugs in. The
//! session proxy only ever talks to a [`RemoteFs`] connection opened by a
//! [`Driver`]; everything protocol-specific stays behind these two traits.
//!
//! # Drivers
//!
//! - [`MemoryDriver`]: in-process namespace with fault injection, used for
//!   tests and demos
//! - [`LocalDriver`]: a local directory tree standing in for the remote
//!   namespace
//! - `SshDriver` (feature `ssh-backend`): SFTP and exec channels over SSH
//!
//! # Example
//!
//! ```
//! use gridlink::backend::{Driver, MemoryDriver};
//! use gridlink::config::Account;
//!
//! let driver = MemoryDriver::new();
//! driver.add_file("/home/kepler/run.log", b"ok");
//!
//! let mut fs = driver.connect(&Account::default()).unwrap();
//! let meta = fs.stat("/home/kepler/run.log").unwrap();
//! assert_eq!(meta.size, 2);
//! ```

pub mod error;
pub mod path;
pub mod types;

mod local;
mod memory;
mod registry;

#[cfg(feature = "ssh-backend")]
mod ssh;

// Re-export main types
pub use error::{DriverError, DriverResult};
pub use local::LocalDriver;
pub use memory::MemoryDriver;
pub use registry::{open_driver, DriverFactory, DriverRegistry};
pub use types::{
    render_query, Avu, CommandOutput, DirEntry, EntryKind, Metadata, MetadataCondition, Operator,
};

#[cfg(feature = "ssh-backend")]
pub use ssh::SshDriver;

use crate::config::Account;
use std::path::Path;

/// One live connection to a remote file system
///
/// All methods block. Paths are absolute, normalized, `/`-separated remote
/// paths.
/// Optional capabilities return [`DriverError::Unsupported`] by default so
/// callers can fall back or report the gap.
pub trait RemoteFs: Send {
    /// Driver identifier for errors and logs (e.g. "memory", "ssh")
    fn driver_name(&self) -> &str;

    /// Cheap round trip used only to detect a stale connection
    fn probe(&mut self) -> DriverResult<()>;

    /// Get metadata for a file or collection
    ///
    /// # Errors
    ///
    /// Returns `DriverError::NotFound` if the path doesn't exist.
    fn stat(&mut self, path: &str) -> DriverResult<Metadata>;

    /// Check if a path exists
    fn exists(&mut self, path: &str) -> DriverResult<bool> {
        match self.stat(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List the direct children of a collection, sorted by name
    fn list(&mut self, path: &str) -> DriverResult<Vec<DirEntry>>;

    /// Create one collection; its parent must exist
    fn mkdir(&mut self, path: &str) -> DriverResult<()>;

    /// Remove an empty collection
    fn rmdir(&mut self, path: &str) -> DriverResult<()>;

    /// Remove a file
    fn remove(&mut self, path: &str) -> DriverResult<()>;

    /// Rename or move a file or collection
    fn rename(&mut self, src: &str, dest: &str) -> DriverResult<()>;

    /// Set permission bits
    fn chmod(&mut self, path: &str, mode: u32) -> DriverResult<()> {
        let _ = (path, mode);
        Err(DriverError::unsupported(self.driver_name(), "chmod"))
    }

    /// Create an empty file, truncating an existing one
    fn create(&mut self, path: &str) -> DriverResult<()>;

    /// Read up to `buf.len()` bytes at `offset`; 0 means end of file
    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize>;

    /// Write `data` at `offset`, extending the file as needed
    fn write_at(&mut self, path: &str, offset: u64, data: &[u8]) -> DriverResult<()>;

    /// Bulk transfer of a remote file to a local path
    fn download(&mut self, remote: &str, local: &Path) -> DriverResult<u64> {
        let _ = (remote, local);
        Err(DriverError::unsupported(self.driver_name(), "download"))
    }

    /// Bulk transfer of a local file to a remote path
    fn upload(&mut self, local: &Path, remote: &str) -> DriverResult<u64> {
        let _ = (local, remote);
        Err(DriverError::unsupported(self.driver_name(), "upload"))
    }

    /// Server-side copy of a remote file
    fn copy(&mut self, src: &str, dest: &str) -> DriverResult<u64> {
        let _ = (src, dest);
        Err(DriverError::unsupported(self.driver_name(), "copy"))
    }

    /// User metadata attached to a path
    fn get_metadata(&mut self, path: &str) -> DriverResult<Vec<Avu>> {
        let _ = path;
        Err(DriverError::unsupported(self.driver_name(), "get_metadata"))
    }

    /// Attach one metadata triple to a path
    fn add_metadata(&mut self, path: &str, avu: &Avu) -> DriverResult<()> {
        let _ = (path, avu);
        Err(DriverError::unsupported(self.driver_name(), "add_metadata"))
    }

    /// Paths under `scope` whose metadata satisfies every condition
    fn query_metadata(
        &mut self,
        scope: &str,
        conditions: &[MetadataCondition],
    ) -> DriverResult<Vec<String>> {
        let _ = (scope, conditions);
        Err(DriverError::unsupported(self.driver_name(), "query_metadata"))
    }

    /// Run a command on the remote side
    fn execute(&mut self, command: &str, args: &[String]) -> DriverResult<CommandOutput> {
        let _ = (command, args);
        Err(DriverError::unsupported(self.driver_name(), "execute"))
    }

    /// Release the connection
    fn close(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

/// Opens [`RemoteFs`] connections for an account
pub trait Driver: Send + Sync {
    /// Driver identifier (e.g. "memory", "local", "ssh")
    fn name(&self) -> &str;

    /// Open and authenticate a new connection
    fn connect(&self, account: &Account) -> DriverResult<Box<dyn RemoteFs>>;
}
