/*!
 * Namespace management: list, move, remove, mkdir, rmdir, chmod
 */

use gridlink_core_resilience::BatchReport;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::transfer::is_collection;
use super::{require_remote_path, require_remote_paths, OpContext};
use crate::backend::{path, DirEntry, DriverError, DriverResult, RemoteFs};
use crate::error::{GridError, Result};
use crate::session::Session;

pub const LIST: &str = "list";
pub const MOVE: &str = "move";
pub const REMOVE: &str = "remove";
pub const MKDIR: &str = "mkdir";
pub const RMDIR: &str = "rmdir";
pub const CHMOD: &str = "chmod";

/// Which entries a listing keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFilter {
    #[default]
    All,
    Files,
    Collections,
}

impl ListFilter {
    fn keeps(&self, entry: &DirEntry) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Files => entry.is_file(),
            ListFilter::Collections => entry.is_collection(),
        }
    }
}

/// Entries of a collection sorted by name. A file path lists itself.
pub fn list(session: &mut Session, remote: &str, filter: ListFilter) -> Result<Vec<DirEntry>> {
    require_remote_path("path", remote)?;

    session.with_session(LIST, |fs| {
        let meta = fs.stat(remote)?;
        let mut entries = if meta.is_collection() {
            fs.list(remote)?
        } else {
            vec![DirEntry::new(path::file_name(remote), remote, meta)]
        };
        entries.retain(|entry| filter.keeps(entry));
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    })
}

/// Rename remote files or collections.
///
/// When `dest` is an existing collection each source moves into it.
pub fn move_paths(
    session: &mut Session,
    ctx: &mut OpContext,
    sources: &[String],
    dest: &str,
) -> Result<BatchReport> {
    require_remote_paths("sources", sources)?;
    require_remote_path("destination", dest)?;

    session.with_session(MOVE, |fs| {
        let dest_is_coll = is_collection(fs, dest)?;
        if sources.len() > 1 && !dest_is_coll {
            return Err(GridError::validation(format!(
                "{} is not a collection; moving several sources needs a collection destination",
                dest
            )));
        }

        let mut report = BatchReport::new();
        for source in sources {
            let target = if dest_is_coll {
                path::join(dest, path::file_name(source))
            } else {
                dest.to_string()
            };
            match fs.rename(source, &target) {
                Ok(()) => report.record_success(target),
                Err(e) => ctx.item_failed(&mut report, source, e.into())?,
            }
        }
        Ok(report)
    })
}

/// Delete files; collections are removed only when `recursive` is set
pub fn remove(
    session: &mut Session,
    ctx: &mut OpContext,
    paths: &[String],
    recursive: bool,
) -> Result<BatchReport> {
    require_remote_paths("paths", paths)?;
    if paths.iter().any(|p| path::normalize(p) == "/") {
        return Err(GridError::validation("refusing to remove the root collection"));
    }

    session.with_session(REMOVE, |fs| {
        let mut report = BatchReport::new();
        for remote in paths {
            match remove_one(fs, remote, recursive) {
                Ok(()) => report.record_success(remote.clone()),
                Err(e) => ctx.item_failed(&mut report, remote, e.into())?,
            }
        }
        Ok(report)
    })
}

fn remove_one(fs: &mut dyn RemoteFs, remote: &str, recursive: bool) -> DriverResult<()> {
    let meta = fs.stat(remote)?;
    if !meta.is_collection() {
        return fs.remove(remote);
    }
    if !recursive {
        return Err(DriverError::IsCollection {
            path: remote.to_string(),
        });
    }
    remove_tree(fs, remote)
}

fn remove_tree(fs: &mut dyn RemoteFs, remote: &str) -> DriverResult<()> {
    for entry in fs.list(remote)? {
        if entry.is_collection() {
            remove_tree(fs, &entry.path)?;
        } else {
            fs.remove(&entry.path)?;
        }
    }
    debug!("Removing collection {}", remote);
    fs.rmdir(remote)
}

/// Create collections. With `parents`, missing ancestors are created and
/// existing collections are not an error.
pub fn mkdir(
    session: &mut Session,
    ctx: &mut OpContext,
    paths: &[String],
    parents: bool,
) -> Result<BatchReport> {
    require_remote_paths("paths", paths)?;

    session.with_session(MKDIR, |fs| {
        let mut report = BatchReport::new();
        for remote in paths {
            let outcome = if parents {
                mkdir_parents(fs, remote)
            } else {
                fs.mkdir(remote)
            };
            match outcome {
                Ok(()) => report.record_success(path::normalize(remote)),
                Err(e) => ctx.item_failed(&mut report, remote, e.into())?,
            }
        }
        Ok(report)
    })
}

fn mkdir_parents(fs: &mut dyn RemoteFs, remote: &str) -> DriverResult<()> {
    let normalized = path::normalize(remote);
    let mut current = String::from("/");
    for component in normalized.split('/').filter(|c| !c.is_empty()) {
        current = path::join(&current, component);
        match fs.stat(&current) {
            Ok(meta) if meta.is_collection() => continue,
            Ok(_) => return Err(DriverError::NotCollection { path: current }),
            Err(e) if e.is_not_found() => fs.mkdir(&current)?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Remove empty collections
pub fn rmdir(session: &mut Session, ctx: &mut OpContext, paths: &[String]) -> Result<BatchReport> {
    require_remote_paths("paths", paths)?;

    session.with_session(RMDIR, |fs| {
        let mut report = BatchReport::new();
        for remote in paths {
            match fs.rmdir(remote) {
                Ok(()) => report.record_success(remote.clone()),
                Err(e) => ctx.item_failed(&mut report, remote, e.into())?,
            }
        }
        Ok(report)
    })
}

/// Set unix permission bits
pub fn chmod(
    session: &mut Session,
    ctx: &mut OpContext,
    paths: &[String],
    mode: u32,
) -> Result<BatchReport> {
    require_remote_paths("paths", paths)?;
    if mode > 0o7777 {
        return Err(GridError::validation(format!(
            "mode {:o} is out of range",
            mode
        )));
    }

    session.with_session(CHMOD, |fs| {
        let mut report = BatchReport::new();
        for remote in paths {
            match fs.chmod(remote, mode) {
                Ok(()) => report.record_success(remote.clone()),
                Err(e) => ctx.item_failed(&mut report, remote, e.into())?,
            }
        }
        Ok(report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDriver;
    use crate::config::{Account, ErrorMode};
    use std::sync::Arc;

    fn setup() -> (MemoryDriver, Session) {
        let driver = MemoryDriver::new();
        driver.add_file("/zone/a.txt", b"a");
        driver.add_file("/zone/b.txt", b"bb");
        driver.add_file("/zone/sub/c.txt", b"ccc");
        let session = Session::new(Arc::new(driver.clone()), Account::default());
        (driver, session)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_list_with_filters() {
        let (_driver, mut session) = setup();
        let all = list(&mut session, "/zone", ListFilter::All).unwrap();
        let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);

        let dirs = list(&mut session, "/zone", ListFilter::Collections).unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].path, "/zone/sub");

        let single = list(&mut session, "/zone/b.txt", ListFilter::All).unwrap();
        assert_eq!(single[0].metadata.size, 2);
    }

    #[test]
    fn test_list_relative_path_is_validation_error() {
        let (driver, mut session) = setup();
        let err = list(&mut session, "zone", ListFilter::All).unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
        assert_eq!(driver.connect_attempts(), 0);
    }

    #[test]
    fn test_remove_collection_needs_recursive() {
        let (driver, mut session) = setup();
        let mut ctx = OpContext::new();

        let report = remove(
            &mut session,
            &mut ctx,
            &strings(&["/zone/a.txt", "/zone/sub"]),
            false,
        )
        .unwrap();
        assert_eq!(report.outputs(), ["/zone/a.txt"]);
        assert_eq!(report.exit_message(), "/zone/sub is a collection.\n");

        let report = remove(&mut session, &mut ctx, &strings(&["/zone/sub"]), true).unwrap();
        assert!(report.is_success());
        assert!(!driver.contains("/zone/sub/c.txt"));
        assert!(!driver.contains("/zone/sub"));
    }

    #[test]
    fn test_remove_root_rejected() {
        let (_driver, mut session) = setup();
        let err = remove(&mut session, &mut OpContext::new(), &strings(&["/"]), true).unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
    }

    #[test]
    fn test_move_into_collection() {
        let (driver, mut session) = setup();
        let report = move_paths(
            &mut session,
            &mut OpContext::new(),
            &strings(&["/zone/a.txt", "/zone/missing", "/zone/b.txt"]),
            "/zone/sub",
        )
        .unwrap();
        assert_eq!(report.outputs(), ["/zone/sub/a.txt", "/zone/sub/b.txt"]);
        assert_eq!(report.exit_message(), "file /zone/missing does not exist.\n");
        assert!(driver.contains("/zone/sub/b.txt"));
    }

    #[test]
    fn test_move_many_into_file_is_validation_error() {
        let (_driver, mut session) = setup();
        let err = move_paths(
            &mut session,
            &mut OpContext::new(),
            &strings(&["/zone/a.txt", "/zone/b.txt"]),
            "/zone/sub/c.txt",
        )
        .unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
    }

    #[test]
    fn test_mkdir_with_and_without_parents() {
        let (driver, mut session) = setup();
        let mut ctx = OpContext::new();

        let report = mkdir(&mut session, &mut ctx, &strings(&["/x/y/z"]), false).unwrap();
        assert_eq!(report.failure_count(), 1);
        assert!(!driver.contains("/x"));

        let report = mkdir(&mut session, &mut ctx, &strings(&["/x/y/z", "/zone"]), true).unwrap();
        assert!(report.is_success());
        assert!(driver.contains("/x/y/z"));
    }

    #[test]
    fn test_rmdir_and_abort_mode() {
        let (driver, mut session) = setup();
        driver.add_collection("/empty");
        let mut ctx = OpContext::new().with_error_mode(ErrorMode::Abort);

        let err = rmdir(&mut session, &mut ctx, &strings(&["/zone", "/empty"])).unwrap_err();
        assert_eq!(err.component(), Some("rmdir"));
        assert!(driver.contains("/empty"), "abort stops before later items");

        let report = rmdir(&mut session, &mut ctx, &strings(&["/empty"])).unwrap();
        assert!(report.is_success());
    }

    #[test]
    fn test_chmod() {
        let (driver, mut session) = setup();
        let mut ctx = OpContext::new();
        let report = chmod(&mut session, &mut ctx, &strings(&["/zone/a.txt"]), 0o600).unwrap();
        assert!(report.is_success());
        assert_eq!(driver.permissions("/zone/a.txt"), Some(0o600));

        let err = chmod(&mut session, &mut ctx, &strings(&["/zone/a.txt"]), 0o17777).unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
    }
}
