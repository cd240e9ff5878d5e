/*!
 * get, put and copy
 *
 * Each file first goes through the driver's bulk path (download, upload or
 * server-side copy). If that fails the file is moved again in fixed-size
 * chunks with `read_at`/`write_at`; only when both fail is the item recorded
 * as failed. Collections and local directories are transferred recursively.
 */

use gridlink_core_resilience::BatchReport;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{require_remote_path, require_remote_paths, OpContext};
use crate::backend::{path, DriverError, DriverResult, RemoteFs};
use crate::error::{GridError, Result};
use crate::session::Session;

pub const GET: &str = "get";
pub const PUT: &str = "put";
pub const COPY: &str = "copy";

/// Fetch remote files or collections into the local file system.
///
/// With several sources `local_dest` must be an existing directory. Items
/// land at `local_dest/<name>` when `local_dest` is a directory, otherwise
/// at `local_dest` itself.
pub fn get(
    session: &mut Session,
    ctx: &mut OpContext,
    sources: &[String],
    local_dest: &Path,
) -> Result<BatchReport> {
    require_remote_paths("sources", sources)?;
    let dest_is_dir = local_dest.is_dir();
    if sources.len() > 1 && !dest_is_dir {
        return Err(GridError::validation(format!(
            "{} is not a directory; fetching several sources needs a directory destination",
            local_dest.display()
        )));
    }

    session.with_session(GET, |fs| {
        let mut report = BatchReport::new();
        for source in sources {
            let target = if dest_is_dir {
                local_dest.join(path::file_name(source))
            } else {
                local_dest.to_path_buf()
            };

            match fetch(fs, ctx, &mut report, source, &target) {
                Ok(true) => report.record_success(target.display().to_string()),
                Ok(false) => debug!("{} skipped or incomplete", source),
                Err(e) => ctx.item_failed(&mut report, source, e)?,
            }
        }
        info!(
            "Fetched {} of {} item(s)",
            report.outputs().len(),
            sources.len()
        );
        Ok(report)
    })
}

/// Upload local files or directories to the remote side.
///
/// With several sources `remote_dest` must be an existing collection.
pub fn put(
    session: &mut Session,
    ctx: &mut OpContext,
    sources: &[PathBuf],
    remote_dest: &str,
) -> Result<BatchReport> {
    require_remote_path("destination", remote_dest)?;

    session.with_session(PUT, |fs| {
        let dest_is_coll = is_collection(fs, remote_dest)?;
        if sources.len() > 1 && !dest_is_coll {
            return Err(GridError::validation(format!(
                "{} is not a collection; uploading several sources needs a collection destination",
                remote_dest
            )));
        }

        let mut report = BatchReport::new();
        for source in sources {
            let subject = source.display().to_string();
            let target = if dest_is_coll {
                path::join(remote_dest, &file_name_of(source))
            } else {
                remote_dest.to_string()
            };

            match send(fs, ctx, &mut report, source, &target) {
                Ok(true) => report.record_success(target),
                Ok(false) => debug!("{} skipped or incomplete", subject),
                Err(e) => ctx.item_failed(&mut report, &subject, e)?,
            }
        }
        info!(
            "Uploaded {} of {} item(s)",
            report.outputs().len(),
            sources.len()
        );
        Ok(report)
    })
}

/// Copy remote files or collections within one session
pub fn copy(
    session: &mut Session,
    ctx: &mut OpContext,
    sources: &[String],
    dest: &str,
) -> Result<BatchReport> {
    require_remote_paths("sources", sources)?;
    require_remote_path("destination", dest)?;

    session.with_session(COPY, |fs| {
        let dest_is_coll = is_collection(fs, dest)?;
        if sources.len() > 1 && !dest_is_coll {
            return Err(GridError::validation(format!(
                "{} is not a collection; copying several sources needs a collection destination",
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

            match duplicate(fs, ctx, &mut report, source, &target) {
                Ok(true) => report.record_success(target),
                Ok(false) => debug!("{} skipped or incomplete", source),
                Err(e) => ctx.item_failed(&mut report, source, e)?,
            }
        }
        Ok(report)
    })
}

/// True if `remote` exists and is a collection
pub(crate) fn is_collection(fs: &mut dyn RemoteFs, remote: &str) -> DriverResult<bool> {
    match fs.stat(remote) {
        Ok(meta) => Ok(meta.is_collection()),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

fn file_name_of(local: &Path) -> String {
    local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn local_err(local: &Path) -> impl FnOnce(io::Error) -> DriverError + '_ {
    move |e| DriverError::from_io("local", &local.display().to_string(), e)
}

/// Run the bulk transfer, then the streaming fallback if it failed
fn with_fallback<B, S>(
    fs: &mut dyn RemoteFs,
    subject: &str,
    bulk: B,
    streaming: S,
) -> DriverResult<u64>
where
    B: FnOnce(&mut dyn RemoteFs) -> DriverResult<u64>,
    S: FnOnce(&mut dyn RemoteFs) -> DriverResult<u64>,
{
    let bulk_err = match bulk(&mut *fs) {
        Ok(bytes) => return Ok(bytes),
        Err(e) if e.is_connection_lost() => return Err(e),
        Err(e) => e,
    };
    debug!(
        "Bulk transfer of {} failed ({}), falling back to streaming",
        subject, bulk_err
    );

    match streaming(&mut *fs) {
        Ok(bytes) => Ok(bytes),
        Err(stream_err) if bulk_err.is_unsupported() || stream_err.is_connection_lost() => {
            Err(stream_err)
        }
        Err(stream_err) => Err(DriverError::other(
            fs.driver_name(),
            format!(
                "bulk transfer failed ({}); streaming fallback failed ({})",
                bulk_err, stream_err
            ),
        )),
    }
}

// get

/// `Ok(false)` when the overwrite was declined or a nested item failed
fn fetch(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    report: &mut BatchReport,
    source: &str,
    target: &Path,
) -> Result<bool> {
    let meta = fs.stat(source)?;
    if meta.is_collection() {
        let failures = report.failure_count();
        fetch_collection(fs, ctx, report, source, target)?;
        return Ok(report.failure_count() == failures);
    }
    fetch_file(fs, ctx, source, target)
}

fn fetch_collection(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    report: &mut BatchReport,
    source: &str,
    target: &Path,
) -> Result<()> {
    fs::create_dir_all(target).map_err(local_err(target))?;
    for entry in fs.list(source)? {
        let child_target = target.join(&entry.name);
        let outcome = if entry.is_collection() {
            fetch_collection(fs, ctx, report, &entry.path, &child_target).map(|_| true)
        } else {
            fetch_file(fs, ctx, &entry.path, &child_target)
        };
        if let Err(e) = outcome {
            ctx.item_failed(report, &entry.path, e)?;
        }
    }
    Ok(())
}

fn fetch_file(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    source: &str,
    target: &Path,
) -> Result<bool> {
    if target.exists() && !ctx.confirm(&format!("Overwrite local file {}?", target.display())) {
        return Ok(false);
    }

    let chunk_size = ctx.chunk_size();
    let bytes = with_fallback(
        fs,
        source,
        |fs| fs.download(source, target),
        |fs| stream_download(fs, source, target, chunk_size),
    )?;
    debug!("Fetched {} ({} bytes)", source, bytes);
    Ok(true)
}

fn stream_download(
    fs: &mut dyn RemoteFs,
    source: &str,
    target: &Path,
    chunk_size: usize,
) -> DriverResult<u64> {
    let mut file = File::create(target).map_err(local_err(target))?;
    let mut buf = vec![0u8; chunk_size];
    let mut offset = 0u64;
    loop {
        let n = fs.read_at(source, offset, &mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(local_err(target))?;
        offset += n as u64;
    }
    file.flush().map_err(local_err(target))?;
    Ok(offset)
}

// put

fn send(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    report: &mut BatchReport,
    source: &Path,
    target: &str,
) -> Result<bool> {
    let meta = fs::metadata(source).map_err(local_err(source))?;
    if meta.is_dir() {
        let failures = report.failure_count();
        send_directory(fs, ctx, report, source, target)?;
        return Ok(report.failure_count() == failures);
    }
    send_file(fs, ctx, source, target)
}

fn send_directory(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    report: &mut BatchReport,
    source: &Path,
    target: &str,
) -> Result<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let subject = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| source.display().to_string());
                let err = DriverError::Io(io::Error::other(e.to_string()));
                ctx.item_failed(report, &subject, err.into())?;
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let remote = if relative.is_empty() {
            target.to_string()
        } else {
            path::join(target, &relative)
        };

        let outcome = if entry.file_type().is_dir() {
            ensure_collection(fs, &remote).map(|_| true)
        } else {
            send_file(fs, ctx, entry.path(), &remote)
        };
        if let Err(e) = outcome {
            ctx.item_failed(report, &entry.path().display().to_string(), e)?;
        }
    }
    Ok(())
}

fn ensure_collection(fs: &mut dyn RemoteFs, remote: &str) -> Result<()> {
    match fs.stat(remote) {
        Ok(meta) if meta.is_collection() => Ok(()),
        Ok(_) => Err(DriverError::NotCollection {
            path: remote.to_string(),
        }
        .into()),
        Err(e) if e.is_not_found() => Ok(fs.mkdir(remote)?),
        Err(e) => Err(e.into()),
    }
}

fn send_file(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    source: &Path,
    target: &str,
) -> Result<bool> {
    if fs.exists(target)? && !ctx.confirm(&format!("Overwrite remote file {}?", target)) {
        return Ok(false);
    }

    let chunk_size = ctx.chunk_size();
    let bytes = with_fallback(
        fs,
        target,
        |fs| fs.upload(source, target),
        |fs| stream_upload(fs, source, target, chunk_size),
    )?;
    debug!("Uploaded {} ({} bytes)", target, bytes);
    Ok(true)
}

fn stream_upload(
    fs: &mut dyn RemoteFs,
    source: &Path,
    target: &str,
    chunk_size: usize,
) -> DriverResult<u64> {
    let mut file = File::open(source).map_err(local_err(source))?;
    fs.create(target)?;
    let mut buf = vec![0u8; chunk_size];
    let mut offset = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(local_err(source))?;
        if n == 0 {
            break;
        }
        fs.write_at(target, offset, &buf[..n])?;
        offset += n as u64;
    }
    Ok(offset)
}

// copy

fn duplicate(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    report: &mut BatchReport,
    source: &str,
    target: &str,
) -> Result<bool> {
    if path::is_within(target, source) {
        return Err(DriverError::InvalidPath {
            path: target.to_string(),
            reason: format!("cannot copy {} into itself", source),
        }
        .into());
    }

    let meta = fs.stat(source)?;
    if meta.is_collection() {
        let failures = report.failure_count();
        duplicate_collection(fs, ctx, report, source, target)?;
        return Ok(report.failure_count() == failures);
    }
    duplicate_file(fs, ctx, source, target)
}

fn duplicate_collection(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    report: &mut BatchReport,
    source: &str,
    target: &str,
) -> Result<()> {
    ensure_collection(fs, target)?;
    for entry in fs.list(source)? {
        let child_target = path::join(target, &entry.name);
        let outcome = if entry.is_collection() {
            duplicate_collection(fs, ctx, report, &entry.path, &child_target).map(|_| true)
        } else {
            duplicate_file(fs, ctx, &entry.path, &child_target)
        };
        if let Err(e) = outcome {
            ctx.item_failed(report, &entry.path, e)?;
        }
    }
    Ok(())
}

fn duplicate_file(
    fs: &mut dyn RemoteFs,
    ctx: &mut OpContext,
    source: &str,
    target: &str,
) -> Result<bool> {
    if fs.exists(target)? && !ctx.confirm(&format!("Overwrite remote file {}?", target)) {
        return Ok(false);
    }

    let chunk_size = ctx.chunk_size();
    let bytes = with_fallback(
        fs,
        source,
        |fs| fs.copy(source, target),
        |fs| stream_copy(fs, source, target, chunk_size),
    )?;
    debug!("Copied {} to {} ({} bytes)", source, target, bytes);
    Ok(true)
}

fn stream_copy(
    fs: &mut dyn RemoteFs,
    source: &str,
    target: &str,
    chunk_size: usize,
) -> DriverResult<u64> {
    fs.create(target)?;
    let mut buf = vec![0u8; chunk_size];
    let mut offset = 0u64;
    loop {
        let n = fs.read_at(source, offset, &mut buf)?;
        if n == 0 {
            break;
        }
        fs.write_at(target, offset, &buf[..n])?;
        offset += n as u64;
    }
    Ok(offset)
}
