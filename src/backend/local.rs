//! Local directory driver
//!
//! Maps the remote namespace onto a directory tree on this machine: remote
//! path `/a/b` lives at `<root>/a/b`. User metadata is kept in a JSON sidecar
//! file at the root, hidden from listings.

use super::error::{DriverError, DriverResult};
use super::path;
use super::types::{Avu, CommandOutput, DirEntry, Metadata, MetadataCondition};
use super::{Driver, RemoteFs};
use crate::config::Account;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use walkdir::WalkDir;

const DRIVER: &str = "local";
const SIDECAR: &str = ".gridlink-metadata.json";

/// Driver that serves a local directory as the remote namespace
///
/// # Example
///
/// ```no_run
/// use gridlink::backend::{Driver, LocalDriver};
/// use gridlink::config::Account;
///
/// let driver = LocalDriver::new("/srv/grid");
/// let mut fs = driver.connect(&Account::default()).unwrap();
/// for entry in fs.list("/").unwrap() {
///     println!("{}", entry.name);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalDriver {
    root: PathBuf,
}

impl LocalDriver {
    /// Create a driver rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Driver for LocalDriver {
    fn name(&self) -> &str {
        DRIVER
    }

    fn connect(&self, account: &Account) -> DriverResult<Box<dyn RemoteFs>> {
        let meta = fs::metadata(&self.root).map_err(|e| DriverError::ConnectionFailed {
            endpoint: self.root.display().to_string(),
            message: e.to_string(),
        })?;
        if !meta.is_dir() {
            return Err(DriverError::ConnectionFailed {
                endpoint: self.root.display().to_string(),
                message: "root is not a directory".to_string(),
            });
        }

        debug!(
            "Opened local namespace at {} for {}",
            self.root.display(),
            account.username
        );
        Ok(Box::new(LocalFs {
            root: self.root.clone(),
        }))
    }
}

struct LocalFs {
    root: PathBuf,
}

type Sidecar = BTreeMap<String, Vec<Avu>>;

impl LocalFs {
    /// Resolve a remote path to its location under the root
    fn resolve(&self, remote: &str) -> DriverResult<PathBuf> {
        if !path::is_absolute(remote) {
            return Err(DriverError::InvalidPath {
                path: remote.to_string(),
                reason: "remote paths must be absolute".to_string(),
            });
        }
        let normalized = path::normalize(remote);
        Ok(self.root.join(normalized.trim_start_matches('/')))
    }

    fn io(remote: &str) -> impl FnOnce(std::io::Error) -> DriverError + '_ {
        move |e| DriverError::from_io(DRIVER, remote, e)
    }

    fn convert_metadata(meta: &fs::Metadata) -> Metadata {
        let mut metadata = if meta.is_dir() {
            Metadata::collection()
        } else {
            Metadata::file(meta.len())
        };
        metadata.modified = meta.modified().ok();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions = Some(meta.permissions().mode() & 0o7777);
        }

        metadata
    }

    fn load_sidecar(&self) -> DriverResult<Sidecar> {
        match fs::read(self.root.join(SIDECAR)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| DriverError::other(DRIVER, format!("corrupt metadata store: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::new()),
            Err(e) => Err(DriverError::Io(e)),
        }
    }

    fn save_sidecar(&self, sidecar: &Sidecar) -> DriverResult<()> {
        let json = serde_json::to_vec_pretty(sidecar)
            .map_err(|e| DriverError::other(DRIVER, e.to_string()))?;
        fs::write(self.root.join(SIDECAR), json)?;
        Ok(())
    }

    fn is_sidecar(&self, local: &Path) -> bool {
        local == self.root.join(SIDECAR)
    }
}

impl RemoteFs for LocalFs {
    fn driver_name(&self) -> &str {
        DRIVER
    }

    fn probe(&mut self) -> DriverResult<()> {
        fs::metadata(&self.root)
            .map(|_| ())
            .map_err(|e| DriverError::ConnectionFailed {
                endpoint: self.root.display().to_string(),
                message: e.to_string(),
            })
    }

    fn stat(&mut self, remote: &str) -> DriverResult<Metadata> {
        let local = self.resolve(remote)?;
        let meta = fs::metadata(&local).map_err(Self::io(remote))?;
        Ok(Self::convert_metadata(&meta))
    }

    fn list(&mut self, remote: &str) -> DriverResult<Vec<DirEntry>> {
        let local = self.resolve(remote)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&local).map_err(Self::io(remote))? {
            let entry = entry?;
            if self.is_sidecar(&entry.path()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            entries.push(DirEntry::new(
                name.clone(),
                path::join(&path::normalize(remote), &name),
                Self::convert_metadata(&meta),
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&mut self, remote: &str) -> DriverResult<()> {
        let local = self.resolve(remote)?;
        fs::create_dir(&local).map_err(Self::io(remote))
    }

    fn rmdir(&mut self, remote: &str) -> DriverResult<()> {
        let local = self.resolve(remote)?;
        if !fs::metadata(&local).map_err(Self::io(remote))?.is_dir() {
            return Err(DriverError::NotCollection {
                path: remote.to_string(),
            });
        }
        if fs::read_dir(&local)?.next().is_some() {
            return Err(DriverError::NotEmpty {
                path: remote.to_string(),
            });
        }
        fs::remove_dir(&local).map_err(Self::io(remote))
    }

    fn remove(&mut self, remote: &str) -> DriverResult<()> {
        let local = self.resolve(remote)?;
        if fs::metadata(&local).map_err(Self::io(remote))?.is_dir() {
            return Err(DriverError::IsCollection {
                path: remote.to_string(),
            });
        }
        fs::remove_file(&local).map_err(Self::io(remote))
    }

    fn rename(&mut self, src: &str, dest: &str) -> DriverResult<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dest)?;
        fs::metadata(&from).map_err(Self::io(src))?;
        if to.exists() {
            return Err(DriverError::AlreadyExists {
                path: dest.to_string(),
            });
        }
        fs::rename(&from, &to).map_err(Self::io(dest))
    }

    #[cfg(unix)]
    fn chmod(&mut self, remote: &str, mode: u32) -> DriverResult<()> {
        use std::os::unix::fs::PermissionsExt;
        let local = self.resolve(remote)?;
        fs::set_permissions(&local, fs::Permissions::from_mode(mode & 0o7777))
            .map_err(Self::io(remote))
    }

    fn create(&mut self, remote: &str) -> DriverResult<()> {
        let local = self.resolve(remote)?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&local)
            .map(|_| ())
            .map_err(Self::io(remote))
    }

    fn read_at(&mut self, remote: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize> {
        let local = self.resolve(remote)?;
        let mut file = fs::File::open(&local).map_err(Self::io(remote))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, remote: &str, offset: u64, data: &[u8]) -> DriverResult<()> {
        let local = self.resolve(remote)?;
        let mut file = OpenOptions::new()
            .write(true)
            .open(&local)
            .map_err(Self::io(remote))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn download(&mut self, remote: &str, local: &Path) -> DriverResult<u64> {
        let source = self.resolve(remote)?;
        if fs::metadata(&source).map_err(Self::io(remote))?.is_dir() {
            return Err(DriverError::IsCollection {
                path: remote.to_string(),
            });
        }
        Ok(fs::copy(&source, local)?)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> DriverResult<u64> {
        let target = self.resolve(remote)?;
        Ok(fs::copy(local, &target).map_err(Self::io(remote))?)
    }

    fn copy(&mut self, src: &str, dest: &str) -> DriverResult<u64> {
        let from = self.resolve(src)?;
        let to = self.resolve(dest)?;
        Ok(fs::copy(&from, &to).map_err(Self::io(src))?)
    }

    fn get_metadata(&mut self, remote: &str) -> DriverResult<Vec<Avu>> {
        self.stat(remote)?;
        let key = path::normalize(remote);
        Ok(self.load_sidecar()?.remove(&key).unwrap_or_default())
    }

    fn add_metadata(&mut self, remote: &str, avu: &Avu) -> DriverResult<()> {
        self.stat(remote)?;
        let mut sidecar = self.load_sidecar()?;
        let avus = sidecar.entry(path::normalize(remote)).or_default();
        if !avus.contains(avu) {
            avus.push(avu.clone());
        }
        self.save_sidecar(&sidecar)
    }

    fn query_metadata(
        &mut self,
        scope: &str,
        conditions: &[MetadataCondition],
    ) -> DriverResult<Vec<String>> {
        let local_scope = self.resolve(scope)?;
        fs::metadata(&local_scope).map_err(Self::io(scope))?;
        let sidecar = self.load_sidecar()?;

        let mut found = Vec::new();
        for entry in WalkDir::new(&local_scope).sort_by_file_name() {
            let entry = entry.map_err(|e| DriverError::other(DRIVER, e.to_string()))?;
            if self.is_sidecar(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let remote = path::normalize(&format!("/{}", relative.to_string_lossy()));
            let Some(avus) = sidecar.get(&remote) else {
                continue;
            };
            if conditions
                .iter()
                .all(|cond| avus.iter().any(|avu| cond.matches(avu)))
            {
                found.push(remote);
            }
        }
        Ok(found)
    }

    fn execute(&mut self, command: &str, args: &[String]) -> DriverResult<CommandOutput> {
        let output = Command::new(command)
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| DriverError::other(DRIVER, format!("failed to run {}: {}", command, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code().unwrap_or(-1),
        })
    }
}
