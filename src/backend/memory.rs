//! In-memory grid namespace
//!
//! [`MemoryDriver`] keeps files, collections and user metadata in process
//! memory. Every connection it opens shares the same namespace, so data
//! survives reconnects. Fault hooks let callers kill the transport, refuse
//! connects, or break the bulk and streaming transfer paths.
//!
//! # Example
//!
//! ```
//! use gridlink::backend::{Driver, MemoryDriver};
//! use gridlink::config::Account;
//!
//! let driver = MemoryDriver::new();
//! let mut fs = driver.connect(&Account::default()).unwrap();
//! fs.probe().unwrap();
//!
//! driver.kill_transport();
//! assert!(fs.probe().is_err());
//! ```

use super::error::{DriverError, DriverResult};
use super::path;
use super::types::{Avu, CommandOutput, DirEntry, EntryKind, Metadata, MetadataCondition};
use super::{Driver, RemoteFs};
use crate::config::Account;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::debug;

const DRIVER: &str = "memory";

#[derive(Debug, Clone)]
struct Node {
    kind: EntryKind,
    data: Vec<u8>,
    permissions: u32,
    modified: SystemTime,
    avus: Vec<Avu>,
}

impl Node {
    fn file(data: Vec<u8>) -> Self {
        Self {
            kind: EntryKind::File,
            data,
            permissions: 0o644,
            modified: SystemTime::now(),
            avus: Vec::new(),
        }
    }

    fn collection() -> Self {
        Self {
            kind: EntryKind::Collection,
            data: Vec::new(),
            permissions: 0o755,
            modified: SystemTime::now(),
            avus: Vec::new(),
        }
    }

    fn metadata(&self) -> Metadata {
        let meta = match self.kind {
            EntryKind::File => Metadata::file(self.data.len() as u64),
            EntryKind::Collection => Metadata::collection(),
        };
        meta.with_modified(self.modified)
            .with_permissions(self.permissions)
    }
}

#[derive(Debug)]
struct Namespace {
    nodes: BTreeMap<String, Node>,
}

impl Namespace {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::collection());
        Self { nodes }
    }

    fn node(&self, path: &str) -> DriverResult<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| DriverError::not_found(DRIVER, path))
    }

    fn node_mut(&mut self, path: &str) -> DriverResult<&mut Node> {
        self.nodes
            .get_mut(path)
            .ok_or_else(|| DriverError::not_found(DRIVER, path))
    }

    fn file_mut(&mut self, path: &str) -> DriverResult<&mut Node> {
        let node = self.node_mut(path)?;
        if node.kind != EntryKind::File {
            return Err(DriverError::IsCollection {
                path: path.to_string(),
            });
        }
        Ok(node)
    }

    fn require_parent(&self, path: &str) -> DriverResult<()> {
        let parent = path::parent(path).ok_or_else(|| DriverError::InvalidPath {
            path: path.to_string(),
            reason: "the root has no parent".to_string(),
        })?;
        match self.nodes.get(&parent) {
            Some(node) if node.kind == EntryKind::Collection => Ok(()),
            Some(_) => Err(DriverError::NotCollection { path: parent }),
            None => Err(DriverError::not_found(DRIVER, &parent)),
        }
    }

    fn ensure_parents(&mut self, path: &str) {
        let mut current = path::parent(path);
        let mut missing = Vec::new();
        while let Some(dir) = current {
            if self.nodes.contains_key(&dir) {
                break;
            }
            current = path::parent(&dir);
            missing.push(dir);
        }
        for dir in missing.into_iter().rev() {
            self.nodes.insert(dir, Node::collection());
        }
    }

    fn children(&self, dir: &str) -> Vec<(String, &Node)> {
        self.nodes
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && path::parent(p).as_deref() == Some(dir))
            .map(|(p, n)| (p.clone(), n))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Faults {
    generation: u64,
    refused_connects: u32,
    refuse_all: bool,
    bulk_broken: bool,
    stream_broken: bool,
    failing_paths: HashSet<String>,
    credentials: Option<(String, String)>,
    commands: HashMap<String, CommandOutput>,
    connect_attempts: u64,
    probes: u64,
    closes: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Driver backed by an in-process namespace shared by all its connections
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    namespace: Arc<Mutex<Namespace>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryDriver {
    /// Create a driver with an empty namespace (only `/` exists)
    pub fn new() -> Self {
        Self {
            namespace: Arc::new(Mutex::new(Namespace::new())),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Require these credentials on connect
    pub fn with_credentials(self, username: &str, password: &str) -> Self {
        lock(&self.faults).credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Add a file, creating missing parent collections
    pub fn add_file(&self, remote: &str, data: &[u8]) {
        let remote = path::normalize(remote);
        let mut ns = lock(&self.namespace);
        ns.ensure_parents(&remote);
        ns.nodes.insert(remote, Node::file(data.to_vec()));
    }

    /// Add a collection, creating missing parents
    pub fn add_collection(&self, remote: &str) {
        let remote = path::normalize(remote);
        let mut ns = lock(&self.namespace);
        ns.ensure_parents(&remote);
        ns.nodes.entry(remote).or_insert_with(Node::collection);
    }

    /// Attach a metadata triple to an existing path
    pub fn attach_metadata(&self, remote: &str, avu: Avu) {
        if let Some(node) = lock(&self.namespace).nodes.get_mut(&path::normalize(remote)) {
            node.avus.push(avu);
        }
    }

    /// Content of a file, if it exists
    pub fn file_data(&self, remote: &str) -> Option<Vec<u8>> {
        lock(&self.namespace)
            .nodes
            .get(&path::normalize(remote))
            .filter(|n| n.kind == EntryKind::File)
            .map(|n| n.data.clone())
    }

    /// True if a file or collection exists at `remote`
    pub fn contains(&self, remote: &str) -> bool {
        lock(&self.namespace)
            .nodes
            .contains_key(&path::normalize(remote))
    }

    /// Permission bits of a path
    pub fn permissions(&self, remote: &str) -> Option<u32> {
        lock(&self.namespace)
            .nodes
            .get(&path::normalize(remote))
            .map(|n| n.permissions)
    }

    /// Register the output returned when `command` is executed
    pub fn register_command(&self, command: &str, output: CommandOutput) {
        lock(&self.faults)
            .commands
            .insert(command.to_string(), output);
    }

    /// Break every connection opened so far; new connections are unaffected
    pub fn kill_transport(&self) {
        lock(&self.faults).generation += 1;
    }

    /// Make the next `count` connect attempts fail
    pub fn refuse_connects(&self, count: u32) {
        lock(&self.faults).refused_connects = count;
    }

    /// Make every connect attempt fail until switched off
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.faults).refuse_all = unreachable;
    }

    /// Make bulk download/upload/copy fail
    pub fn break_bulk_transfers(&self, broken: bool) {
        lock(&self.faults).bulk_broken = broken;
    }

    /// Make `read_at`/`write_at` fail
    pub fn break_streaming(&self, broken: bool) {
        lock(&self.faults).stream_broken = broken;
    }

    /// Make every data operation on `remote` fail with an I/O error
    pub fn fail_path(&self, remote: &str) {
        lock(&self.faults)
            .failing_paths
            .insert(path::normalize(remote));
    }

    /// Connect attempts seen so far, successful or not
    pub fn connect_attempts(&self) -> u64 {
        lock(&self.faults).connect_attempts
    }

    /// Liveness probes seen so far
    pub fn probe_count(&self) -> u64 {
        lock(&self.faults).probes
    }

    /// Connections closed so far
    pub fn close_count(&self) -> u64 {
        lock(&self.faults).closes
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        DRIVER
    }

    fn connect(&self, account: &Account) -> DriverResult<Box<dyn RemoteFs>> {
        let mut faults = lock(&self.faults);
        faults.connect_attempts += 1;

        if faults.refuse_all || faults.refused_connects > 0 {
            faults.refused_connects = faults.refused_connects.saturating_sub(1);
            return Err(DriverError::ConnectionFailed {
                endpoint: account.endpoint(),
                message: "connection refused".to_string(),
            });
        }

        if let Some((username, password)) = &faults.credentials {
            if account.username != *username || account.password_str() != Some(password.as_str())
            {
                return Err(DriverError::AuthenticationFailed {
                    driver: DRIVER.to_string(),
                    message: format!("invalid credentials for {}", account.username),
                });
            }
        }

        debug!("Opened memory connection generation {}", faults.generation);
        Ok(Box::new(MemoryFs {
            namespace: Arc::clone(&self.namespace),
            faults: Arc::clone(&self.faults),
            generation: faults.generation,
            closed: false,
        }))
    }
}

/// Connection to a [`MemoryDriver`] namespace
struct MemoryFs {
    namespace: Arc<Mutex<Namespace>>,
    faults: Arc<Mutex<Faults>>,
    generation: u64,
    closed: bool,
}

impl MemoryFs {
    fn check_alive(&self) -> DriverResult<()> {
        if self.closed || self.generation < lock(&self.faults).generation {
            return Err(DriverError::ConnectionFailed {
                endpoint: DRIVER.to_string(),
                message: "transport closed".to_string(),
            });
        }
        Ok(())
    }

    fn check_path(&self, remote: &str) -> DriverResult<()> {
        self.check_alive()?;
        if lock(&self.faults).failing_paths.contains(remote) {
            return Err(DriverError::Io(std::io::Error::other(format!(
                "simulated I/O failure on {}",
                remote
            ))));
        }
        Ok(())
    }

    fn check_bulk(&self) -> DriverResult<()> {
        if lock(&self.faults).bulk_broken {
            return Err(DriverError::other(DRIVER, "parallel transfer failed"));
        }
        Ok(())
    }

    fn check_stream(&self) -> DriverResult<()> {
        if lock(&self.faults).stream_broken {
            return Err(DriverError::other(DRIVER, "stream transfer failed"));
        }
        Ok(())
    }
}

impl RemoteFs for MemoryFs {
    fn driver_name(&self) -> &str {
        DRIVER
    }

    fn probe(&mut self) -> DriverResult<()> {
        lock(&self.faults).probes += 1;
        self.check_alive()
    }

    fn stat(&mut self, remote: &str) -> DriverResult<Metadata> {
        self.check_path(remote)?;
        Ok(lock(&self.namespace).node(remote)?.metadata())
    }

    fn list(&mut self, remote: &str) -> DriverResult<Vec<DirEntry>> {
        self.check_path(remote)?;
        let ns = lock(&self.namespace);
        let node = ns.node(remote)?;
        if node.kind == EntryKind::File {
            return Err(DriverError::NotCollection {
                path: remote.to_string(),
            });
        }

        let mut entries: Vec<DirEntry> = ns
            .children(remote)
            .into_iter()
            .map(|(p, n)| DirEntry::new(path::file_name(&p), p.clone(), n.metadata()))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&mut self, remote: &str) -> DriverResult<()> {
        self.check_path(remote)?;
        let mut ns = lock(&self.namespace);
        if ns.nodes.contains_key(remote) {
            return Err(DriverError::AlreadyExists {
                path: remote.to_string(),
            });
        }
        ns.require_parent(remote)?;
        ns.nodes.insert(remote.to_string(), Node::collection());
        Ok(())
    }

    fn rmdir(&mut self, remote: &str) -> DriverResult<()> {
        self.check_path(remote)?;
        let mut ns = lock(&self.namespace);
        if ns.node(remote)?.kind != EntryKind::Collection {
            return Err(DriverError::NotCollection {
                path: remote.to_string(),
            });
        }
        if remote == "/" {
            return Err(DriverError::PermissionDenied {
                path: remote.to_string(),
                message: "cannot remove the root collection".to_string(),
            });
        }
        if !ns.children(remote).is_empty() {
            return Err(DriverError::NotEmpty {
                path: remote.to_string(),
            });
        }
        ns.nodes.remove(remote);
        Ok(())
    }

    fn remove(&mut self, remote: &str) -> DriverResult<()> {
        self.check_path(remote)?;
        let mut ns = lock(&self.namespace);
        ns.file_mut(remote)?;
        ns.nodes.remove(remote);
        Ok(())
    }

    fn rename(&mut self, src: &str, dest: &str) -> DriverResult<()> {
        self.check_path(src)?;
        self.check_path(dest)?;
        let mut ns = lock(&self.namespace);
        ns.node(src)?;
        if ns.nodes.contains_key(dest) {
            return Err(DriverError::AlreadyExists {
                path: dest.to_string(),
            });
        }
        if path::is_within(dest, src) {
            return Err(DriverError::InvalidPath {
                path: dest.to_string(),
                reason: format!("cannot move {} inside itself", src),
            });
        }
        ns.require_parent(dest)?;

        let moved: Vec<String> = ns
            .nodes
            .keys()
            .filter(|p| path::is_within(p, src))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = ns.nodes.remove(&old) {
                let new = format!("{}{}", dest, &old[src.len()..]);
                ns.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn chmod(&mut self, remote: &str, mode: u32) -> DriverResult<()> {
        self.check_path(remote)?;
        lock(&self.namespace).node_mut(remote)?.permissions = mode & 0o7777;
        Ok(())
    }

    fn create(&mut self, remote: &str) -> DriverResult<()> {
        self.check_path(remote)?;
        let mut ns = lock(&self.namespace);
        if let Some(node) = ns.nodes.get(remote) {
            if node.kind == EntryKind::Collection {
                return Err(DriverError::IsCollection {
                    path: remote.to_string(),
                });
            }
        }
        ns.require_parent(remote)?;
        ns.nodes.insert(remote.to_string(), Node::file(Vec::new()));
        Ok(())
    }

    fn read_at(&mut self, remote: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize> {
        self.check_path(remote)?;
        self.check_stream()?;
        let mut ns = lock(&self.namespace);
        let node = ns.file_mut(remote)?;
        let start = (offset as usize).min(node.data.len());
        let end = (start + buf.len()).min(node.data.len());
        buf[..end - start].copy_from_slice(&node.data[start..end]);
        Ok(end - start)
    }

    fn write_at(&mut self, remote: &str, offset: u64, data: &[u8]) -> DriverResult<()> {
        self.check_path(remote)?;
        self.check_stream()?;
        let mut ns = lock(&self.namespace);
        let node = ns.file_mut(remote)?;
        let start = offset as usize;
        if node.data.len() < start + data.len() {
            node.data.resize(start + data.len(), 0);
        }
        node.data[start..start + data.len()].copy_from_slice(data);
        node.modified = SystemTime::now();
        Ok(())
    }

    fn download(&mut self, remote: &str, local: &Path) -> DriverResult<u64> {
        self.check_path(remote)?;
        self.check_bulk()?;
        let data = lock(&self.namespace).file_mut(remote)?.data.clone();
        std::fs::write(local, &data)?;
        Ok(data.len() as u64)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> DriverResult<u64> {
        self.check_path(remote)?;
        self.check_bulk()?;
        let data = std::fs::read(local)?;
        let len = data.len() as u64;
        let mut ns = lock(&self.namespace);
        ns.require_parent(remote)?;
        ns.nodes.insert(remote.to_string(), Node::file(data));
        Ok(len)
    }

    fn copy(&mut self, src: &str, dest: &str) -> DriverResult<u64> {
        self.check_path(src)?;
        self.check_path(dest)?;
        self.check_bulk()?;
        let mut ns = lock(&self.namespace);
        let data = ns.file_mut(src)?.data.clone();
        ns.require_parent(dest)?;
        let len = data.len() as u64;
        ns.nodes.insert(dest.to_string(), Node::file(data));
        Ok(len)
    }

    fn get_metadata(&mut self, remote: &str) -> DriverResult<Vec<Avu>> {
        self.check_path(remote)?;
        Ok(lock(&self.namespace).node(remote)?.avus.clone())
    }

    fn add_metadata(&mut self, remote: &str, avu: &Avu) -> DriverResult<()> {
        self.check_path(remote)?;
        let mut ns = lock(&self.namespace);
        let node = ns.node_mut(remote)?;
        if !node.avus.contains(avu) {
            node.avus.push(avu.clone());
        }
        Ok(())
    }

    fn query_metadata(
        &mut self,
        scope: &str,
        conditions: &[MetadataCondition],
    ) -> DriverResult<Vec<String>> {
        self.check_path(scope)?;
        let ns = lock(&self.namespace);
        ns.node(scope)?;
        Ok(ns
            .nodes
            .iter()
            .filter(|(p, _)| path::is_within(p, scope))
            .filter(|(_, node)| {
                conditions
                    .iter()
                    .all(|cond| node.avus.iter().any(|avu| cond.matches(avu)))
            })
            .map(|(p, _)| p.clone())
            .collect())
    }

    fn execute(&mut self, command: &str, args: &[String]) -> DriverResult<CommandOutput> {
        self.check_alive()?;
        let faults = lock(&self.faults);
        let full = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        let output = faults
            .commands
            .get(&full)
            .or_else(|| faults.commands.get(command))
            .cloned()
            .unwrap_or_else(|| CommandOutput {
                stdout: String::new(),
                stderr: format!("{}: command not found\n", command),
                exit_status: 127,
            });
        Ok(output)
    }

    fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            lock(&self.faults).closes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Operator;

    fn connect(driver: &MemoryDriver) -> Box<dyn RemoteFs> {
        driver.connect(&Account::default()).unwrap()
    }

    #[test]
    fn test_add_file_creates_parents() {
        let driver = MemoryDriver::new();
        driver.add_file("/home/kepler/data/run1.bin", b"abc");
        assert!(driver.contains("/home/kepler/data"));

        let mut fs = connect(&driver);
        assert!(fs.stat("/home/kepler").unwrap().is_collection());
        assert_eq!(fs.stat("/home/kepler/data/run1.bin").unwrap().size, 3);
    }

    #[test]
    fn test_list_is_sorted_and_direct_only() {
        let driver = MemoryDriver::new();
        driver.add_file("/c/zeta.txt", b"");
        driver.add_file("/c/alpha.txt", b"");
        driver.add_file("/c/sub/deep.txt", b"");

        let mut fs = connect(&driver);
        let names: Vec<String> = fs
            .list("/c")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["alpha.txt", "sub", "zeta.txt"]);
    }

    #[test]
    fn test_kill_transport_breaks_only_existing_connections() {
        let driver = MemoryDriver::new();
        let mut old = connect(&driver);
        driver.kill_transport();
        assert!(old.probe().is_err());
        assert!(old.stat("/").is_err());

        let mut fresh = connect(&driver);
        assert!(fresh.probe().is_ok());
        assert_eq!(driver.probe_count(), 2);
    }

    #[test]
    fn test_refuse_connects() {
        let driver = MemoryDriver::new();
        driver.refuse_connects(1);
        assert!(driver.connect(&Account::default()).is_err());
        assert!(driver.connect(&Account::default()).is_ok());
        assert_eq!(driver.connect_attempts(), 2);
    }

    #[test]
    fn test_credentials_checked() {
        let driver = MemoryDriver::new().with_credentials("kepler", "secret");
        let mut account = Account::default();
        account.username = "kepler".to_string();
        account.set_password("wrong");
        let err = driver.connect(&account).err().unwrap();
        assert!(err.is_auth_error());

        account.set_password("secret");
        assert!(driver.connect(&account).is_ok());
    }

    #[test]
    fn test_read_write_at() {
        let driver = MemoryDriver::new();
        let mut fs = connect(&driver);
        fs.create("/f.bin").unwrap();
        fs.write_at("/f.bin", 0, b"hello ").unwrap();
        fs.write_at("/f.bin", 6, b"world").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(fs.read_at("/f.bin", 6, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"worl");
        assert_eq!(fs.read_at("/f.bin", 11, &mut buf).unwrap(), 0);
        assert_eq!(driver.file_data("/f.bin").unwrap(), b"hello world");
    }

    #[test]
    fn test_rename_moves_subtree() {
        let driver = MemoryDriver::new();
        driver.add_file("/a/x/1.txt", b"1");
        driver.add_collection("/b");
        let mut fs = connect(&driver);

        fs.rename("/a/x", "/b/y").unwrap();
        assert!(driver.contains("/b/y/1.txt"));
        assert!(!driver.contains("/a/x"));
        assert!(fs.rename("/b", "/b/y/inner").is_err());
    }

    #[test]
    fn test_rmdir_requires_empty() {
        let driver = MemoryDriver::new();
        driver.add_file("/d/f", b"");
        let mut fs = connect(&driver);
        assert!(matches!(
            fs.rmdir("/d").unwrap_err(),
            DriverError::NotEmpty { .. }
        ));
        fs.remove("/d/f").unwrap();
        fs.rmdir("/d").unwrap();
        assert!(!driver.contains("/d"));
    }

    #[test]
    fn test_bulk_and_stream_faults() {
        let driver = MemoryDriver::new();
        driver.add_file("/f", b"data");
        let mut fs = connect(&driver);

        driver.break_bulk_transfers(true);
        assert!(fs.copy("/f", "/g").is_err());
        let mut buf = [0u8; 8];
        assert_eq!(fs.read_at("/f", 0, &mut buf).unwrap(), 4);

        driver.break_streaming(true);
        assert!(fs.read_at("/f", 0, &mut buf).is_err());
    }

    #[test]
    fn test_query_metadata() {
        let driver = MemoryDriver::new();
        driver.add_file("/obs/adcp1.bin", b"");
        driver.add_file("/obs/adcp2.bin", b"");
        driver.add_file("/other/ctd.csv", b"");
        driver.attach_metadata("/obs/adcp1.bin", Avu::new("depth", "12"));
        driver.attach_metadata("/obs/adcp2.bin", Avu::new("depth", "4"));
        driver.attach_metadata("/other/ctd.csv", Avu::new("depth", "30"));

        let mut fs = connect(&driver);
        let cond = MetadataCondition::new("depth", Operator::GreaterThan, "10");
        let found = fs.query_metadata("/obs", &[cond]).unwrap();
        assert_eq!(found, vec!["/obs/adcp1.bin".to_string()]);
    }

    #[test]
    fn test_execute_registered_command() {
        let driver = MemoryDriver::new();
        driver.register_command(
            "hostname",
            CommandOutput {
                stdout: "grid01\n".to_string(),
                ..Default::default()
            },
        );
        let mut fs = connect(&driver);
        assert_eq!(fs.execute("hostname", &[]).unwrap().stdout, "grid01\n");
        assert_eq!(fs.execute("nope", &[]).unwrap().exit_status, 127);
    }

    #[test]
    fn test_close_counts_once() {
        let driver = MemoryDriver::new();
        let mut fs = connect(&driver);
        fs.close().unwrap();
        fs.close().unwrap();
        assert_eq!(driver.close_count(), 1);
        assert!(fs.probe().is_err());
    }
}
