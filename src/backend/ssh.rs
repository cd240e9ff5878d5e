//! SSH driver: SFTP for the namespace, exec channels for remote commands
//!
//! Enabled with the `ssh-backend` feature. Authentication follows the
//! driver configuration: the SSH agent when `driver.agent` is set, a private
//! key when `driver.key_file` is set (the account password unlocks it), and
//! the account password otherwise.
//!
//! SFTP has no user metadata and no server-side copy, so those calls return
//! [`DriverError::Unsupported`] and copies fall back to streaming.

use super::error::{DriverError, DriverResult};
use super::types::{CommandOutput, DirEntry, Metadata};
use super::{path, Driver, RemoteFs};
use crate::config::{Account, DriverConfig};

use secrecy::{ExposeSecret, SecretString};
use ssh2::{ErrorCode, FileStat, OpenFlags, OpenType, Session, Sftp};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info};

const DRIVER: &str = "ssh";

// libssh2 SFTP status codes
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_FILE_ALREADY_EXISTS: i32 = 11;
const FX_DIR_NOT_EMPTY: i32 = 18;

/// Authentication method
enum SshAuth {
    Password(SecretString),
    KeyFile {
        key_path: PathBuf,
        passphrase: Option<SecretString>,
    },
    Agent,
}

/// Opens SFTP sessions on an SSH server
#[derive(Debug, Clone, Default)]
pub struct SshDriver {
    key_file: Option<PathBuf>,
    agent: bool,
}

impl SshDriver {
    /// Password authentication with the account password
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            key_file: config.key_file.clone(),
            agent: config.agent,
        }
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_agent(mut self, agent: bool) -> Self {
        self.agent = agent;
        self
    }

    fn auth_for(&self, account: &Account) -> SshAuth {
        if self.agent {
            SshAuth::Agent
        } else if let Some(key_path) = &self.key_file {
            SshAuth::KeyFile {
                key_path: key_path.clone(),
                passphrase: account
                    .password_str()
                    .map(|p| SecretString::from(p.to_string())),
            }
        } else {
            SshAuth::Password(account.password.clone())
        }
    }
}

impl Driver for SshDriver {
    fn name(&self) -> &str {
        DRIVER
    }

    fn connect(&self, account: &Account) -> DriverResult<Box<dyn RemoteFs>> {
        let endpoint = account.endpoint();
        let failed = |message: String| DriverError::ConnectionFailed {
            endpoint: endpoint.clone(),
            message,
        };

        let addr = (account.host.as_str(), account.port)
            .to_socket_addrs()
            .map_err(|e| failed(format!("cannot resolve {}: {}", account.host, e)))?
            .next()
            .ok_or_else(|| failed(format!("no address for {}", account.host)))?;

        let timeout = Duration::from_secs(account.timeout_secs);
        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| failed(e.to_string()))?;
        tcp.set_read_timeout(Some(timeout)).ok();
        tcp.set_write_timeout(Some(timeout)).ok();

        let mut session = Session::new().map_err(|e| failed(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        session.handshake().map_err(|e| failed(e.to_string()))?;

        authenticate(&session, &account.username, self.auth_for(account))?;

        let sftp = session
            .sftp()
            .map_err(|e| failed(format!("cannot open SFTP channel: {}", e)))?;

        info!("Connected to {} over SSH", endpoint);
        Ok(Box::new(SshFs {
            session,
            sftp: Some(sftp),
            endpoint,
        }))
    }
}

fn authenticate(session: &Session, username: &str, auth: SshAuth) -> DriverResult<()> {
    let rejected = |message: String| DriverError::AuthenticationFailed {
        driver: DRIVER.to_string(),
        message,
    };

    match auth {
        SshAuth::Password(password) => session
            .userauth_password(username, password.expose_secret())
            .map_err(|e| rejected(format!("password authentication failed: {}", e)))?,
        SshAuth::KeyFile {
            key_path,
            passphrase,
        } => {
            let pass = passphrase.as_ref().map(|p| p.expose_secret());
            session
                .userauth_pubkey_file(username, None, &key_path, pass)
                .map_err(|e| rejected(format!("key file authentication failed: {}", e)))?
        }
        SshAuth::Agent => {
            let mut agent = session
                .agent()
                .map_err(|e| rejected(format!("cannot reach SSH agent: {}", e)))?;
            agent
                .connect()
                .map_err(|e| rejected(format!("cannot reach SSH agent: {}", e)))?;
            agent
                .list_identities()
                .map_err(|e| rejected(format!("cannot list agent identities: {}", e)))?;
            let identities = agent
                .identities()
                .map_err(|e| rejected(format!("cannot list agent identities: {}", e)))?;

            let accepted = identities
                .iter()
                .any(|identity| agent.userauth(username, identity).is_ok());
            if !accepted {
                return Err(rejected("no agent identity was accepted".to_string()));
            }
        }
    }

    if session.authenticated() {
        Ok(())
    } else {
        Err(rejected("server did not accept the credentials".to_string()))
    }
}

/// Map an SFTP status to a driver error for `path`
fn map_sftp(err: ssh2::Error, path: &str) -> DriverError {
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE) => DriverError::not_found(DRIVER, path),
        ErrorCode::SFTP(FX_PERMISSION_DENIED) => DriverError::PermissionDenied {
            path: path.to_string(),
            message: err.message().to_string(),
        },
        ErrorCode::SFTP(FX_FILE_ALREADY_EXISTS) => DriverError::AlreadyExists {
            path: path.to_string(),
        },
        ErrorCode::SFTP(FX_DIR_NOT_EMPTY) => DriverError::NotEmpty {
            path: path.to_string(),
        },
        _ => DriverError::other(DRIVER, format!("{}: {}", path, err)),
    }
}

fn to_metadata(stat: &FileStat) -> Metadata {
    let mut metadata = if stat.is_dir() {
        Metadata::collection()
    } else {
        Metadata::file(stat.size.unwrap_or(0))
    };
    if let Some(mtime) = stat.mtime {
        metadata = metadata.with_modified(UNIX_EPOCH + Duration::from_secs(mtime));
    }
    if let Some(perm) = stat.perm {
        metadata = metadata.with_permissions(perm & 0o7777);
    }
    metadata
}

/// One SSH connection with its SFTP channel
struct SshFs {
    session: Session,
    sftp: Option<Sftp>,
    endpoint: String,
}

impl SshFs {
    fn sftp(&self) -> DriverResult<&Sftp> {
        self.sftp.as_ref().ok_or_else(|| DriverError::ConnectionFailed {
            endpoint: self.endpoint.clone(),
            message: "connection is closed".to_string(),
        })
    }
}

impl RemoteFs for SshFs {
    fn driver_name(&self) -> &str {
        DRIVER
    }

    fn probe(&mut self) -> DriverResult<()> {
        self.sftp()?
            .realpath(Path::new("."))
            .map(|_| ())
            .map_err(|e| DriverError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })
    }

    fn stat(&mut self, remote: &str) -> DriverResult<Metadata> {
        let stat = self
            .sftp()?
            .stat(Path::new(remote))
            .map_err(|e| map_sftp(e, remote))?;
        Ok(to_metadata(&stat))
    }

    fn list(&mut self, remote: &str) -> DriverResult<Vec<DirEntry>> {
        if !self.stat(remote)?.is_collection() {
            return Err(DriverError::NotCollection {
                path: remote.to_string(),
            });
        }

        let children = self
            .sftp()?
            .readdir(Path::new(remote))
            .map_err(|e| map_sftp(e, remote))?;

        let mut entries: Vec<DirEntry> = children
            .iter()
            .filter_map(|(child, stat)| {
                let name = child.file_name()?.to_string_lossy().into_owned();
                let full = path::join(remote, &name);
                Some(DirEntry::new(name, full, to_metadata(stat)))
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&mut self, remote: &str) -> DriverResult<()> {
        if self.exists(remote)? {
            return Err(DriverError::AlreadyExists {
                path: remote.to_string(),
            });
        }
        self.sftp()?
            .mkdir(Path::new(remote), 0o755)
            .map_err(|e| map_sftp(e, remote))
    }

    fn rmdir(&mut self, remote: &str) -> DriverResult<()> {
        if !self.stat(remote)?.is_collection() {
            return Err(DriverError::NotCollection {
                path: remote.to_string(),
            });
        }
        let sftp = self.sftp()?;
        if !sftp
            .readdir(Path::new(remote))
            .map_err(|e| map_sftp(e, remote))?
            .is_empty()
        {
            return Err(DriverError::NotEmpty {
                path: remote.to_string(),
            });
        }
        sftp.rmdir(Path::new(remote)).map_err(|e| map_sftp(e, remote))
    }

    fn remove(&mut self, remote: &str) -> DriverResult<()> {
        if self.stat(remote)?.is_collection() {
            return Err(DriverError::IsCollection {
                path: remote.to_string(),
            });
        }
        self.sftp()?
            .unlink(Path::new(remote))
            .map_err(|e| map_sftp(e, remote))
    }

    fn rename(&mut self, src: &str, dest: &str) -> DriverResult<()> {
        self.stat(src)?;
        self.sftp()?
            .rename(Path::new(src), Path::new(dest), None)
            .map_err(|e| map_sftp(e, dest))
    }

    fn chmod(&mut self, remote: &str, mode: u32) -> DriverResult<()> {
        let stat = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: Some(mode),
            atime: None,
            mtime: None,
        };
        self.sftp()?
            .setstat(Path::new(remote), stat)
            .map_err(|e| map_sftp(e, remote))
    }

    fn create(&mut self, remote: &str) -> DriverResult<()> {
        self.sftp()?
            .create(Path::new(remote))
            .map(|_| ())
            .map_err(|e| map_sftp(e, remote))
    }

    fn read_at(&mut self, remote: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize> {
        let mut file = self
            .sftp()?
            .open(Path::new(remote))
            .map_err(|e| map_sftp(e, remote))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, remote: &str, offset: u64, data: &[u8]) -> DriverResult<()> {
        let mut file = self
            .sftp()?
            .open_mode(
                Path::new(remote),
                OpenFlags::WRITE | OpenFlags::CREATE,
                0o644,
                OpenType::File,
            )
            .map_err(|e| map_sftp(e, remote))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn download(&mut self, remote: &str, local: &Path) -> DriverResult<u64> {
        let mut source = self
            .sftp()?
            .open(Path::new(remote))
            .map_err(|e| map_sftp(e, remote))?;
        let mut target = std::fs::File::create(local)?;
        let copied = io::copy(&mut source, &mut target)?;
        debug!("Downloaded {} ({} bytes)", remote, copied);
        Ok(copied)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> DriverResult<u64> {
        let mut source = std::fs::File::open(local)?;
        let mut target = self
            .sftp()?
            .create(Path::new(remote))
            .map_err(|e| map_sftp(e, remote))?;
        let copied = io::copy(&mut source, &mut target)?;
        debug!("Uploaded {} ({} bytes)", remote, copied);
        Ok(copied)
    }

    fn execute(&mut self, command: &str, args: &[String]) -> DriverResult<CommandOutput> {
        let line = shell_words::join(std::iter::once(command).chain(args.iter().map(String::as_str)));
        let ssh_err = |e: ssh2::Error| DriverError::other(DRIVER, format!("{}: {}", command, e));

        let mut channel = self.session.channel_session().map_err(ssh_err)?;
        channel.exec(&line).map_err(ssh_err)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;

        channel.wait_close().map_err(ssh_err)?;
        let exit_status = channel.exit_status().map_err(ssh_err)?;
        debug!("Remote command '{}' exited with {}", line, exit_status);

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    fn close(&mut self) -> DriverResult<()> {
        self.sftp = None;
        self.session
            .disconnect(None, "gridlink session closed", None)
            .map_err(|e| DriverError::other(DRIVER, e.to_string()))
    }
}
