/*!
 * Operation wrappers
 *
 * Every wrapper validates its arguments without touching the network, runs
 * through [`Session::with_session`], and maps its inputs through the remote
 * operation one item at a time. Item failures are collected in a
 * [`BatchReport`] under [`ErrorMode::Skip`]; under [`ErrorMode::Abort`] the
 * first one ends the call as [`GridError::Operation`].
 */

pub mod exec;
pub mod manage;
pub mod metadata;
pub mod transfer;

pub use exec::exec;
pub use manage::{chmod, list, mkdir, move_paths, remove, rmdir, ListFilter};
pub use metadata::{add_metadata, get_metadata, query_metadata, PathMetadata};
pub use transfer::{copy, get, put};

use gridlink_core_resilience::BatchReport;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use crate::backend::{path, Avu, CommandOutput, DirEntry, DriverError, MetadataCondition};
use crate::config::{ErrorMode, TransferConfig};
use crate::confirm::{self, AlwaysConfirm, Confirm};
use crate::error::{GridError, Result, EXIT_PARTIAL, EXIT_SUCCESS};
use crate::session::Session;

/// Block size of the streaming fallback unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 20_000;

/// Per-call settings shared by the wrappers
pub struct OpContext {
    confirm: Box<dyn Confirm>,
    chunk_size: usize,
    error_mode: ErrorMode,
}

impl OpContext {
    /// Overwrite without asking, skip failing items, 20000-byte chunks
    pub fn new() -> Self {
        Self {
            confirm: Box::new(AlwaysConfirm),
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_mode: ErrorMode::Skip,
        }
    }

    pub fn from_config(transfer: &TransferConfig) -> Self {
        Self {
            confirm: confirm::for_policy(transfer.overwrite),
            chunk_size: transfer.chunk_size.max(1),
            error_mode: transfer.error_mode,
        }
    }

    pub fn with_confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    pub fn with_error_mode(mut self, error_mode: ErrorMode) -> Self {
        self.error_mode = error_mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub(crate) fn confirm(&mut self, message: &str) -> bool {
        self.confirm.confirm(message)
    }

    /// Settle one failed item according to the error mode.
    ///
    /// Only driver failures are item-level. A lost connection and anything
    /// else end the call whatever the error mode.
    pub(crate) fn item_failed(
        &self,
        report: &mut BatchReport,
        subject: &str,
        err: GridError,
    ) -> Result<()> {
        let source = match err {
            GridError::Driver(source) if !source.is_connection_lost() => source,
            other => return Err(other),
        };

        match self.error_mode {
            ErrorMode::Skip => {
                let line = failure_line(subject, &source);
                debug!("Item failed: {}", line);
                report.record_failure(line);
                Ok(())
            }
            ErrorMode::Abort => Err(GridError::Driver(source)),
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpContext")
            .field("chunk_size", &self.chunk_size)
            .field("error_mode", &self.error_mode)
            .finish()
    }
}

/// User-visible line for one failed item
fn failure_line(subject: &str, err: &DriverError) -> String {
    match err {
        DriverError::NotFound { path, .. } => format!("file {} does not exist.", path),
        DriverError::IsCollection { path } => format!("{} is a collection.", path),
        other => format!("{}: {}", subject, other),
    }
}

/// Reject relative remote paths; an empty list is an empty batch
pub(crate) fn require_remote_paths(what: &str, paths: &[String]) -> Result<()> {
    for p in paths {
        require_remote_path(what, p)?;
    }
    Ok(())
}

pub(crate) fn require_remote_path(what: &str, remote: &str) -> Result<()> {
    if !path::is_absolute(remote) {
        return Err(GridError::validation(format!(
            "{} must be an absolute remote path, got '{}'",
            what, remote
        )));
    }
    Ok(())
}

/// One operation with its typed arguments, chosen once up front
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List {
        path: String,
        filter: ListFilter,
    },
    Get {
        sources: Vec<String>,
        dest: PathBuf,
    },
    Put {
        sources: Vec<PathBuf>,
        dest: String,
    },
    Copy {
        sources: Vec<String>,
        dest: String,
    },
    Move {
        sources: Vec<String>,
        dest: String,
    },
    Remove {
        paths: Vec<String>,
        recursive: bool,
    },
    Mkdir {
        paths: Vec<String>,
        parents: bool,
    },
    Rmdir {
        paths: Vec<String>,
    },
    Chmod {
        paths: Vec<String>,
        mode: u32,
    },
    GetMetadata {
        paths: Vec<String>,
    },
    AddMetadata {
        paths: Vec<String>,
        avu: Avu,
    },
    QueryMetadata {
        scope: String,
        conditions: Vec<MetadataCondition>,
    },
    Exec {
        command: String,
        args: Vec<String>,
    },
    /// Only confirm that the session is live
    Probe,
}

/// What a [`Command`] produced
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Listing(Vec<DirEntry>),
    Batch(BatchReport),
    Metadata {
        entries: Vec<PathMetadata>,
        report: BatchReport,
    },
    Paths(Vec<String>),
    Output(CommandOutput),
    Live {
        endpoint: String,
    },
}

impl CommandOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        let partial = match self {
            CommandOutcome::Batch(report) | CommandOutcome::Metadata { report, .. } => {
                !report.is_success()
            }
            CommandOutcome::Output(output) => !output.success(),
            CommandOutcome::Listing(_) | CommandOutcome::Paths(_) | CommandOutcome::Live { .. } => {
                false
            }
        };
        if partial {
            EXIT_PARTIAL
        } else {
            EXIT_SUCCESS
        }
    }
}

impl Command {
    /// Component name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::List { .. } => manage::LIST,
            Command::Get { .. } => transfer::GET,
            Command::Put { .. } => transfer::PUT,
            Command::Copy { .. } => transfer::COPY,
            Command::Move { .. } => manage::MOVE,
            Command::Remove { .. } => manage::REMOVE,
            Command::Mkdir { .. } => manage::MKDIR,
            Command::Rmdir { .. } => manage::RMDIR,
            Command::Chmod { .. } => manage::CHMOD,
            Command::GetMetadata { .. } => metadata::GET_METADATA,
            Command::AddMetadata { .. } => metadata::ADD_METADATA,
            Command::QueryMetadata { .. } => metadata::QUERY_METADATA,
            Command::Exec { .. } => exec::EXEC,
            Command::Probe => "probe",
        }
    }

    /// Run the command against `session`
    pub fn run(&self, session: &mut Session, ctx: &mut OpContext) -> Result<CommandOutcome> {
        debug!("Running {}", self.name());
        let outcome = match self {
            Command::List { path, filter } => CommandOutcome::Listing(list(session, path, *filter)?),
            Command::Get { sources, dest } => {
                CommandOutcome::Batch(get(session, ctx, sources, dest)?)
            }
            Command::Put { sources, dest } => {
                CommandOutcome::Batch(put(session, ctx, sources, dest)?)
            }
            Command::Copy { sources, dest } => {
                CommandOutcome::Batch(copy(session, ctx, sources, dest)?)
            }
            Command::Move { sources, dest } => {
                CommandOutcome::Batch(move_paths(session, ctx, sources, dest)?)
            }
            Command::Remove { paths, recursive } => {
                CommandOutcome::Batch(remove(session, ctx, paths, *recursive)?)
            }
            Command::Mkdir { paths, parents } => {
                CommandOutcome::Batch(mkdir(session, ctx, paths, *parents)?)
            }
            Command::Rmdir { paths } => CommandOutcome::Batch(rmdir(session, ctx, paths)?),
            Command::Chmod { paths, mode } => {
                CommandOutcome::Batch(chmod(session, ctx, paths, *mode)?)
            }
            Command::GetMetadata { paths } => {
                let (entries, report) = get_metadata(session, ctx, paths)?;
                CommandOutcome::Metadata { entries, report }
            }
            Command::AddMetadata { paths, avu } => {
                CommandOutcome::Batch(add_metadata(session, ctx, paths, avu)?)
            }
            Command::QueryMetadata { scope, conditions } => {
                CommandOutcome::Paths(query_metadata(session, scope, conditions)?)
            }
            Command::Exec { command, args } => {
                CommandOutcome::Output(exec(session, command, args)?)
            }
            Command::Probe => {
                session.with_session("probe", |_fs| Ok(()))?;
                CommandOutcome::Live {
                    endpoint: session.account().endpoint(),
                }
            }
        };
        Ok(outcome)
    }
}
