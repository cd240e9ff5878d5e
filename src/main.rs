/*!
 * gridlink CLI - Command Line Interface
 *
 * Loads the configuration, opens one session, runs one command, prints the
 * outcome and closes the session. Exit codes: 0 success, 1 partial failure,
 * 2 fatal (connection, validation, configuration).
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::{theme::ColorfulTheme, Password};
use gridlink::{
    backend::{open_driver, Avu, MetadataCondition},
    cli_style::{self, listing_table, metadata_table, print_error, print_success, Theme},
    config::{DriverKind, ErrorMode, GridConfig, LogLevel, OverwritePolicy},
    error::{GridError, EXIT_FATAL},
    logging,
    ops::{Command as GridCommand, CommandOutcome, ListFilter, OpContext},
    Session,
};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "gridlink")]
#[command(version, about = "Resilient client for remote grid file systems", long_about = None)]
struct Cli {
    /// Path to config file (default: <config dir>/gridlink/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Driver to use, overriding the config file
    #[arg(long, value_enum, global = true)]
    driver: Option<DriverArg>,

    /// Root directory for the local driver
    #[arg(long, value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Overwrite existing targets without asking
    #[arg(short = 'y', long, global = true, conflicts_with = "no_clobber")]
    yes: bool,

    /// Never overwrite existing targets
    #[arg(short = 'n', long, global = true)]
    no_clobber: bool,

    /// What a failing item does to the rest of the batch
    #[arg(long, value_enum, global = true)]
    error_mode: Option<ErrorModeArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a collection
    Ls {
        /// Remote path (default: home collection)
        #[arg(default_value = ".")]
        path: String,

        /// Only data objects
        #[arg(short = 'f', long, conflicts_with = "collections")]
        files: bool,

        /// Only collections
        #[arg(short = 'c', long)]
        collections: bool,
    },

    /// Download remote files or collections
    Get {
        #[arg(required = true)]
        sources: Vec<String>,
        /// Local file or directory
        dest: PathBuf,
    },

    /// Upload local files or directories
    Put {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Remote file or collection
        dest: String,
    },

    /// Copy remote files or collections
    Cp {
        #[arg(required = true)]
        sources: Vec<String>,
        dest: String,
    },

    /// Move or rename remote files or collections
    Mv {
        #[arg(required = true)]
        sources: Vec<String>,
        dest: String,
    },

    /// Remove remote files
    Rm {
        /// Remove collections and their contents
        #[arg(short = 'r', long)]
        recursive: bool,

        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Create collections
    Mkdir {
        /// Create missing parents; existing collections are fine
        #[arg(short = 'p', long)]
        parents: bool,

        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove empty collections
    Rmdir {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Change permission bits
    Chmod {
        /// Octal mode, e.g. 750
        #[arg(value_parser = parse_mode)]
        mode: u32,

        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// User metadata (attribute/value/units)
    Meta {
        #[command(subcommand)]
        action: MetaCommand,
    },

    /// Run a command on the remote side
    Exec {
        command: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Check that the remote side answers
    Probe,
}

#[derive(Subcommand)]
enum MetaCommand {
    /// Show the metadata of paths
    Get {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Attach one attribute/value pair to paths
    Add {
        attribute: String,
        value: String,

        #[arg(required = true)]
        paths: Vec<String>,

        #[arg(short = 'u', long)]
        units: Option<String>,
    },

    /// Find paths whose metadata matches every condition
    Query {
        /// Collection to search below (default: home collection)
        #[arg(short = 's', long, default_value = ".")]
        scope: String,

        /// Conditions such as "site like Kaneohe%" or "depth >= 10"
        #[arg(required = true, value_parser = parse_condition)]
        conditions: Vec<MetadataCondition>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ErrorModeArg {
    Skip,
    Abort,
}

impl From<ErrorModeArg> for ErrorMode {
    fn from(mode: ErrorModeArg) -> Self {
        match mode {
            ErrorModeArg::Skip => ErrorMode::Skip,
            ErrorModeArg::Abort => ErrorMode::Abort,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum DriverArg {
    Memory,
    Local,
    Ssh,
}

impl From<DriverArg> for DriverKind {
    fn from(driver: DriverArg) -> Self {
        match driver {
            DriverArg::Memory => DriverKind::Memory,
            DriverArg::Local => DriverKind::Local,
            DriverArg::Ssh => DriverKind::Ssh,
        }
    }
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|_| format!("'{}' is not an octal mode", s))
}

fn parse_condition(s: &str) -> Result<MetadataCondition, String> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            let grid_error = e.downcast_ref::<GridError>();
            let hint = match grid_error {
                Some(GridError::Connection(_)) => Some("check the account settings and that the server is reachable"),
                Some(GridError::Config(_)) => Some("see --config and the [driver] section of the config file"),
                _ => None,
            };
            print_error(&format!("{:#}", e), hint);
            grid_error.map(GridError::exit_code).unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli)?;

    if let Err(e) = logging::init_logging(&config) {
        cli_style::print_warning(&format!("Failed to initialize logging: {}", e));
    }
    debug!("Using {} driver", config.driver.kind);

    let driver = open_driver(&config.driver).map_err(GridError::from)?;
    let mut session = Session::new(driver, config.account.clone());
    let mut ctx = OpContext::from_config(&config.transfer);

    let command = build_command(cli.command, &session);
    let result = command.run(&mut session, &mut ctx);
    session.close();

    let outcome = result?;
    print_outcome(&outcome);
    info!("{} finished", command.name());
    Ok(outcome.exit_code())
}

/// Config file plus command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<GridConfig> {
    let mut config = match &cli.config {
        Some(path) => GridConfig::from_file(path)
            .with_context(|| format!("failed to load config file {}", path.display()))?,
        None => match GridConfig::default_path().filter(|path| path.exists()) {
            Some(path) => GridConfig::from_file(&path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => {
                let mut config = GridConfig::default();
                config.account.apply_env();
                config
            }
        },
    };

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file.clone();
    }
    config.verbose |= cli.verbose;

    if let Some(driver) = cli.driver {
        config.driver.kind = driver.into();
    }
    if let Some(root) = &cli.root {
        config.driver.root = Some(root.clone());
    }

    if cli.yes {
        config.transfer.overwrite = OverwritePolicy::Always;
    } else if cli.no_clobber {
        config.transfer.overwrite = OverwritePolicy::Never;
    }
    if let Some(mode) = cli.error_mode {
        config.transfer.error_mode = mode.into();
    }

    config.validate()?;

    if needs_password(&config) {
        let password = Password::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Password for {}", config.account.endpoint()))
            .interact()
            .context("failed to read password")?;
        config.account.set_password(&password);
    }

    Ok(config)
}

fn needs_password(config: &GridConfig) -> bool {
    config.driver.kind == DriverKind::Ssh
        && !config.driver.agent
        && config.driver.key_file.is_none()
        && config.account.password_str().is_none()
}

/// Turn parsed arguments into a command, resolving relative remote paths
/// against the home collection
fn build_command(command: Commands, session: &Session) -> GridCommand {
    let resolve = |paths: Vec<String>| -> Vec<String> {
        paths.iter().map(|p| session.resolve(p)).collect()
    };

    match command {
        Commands::Ls {
            path,
            files,
            collections,
        } => {
            let filter = if files {
                ListFilter::Files
            } else if collections {
                ListFilter::Collections
            } else {
                ListFilter::All
            };
            GridCommand::List {
                path: session.resolve(&path),
                filter,
            }
        }
        Commands::Get { sources, dest } => GridCommand::Get {
            sources: resolve(sources),
            dest,
        },
        Commands::Put { sources, dest } => GridCommand::Put {
            sources,
            dest: session.resolve(&dest),
        },
        Commands::Cp { sources, dest } => GridCommand::Copy {
            sources: resolve(sources),
            dest: session.resolve(&dest),
        },
        Commands::Mv { sources, dest } => GridCommand::Move {
            sources: resolve(sources),
            dest: session.resolve(&dest),
        },
        Commands::Rm { recursive, paths } => GridCommand::Remove {
            paths: resolve(paths),
            recursive,
        },
        Commands::Mkdir { parents, paths } => GridCommand::Mkdir {
            paths: resolve(paths),
            parents,
        },
        Commands::Rmdir { paths } => GridCommand::Rmdir {
            paths: resolve(paths),
        },
        Commands::Chmod { mode, paths } => GridCommand::Chmod {
            paths: resolve(paths),
            mode,
        },
        Commands::Meta { action } => match action {
            MetaCommand::Get { paths } => GridCommand::GetMetadata {
                paths: resolve(paths),
            },
            MetaCommand::Add {
                attribute,
                value,
                paths,
                units,
            } => {
                let mut avu = Avu::new(attribute, value);
                if let Some(units) = units {
                    avu = avu.with_units(units);
                }
                GridCommand::AddMetadata {
                    paths: resolve(paths),
                    avu,
                }
            }
            MetaCommand::Query { scope, conditions } => GridCommand::QueryMetadata {
                scope: session.resolve(&scope),
                conditions,
            },
        },
        Commands::Exec { command, args } => GridCommand::Exec { command, args },
        Commands::Probe => GridCommand::Probe,
    }
}

/// Results on stdout, accumulated failures on stderr
fn print_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Listing(entries) => println!("{}", listing_table(entries)),
        CommandOutcome::Batch(report) => {
            for output in report.outputs() {
                println!("{}", output);
            }
            eprint!("{}", report.exit_message());
        }
        CommandOutcome::Metadata { entries, report } => {
            if !entries.is_empty() {
                println!("{}", metadata_table(entries));
            }
            eprint!("{}", report.exit_message());
        }
        CommandOutcome::Paths(paths) => {
            for path in paths {
                println!("{}", path);
            }
        }
        CommandOutcome::Output(output) => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
        }
        CommandOutcome::Live { endpoint } => {
            print_success(&format!("{} is live", Theme::primary(endpoint)))
        }
    }
}
