// src/cli.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

use netconf_exec::datastore::Datastore;
use netconf_exec::devices::TransportKind;
use netconf_exec::operation::{
    Commit, ConfigSource, DefaultOperation, EditConfig, ErrorOption, Filter, Operation, Payload,
    TestOption,
};

/// ncexec: run single NETCONF operations against a device
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional path to the ncexec configuration file
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Device name from devices.toml
    #[clap(long, short, value_name = "NAME", conflicts_with = "host")]
    pub device: Option<String>,

    /// Device address, when not using --device
    #[clap(long, value_name = "HOST")]
    pub host: Option<String>,

    #[clap(long, value_name = "PORT")]
    pub port: Option<u16>,

    #[clap(long, short, value_name = "USER")]
    pub username: Option<String>,

    /// SSH identity file
    #[clap(long, short, value_name = "FILE")]
    pub identity: Option<PathBuf>,

    #[clap(long, value_enum)]
    pub transport: Option<TransportCli>,

    /// Set log level (RUST_LOG takes precedence)
    #[clap(long, value_name = "LEVEL", value_enum)]
    pub log_level: Option<LogLevelCli>,

    /// Print replies and errors as JSON
    #[clap(long)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve running configuration and state data
    Get {
        /// Subtree filter file ('-' for stdin)
        #[clap(long, value_name = "FILE", conflicts_with = "xpath")]
        filter: Option<PathBuf>,
        #[clap(long, value_name = "SELECT")]
        xpath: Option<String>,
    },
    /// Retrieve configuration from a datastore
    GetConfig {
        #[clap(long, default_value = "running")]
        source: Datastore,
        #[clap(long, value_name = "FILE", conflicts_with = "xpath")]
        filter: Option<PathBuf>,
        #[clap(long, value_name = "SELECT")]
        xpath: Option<String>,
    },
    /// Load configuration into a datastore
    EditConfig {
        #[clap(long, default_value = "candidate")]
        target: Datastore,
        /// Configuration file ('-' for stdin)
        config: PathBuf,
        #[clap(long, value_enum)]
        default_operation: Option<DefaultOperationCli>,
        #[clap(long, value_enum)]
        test_option: Option<TestOptionCli>,
        #[clap(long, value_enum)]
        error_option: Option<ErrorOptionCli>,
    },
    /// Replace a datastore with another datastore or inline configuration
    CopyConfig {
        #[clap(long)]
        target: Datastore,
        #[clap(long, required_unless_present = "config", conflicts_with = "config")]
        source: Option<Datastore>,
        #[clap(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    DeleteConfig {
        #[clap(long)]
        target: Datastore,
    },
    Lock {
        #[clap(long, default_value = "candidate")]
        target: Datastore,
    },
    Unlock {
        #[clap(long, default_value = "candidate")]
        target: Datastore,
    },
    /// Commit the candidate configuration
    Commit {
        #[clap(long)]
        confirmed: bool,
        /// Seconds before an unconfirmed commit is rolled back
        #[clap(long, value_name = "SECS")]
        confirm_timeout: Option<u32>,
        #[clap(long, value_name = "ID")]
        persist: Option<String>,
    },
    CancelCommit {
        #[clap(long, value_name = "ID")]
        persist_id: Option<String>,
    },
    DiscardChanges,
    /// Validate a datastore or inline configuration
    Validate {
        #[clap(long, required_unless_present = "config", conflicts_with = "config")]
        source: Option<Datastore>,
        #[clap(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    KillSession {
        session_id: u32,
    },
    /// Send a pre-built RPC body (bare or wrapped in <rpc>) from a file or `-`
    Rpc {
        #[clap(value_name = "FILE")]
        payload: PathBuf,
    },
    /// List devices configured in devices.toml
    Devices,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogLevelCli {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevelCli {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevelCli::Trace => "trace",
            LogLevelCli::Debug => "debug",
            LogLevelCli::Info => "info",
            LogLevelCli::Warn => "warn",
            LogLevelCli::Error => "error",
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum TransportCli {
    Ssh,
    Tcp,
}

impl From<TransportCli> for TransportKind {
    fn from(value: TransportCli) -> Self {
        match value {
            TransportCli::Ssh => TransportKind::Ssh,
            TransportCli::Tcp => TransportKind::Tcp,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum DefaultOperationCli {
    Merge,
    Replace,
    None,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum TestOptionCli {
    TestThenSet,
    Set,
    TestOnly,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ErrorOptionCli {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl Commands {
    /// Builds the operation this command runs. `None` for local-only commands.
    pub fn to_operation(&self) -> Result<Option<Operation>> {
        let operation = match self {
            Commands::Get { filter, xpath } => Operation::Get {
                filter: read_filter(filter.as_deref(), xpath.as_deref())?,
            },
            Commands::GetConfig { source, filter, xpath } => {
                Operation::get_config(source.clone(), read_filter(filter.as_deref(), xpath.as_deref())?)
            }
            Commands::EditConfig {
                target,
                config,
                default_operation,
                test_option,
                error_option,
            } => {
                let mut edit = EditConfig::new(target.clone(), read_payload(config)?);
                edit.default_operation = default_operation.map(|op| match op {
                    DefaultOperationCli::Merge => DefaultOperation::Merge,
                    DefaultOperationCli::Replace => DefaultOperation::Replace,
                    DefaultOperationCli::None => DefaultOperation::None,
                });
                edit.test_option = test_option.map(|option| match option {
                    TestOptionCli::TestThenSet => TestOption::TestThenSet,
                    TestOptionCli::Set => TestOption::Set,
                    TestOptionCli::TestOnly => TestOption::TestOnly,
                });
                edit.error_option = error_option.map(|option| match option {
                    ErrorOptionCli::StopOnError => ErrorOption::StopOnError,
                    ErrorOptionCli::ContinueOnError => ErrorOption::ContinueOnError,
                    ErrorOptionCli::RollbackOnError => ErrorOption::RollbackOnError,
                });
                Operation::EditConfig(edit)
            }
            Commands::CopyConfig { target, source, config } => Operation::CopyConfig {
                target: target.clone(),
                source: config_source(source.as_ref(), config.as_deref())?,
            },
            Commands::DeleteConfig { target } => Operation::DeleteConfig { target: target.clone() },
            Commands::Lock { target } => Operation::lock(target.clone()),
            Commands::Unlock { target } => Operation::unlock(target.clone()),
            Commands::Commit {
                confirmed,
                confirm_timeout,
                persist,
            } => Operation::Commit(Commit {
                confirmed: *confirmed,
                confirm_timeout: *confirm_timeout,
                persist: persist.clone(),
            }),
            Commands::CancelCommit { persist_id } => Operation::CancelCommit {
                persist_id: persist_id.clone(),
            },
            Commands::DiscardChanges => Operation::DiscardChanges,
            Commands::Validate { source, config } => Operation::Validate {
                source: config_source(source.as_ref(), config.as_deref())?,
            },
            Commands::KillSession { session_id } => Operation::KillSession {
                session_id: *session_id,
            },
            Commands::Rpc { payload } => Operation::Raw(read_payload(payload)?),
            Commands::Devices => return Ok(None),
        };
        Ok(Some(operation))
    }
}

fn config_source(source: Option<&Datastore>, config: Option<&Path>) -> Result<ConfigSource> {
    match (source, config) {
        (Some(datastore), None) => Ok(ConfigSource::Datastore(datastore.clone())),
        (None, Some(path)) => Ok(ConfigSource::Config(read_payload(path)?)),
        _ => bail!("exactly one of --source or --config is required"),
    }
}

fn read_filter(filter: Option<&Path>, xpath: Option<&str>) -> Result<Option<Filter>> {
    Ok(match (filter, xpath) {
        (Some(path), _) => Some(Filter::Subtree(read_payload(path)?)),
        (None, Some(select)) => Some(Filter::XPath(select.to_string())),
        (None, None) => None,
    })
}

/// Reads an XML payload from a file, or stdin for `-`.
pub fn read_payload(path: &Path) -> Result<Payload> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read payload from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file {}", path.display()))?
    };
    Ok(Payload::encoded(content))
}
