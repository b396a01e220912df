//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Command line surface and mode selection

pub mod catalog;

use std::path::PathBuf;

use bytesize::ByteSize;
use clap::{Parser, ValueEnum};

use crate::engine::config::DEFAULT_CONFIG_PATH;
use crate::engine::validate_entry_name;
use crate::error::ExportError;

/// Export, recreate, delete or list archived LXC containers
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "lxc-export", version, about)]
pub struct Cli {
    /// NAME of the container
    #[arg(short = 'n', long, value_name = "NAME")]
    pub name: Option<String>,

    /// Export the container under NAME in the export store
    #[arg(short = 'e', long = "export", value_name = "NAME")]
    pub export_name: Option<String>,

    /// Create a container called NAME from the export given by --name
    #[arg(short = 'c', long = "create", value_name = "NAME")]
    pub create_name: Option<String>,

    /// Require snapshot NAME to exist before exporting
    #[arg(short = 's', long, value_name = "NAME")]
    pub snapshot: Option<String>,

    /// Delete the export given by --name
    #[arg(short = 'D', long)]
    pub delete: bool,

    /// List valid exports
    #[arg(short = 'L', long)]
    pub list: bool,

    /// Use PATH as the container search path
    #[arg(short = 'P', long, value_name = "PATH")]
    pub lxcpath: Option<PathBuf>,

    /// Backing store type
    #[arg(short = 'B', long, value_name = "TYPE")]
    pub bdev: Option<String>,

    /// Filesystem size for block backed stores (e.g. 1G)
    #[arg(long, value_name = "SIZE")]
    pub fssize: Option<ByteSize>,

    /// Send the success summary to the log (info level) instead of stderr
    #[arg(short, long)]
    pub quiet: bool,

    /// Log to FILE instead of stderr ("none" disables logging)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub logfile: Option<String>,

    /// Log level
    #[arg(
        short = 'l',
        long,
        value_name = "LEVEL",
        value_enum,
        ignore_case = true,
        default_value = "error"
    )]
    pub logpriority: LogPriority,

    /// Configuration file
    #[arg(
        long,
        value_name = "FILE",
        env = "LXC_EXPORT_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,
}

/// LXC log priorities
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPriority {
    Fatal,
    Crit,
    #[default]
    Error,
    Warn,
    Notice,
    Info,
    Debug,
    Trace,
}

impl LogPriority {
    /// Matching `tracing` filter directive
    pub fn directive(self) -> &'static str {
        match self {
            LogPriority::Fatal | LogPriority::Crit | LogPriority::Error => "error",
            LogPriority::Warn => "warn",
            LogPriority::Notice | LogPriority::Info => "info",
            LogPriority::Debug => "debug",
            LogPriority::Trace => "trace",
        }
    }
}

/// The single operation an invocation performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Export {
        name: String,
        export_name: String,
        snapshot: Option<String>,
    },
    Create {
        name: String,
        create_name: String,
    },
    Delete {
        name: String,
    },
    List,
}

impl Cli {
    /// Check the flag combination and pick the operation. Touches nothing
    /// outside the parsed arguments.
    pub fn operation(&self) -> Result<Operation, ExportError> {
        let name = self.name.as_deref().filter(|n| !n.is_empty());

        if self.list {
            let mut extra = Vec::new();
            if name.is_some() {
                extra.push("--name");
            }
            if self.export_name.is_some() {
                extra.push("--export");
            }
            if self.create_name.is_some() {
                extra.push("--create");
            }
            if self.delete {
                extra.push("--delete");
            }
            if self.snapshot.is_some() {
                extra.push("--snapshot");
            }
            if !extra.is_empty() {
                return Err(ExportError::ConflictingModes(format!(
                    "--list cannot be combined with {}",
                    extra.join(", ")
                )));
            }
            return Ok(Operation::List);
        }

        let name = name.ok_or(ExportError::MissingName)?;

        let mut modes = Vec::new();
        if self.export_name.is_some() {
            modes.push("--export");
        }
        if self.create_name.is_some() {
            modes.push("--create");
        }
        if self.delete {
            modes.push("--delete");
        }
        match modes.len() {
            0 => return Err(ExportError::NoOperationSelected),
            1 => {}
            _ => {
                return Err(ExportError::ConflictingModes(format!(
                    "only one of {} may be given",
                    modes.join(", ")
                )))
            }
        }

        if self.snapshot.is_some() && self.export_name.is_none() {
            return Err(ExportError::ConflictingModes(format!(
                "--snapshot only applies to --export, not {}",
                modes[0]
            )));
        }

        validate_entry_name("container", name)?;
        if let Some(export_name) = &self.export_name {
            validate_entry_name("export", export_name)?;
            if let Some(snapshot) = &self.snapshot {
                validate_entry_name("snapshot", snapshot)?;
            }
            return Ok(Operation::Export {
                name: name.to_string(),
                export_name: export_name.clone(),
                snapshot: self.snapshot.clone(),
            });
        }
        if let Some(create_name) = &self.create_name {
            validate_entry_name("container", create_name)?;
            return Ok(Operation::Create {
                name: name.to_string(),
                create_name: create_name.clone(),
            });
        }
        Ok(Operation::Delete {
            name: name.to_string(),
        })
    }
}
