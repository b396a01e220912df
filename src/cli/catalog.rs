//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Export catalog operations

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::cli::{Cli, Operation};
use crate::engine::{
    check_not_symlink, resolve_snapshot, BdevOptions, Config, Container, ContainerRuntime,
    ExportStore, SnapshotInfo,
};
use crate::error::ExportError;

/// Where operations read and write, resolved from flags and config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: ExportStore,
    pub lxcpath: PathBuf,
    pub bdev: BdevOptions,
}

impl Settings {
    /// Flags override the config file; the store root comes from config only.
    pub fn new(cli: &Cli, config: &Config) -> Result<Self> {
        let fs_size = match cli.fssize {
            Some(size) => Some(size),
            None => config.fs_size()?,
        };
        Ok(Self {
            store: ExportStore::new(&config.store_root),
            lxcpath: cli.lxcpath.clone().unwrap_or_else(|| config.lxcpath.clone()),
            bdev: BdevOptions {
                bdev_type: cli.bdev.clone().unwrap_or_else(|| config.bdev.clone()),
                fs_size,
            },
        })
    }
}

/// What a successful operation did, printed as the summary line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exported {
        name: String,
        path: PathBuf,
        snapshot: Option<SnapshotInfo>,
    },
    Created {
        name: String,
        from: String,
        lxcpath: PathBuf,
    },
    Deleted {
        name: String,
    },
    Listed {
        count: usize,
        store: PathBuf,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Exported {
                name,
                path,
                snapshot,
            } => {
                write!(f, "exported '{}' to {}", name, path.display())?;
                if let Some(snap) = snapshot {
                    write!(f, " (snapshot '{}' taken {})", snap.name, snap.timestamp)?;
                }
                Ok(())
            }
            Outcome::Created {
                name,
                from,
                lxcpath,
            } => write!(
                f,
                "created '{}' in {} from export '{}'",
                name,
                lxcpath.display(),
                from
            ),
            Outcome::Deleted { name } => write!(f, "deleted export '{}'", name),
            Outcome::Listed { count, store } => {
                write!(f, "{} export(s) in {}", count, store.display())
            }
        }
    }
}

/// Run `op`. Listing output goes to `out`; nothing else is printed here.
pub fn execute<R: ContainerRuntime>(
    op: &Operation,
    settings: &Settings,
    runtime: &R,
    out: &mut impl Write,
) -> Result<Outcome, ExportError> {
    match op {
        Operation::Export {
            name,
            export_name,
            snapshot,
        } => export_container(runtime, settings, name, export_name, snapshot.as_deref()),
        Operation::Create { name, create_name } => {
            create_container(runtime, settings, name, create_name)
        }
        Operation::Delete { name } => delete_export(runtime, settings, name),
        Operation::List => list_exports(settings, out),
    }
}

/// Open `name` under `path`, failing unless the container is defined.
/// The handle is released on return if it is not handed back.
fn open_defined<R: ContainerRuntime>(
    runtime: &R,
    name: &str,
    path: &Path,
) -> Result<R::Handle, ExportError> {
    let not_found = || ExportError::ContainerNotFound {
        name: name.to_string(),
        path: path.to_path_buf(),
    };
    let handle = runtime.open(name, path).ok_or_else(not_found)?;
    if !handle.is_defined() {
        return Err(not_found());
    }
    Ok(handle)
}

fn export_container<R: ContainerRuntime>(
    runtime: &R,
    settings: &Settings,
    name: &str,
    export_name: &str,
    snapshot: Option<&str>,
) -> Result<Outcome, ExportError> {
    let container = open_defined(runtime, name, &settings.lxcpath)?;

    let snapshot = match snapshot {
        Some(wanted) => match resolve_snapshot(&container, wanted)? {
            Some(info) => {
                info!(container = name, snapshot = %info.name, taken = %info.timestamp, "snapshot found");
                Some(info)
            }
            None => {
                return Err(ExportError::SnapshotNotFound {
                    snapshot: wanted.to_string(),
                    container: name.to_string(),
                })
            }
        },
        None => None,
    };

    settings.store.ensure_ready()?;

    info!(
        container = name,
        export = export_name,
        bdev = %settings.bdev.bdev_type,
        "exporting"
    );
    container
        .export(export_name, settings.store.root(), &settings.bdev)
        .map_err(|e| ExportError::collaborator("export", e))?;

    Ok(Outcome::Exported {
        name: name.to_string(),
        path: settings.store.entry_path(export_name),
        snapshot,
    })
}

fn create_container<R: ContainerRuntime>(
    runtime: &R,
    settings: &Settings,
    name: &str,
    create_name: &str,
) -> Result<Outcome, ExportError> {
    let entry = settings.store.entry_path(name);
    if entry.symlink_metadata().is_err() {
        return Err(ExportError::ContainerNotFound {
            name: name.to_string(),
            path: settings.store.root().to_path_buf(),
        });
    }
    if !settings.store.contains(name) {
        return Err(ExportError::InvalidExport {
            name: name.to_string(),
            path: entry,
        });
    }

    let export = open_defined(runtime, name, settings.store.root())?;
    info!(
        export = name,
        container = create_name,
        lxcpath = %settings.lxcpath.display(),
        "creating from export"
    );
    export
        .create_from_export(create_name, &settings.lxcpath, &settings.bdev)
        .map_err(|e| ExportError::collaborator("create", e))?;

    Ok(Outcome::Created {
        name: create_name.to_string(),
        from: name.to_string(),
        lxcpath: settings.lxcpath.clone(),
    })
}

fn delete_export<R: ContainerRuntime>(
    runtime: &R,
    settings: &Settings,
    name: &str,
) -> Result<Outcome, ExportError> {
    check_not_symlink(&settings.store.entry_path(name))?;

    let export = open_defined(runtime, name, settings.store.root())?;
    info!(export = name, "deleting export");
    export
        .destroy()
        .map_err(|e| ExportError::collaborator("delete", e))?;

    Ok(Outcome::Deleted {
        name: name.to_string(),
    })
}

fn list_exports(settings: &Settings, out: &mut impl Write) -> Result<Outcome, ExportError> {
    let mut names: Vec<String> = settings.store.exports()?.collect();
    names.sort();
    for name in &names {
        writeln!(out, "{}", name)?;
    }
    Ok(Outcome::Listed {
        count: names.len(),
        store: settings.store.root().to_path_buf(),
    })
}
