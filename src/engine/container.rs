//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Container runtime boundary
//!
//! The catalog never manipulates containers itself. It goes through a
//! [`ContainerRuntime`] that hands out [`Container`] handles; a handle is
//! released when it is dropped, so every exit path releases it exactly once.
//! Snapshot records follow the same rule.

use std::fmt;
use std::path::Path;

use bytesize::ByteSize;
use thiserror::Error;

/// Block-device type used when none is requested.
pub const DEFAULT_BDEV: &str = "dir";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// The runtime recognises the request but has no implementation for it.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("{reason} (status {status})")]
    Failed { status: i32, reason: String },
}

impl ContainerError {
    pub fn failed(status: i32, reason: impl Into<String>) -> Self {
        Self::Failed {
            status,
            reason: reason.into(),
        }
    }

    /// Map an I/O failure, keeping the OS error number as the status.
    pub fn from_io(context: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::failed(
            err.raw_os_error().unwrap_or(-1),
            format!("{context}: {err}"),
        )
    }
}

/// Backing store parameters passed through to export and create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BdevOptions {
    pub bdev_type: String,
    pub fs_size: Option<ByteSize>,
}

impl Default for BdevOptions {
    fn default() -> Self {
        Self {
            bdev_type: DEFAULT_BDEV.to_string(),
            fs_size: None,
        }
    }
}

/// One point-in-time snapshot reported by the runtime.
pub trait SnapshotRecord {
    fn name(&self) -> &str;
    fn path(&self) -> &Path;
    fn timestamp(&self) -> &str;
}

/// Capabilities of a container handle.
pub trait Container {
    type Snapshot: SnapshotRecord;

    fn name(&self) -> &str;

    fn is_defined(&self) -> bool;

    /// All recorded snapshots. An error stands for a negative count.
    fn snapshots(&self) -> Result<Vec<Self::Snapshot>, ContainerError>;

    /// Write this container as `<store_root>/<export_name>`.
    fn export(
        &self,
        export_name: &str,
        store_root: &Path,
        opts: &BdevOptions,
    ) -> Result<(), ContainerError>;

    /// Materialise a new container `<lxcpath>/<create_name>` from this
    /// (exported) container.
    fn create_from_export(
        &self,
        create_name: &str,
        lxcpath: &Path,
        opts: &BdevOptions,
    ) -> Result<(), ContainerError>;

    fn destroy(&self) -> Result<(), ContainerError>;
}

/// Factory for container handles.
pub trait ContainerRuntime {
    type Handle: Container;

    /// Open a handle on `name` under `lxcpath`. `None` when the runtime
    /// cannot allocate one at all; an undefined container still gets a
    /// handle.
    fn open(&self, name: &str, lxcpath: &Path) -> Option<Self::Handle>;
}
