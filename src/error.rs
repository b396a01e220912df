//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Errors reported to the user by the command dispatcher

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::{ContainerError, SnapshotError, StoreError, ValidationError};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("conflicting options: {0}")]
    ConflictingModes(String),
    #[error("missing container name, use --name option")]
    MissingName,
    #[error("no operation selected, use one of --export, --create, --delete or --list")]
    NoOperationSelected,
    /// Rejected name, or a path that is unsafe to operate on
    #[error(transparent)]
    InvalidName(#[from] ValidationError),
    #[error("container '{name}' not found in {}", .path.display())]
    ContainerNotFound { name: String, path: PathBuf },
    #[error("'{name}' in {} is not a valid export (needs rootfs/ and config)", .path.display())]
    InvalidExport { name: String, path: PathBuf },
    #[error("snapshot '{snapshot}' not found for container '{container}'")]
    SnapshotNotFound { snapshot: String, container: String },
    #[error("container '{container}' has no snapshots")]
    NoSnapshots {
        container: String,
        #[source]
        source: Option<ContainerError>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{op} is not implemented: {detail}")]
    OperationNotImplemented { op: &'static str, detail: String },
    #[error("{op} failed: {reason} (status {status})")]
    CollaboratorFailure {
        op: &'static str,
        status: i32,
        reason: String,
    },
    #[error("failed to write output")]
    Output(#[from] io::Error),
}

impl ExportError {
    /// Wrap a runtime failure for operation `op`, keeping the not-implemented
    /// case distinct.
    pub fn collaborator(op: &'static str, err: ContainerError) -> Self {
        match err {
            ContainerError::NotImplemented(detail) => Self::OperationNotImplemented { op, detail },
            ContainerError::Failed { status, reason } => {
                Self::CollaboratorFailure { op, status, reason }
            }
        }
    }
}

impl From<SnapshotError> for ExportError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::NoSnapshots { container, source } => {
                Self::NoSnapshots { container, source }
            }
        }
    }
}
