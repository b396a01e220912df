//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Export catalog core: store layout, container boundary, snapshot lookup

pub mod config;
pub mod container;
pub mod lxcdir;
pub mod snapshot;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use container::{BdevOptions, Container, ContainerError, ContainerRuntime};
pub use lxcdir::LxcDir;
pub use snapshot::{resolve_snapshot, SnapshotError, SnapshotInfo};
pub use store::{ExportStore, StoreError};
pub use validation::{check_not_symlink, validate_entry_name, ValidationError};
