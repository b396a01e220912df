//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Snapshot lookup performed before an export

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use super::container::{Container, ContainerError, SnapshotRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Zero snapshots, or the runtime could not count them
    #[error("container '{container}' has no snapshots")]
    NoSnapshots {
        container: String,
        #[source]
        source: Option<ContainerError>,
    },
}

/// Details of a matched snapshot, detached from the runtime's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: PathBuf,
    pub timestamp: String,
}

impl SnapshotInfo {
    fn from_record(record: &impl SnapshotRecord) -> Self {
        Self {
            name: record.name().to_string(),
            path: record.path().to_path_buf(),
            timestamp: record.timestamp().to_string(),
        }
    }
}

/// Look for a snapshot called `snapshot` on `container`.
///
/// `Ok(None)` means the container has snapshots but none with that name.
/// All records are dropped before returning, whatever the outcome.
pub fn resolve_snapshot<C: Container>(
    container: &C,
    snapshot: &str,
) -> Result<Option<SnapshotInfo>, SnapshotError> {
    let records = container
        .snapshots()
        .map_err(|source| SnapshotError::NoSnapshots {
            container: container.name().to_string(),
            source: Some(source),
        })?;

    if records.is_empty() {
        return Err(SnapshotError::NoSnapshots {
            container: container.name().to_string(),
            source: None,
        });
    }

    debug!(
        container = container.name(),
        count = records.len(),
        "scanning snapshots"
    );

    let found = records
        .iter()
        .find(|record| record.name() == snapshot)
        .map(|record| SnapshotInfo::from_record(record));
    drop(records);

    Ok(found)
}
