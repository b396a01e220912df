//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Export store: the directory holding one subdirectory per exported container
//!
//! An entry is a genuine export only when it directly contains a `rootfs`
//! directory and a `config` file. Anything else in the store is ignored.

use std::fs::{self, DirBuilder, ReadDir};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use nix::unistd::{access, AccessFlags};
use thiserror::Error;
use tracing::{debug, info};

/// Marker directory of a valid export entry.
pub const ROOTFS_MARKER: &str = "rootfs";
/// Marker file of a valid export entry.
pub const CONFIG_MARKER: &str = "config";
/// Permission bits for a freshly created store.
pub const STORE_MODE: u32 = 0o700;
/// Prefix of the half-written copies staged inside the store.
pub const STAGING_PREFIX: &str = ".lxc-export-";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("permission denied for export store {}", .path.display())]
    PermissionDenied { path: PathBuf },
    #[error("failed to create export store {}", .path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("export store {} is unreadable", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle on the store root. Holds no state beyond the path; every query
/// re-reads the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportStore {
    root: PathBuf,
}

impl ExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an export named `name` occupies (whether or not it exists).
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether the entry called `name` exists and is a valid export.
    pub fn contains(&self, name: &str) -> bool {
        is_valid_export(&self.entry_path(name))
    }

    /// Iterate the names of valid exports, in directory order.
    ///
    /// Fails only if the store root itself cannot be opened; an empty store
    /// yields nothing.
    pub fn exports(&self) -> Result<Exports, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Unreadable {
            path: self.root.clone(),
            source,
        })?;
        Ok(Exports { entries })
    }

    /// Create the store with owner-only permissions if it is missing, then
    /// make sure it is writable.
    pub fn ensure_ready(&self) -> Result<(), StoreError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StoreError::CreateFailed {
                    path: self.root.clone(),
                    source: io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "path exists and is not a directory",
                    ),
                })
            }
            Err(_) => {
                DirBuilder::new()
                    .recursive(true)
                    .mode(STORE_MODE)
                    .create(&self.root)
                    .map_err(|source| match source.kind() {
                        io::ErrorKind::PermissionDenied => StoreError::PermissionDenied {
                            path: self.root.clone(),
                        },
                        _ => StoreError::CreateFailed {
                            path: self.root.clone(),
                            source,
                        },
                    })?;
                info!(store = %self.root.display(), "created export store");
            }
        }

        access(self.root.as_path(), AccessFlags::W_OK | AccessFlags::X_OK).map_err(|_| {
            StoreError::PermissionDenied {
                path: self.root.clone(),
            }
        })
    }
}

/// Lazy scan over the store root. Each call to [`ExportStore::exports`]
/// starts a fresh scan.
#[derive(Debug)]
pub struct Exports {
    entries: ReadDir,
}

impl Iterator for Exports {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable store entry");
                    continue;
                }
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            // Hidden names cover staging copies and can never be export names
            if !is_dir || entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if is_valid_export(&path) {
                return Some(entry.file_name().to_string_lossy().into_owned());
            }
            debug!(entry = %path.display(), "not a valid export");
        }
        None
    }
}

/// True if `entry` directly contains a `rootfs` directory and a
/// non-directory `config`. An unreadable entry is simply invalid.
pub fn is_valid_export(entry: &Path) -> bool {
    let children = match fs::read_dir(entry) {
        Ok(children) => children,
        Err(_) => return false,
    };

    let mut has_rootfs = false;
    let mut has_config = false;
    for child in children.flatten() {
        let Ok(file_type) = child.file_type() else {
            continue;
        };
        match child.file_name().to_str() {
            Some(ROOTFS_MARKER) if file_type.is_dir() => has_rootfs = true,
            Some(CONFIG_MARKER) if !file_type.is_dir() => has_config = true,
            _ => {}
        }
        if has_rootfs && has_config {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn make_export(root: &Path, name: &str) -> PathBuf {
        let entry = root.join(name);
        fs::create_dir_all(entry.join(ROOTFS_MARKER)).unwrap();
        fs::write(entry.join(CONFIG_MARKER), "lxc.uts.name = x\n").unwrap();
        entry
    }

    fn running_as_root() -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn chmod(path: &Path, mode: u32) {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    fn sorted(store: &ExportStore) -> Vec<String> {
        let mut names: Vec<String> = store.exports().unwrap().collect();
        names.sort();
        names
    }

    #[test]
    fn test_valid_export_needs_both_markers() {
        let dir = tempfile::tempdir().unwrap();

        let full = make_export(dir.path(), "full");
        assert!(is_valid_export(&full));

        let only_config = dir.path().join("only_config");
        fs::create_dir(&only_config).unwrap();
        fs::write(only_config.join(CONFIG_MARKER), "").unwrap();
        assert!(!is_valid_export(&only_config));

        let only_rootfs = dir.path().join("only_rootfs");
        fs::create_dir_all(only_rootfs.join(ROOTFS_MARKER)).unwrap();
        assert!(!is_valid_export(&only_rootfs));
    }

    #[test]
    fn test_valid_export_ignores_extra_files() {
        let dir = tempfile::tempdir().unwrap();
        let entry = make_export(dir.path(), "web1");
        fs::write(entry.join("fstab"), "").unwrap();
        fs::create_dir(entry.join("snaps")).unwrap();
        assert!(is_valid_export(&entry));
    }

    #[test]
    fn test_markers_must_have_right_type() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("swapped");
        fs::create_dir_all(entry.join(CONFIG_MARKER)).unwrap();
        fs::write(entry.join(ROOTFS_MARKER), "").unwrap();
        assert!(!is_valid_export(&entry));
    }

    #[test]
    fn test_markers_must_be_direct_children() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("nested");
        make_export(&entry, "inner");
        assert!(!is_valid_export(&entry));
    }

    #[test]
    fn test_missing_entry_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_valid_export(&dir.path().join("nope")));
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        assert_eq!(store.exports().unwrap().count(), 0);
    }

    #[test]
    fn test_missing_store_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path().join("absent"));
        assert!(matches!(
            store.exports(),
            Err(StoreError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_list_skips_invalid_entries_and_files() {
        let dir = tempfile::tempdir().unwrap();
        make_export(dir.path(), "web1");
        make_export(dir.path(), "db");
        let foo = dir.path().join("foo");
        fs::create_dir(&foo).unwrap();
        fs::write(foo.join(CONFIG_MARKER), "").unwrap();
        fs::write(dir.path().join("stray-file"), "").unwrap();

        let store = ExportStore::new(dir.path());
        assert_eq!(sorted(&store), vec!["db".to_string(), "web1".to_string()]);
        assert!(store.contains("web1"));
        assert!(!store.contains("foo"));
    }

    #[test]
    fn test_list_rescans_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExportStore::new(dir.path());
        assert!(sorted(&store).is_empty());
        make_export(dir.path(), "late");
        assert_eq!(sorted(&store), vec!["late".to_string()]);
    }

    #[test]
    fn test_ensure_ready_creates_owner_only_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("store");
        let store = ExportStore::new(&root);

        store.ensure_ready().unwrap();
        let mode = fs::metadata(&root).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, STORE_MODE);

        // Second call is a no-op
        store.ensure_ready().unwrap();
    }

    #[test]
    fn test_ensure_ready_rejects_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        fs::write(&root, "").unwrap();
        assert!(matches!(
            ExportStore::new(&root).ensure_ready(),
            Err(StoreError::CreateFailed { .. })
        ));
    }

    #[test]
    fn test_list_skips_staging_and_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        make_export(dir.path(), "web1");
        make_export(dir.path(), &format!("{STAGING_PREFIX}a1b2c3"));
        make_export(dir.path(), ".hidden");

        let store = ExportStore::new(dir.path());
        assert_eq!(sorted(&store), vec!["web1".to_string()]);
    }

    #[test]
    fn test_unreadable_entry_is_invalid() {
        if running_as_root() {
            eprintln!("skipping: permission bits do not bind root");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let entry = make_export(dir.path(), "locked");
        chmod(&entry, 0o000);

        let valid = is_valid_export(&entry);
        let listed = sorted(&ExportStore::new(dir.path()));
        chmod(&entry, 0o755);

        assert!(!valid);
        assert!(listed.is_empty());
    }

    #[test]
    fn test_ensure_ready_under_read_only_parent() {
        if running_as_root() {
            eprintln!("skipping: permission bits do not bind root");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("ro");
        fs::create_dir(&parent).unwrap();
        chmod(&parent, 0o555);

        let result = ExportStore::new(parent.join("store")).ensure_ready();
        chmod(&parent, 0o755);

        assert!(matches!(result, Err(StoreError::PermissionDenied { .. })));
        assert!(!parent.join("store").exists());
    }

    #[test]
    fn test_ensure_ready_rejects_read_only_store() {
        if running_as_root() {
            eprintln!("skipping: permission bits do not bind root");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        fs::create_dir(&root).unwrap();
        chmod(&root, 0o500);

        let result = ExportStore::new(&root).ensure_ready();
        chmod(&root, 0o700);

        assert!(matches!(result, Err(StoreError::PermissionDenied { .. })));
    }
}
