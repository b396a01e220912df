//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Container runtime over the plain LXC directory layout
//!
//! ```text
//! <lxcpath>/<name>/config
//! <lxcpath>/<name>/rootfs/
//! <lxcpath>/<name>/snaps/<snapshot>/ts
//! ```
//!
//! Only the `dir` backing store is supported.

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::container::{
    BdevOptions, Container, ContainerError, ContainerRuntime, SnapshotRecord, DEFAULT_BDEV,
};
use super::store::{is_valid_export, CONFIG_MARKER, ROOTFS_MARKER, STAGING_PREFIX};

/// Per-container snapshot directory, never carried into an export.
pub const SNAPS_DIR: &str = "snaps";
/// File inside a snapshot directory holding its creation time.
pub const SNAP_TIMESTAMP_FILE: &str = "ts";
/// Format LXC writes into the `ts` file.
pub const LXC_TIMESTAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Runtime handing out [`DirContainer`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct LxcDir;

impl ContainerRuntime for LxcDir {
    type Handle = DirContainer;

    fn open(&self, name: &str, lxcpath: &Path) -> Option<DirContainer> {
        Some(DirContainer {
            name: name.to_string(),
            dir: lxcpath.join(name),
        })
    }
}

#[derive(Debug)]
pub struct DirContainer {
    name: String,
    dir: PathBuf,
}

impl DirContainer {
    fn require_defined(&self) -> Result<(), ContainerError> {
        if self.is_defined() {
            Ok(())
        } else {
            Err(ContainerError::failed(
                libc::ENOENT,
                format!("container '{}' is not defined", self.name),
            ))
        }
    }
}

#[derive(Debug)]
pub struct DirSnapshot {
    name: String,
    path: PathBuf,
    timestamp: String,
    taken: Option<NaiveDateTime>,
}

impl SnapshotRecord for DirSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl Container for DirContainer {
    type Snapshot = DirSnapshot;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_defined(&self) -> bool {
        fs::metadata(self.dir.join(CONFIG_MARKER))
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    fn snapshots(&self) -> Result<Vec<DirSnapshot>, ContainerError> {
        let snaps = self.dir.join(SNAPS_DIR);
        let entries = match fs::read_dir(&snaps) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ContainerError::from_io(snaps.display(), &e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ContainerError::from_io(snaps.display(), &e))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let timestamp = fs::read_to_string(entry.path().join(SNAP_TIMESTAMP_FILE))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let taken = parse_lxc_timestamp(&timestamp);
            if taken.is_none() {
                warn!(snapshot = %entry.path().display(), "missing or malformed snapshot timestamp");
            }
            records.push(DirSnapshot {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: snaps.clone(),
                timestamp,
                taken,
            });
        }

        // Oldest first, undated last
        records.sort_by(|a, b| match (a.taken, b.taken) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });
        Ok(records)
    }

    fn export(
        &self,
        export_name: &str,
        store_root: &Path,
        opts: &BdevOptions,
    ) -> Result<(), ContainerError> {
        check_bdev(opts)?;
        self.require_defined()?;
        let dest = store_root.join(export_name);
        info!(container = %self.name, dest = %dest.display(), "copying container into store");
        clone_container(&self.dir, &dest, export_name)
    }

    fn create_from_export(
        &self,
        create_name: &str,
        lxcpath: &Path,
        opts: &BdevOptions,
    ) -> Result<(), ContainerError> {
        check_bdev(opts)?;
        self.require_defined()?;
        let dest = lxcpath.join(create_name);
        info!(export = %self.name, dest = %dest.display(), "materialising container");
        clone_container(&self.dir, &dest, create_name)
    }

    fn destroy(&self) -> Result<(), ContainerError> {
        self.require_defined()?;
        fs::remove_dir_all(&self.dir).map_err(|e| ContainerError::from_io(self.dir.display(), &e))
    }
}

fn check_bdev(opts: &BdevOptions) -> Result<(), ContainerError> {
    if opts.bdev_type != DEFAULT_BDEV {
        return Err(ContainerError::NotImplemented(format!(
            "block device type '{}'",
            opts.bdev_type
        )));
    }
    if let Some(size) = opts.fs_size {
        debug!(%size, "fssize has no effect on a dir backing store");
    }
    Ok(())
}

/// Copy `src` to `dest` (which must not exist) through a staging directory
/// next to `dest`, so `dest` only ever appears complete.
///
/// The rootfs is taken from wherever the config points, so a container whose
/// rootfs lives outside its directory still yields `rootfs/` in the copy.
fn clone_container(src: &Path, dest: &Path, new_name: &str) -> Result<(), ContainerError> {
    if dest.symlink_metadata().is_ok() {
        return Err(ContainerError::failed(
            libc::EEXIST,
            format!("{} already exists", dest.display()),
        ));
    }

    let src_config = src.join(CONFIG_MARKER);
    let text = fs::read_to_string(&src_config)
        .map_err(|e| ContainerError::from_io(src_config.display(), &e))?;
    let rootfs = rootfs_source(&text, src)?;
    let rootfs_meta =
        fs::metadata(&rootfs).map_err(|e| ContainerError::from_io(rootfs.display(), &e))?;
    if !rootfs_meta.is_dir() {
        return Err(ContainerError::failed(
            libc::ENOTDIR,
            format!("rootfs {} is not a directory", rootfs.display()),
        ));
    }

    let parent = dest.parent().ok_or_else(|| {
        ContainerError::failed(libc::EINVAL, format!("{} has no parent", dest.display()))
    })?;
    fs::create_dir_all(parent).map_err(|e| ContainerError::from_io(parent.display(), &e))?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)
        .map_err(|e| ContainerError::from_io(parent.display(), &e))?;

    // A rootfs kept inside the container directory is copied once, as rootfs/
    let mut skip = vec![OsString::from(SNAPS_DIR), OsString::from(ROOTFS_MARKER)];
    if rootfs.parent() == Some(src) {
        if let Some(local) = rootfs.file_name() {
            skip.push(local.to_os_string());
        }
    }
    copy_tree(src, staging.path(), &skip)?;

    let staged_rootfs = staging.path().join(ROOTFS_MARKER);
    fs::create_dir(&staged_rootfs)
        .map_err(|e| ContainerError::from_io(staged_rootfs.display(), &e))?;
    debug!(from = %rootfs.display(), "copying rootfs");
    copy_tree(&rootfs, &staged_rootfs, &[])?;
    fs::set_permissions(&staged_rootfs, rootfs_meta.permissions())
        .map_err(|e| ContainerError::from_io(staged_rootfs.display(), &e))?;

    let config = staging.path().join(CONFIG_MARKER);
    let rewritten = rewrite_config(&text, new_name, &dest.join(ROOTFS_MARKER));
    fs::write(&config, rewritten).map_err(|e| ContainerError::from_io(config.display(), &e))?;

    let perms = fs::metadata(src)
        .map_err(|e| ContainerError::from_io(src.display(), &e))?
        .permissions();
    fs::set_permissions(staging.path(), perms)
        .map_err(|e| ContainerError::from_io(staging.path().display(), &e))?;

    if !is_valid_export(staging.path()) {
        return Err(ContainerError::failed(
            libc::EINVAL,
            format!("copy of {} is not a valid export", src.display()),
        ));
    }

    fs::rename(staging.path(), dest).map_err(|e| ContainerError::from_io(dest.display(), &e))?;
    // `staging` now points at nothing; dropping it is a no-op
    Ok(())
}

/// Directory holding the container's root filesystem, read from
/// `lxc.rootfs.path` (or the legacy `lxc.rootfs`). Defaults to
/// `<dir>/rootfs` when the config names none.
pub fn rootfs_source(config: &str, dir: &Path) -> Result<PathBuf, ContainerError> {
    let value = config
        .lines()
        .filter(|line| matches!(config_key(line), Some("lxc.rootfs.path" | "lxc.rootfs")))
        .filter_map(|line| line.split_once('=').map(|(_, v)| v.trim()))
        .last()
        .unwrap_or_default();

    if value.is_empty() {
        return Ok(dir.join(ROOTFS_MARKER));
    }
    if let Some(path) = value.strip_prefix("dir:") {
        return Ok(PathBuf::from(path));
    }
    if value.starts_with('/') {
        return Ok(PathBuf::from(value));
    }
    match value.split_once(':') {
        Some((kind, _)) => Err(ContainerError::NotImplemented(format!(
            "rootfs type '{kind}'"
        ))),
        None => Err(ContainerError::failed(
            libc::EINVAL,
            format!("rootfs path '{value}' is not absolute"),
        )),
    }
}

/// Recreate the tree under `src` inside the existing directory `dst`,
/// leaving out top-level entries named in `skip`. Symlinks are copied as links.
fn copy_tree(src: &Path, dst: &Path, skip: &[OsString]) -> Result<(), ContainerError> {
    let walk = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && skip.iter().any(|s| s == e.file_name())));

    // Directory modes are applied last so read-only directories can be filled
    let mut dir_modes = Vec::new();

    for entry in walk {
        let entry = entry.map_err(|e| {
            let status = e
                .io_error()
                .and_then(|io| io.raw_os_error())
                .unwrap_or(-1);
            ContainerError::failed(status, format!("walking {}: {e}", src.display()))
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ContainerError::failed(libc::EINVAL, e.to_string()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir(&target).map_err(|e| ContainerError::from_io(target.display(), &e))?;
            let meta = entry
                .metadata()
                .map_err(|e| ContainerError::failed(-1, e.to_string()))?;
            dir_modes.push((target, meta.permissions()));
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)
                .map_err(|e| ContainerError::from_io(entry.path().display(), &e))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .map_err(|e| ContainerError::from_io(entry.path().display(), &e))?;
            symlink(&link, &target).map_err(|e| ContainerError::from_io(target.display(), &e))?;
        } else {
            warn!(path = %entry.path().display(), "skipping special file");
        }
    }

    for (dir, perms) in dir_modes.into_iter().rev() {
        fs::set_permissions(&dir, perms).map_err(|e| ContainerError::from_io(dir.display(), &e))?;
    }
    Ok(())
}

/// Point a container config at its new name and rootfs. Lines that do not
/// set either key are kept verbatim.
pub fn rewrite_config(text: &str, name: &str, rootfs: &Path) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let replacement = match config_key(line) {
            Some(key @ ("lxc.uts.name" | "lxc.utsname")) => Some(format!("{key} = {name}")),
            Some(key @ "lxc.rootfs.path") => Some(format!("{key} = dir:{}", rootfs.display())),
            Some(key @ "lxc.rootfs") => Some(format!("{key} = {}", rootfs.display())),
            _ => None,
        };
        out.push_str(replacement.as_deref().unwrap_or(line));
        out.push('\n');
    }
    out
}

fn config_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    line.split_once('=').map(|(key, _)| key.trim())
}

pub fn parse_lxc_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), LXC_TIMESTAMP_FORMAT).ok()
}
