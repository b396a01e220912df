//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Tool configuration file
//!
//! ```toml
//! store_root = "/var/lib/lxc-export"
//! lxcpath = "/var/lib/lxc"
//! bdev = "dir"
//! fssize = "1G"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytesize::ByteSize;
use serde::Deserialize;
use tracing::debug;

use super::container::DEFAULT_BDEV;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/lxc/lxc-export.conf";
pub const DEFAULT_STORE_ROOT: &str = "/var/lib/lxc-export";
pub const DEFAULT_LXCPATH: &str = "/var/lib/lxc";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding one subdirectory per export
    pub store_root: PathBuf,
    /// Where container definitions are looked up and created
    pub lxcpath: PathBuf,
    /// Backing store type for export/create
    pub bdev: String,
    /// Filesystem size for block backed stores, e.g. "1G"
    pub fssize: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from(DEFAULT_STORE_ROOT),
            lxcpath: PathBuf::from(DEFAULT_LXCPATH),
            bdev: DEFAULT_BDEV.to_string(),
            fssize: None,
        }
    }
}

impl Config {
    /// Read the config file at `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read config file {}", path.display()))
            }
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse config")?;
        config.fs_size()?;
        Ok(config)
    }

    pub fn fs_size(&self) -> Result<Option<ByteSize>> {
        self.fssize
            .as_deref()
            .map(|s| {
                s.parse::<ByteSize>()
                    .map_err(|e| anyhow::anyhow!("Invalid fssize '{}': {}", s, e))
            })
            .transpose()
    }
}
