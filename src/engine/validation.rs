//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Name and path checks applied before touching the store or a container

use std::path::Path;
use thiserror::Error;

/// Longest container, export or snapshot name accepted.
pub const MAX_NAME_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },
    #[error("path traversal detected in {kind} name '{name}'")]
    PathTraversal { kind: &'static str, name: String },
    #[error("symlink not allowed: {0}")]
    SymlinkNotAllowed(String),
}

/// Validate a name that becomes a single directory component
/// (container, export entry, snapshot).
/// Names must start with an alphanumeric character and contain only
/// alphanumerics, underscores, hyphens and dots.
pub fn validate_entry_name(kind: &'static str, name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }

    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(ValidationError::PathTraversal {
            kind,
            name: name.to_string(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name exceeds maximum length of 64 characters"));
    }

    if !name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false)
    {
        return Err(invalid("name must start with a letter or number"));
    }

    if let Some(ch) = name
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '-' && ch != '.')
    {
        return Err(invalid(&format!("invalid character '{}'", ch)));
    }

    Ok(())
}

/// Check if a path is a symlink before performing destructive operations
pub fn check_not_symlink(path: &Path) -> Result<(), ValidationError> {
    match path.symlink_metadata() {
        Ok(metadata) if metadata.file_type().is_symlink() => Err(
            ValidationError::SymlinkNotAllowed(format!(
                "cannot operate on symlink: {}",
                path.display()
            )),
        ),
        // Missing paths are reported by the caller
        _ => Ok(()),
    }
}
