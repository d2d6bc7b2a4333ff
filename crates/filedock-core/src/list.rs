//! Directory enumeration and filtering.
//!
//! Two listing shapes exist with deliberately different failure policies:
//!
//! - [`list`] returns plain names and degrades gracefully: a failure while
//!   applying a filter (bad pattern, per-entry stat error) returns the
//!   unfiltered listing with a warning instead of failing the request.
//! - [`list_detailed`] returns full [`FileEntry`] metadata and is fatal on
//!   any per-entry stat error, because the response shape requires complete
//!   metadata for every entry.
//!
//! Entries whose name starts with `.` are always hidden.

use crate::error::{OpError, OpResult};
use serde::Serialize;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Stat projection of a single directory entry, in the wire shape the
/// frontend consumes.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    /// Last status-change time, whole milliseconds since the epoch.
    pub ctime: i64,
    /// Raw POSIX mode word.
    pub access: u32,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

impl FileEntry {
    pub fn from_metadata(name: impl Into<String>, meta: &std::fs::Metadata) -> Self {
        Self {
            kind: if meta.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            },
            name: name.into(),
            ctime: meta.ctime() * 1000 + meta.ctime_nsec() / 1_000_000,
            access: meta.mode(),
            size: meta.len(),
        }
    }
}

/// Stat one path into a [`FileEntry`] under the given display name.
pub async fn stat_entry(path: &Path, name: &str) -> OpResult<FileEntry> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| OpError::stat_failed(path, e))?;
    Ok(FileEntry::from_metadata(name, &meta))
}

/// Mutually exclusive listing filters, applied after dotfiles are hidden.
#[derive(Debug, Clone)]
pub enum ListFilter {
    /// Case-insensitive regular-expression match on the entry name.
    Name { pattern: String },
    /// Keep only directories (`dirs: true`) or only non-directories.
    Type { dirs: bool },
    /// Keep entries whose size lies in the inclusive window.
    Size { min: Option<u64>, max: Option<u64> },
    /// Keep entries passing a POSIX access check.
    Mode { mode: AccessMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
    Exists,
}

/// Result of a plain listing.
#[derive(Debug)]
pub struct Listing {
    pub names: Vec<String>,
    /// Set when a filter failed and the unfiltered listing was returned.
    pub warning: Option<String>,
}

#[derive(Debug, Error)]
enum FilterError {
    #[error("invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("stat failed for '{0}': {1}")]
    Stat(String, io::Error),
}

/// List visible entry names, optionally filtered.
///
/// An unreadable directory is `AccessDenied`. Filter failures are soft:
/// the unfiltered listing comes back with `warning` set.
pub async fn list(dir: &Path, filter: Option<&ListFilter>) -> OpResult<Listing> {
    let names = visible_names(dir).await?;

    let Some(filter) = filter else {
        return Ok(Listing {
            names,
            warning: None,
        });
    };

    match apply_filter(dir, &names, filter).await {
        Ok(kept) => Ok(Listing {
            names: kept,
            warning: None,
        }),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "listing filter failed, returning unfiltered");
            Ok(Listing {
                names,
                warning: Some(format!("Select Failed: {e}")),
            })
        }
    }
}

/// List visible entries with full metadata. Fatal on any stat failure.
pub async fn list_detailed(dir: &Path) -> OpResult<Vec<FileEntry>> {
    let names = visible_names(dir).await?;

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(&name);
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| OpError::access_denied(&path, e))?;
        entries.push(FileEntry::from_metadata(name, &meta));
    }
    Ok(entries)
}

/// Read a directory in filesystem order, dropping dotfiles.
async fn visible_names(dir: &Path) -> OpResult<Vec<String>> {
    let mut rd = fs::read_dir(dir)
        .await
        .map_err(|e| OpError::access_denied(dir, e))?;

    let mut names = Vec::new();
    while let Some(entry) = rd
        .next_entry()
        .await
        .map_err(|e| OpError::access_denied(dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    Ok(names)
}

async fn apply_filter(
    dir: &Path,
    names: &[String],
    filter: &ListFilter,
) -> Result<Vec<String>, FilterError> {
    match filter {
        ListFilter::Name { pattern } => {
            let re = regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()?;
            Ok(names.iter().filter(|n| re.is_match(n)).cloned().collect())
        }
        ListFilter::Type { dirs } => {
            let mut kept = Vec::new();
            for name in names {
                let meta = stat_for_filter(dir, name).await?;
                if meta.is_dir() == *dirs {
                    kept.push(name.clone());
                }
            }
            Ok(kept)
        }
        ListFilter::Size { min, max } => {
            let mut kept = Vec::new();
            for name in names {
                let meta = stat_for_filter(dir, name).await?;
                if min.is_some_and(|m| meta.len() < m) {
                    continue;
                }
                if max.is_some_and(|m| meta.len() > m) {
                    continue;
                }
                kept.push(name.clone());
            }
            Ok(kept)
        }
        ListFilter::Mode { mode } => {
            let mut kept = Vec::new();
            for name in names {
                if access_ok(&dir.join(name), *mode) {
                    kept.push(name.clone());
                }
            }
            Ok(kept)
        }
    }
}

async fn stat_for_filter(dir: &Path, name: &str) -> Result<std::fs::Metadata, FilterError> {
    let path = dir.join(name);
    fs::metadata(&path)
        .await
        .map_err(|e| FilterError::Stat(path.display().to_string(), e))
}

/// POSIX `access(2)` check against the process's real uid/gid.
fn access_ok(path: &Path, mode: AccessMode) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(cpath) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    let flag = match mode {
        AccessMode::Read => libc::R_OK,
        AccessMode::Write => libc::W_OK,
        AccessMode::Execute => libc::X_OK,
        AccessMode::Exists => libc::F_OK,
    };
    // SAFETY: cpath is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(cpath.as_ptr(), flag) == 0 }
}
