//! Path safety and resolution.
//!
//! Client paths arrive as relative strings and must never escape the
//! configured root. [`PathResolver::resolve`] is the only constructor for
//! [`ResolvedPath`], so any `ResolvedPath` in the program is proven safe.
//!
//! Resolution is pure string work; existence checks live in [`probe`], a
//! tri-state lookup so that "not found" is an ordinary branch rather than
//! an error to catch.

use crate::error::{OpError, OpResult};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Resolves client-supplied relative paths against a single root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

/// An absolute path guaranteed to lie within the resolver's root.
///
/// Holds both the absolute path and the normalized relative string the
/// client sent, which callers use for basenames and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    abs: PathBuf,
    rel: String,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and resolve a raw client path.
    ///
    /// The traversal check runs against the raw, unnormalized string: a
    /// substring match on `..` is deliberately stricter than a per-segment
    /// check, closing bypasses built from repeated or mixed separators.
    ///
    /// `must_be_dir`: `Some(true)` guarantees a trailing `/` on the relative
    /// form, `Some(false)` strips one, `None` leaves the string as sent.
    pub fn resolve(&self, raw: &str, must_be_dir: Option<bool>) -> OpResult<ResolvedPath> {
        if raw.contains("..") {
            return Err(OpError::PathTraversal {
                path: raw.to_string(),
            });
        }

        let rel = normalize(raw, must_be_dir);
        let abs = self
            .root
            .join(rel.trim_start_matches('/').trim_end_matches('/'));

        Ok(ResolvedPath { abs, rel })
    }
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.abs
    }

    /// The normalized relative form, as derived from the client string.
    pub fn relative(&self) -> &str {
        &self.rel
    }

    /// Last path segment of the relative form, if any.
    pub fn basename(&self) -> Option<&str> {
        self.rel
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abs.display())
    }
}

/// Collapse separator runs to a single `/` and apply the trailing-slash rule.
fn normalize(raw: &str, must_be_dir: Option<bool>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_sep = false;
    for c in raw.chars() {
        let sep = c == '/' || c == '\\';
        if sep {
            if !prev_sep {
                out.push('/');
            }
        } else {
            out.push(c);
        }
        prev_sep = sep;
    }

    match must_be_dir {
        Some(true) => {
            if !out.ends_with('/') {
                out.push('/');
            }
        }
        Some(false) => {
            if out.ends_with('/') {
                out.pop();
            }
        }
        None => {}
    }

    out
}

/// Tri-state existence check.
#[derive(Debug)]
pub enum PathProbe {
    /// Exists and is not a directory (regular file, symlink target, etc).
    File(Metadata),
    /// Exists and is a directory.
    Dir(Metadata),
    /// Does not exist.
    Absent,
}

impl PathProbe {
    pub fn is_dir(&self) -> bool {
        matches!(self, PathProbe::Dir(_))
    }

    pub fn exists(&self) -> bool {
        !matches!(self, PathProbe::Absent)
    }
}

/// Stat a path without treating "not found" as an error.
///
/// Only a genuine stat failure (permissions, broken mount) surfaces as
/// [`OpError::StatFailed`].
pub async fn probe(path: &Path) -> OpResult<PathProbe> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(PathProbe::Dir(meta)),
        Ok(meta) => Ok(PathProbe::File(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathProbe::Absent),
        Err(e) => Err(OpError::stat_failed(path, e)),
    }
}
