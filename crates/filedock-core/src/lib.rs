//! Single-root file-management core.
//!
//! Everything in this crate operates beneath one configured base directory:
//! client-supplied relative paths are validated by [`path::PathResolver`],
//! directories are enumerated and filtered by [`list`], trees are copied,
//! deleted and moved by [`ops::FileOps`], and mutating requests are
//! authenticated by [`auth::RequestSigner`].
//!
//! The crate is transport-agnostic: no HTTP types appear here. The
//! `filedock-httpd` crate owns the request/response surface and calls in.

pub mod auth;
pub mod error;
pub mod list;
pub mod ops;
pub mod path;

pub use auth::RequestSigner;
pub use error::{OpError, OpResult};
pub use list::{AccessMode, EntryKind, FileEntry, ListFilter, Listing};
pub use ops::FileOps;
pub use path::{probe, PathProbe, PathResolver, ResolvedPath};
