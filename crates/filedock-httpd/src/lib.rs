//! HTTP front for the filedock file-management core.
//!
//! This crate owns the request/response surface: a hyper-based server
//! lifecycle, the dispatcher that routes query-string actions to core
//! operations, JSON action handlers, and byte-range file serving with
//! caching validators.
//!
//! All filesystem logic lives in `filedock-core`; this crate resolves
//! paths, checks signatures, and translates core errors to status codes.

pub mod actions;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod range;
pub mod server;

pub use config::ServerConfig;
pub use dispatch::AppState;
pub use error::{ApiError, ApiResult};
pub use server::FiledockServer;
