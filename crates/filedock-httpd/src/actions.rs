//! JSON action handlers.
//!
//! Each `?action=` value maps to one handler taking the parsed request
//! body. Batch actions process elements in order and abort on the first
//! failure, so earlier elements may already have been applied.

use crate::dispatch::{json_response, ok_empty, AppState, Body};
use crate::error::{ApiError, ApiResult};
use filedock_core::list::{self, AccessMode, ListFilter};
use filedock_core::{probe, OpError, PathProbe};
use hyper::header::{HeaderValue, WARNING};
use hyper::Response;
use serde::Deserialize;
use serde_json::Value;
use std::io;
use std::os::unix::fs::MetadataExt;
use tokio::fs;
use tracing::debug;

/// Route a parsed action to its handler.
pub async fn dispatch(state: &AppState, action: &str, body: &[u8]) -> ApiResult<Response<Body>> {
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequestBody(format!("bad JSON body: {e}")))?;
    if !json.is_object() {
        return Err(ApiError::BadRequestBody(
            "bad JSON body: expected an object".to_string(),
        ));
    }

    match action {
        "list" => list_names(state, parse(json)?).await,
        "slist" => list_detailed(state, parse(json)?).await,
        "stat" => stat_one(state, parse(json)?).await,
        "copy" => copy_batch(state, parse(json)?).await,
        "rename" => rename_batch(state, parse(json)?).await,
        "move" | "fmove" => move_batch(state, parse(json)?).await,
        "delete" => delete_batch(state, parse(json)?).await,
        "touch" => touch_batch(state, parse(json)?).await,
        "mkdir" => mkdir_batch(state, parse(json)?).await,
        other => Err(ApiError::UnknownAction(other.to_string())),
    }
}

fn parse<T: serde::de::DeserializeOwned>(json: Value) -> ApiResult<T> {
    serde_json::from_value(json).map_err(|e| ApiError::BadRequestBody(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ListRequest {
    path: String,
    #[serde(flatten)]
    select: Option<SelectRequest>,
}

/// Optional listing filter, discriminated by the `select` key.
#[derive(Debug, Deserialize)]
#[serde(tag = "select", rename_all = "lowercase")]
enum SelectRequest {
    Name {
        reg: String,
    },
    Type {
        #[serde(rename = "type")]
        kind: TypeSelector,
    },
    Size {
        min: Option<u64>,
        max: Option<u64>,
    },
    Mode {
        mode: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TypeSelector {
    Dir,
    File,
}

impl SelectRequest {
    fn into_filter(self) -> ListFilter {
        match self {
            SelectRequest::Name { reg } => ListFilter::Name { pattern: reg },
            SelectRequest::Type { kind } => ListFilter::Type {
                dirs: matches!(kind, TypeSelector::Dir),
            },
            SelectRequest::Size { min, max } => ListFilter::Size { min, max },
            SelectRequest::Mode { mode } => ListFilter::Mode {
                mode: match mode.as_deref() {
                    Some("r") => AccessMode::Read,
                    Some("w") => AccessMode::Write,
                    Some("x") => AccessMode::Execute,
                    _ => AccessMode::Exists,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PathRequest {
    path: String,
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    from: Vec<String>,
    to: String,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    pairs: Vec<RenamePair>,
}

#[derive(Debug, Deserialize)]
struct RenamePair {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TouchRequest {
    files: Vec<String>,
    mode: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MkdirRequest {
    files: Vec<String>,
}

/// `list`: names only. A failed filter degrades to the unfiltered listing,
/// reported through the `Warning` response header.
async fn list_names(state: &AppState, req: ListRequest) -> ApiResult<Response<Body>> {
    let dir = state.resolver.resolve(&req.path, Some(true))?;
    let filter = req.select.map(SelectRequest::into_filter);
    let listing = list::list(dir.as_path(), filter.as_ref()).await?;

    let mut resp = json_response(&listing.names)?;
    if let Some(warning) = listing.warning
        && let Ok(v) = HeaderValue::from_str(&warning)
    {
        resp.headers_mut().insert(WARNING, v);
    }
    Ok(resp)
}

/// `slist`: full metadata per entry.
async fn list_detailed(state: &AppState, req: PathRequest) -> ApiResult<Response<Body>> {
    let dir = state.resolver.resolve(&req.path, Some(true))?;
    let entries = list::list_detailed(dir.as_path()).await?;
    json_response(&entries)
}

/// `stat`: metadata for a single path.
async fn stat_one(state: &AppState, req: PathRequest) -> ApiResult<Response<Body>> {
    let target = state.resolver.resolve(&req.path, None)?;
    let name = target.basename().unwrap_or("/");
    let entry = list::stat_entry(target.as_path(), name).await?;
    json_response(&entry)
}

/// `copy`: copy each source into an existing destination directory, keeping
/// the source basename.
async fn copy_batch(state: &AppState, req: TransferRequest) -> ApiResult<Response<Body>> {
    let to = state.resolver.resolve(&req.to, Some(true))?;
    require_dir(&to.to_string(), probe(to.as_path()).await?)?;

    for raw in &req.from {
        let from = state.resolver.resolve(raw, Some(false))?;
        let basename = from
            .basename()
            .ok_or_else(|| ApiError::BadRequest(format!("unknown source '{raw}'")))?;
        debug!(from = %from, to = %to, "copy");
        state
            .ops
            .copy(from.as_path(), &to.as_path().join(basename))
            .await?;
    }
    Ok(ok_empty())
}

/// `rename`: ordered from/to pairs, plain renames within the root. Pair
/// order is the execution order, so chains like a→b, c→a work.
async fn rename_batch(state: &AppState, req: RenameRequest) -> ApiResult<Response<Body>> {
    for pair in &req.pairs {
        let from = state.resolver.resolve(&pair.from, Some(false))?;
        let to = state.resolver.resolve(&pair.to, Some(false))?;
        debug!(from = %from, to = %to, "rename");
        fs::rename(from.as_path(), to.as_path())
            .await
            .map_err(|e| OpError::Io {
                path: from.to_string(),
                source: e,
            })?;
    }
    Ok(ok_empty())
}

/// `move` / `fmove`: relocate each source into an existing destination
/// directory. Falls back to copy-and-delete across devices and merges
/// into existing directories.
async fn move_batch(state: &AppState, req: TransferRequest) -> ApiResult<Response<Body>> {
    let to = state.resolver.resolve(&req.to, Some(true))?;
    let meta = require_dir(&to.to_string(), probe(to.as_path()).await?)?;
    let ctx_dev = meta.dev();

    for raw in &req.from {
        let from = state.resolver.resolve(raw, Some(false))?;
        let basename = from
            .basename()
            .ok_or_else(|| ApiError::BadRequest(format!("unknown source '{raw}'")))?;
        debug!(from = %from, to = %to, "move");
        state
            .ops
            .move_entry(from.as_path(), &to.as_path().join(basename), Some(ctx_dev))
            .await?;
    }
    Ok(ok_empty())
}

/// `delete`: remove each path, directories recursively. First failure
/// aborts the rest of the batch.
async fn delete_batch(state: &AppState, req: DeleteRequest) -> ApiResult<Response<Body>> {
    for raw in &req.files {
        let target = state.resolver.resolve(raw, None)?;
        debug!(target = %target, "delete");
        state.ops.delete(target.as_path()).await?;
    }
    Ok(ok_empty())
}

/// `touch`: create (or truncate) each file with the requested mode.
async fn touch_batch(state: &AppState, req: TouchRequest) -> ApiResult<Response<Body>> {
    let mode = req.mode.unwrap_or(0o755);
    for raw in &req.files {
        let target = state.resolver.resolve(raw, Some(false))?;
        debug!(target = %target, mode, "touch");
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(target.as_path())
            .await
            .map_err(|e| OpError::AccessDenied {
                path: target.to_string(),
                source: e,
            })?;
    }
    Ok(ok_empty())
}

/// `mkdir`: create each directory, parents included.
async fn mkdir_batch(state: &AppState, req: MkdirRequest) -> ApiResult<Response<Body>> {
    for raw in &req.files {
        let target = state.resolver.resolve(raw, Some(true))?;
        debug!(target = %target, "mkdir");
        fs::create_dir_all(target.as_path())
            .await
            .map_err(|e| OpError::AccessDenied {
                path: target.to_string(),
                source: e,
            })?;
    }
    Ok(ok_empty())
}

/// The destination of a batch copy/move must be an existing directory.
fn require_dir(path: &str, probe: PathProbe) -> ApiResult<std::fs::Metadata> {
    match probe {
        PathProbe::Dir(meta) => Ok(meta),
        PathProbe::File(_) => Err(ApiError::BadRequest(format!("'{path}' is not a dir"))),
        PathProbe::Absent => Err(OpError::StatFailed {
            path: path.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
        }
        .into()),
    }
}
