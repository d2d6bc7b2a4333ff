//! Request routing.
//!
//! The dispatcher owns the request/response objects: it parses the method,
//! query string and body, verifies signatures where required, and delegates
//! to the range server or the JSON action handlers. Failures are rendered
//! as plain-text bodies naming the failing sub-operation.

use crate::actions;
use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::range;
use bytes::Bytes;
use filedock_core::auth::DEFAULT_WINDOW;
use filedock_core::{FileOps, OpError, PathProbe, PathResolver, RequestSigner};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ALLOW, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// Response body type used throughout the crate.
pub type Body = BoxBody<Bytes, io::Error>;

/// Actions that never require a signature.
const AUTH_EXEMPT: &[&str] = &["list", "slist"];

/// Shared per-server state handed to every request.
pub struct AppState {
    pub config: ServerConfig,
    pub resolver: PathResolver,
    pub ops: FileOps,
    pub signer: RequestSigner,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let resolver = PathResolver::new(&config.root);
        let ops = FileOps::new(config.chunk_size);
        let signer = RequestSigner::new(config.secret.clone(), DEFAULT_WINDOW);
        Self {
            config,
            resolver,
            ops,
            signer,
        }
    }
}

pub fn empty_body() -> Body {
    BodyExt::boxed(Empty::new().map_err(io::Error::other))
}

pub fn full_body(bytes: impl Into<Bytes>) -> Body {
    BodyExt::boxed(Full::new(bytes.into()).map_err(io::Error::other))
}

pub(crate) fn text_response(status: StatusCode, msg: impl Into<Bytes>) -> Response<Body> {
    let mut resp = Response::new(full_body(msg));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    resp
}

pub(crate) fn ok_empty() -> Response<Body> {
    text_response(StatusCode::OK, "")
}

pub(crate) fn json_response<T: serde::Serialize>(value: &T) -> ApiResult<Response<Body>> {
    let body =
        serde_json::to_vec(value).map_err(|e| ApiError::BadRequest(format!("serialize: {e}")))?;
    let mut resp = Response::new(full_body(body));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(resp)
}

/// Entry point for one request. Never fails: errors become responses.
pub async fn handle(state: Arc<AppState>, req: Request<Incoming>) -> Response<Body> {
    let query = parse_query(req.uri().query());
    let label = operation_label(req.method(), &query);

    let mut resp = match route(&state, req, &query).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(operation = label, error = %e, "request failed");
            text_response(e.status(), format!("{label} Error: {e}"))
        }
    };

    if state.config.cors_enabled {
        let headers = resp.headers_mut();
        headers.insert(
            "Access-Control-Allow-Origin",
            HeaderValue::from_static("*"),
        );
        headers.insert(
            "Access-Control-Request-Method",
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            "Access-Control-Allow-Headers",
            HeaderValue::from_static("Content-Type, Authorization"),
        );
    }
    resp
}

async fn route(
    state: &AppState,
    req: Request<Incoming>,
    query: &HashMap<String, String>,
) -> ApiResult<Response<Body>> {
    if req.method() == Method::OPTIONS {
        let mut resp = Response::new(empty_body());
        *resp.status_mut() = StatusCode::NO_CONTENT;
        resp.headers_mut()
            .insert(ALLOW, HeaderValue::from_static("OPTIONS, GET, POST"));
        return Ok(resp);
    }

    if state.config.file_serving
        && req.method() == Method::GET
        && let Some(file) = query.get("file")
    {
        let path = state.resolver.resolve(file, Some(false))?;
        return range::serve(
            &path,
            req.headers(),
            query.get("mime").map(String::as_str),
            state.config.chunk_size,
        )
        .await;
    }

    let Some(action) = query.get("action") else {
        return Err(ApiError::BadRequest(
            "invalid request: action should be defined".to_string(),
        ));
    };

    if req.method() == Method::GET && action == "upload" {
        return preflight_upload(state, req.headers(), query).await;
    }

    let content_length = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if req.method() != Method::POST || content_length == 0 {
        return Err(ApiError::BadRequest(
            "bad method (POST only) or missing body".to_string(),
        ));
    }

    if action == "upload" {
        return upload(state, req, query, content_length).await;
    }

    let auth_header = header_str(req.headers(), &AUTHORIZATION);
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|_| ApiError::BodyUnavailable)?
        .to_bytes();

    if !AUTH_EXEMPT.contains(&action.as_str())
        && !state
            .signer
            .verify(auth_header.as_deref(), content_length, &body)
    {
        return Err(ApiError::AuthFailure);
    }

    actions::dispatch(state, action, &body).await
}

/// `GET ?action=upload&length=N&path=P`: existence probe before an upload.
/// Gated by the signature over the declared length and the target path.
async fn preflight_upload(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> ApiResult<Response<Body>> {
    let raw_path = query
        .get("path")
        .ok_or_else(|| ApiError::BadRequest("missing `path` parameter".to_string()))?;
    let length: u64 = query
        .get("length")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::BadRequest("missing or invalid `length` parameter".to_string()))?;

    let auth_header = header_str(headers, &AUTHORIZATION);
    if !state
        .signer
        .verify(auth_header.as_deref(), length, raw_path.as_bytes())
    {
        return Err(ApiError::AuthFailure);
    }

    let path = state.resolver.resolve(raw_path, Some(false))?;
    let body = match filedock_core::probe(path.as_path()).await? {
        PathProbe::Absent => serde_json::json!({ "exists": false }),
        PathProbe::File(meta) => {
            serde_json::json!({ "exists": true, "type": "file", "size": meta.len() })
        }
        PathProbe::Dir(_) => serde_json::json!({ "exists": true, "type": "dir" }),
    };
    json_response(&body)
}

/// `POST ?action=upload&path=P`: stream the request body verbatim to `P`.
async fn upload(
    state: &AppState,
    req: Request<Incoming>,
    query: &HashMap<String, String>,
    content_length: u64,
) -> ApiResult<Response<Body>> {
    let raw_path = query
        .get("path")
        .ok_or_else(|| ApiError::BadRequest("missing `path` parameter".to_string()))?;

    let auth_header = header_str(req.headers(), &AUTHORIZATION);
    if !state
        .signer
        .verify(auth_header.as_deref(), content_length, raw_path.as_bytes())
    {
        return Err(ApiError::AuthFailure);
    }

    let dest = state.resolver.resolve(raw_path, Some(false))?;
    debug!(dest = %dest, length = content_length, "upload");

    let mut file = fs::File::create(dest.as_path())
        .await
        .map_err(|e| OpError::AccessDenied {
            path: dest.to_string(),
            source: e,
        })?;

    let mut body = req.into_body();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|_| ApiError::BodyUnavailable)?;
        if let Some(data) = frame.data_ref() {
            file.write_all(data).await.map_err(|e| OpError::Io {
                path: dest.to_string(),
                source: e,
            })?;
        }
    }
    file.flush().await.map_err(|e| OpError::Io {
        path: dest.to_string(),
        source: e,
    })?;

    Ok(ok_empty())
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Human-readable label for the failing sub-operation in error bodies.
fn operation_label(method: &Method, query: &HashMap<String, String>) -> &'static str {
    if method == Method::GET && query.contains_key("file") {
        return "File Serve";
    }
    match query.get("action").map(String::as_str) {
        Some("upload") => "Upload",
        Some("list" | "slist") => "List",
        Some("stat") => "Stat",
        Some("copy") => "Copy",
        Some("rename") => "Rename",
        Some("move" | "fmove") => "Move",
        Some("delete") => "Delete",
        Some("touch") => "Create File",
        Some("mkdir") => "Create Dir",
        _ => "Core",
    }
}
