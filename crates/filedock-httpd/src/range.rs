//! Byte-range file serving with caching validators.
//!
//! The validator is the file's last-change time in milliseconds, base-36
//! encoded, sent as an opaque `ETag`. Clients echo it back (standard
//! `If-None-Match`, or the bare `ETag` request header the original frontend
//! sends) to get a bodyless 304.
//!
//! Bodies are lazy chunked streams over the open file: a chunk is read only
//! when the connection wants it and reads never pass the requested window.
//! A zero-byte read inside the window means the file shrank after stat; the
//! stream yields an error so the connection fails instead of delivering a
//! silently short body under an already-sent `Content-Length`.

use crate::dispatch::{empty_body, Body};
use crate::error::{ApiError, ApiResult};
use bytes::Bytes;
use filedock_core::{OpError, ResolvedPath};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, IF_NONE_MATCH, RANGE};
use hyper::{HeaderMap, Response, StatusCode};
use std::io::{self, SeekFrom};
use std::os::unix::fs::MetadataExt;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Serve a file's bytes, honoring conditional and byte-range requests.
pub async fn serve(
    path: &ResolvedPath,
    headers: &HeaderMap,
    mime: Option<&str>,
    chunk_size: usize,
) -> ApiResult<Response<Body>> {
    let mut file = fs::File::open(path.as_path()).await.map_err(|e| {
        OpError::AccessDenied {
            path: path.to_string(),
            source: e,
        }
    })?;
    let meta = file.metadata().await.map_err(|e| OpError::StatFailed {
        path: path.to_string(),
        source: e,
    })?;
    if !meta.is_file() {
        return Err(OpError::AccessDenied {
            path: path.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        }
        .into());
    }

    let size = meta.len();
    let ctime_ms = u128::try_from(meta.ctime() * 1000 + meta.ctime_nsec() / 1_000_000).unwrap_or(0);
    let validator = base36(ctime_ms);

    let content_type = mime
        .and_then(|m| HeaderValue::from_str(m).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_MIME));

    // Cache hit: validator matches, no body.
    if client_validator(headers).is_some_and(|v| v == validator) {
        let mut resp = Response::new(empty_body());
        *resp.status_mut() = StatusCode::NOT_MODIFIED;
        set_common_headers(&mut resp, &content_type, &validator);
        resp.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(size));
        return Ok(resp);
    }

    if let Some(range) = headers.get(RANGE) {
        let range = range
            .to_str()
            .map_err(|_| ApiError::BadRange("unreadable header".to_string()))?;
        let (start, end) = parse_range(range, size)?;
        let len = end - start + 1;
        debug!(path = %path, start, end, size, "serving partial content");

        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| OpError::Io {
                path: path.to_string(),
                source: e,
            })?;

        let mut resp = Response::new(stream_body(file, len, chunk_size));
        *resp.status_mut() = StatusCode::PARTIAL_CONTENT;
        set_common_headers(&mut resp, &content_type, &validator);
        resp.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(len));
        if let Ok(cr) = HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")) {
            resp.headers_mut().insert(CONTENT_RANGE, cr);
        }
        return Ok(resp);
    }

    debug!(path = %path, size, "serving full content");
    let mut resp = Response::new(stream_body(file, size, chunk_size));
    set_common_headers(&mut resp, &content_type, &validator);
    resp.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(size));
    Ok(resp)
}

fn set_common_headers(resp: &mut Response<Body>, content_type: &HeaderValue, validator: &str) {
    resp.headers_mut().insert(CONTENT_TYPE, content_type.clone());
    if let Ok(v) = HeaderValue::from_str(validator) {
        resp.headers_mut().insert(ETAG, v);
    }
}

/// The validator the client sent, if any. Quotes are tolerated.
fn client_validator(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(IF_NONE_MATCH)
        .or_else(|| headers.get("etag"))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().trim_matches('"'))
}

/// Parse `bytes=<start>-<end>` where either bound may be omitted.
///
/// Returns the inclusive `[start, end]` window. Malformed syntax is a 400,
/// a window the file cannot satisfy (either bound at or past EOF) is a 416,
/// and an inverted explicit window is a 400.
fn parse_range(header: &str, size: u64) -> ApiResult<(u64, u64)> {
    let bad = || ApiError::BadRange(header.to_string());

    let spec = header.trim().strip_prefix("bytes=").ok_or_else(bad)?.trim();
    let (first, second) = spec.split_once('-').ok_or_else(bad)?;
    let (first, second) = (first.trim(), second.trim());
    if first.is_empty() && second.is_empty() {
        return Err(bad());
    }

    let (start, end) = if first.is_empty() {
        // Suffix form `-N`: the last N bytes.
        let n: u64 = second.parse().map_err(|_| bad())?;
        if size == 0 {
            return Err(ApiError::RangeUnsatisfiable { size });
        }
        (size.saturating_sub(n), size - 1)
    } else if second.is_empty() {
        // Open form `N-`: from byte N to end-of-file.
        let start: u64 = first.parse().map_err(|_| bad())?;
        let end = size.checked_sub(1).ok_or(ApiError::RangeUnsatisfiable { size })?;
        (start, end)
    } else {
        (
            first.parse().map_err(|_| bad())?,
            second.parse().map_err(|_| bad())?,
        )
    };

    if start >= size || end >= size {
        return Err(ApiError::RangeUnsatisfiable { size });
    }
    if end < start {
        return Err(ApiError::BadRange(format!(
            "illegal range ({start} > {end})"
        )));
    }
    Ok((start, end))
}

/// Stream `remaining` bytes from the file's current position in fixed
/// chunks, the last one truncated to the remainder.
fn stream_body(file: fs::File, remaining: u64, chunk_size: usize) -> Body {
    let stream = futures::stream::try_unfold(
        (file, remaining),
        move |(mut file, remaining)| async move {
            if remaining == 0 {
                return Ok::<_, io::Error>(None);
            }
            let want = chunk_size.min(usize::try_from(remaining).unwrap_or(chunk_size));
            let mut buf = vec![0u8; want];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                // File shrank under us; fail the stream rather than hand the
                // client a short body it would take for complete.
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file truncated while streaming, {remaining} bytes short"),
                ));
            }
            buf.truncate(n);
            Ok(Some((Frame::data(Bytes::from(buf)), (file, remaining - n as u64))))
        },
    );
    BodyExt::boxed(StreamBody::new(stream))
}

/// Base-36 rendering of the change timestamp, lowercase digits.
fn base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
