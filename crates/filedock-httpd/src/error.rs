//! HTTP-facing error type and status mapping.
//!
//! Core errors pass through wrapped; the HTTP layer adds the request-level
//! failures (bad range, auth, malformed body) and maps every variant to the
//! status code the client sees.

use filedock_core::OpError;
use hyper::StatusCode;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A core path/listing/tree-operation failure.
    #[error(transparent)]
    Op(#[from] OpError),

    /// Malformed `Range` header syntax or an illegal window.
    #[error("bad range: {0}")]
    BadRange(String),

    /// A syntactically valid range that the file cannot satisfy.
    #[error("range not satisfiable (file size {size})")]
    RangeUnsatisfiable { size: u64 },

    /// Signature missing or failed verification.
    #[error("signature verification failed")]
    AuthFailure,

    /// Body present but not the JSON object the action expects.
    #[error("bad request body: {0}")]
    BadRequestBody(String),

    /// The request body could not be retrieved at all.
    #[error("request body unavailable")]
    BodyUnavailable,

    /// Unrecognized `action` query parameter.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// Any other malformed request (missing fields, wrong method).
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// The status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            // Path and access violations, including traversal, are 403.
            ApiError::Op(_) => StatusCode::FORBIDDEN,
            ApiError::BadRange(_)
            | ApiError::BadRequestBody(_)
            | ApiError::UnknownAction(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RangeUnsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::AuthFailure => StatusCode::UNAUTHORIZED,
            ApiError::BodyUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result alias for handler code.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let traversal = ApiError::Op(OpError::PathTraversal {
            path: "../x".into(),
        });
        assert_eq!(traversal.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRange("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::RangeUnsatisfiable { size: 10 }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(ApiError::AuthFailure.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::BodyUnavailable.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::UnknownAction("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
