//! Error types for the dispatch service

use std::{fmt, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;

/// Why a scan code was refused.
///
/// The precise reason is kept for logging only. Outwardly an unknown code and
/// an expired code are reported identically so callers cannot probe which
/// codes were ever issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// No token was ever issued with this code
    NotFound,
    /// The token exists but its validity window has passed
    Expired,
    /// The token was already exchanged for a command
    AlreadyUsed,
}

impl TokenRejection {
    /// Internal name, used in log lines
    pub fn as_str(self) -> &'static str {
        match self {
            TokenRejection::NotFound => "not_found",
            TokenRejection::Expired => "expired",
            TokenRejection::AlreadyUsed => "already_used",
        }
    }

    /// Reason code reported to the scanning client.
    ///
    /// With `conceal_reuse` set, a reused code is folded into
    /// `expired_or_invalid` as well.
    pub fn reason_code(self, conceal_reuse: bool) -> &'static str {
        match self {
            TokenRejection::AlreadyUsed if !conceal_reuse => "already_used",
            _ => "expired_or_invalid",
        }
    }
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the dispatch operations
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The device identifier was empty or malformed
    #[error("invalid device identifier")]
    InvalidDevice,

    /// A scan arrived without a code
    #[error("missing scan code")]
    MissingCode,

    /// No command exists with the given id
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// The token could not be consumed
    #[error("token rejected: {0}")]
    TokenRejected(TokenRejection),

    /// The store did not answer in time
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    /// The store failed
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl DispatchError {
    /// Whether the caller may retry the same request later
    pub fn is_transient(&self) -> bool {
        match self {
            DispatchError::Timeout(_) => true,
            DispatchError::Store(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Stable reason code for the response body
    pub fn reason_code(&self) -> &'static str {
        match self {
            DispatchError::InvalidDevice => "invalid_device",
            DispatchError::MissingCode => "missing_code",
            DispatchError::CommandNotFound(_) => "not_found",
            DispatchError::TokenRejected(rejection) => rejection.reason_code(false),
            _ if self.is_transient() => "store_unavailable",
            _ => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::InvalidDevice | DispatchError::MissingCode => StatusCode::BAD_REQUEST,
            DispatchError::CommandNotFound(_) => StatusCode::NOT_FOUND,
            // Token rejections are an expected outcome of scanning, not a protocol error.
            DispatchError::TokenRejected(_) => StatusCode::OK,
            _ if self.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Type alias for dispatch results
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by the HTTP layer
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error from a dispatch operation
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Too many scan attempts from one client
    #[error("Too many requests")]
    RateLimited,

    /// Missing or wrong bearer token
    #[error("Unauthorized")]
    Unauthorized,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            ApiError::Dispatch(err) => {
                if !err.is_transient() && err.status_code().is_server_error() {
                    tracing::error!("Dispatch operation failed: {}", err);
                }
                (err.status_code(), err.reason_code())
            }
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };

        let body = Json(json!({
            "ok": false,
            "error": reason,
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_and_expired_share_reason_code() {
        assert_eq!(
            TokenRejection::NotFound.reason_code(false),
            TokenRejection::Expired.reason_code(false)
        );
        assert_eq!(TokenRejection::AlreadyUsed.reason_code(false), "already_used");
    }

    #[test]
    fn test_conceal_reuse_folds_already_used() {
        assert_eq!(
            TokenRejection::AlreadyUsed.reason_code(true),
            "expired_or_invalid"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DispatchError::InvalidDevice.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::CommandNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DispatchError::TokenRejected(TokenRejection::Expired).status_code(),
            StatusCode::OK
        );
        assert_eq!(
            DispatchError::Timeout(Duration::from_secs(3)).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            DispatchError::Store(DatabaseError::Decode("bad".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transient_reason_code() {
        let err = DispatchError::Timeout(Duration::from_millis(10));
        assert_eq!(err.reason_code(), "store_unavailable");
    }
}
