//! Error types for gdf-profile

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Account store failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Store not configured or not reachable at all
    #[error("Account store unavailable: {0}")]
    Unavailable(String),

    /// Token missing, expired or revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Store answered with a non-auth error status
    #[error("Store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unparseable store response: {0}")]
    Parse(String),
}

/// Generation Service failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation network error: {0}")]
    Network(String),

    #[error("Generation API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response did not follow the expected contract
    #[error("Malformed generation response: {0}")]
    Malformed(String),
}

/// Errors surfaced by the reconciliation driver and guest cache
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Account store unavailable: {0}")]
    StoreUnavailable(String),

    /// Write timed out or was rejected; local state kept
    #[error("Profile write failed: {0}")]
    WriteFailed(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(GenerationError),

    #[error("Generation response malformed: {0}")]
    GenerationMalformed(String),

    #[error("Stored record corrupt: {0}")]
    RecordCorrupt(String),

    #[error("AI request quota exhausted ({made}/{limit})")]
    QuotaExceeded { made: i64, limit: i64 },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<GenerationError> for ProfileError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Malformed(msg) => ProfileError::GenerationMalformed(msg),
            other => ProfileError::GenerationFailed(other),
        }
    }
}

impl From<StoreError> for ProfileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized(_) => ProfileError::Unauthenticated,
            StoreError::Parse(msg) => ProfileError::RecordCorrupt(msg),
            other => ProfileError::StoreUnavailable(other.to_string()),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Upstream failure: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] gdf_common::Error),
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        let message = err.to_string();
        match err {
            ProfileError::Unauthenticated => ApiError::Unauthorized(message),
            ProfileError::UnknownTask(_) => ApiError::NotFound(message),
            ProfileError::QuotaExceeded { .. } => ApiError::TooManyRequests(message),
            ProfileError::GenerationFailed(_)
            | ProfileError::GenerationMalformed(_)
            | ProfileError::WriteFailed(_) => {
                ApiError::BadGateway(message)
            }
            ProfileError::StoreUnavailable(_) => ApiError::Unavailable(message),
            ProfileError::RecordCorrupt(_) | ProfileError::Database(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ProfileError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            ProfileError::from(StoreError::Unauthorized("expired".into())),
            ProfileError::Unauthenticated
        ));
        assert!(matches!(
            ProfileError::from(StoreError::Network("reset".into())),
            ProfileError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        let resp = ApiError::Forbidden("admin only".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_quota_maps_to_429() {
        let resp = ApiError::from(ProfileError::QuotaExceeded { made: 5, limit: 5 }).into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
