//! Service error types with HTTP status code mapping.
//!
//! [`PricefeedError`] is the central error type. Each variant maps to a
//! specific HTTP status code and a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::olt_url::UrlError;
use crate::te::TeError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3001,
///     "message": "store error: connection refused",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`PricefeedError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category   | HTTP Status               |
/// |-----------|------------|---------------------------|
/// | 1000–1999 | Validation | 400 Bad Request           |
/// | 3000–3999 | Server     | 500 Internal Server Error |
/// | 4000–4999 | Upstream   | 502 Bad Gateway           |
#[derive(Debug, thiserror::Error)]
pub enum PricefeedError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Relational store failure.
    #[error("store error: {0}")]
    Store(String),

    /// SEO URL derivation failure.
    #[error("url error: {0}")]
    Url(#[from] UrlError),

    /// Upstream TE API failure that aborted the whole operation.
    #[error("upstream error: {0}")]
    Upstream(#[from] TeError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PricefeedError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Config(_) => 1002,
            Self::Store(_) => 3001,
            Self::Internal(_) => 3000,
            Self::Url(_) => 3002,
            Self::Upstream(_) => 4001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Internal(_) | Self::Url(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for PricefeedError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
