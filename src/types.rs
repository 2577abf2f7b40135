// Error taxonomy and HTTP mapping

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("You have already voted in this poll.")]
    AlreadyVoted,

    #[error("Database error: {0}")]
    Database(String),

    #[error("{message}")]
    AuthService { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyVoted => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // 4xx from the auth service is the caller's problem, anything else is ours
            AppError::AuthService { status, .. } if (400..500).contains(status) => {
                StatusCode::BAD_REQUEST
            }
            AppError::AuthService { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::RateLimited(_) => "rate_limit",
            AppError::Unauthenticated => "authentication",
            AppError::Forbidden(_) => "authorization",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyVoted => "already_voted",
            AppError::Database(_) => "database",
            AppError::AuthService { .. } => "auth_service",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Message shown to the caller. Store and internal failures are never
    /// echoed back verbatim.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Database(e.to_string())
    }
}

// Malformed requests get the same JSON error body as every other failure

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
    pub code: &'static str,
    pub status_code: u16,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Database(detail) => tracing::error!(%detail, "Store operation failed"),
            AppError::Internal(detail) => tracing::error!(%detail, "Internal error"),
            AppError::Forbidden(msg) => tracing::warn!(%msg, "Authorization rejected"),
            AppError::AuthService { status, message } => {
                tracing::warn!(status, %message, "Auth service rejected request")
            }
            AppError::RateLimited(msg) => tracing::info!(%msg, "Rate limit exceeded"),
            AppError::AlreadyVoted => tracing::info!("Duplicate vote rejected"),
            other => tracing::debug!(error = %other, "Request rejected"),
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.public_message(),
                code: self.code(),
                status_code: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}
