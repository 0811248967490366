use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LawdeskError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Password hash error: {0}")]
    PasswordHash(String),

    #[error("Time parse error: {0}")]
    TimeParse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl LawdeskError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LawdeskError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            LawdeskError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LawdeskError::Forbidden(_) => StatusCode::FORBIDDEN,
            LawdeskError::NotFound(_) => StatusCode::NOT_FOUND,
            LawdeskError::Conflict(_) => StatusCode::CONFLICT,
            LawdeskError::Json(_)
            | LawdeskError::Db(_)
            | LawdeskError::Io(_)
            | LawdeskError::PasswordHash(_)
            | LawdeskError::TimeParse(_)
            | LawdeskError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LawdeskError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, LawdeskError>;
