use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use pinboard_db::StoreError;
use pinboard_types::api::MessageResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Access denied")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Post not found")]
    PostNotFound,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::DuplicateUsername
            | ApiError::InvalidCredentials
            | ApiError::InvalidRole(_)
            | ApiError::BadRequest(_)
            | ApiError::InvalidToken => StatusCode::BAD_REQUEST,
            ApiError::MissingToken => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::PostNotFound => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Store(e) => {
                error!("Storage error: {}", e);
                "Internal server error".to_string()
            }
            ApiError::Internal(e) => {
                error!("Internal error: {:?}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(MessageResponse::new(message))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
