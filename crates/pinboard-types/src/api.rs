use serde::{Deserialize, Serialize};

use crate::models::{Role, UserId};

// -- JWT Claims --

/// Session token claims. Shared by the auth service (issuing) and the
/// request middleware (verifying).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: UserId,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// Defaults to `user` when omitted.
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

// -- Posts --

#[derive(Debug, Deserialize)]
pub struct PostContentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub comment: String,
}

// -- Generic --

/// Body of every non-data response, successful or not.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
