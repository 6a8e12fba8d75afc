use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::ApiError;

/// Verify the session token from the `Authorization` header and expose its
/// claims to the handler as an `Extension<Claims>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| ApiError::InvalidToken))
        .transpose()?;

    let claims = state.auth.verify_token(auth_header)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
