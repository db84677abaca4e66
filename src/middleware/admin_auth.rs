use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::{AppError, msg};
use crate::util::extract_bearer_token;

/// Guard for admin tooling routes: `Authorization: Bearer {ADMIN_API_KEY}`.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .config
        .admin_api_key
        .as_deref()
        .ok_or(AppError::ServerMisconfigured(msg::ADMIN_KEY_NOT_CONFIGURED))?;

    let provided = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    if provided.len() != expected.len() || !bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
    {
        tracing::warn!("Rejected admin request with invalid API key");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
