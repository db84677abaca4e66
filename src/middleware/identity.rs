use axum::http::HeaderMap;

use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::jwt::VerifiedIdentity;
use crate::util::extract_bearer_token;

/// Identify the payer of a direct-amount order from its bearer ID token.
///
/// With `require_auth_for_direct_payment` off, a request without a token
/// proceeds anonymously (`Ok(None)`); a token that is present must still
/// verify.
pub async fn authenticate_payer(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<VerifiedIdentity>> {
    let required = state.config.require_auth_for_direct_payment;
    let token = extract_bearer_token(headers);

    match (token, &state.identity) {
        (Some(token), Some(verifier)) => verifier.verify(token).await.map(Some),
        (None, _) if required => Err(AppError::Unauthorized),
        (Some(_), None) if required => {
            Err(AppError::ServerMisconfigured(msg::IDENTITY_NOT_CONFIGURED))
        }
        (Some(_), None) => {
            tracing::debug!("Ignoring bearer token: identity provider not configured");
            Ok(None)
        }
        (None, _) => Ok(None),
    }
}
