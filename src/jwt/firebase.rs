//! Firebase ID token validation for the direct-amount payment flow.

use std::collections::HashSet;

use async_trait::async_trait;
use jwt_simple::algorithms::RSAPublicKeyLike;
use jwt_simple::prelude::{Token, VerificationOptions};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::jwks::JwksCache;

/// Google's public keys for Firebase Auth ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// The signed-in user behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
}

/// Validates bearer ID tokens. Any failure is `AppError::Unauthorized`.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FirebaseClaims {
    #[serde(default)]
    email: Option<String>,
}

pub struct FirebaseVerifier {
    project_id: String,
    jwks: JwksCache,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            project_id: project_id.into(),
            jwks: JwksCache::new(client),
        }
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity> {
        let metadata = Token::decode_metadata(id_token).map_err(|e| {
            tracing::debug!("Invalid ID token format: {}", e);
            AppError::Unauthorized
        })?;
        let kid = metadata.key_id().ok_or(AppError::Unauthorized)?;

        let public_key = self.jwks.get_key(FIREBASE_JWKS_URL, kid).await?;

        let options = VerificationOptions {
            allowed_issuers: Some(HashSet::from([self.issuer()])),
            allowed_audiences: Some(HashSet::from([self.project_id.clone()])),
            ..Default::default()
        };

        let claims = public_key
            .verify_token::<FirebaseClaims>(id_token, Some(options))
            .map_err(|e| {
                tracing::debug!("ID token verification failed: {}", e);
                AppError::Unauthorized
            })?;

        let uid = claims
            .subject
            .filter(|s| !s.is_empty())
            .ok_or(AppError::Unauthorized)?;

        Ok(VerifiedIdentity {
            uid,
            email: claims.custom.email,
        })
    }
}
