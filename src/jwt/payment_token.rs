//! Signed short-lived payment authorization tokens.
//!
//! Admin tooling mints a token for `{userId, amount}`; the payer's browser
//! carries it to the order endpoint. Tokens are HS256 JWTs with `iat`/`exp`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jwt_simple::JWTError;
use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// `type` of a token that authorizes paying the final fee.
pub const FINAL_FEE_TOKEN: &str = "final_fee";
/// `type` of the token handed back to the browser after a verified payment.
pub const RECEIPT_TOKEN: &str = "payment_receipt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("unexpected token type: {0}")]
    WrongType(String),
}

impl From<TokenError> for AppError {
    fn from(_: TokenError) -> Self {
        AppError::InvalidToken
    }
}

/// Custom claims carried by a payment token. `iat`/`exp` are standard claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTokenClaims {
    pub user_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Claims decoded from a token without checking its signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPaymentToken {
    pub user_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl DecodedPaymentToken {
    pub fn is_expired(&self, now: i64) -> bool {
        self.exp.is_some_and(|exp| now >= exp)
    }
}

/// Decode a token's claims without verifying it. Only for display.
pub fn decode_unverified(token: &str) -> Result<DecodedPaymentToken, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Encodes and verifies payment tokens with a shared secret.
#[derive(Clone)]
pub struct PaymentTokenCodec {
    key: HS256Key,
    ttl_secs: u64,
}

impl PaymentTokenCodec {
    pub fn new(secret: &str, ttl_minutes: u64) -> Self {
        Self {
            key: HS256Key::from_bytes(secret.as_bytes()),
            ttl_secs: ttl_minutes * 60,
        }
    }

    /// Encode claims valid from now for the configured TTL.
    pub fn encode(&self, claims: &PaymentTokenClaims) -> Result<String, AppError> {
        self.encode_with_ttl(claims, self.ttl_secs)
    }

    pub fn encode_with_ttl(
        &self,
        claims: &PaymentTokenClaims,
        ttl_secs: u64,
    ) -> Result<String, AppError> {
        let issued_at = chrono::Utc::now().timestamp();
        self.encode_at(claims, issued_at, issued_at + ttl_secs as i64)
    }

    /// Encode claims with explicit `iat`/`exp` (Unix seconds).
    pub fn encode_at(
        &self,
        claims: &PaymentTokenClaims,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<String, AppError> {
        let mut jwt_claims = Claims::with_custom_claims(claims.clone(), Duration::from_secs(0));
        jwt_claims.issued_at = Some(Duration::from_secs(issued_at.max(0) as u64));
        jwt_claims.invalid_before = None;
        jwt_claims.expires_at = Some(Duration::from_secs(expires_at.max(0) as u64));

        self.key
            .authenticate(jwt_claims)
            .map_err(|e| AppError::Internal(format!("Failed to sign payment token: {}", e)))
    }

    /// Verify signature and expiry, returning the custom claims.
    pub fn verify(&self, token: &str) -> Result<PaymentTokenClaims, TokenError> {
        let options = VerificationOptions {
            time_tolerance: Some(Duration::from_secs(0)),
            ..Default::default()
        };

        match self.key.verify_token::<PaymentTokenClaims>(token, Some(options)) {
            Ok(claims) => Ok(claims.custom),
            Err(e) => match e.downcast_ref::<JWTError>() {
                Some(JWTError::TokenHasExpired) => Err(TokenError::Expired),
                Some(JWTError::InvalidAuthenticationTag) => Err(TokenError::InvalidSignature),
                _ if decode_unverified(token).is_err() => Err(TokenError::Malformed),
                _ => Err(TokenError::InvalidSignature),
            },
        }
    }

    /// Verify and additionally require a specific `type`.
    pub fn verify_typed(
        &self,
        token: &str,
        expected_type: &str,
    ) -> Result<PaymentTokenClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != expected_type {
            return Err(TokenError::WrongType(claims.token_type));
        }
        Ok(claims)
    }
}
