//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Holds the public keys used to validate identity-provider ID tokens.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jwt_simple::prelude::*;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Google rotates its signing keys daily; an hour keeps us well inside that.
const CACHE_DURATION: Duration = Duration::from_secs(3600);

struct CachedJwks {
    /// Key ID (kid) -> public key
    keys: HashMap<String, RS256PublicKey>,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > CACHE_DURATION
    }
}

/// Cache of JWKS keys keyed by JWKS URL.
pub struct JwksCache {
    cache: RwLock<HashMap<String, CachedJwks>>,
    client: reqwest::Client,
}

impl JwksCache {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            client,
        }
    }

    /// Get a public key for a JWKS URL and key ID, fetching when absent or stale.
    ///
    /// An unknown kid in a fresh set triggers one refetch, since the
    /// provider may have rotated keys since we cached them.
    pub async fn get_key(&self, jwks_url: &str, kid: &str) -> Result<RS256PublicKey> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| AppError::Internal("JWKS cache lock poisoned".into()))?;
            if let Some(cached) = cache.get(jwks_url)
                && !cached.is_stale()
                && let Some(key) = cached.keys.get(kid)
            {
                return Ok(key.clone());
            }
        }

        let keys = self.fetch_jwks(jwks_url).await?;
        let key = keys.get(kid).cloned();

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| AppError::Internal("JWKS cache lock poisoned".into()))?;
            cache.insert(
                jwks_url.to_string(),
                CachedJwks {
                    keys,
                    fetched_at: Instant::now(),
                },
            );
        }

        key.ok_or_else(|| {
            tracing::debug!(kid, "Key ID not found in JWKS");
            AppError::Unauthorized
        })
    }

    async fn fetch_jwks(&self, url: &str) -> Result<HashMap<String, RS256PublicKey>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("JWKS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse JWKS JSON: {}", e)))?;

        let keys = parse_jwks(jwks);
        if keys.is_empty() {
            return Err(AppError::Internal(
                "No valid RS256 keys found in JWKS".to_string(),
            ));
        }

        Ok(keys)
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    alg: Option<String>,
    /// RSA modulus (base64url)
    #[serde(default)]
    n: String,
    /// RSA exponent (base64url)
    #[serde(default)]
    e: String,
}

/// Keep RSA keys with a kid and RS256 (or unspecified) algorithm.
fn parse_jwks(jwks: JwksResponse) -> HashMap<String, RS256PublicKey> {
    let mut keys = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" {
            continue;
        }
        if let Some(ref alg) = jwk.alg
            && alg != "RS256"
        {
            continue;
        }
        let Some(kid) = jwk.kid else {
            continue;
        };

        match parse_rsa_public_key(&jwk.n, &jwk.e) {
            Ok(public_key) => {
                keys.insert(kid, public_key);
            }
            Err(e) => {
                tracing::warn!("Failed to parse JWK with kid '{}': {}", kid, e);
            }
        }
    }

    keys
}

fn parse_rsa_public_key(n_b64: &str, e_b64: &str) -> Result<RS256PublicKey> {
    let n = URL_SAFE_NO_PAD
        .decode(n_b64)
        .map_err(|e| AppError::Internal(format!("Invalid base64url for 'n': {}", e)))?;
    let e = URL_SAFE_NO_PAD
        .decode(e_b64)
        .map_err(|e| AppError::Internal(format!("Invalid base64url for 'e': {}", e)))?;

    RS256PublicKey::from_components(&n, &e)
        .map_err(|e| AppError::Internal(format!("Failed to build RSA key: {}", e)))
}
