use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::RazorpayConfig;
use crate::error::{AppError, Result};

use super::{GatewayOrder, GatewayPayment, OrderRequest, PaymentGateway};

type HmacSha256 = Hmac<Sha256>;

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig, client: Client) -> Self {
        Self {
            client,
            base_url: RAZORPAY_API_BASE.to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::OrderCreateFailed(format!("Razorpay API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::OrderCreateFailed(format!(
                "Razorpay API error ({}): {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::OrderCreateFailed(format!("Failed to parse Razorpay order: {}", e))
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Razorpay API error: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Razorpay payment fetch returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Razorpay payment: {}", e)))
    }
}

// ============ Signatures ============

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign_hex(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid HMAC key".into()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn signature_matches(secret: &str, payload: &[u8], provided: &str) -> bool {
    let Ok(expected) = sign_hex(secret, payload) else {
        return false;
    };
    let provided = provided.trim().to_ascii_lowercase();

    // Length is not secret: always 64 hex chars for SHA-256
    if expected.len() != provided.len() {
        return false;
    }

    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Checkout callback: HMAC over `"{order_id}|{payment_id}"` with the key secret.
pub fn verify_checkout_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let payload = format!("{}|{}", order_id, payment_id);
    signature_matches(key_secret, payload.as_bytes(), signature)
}

/// Webhook delivery: HMAC over the raw request body with the webhook secret.
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    signature_matches(webhook_secret, body, signature)
}

// ============ Webhook payloads ============

#[derive(Debug, Deserialize)]
pub struct RazorpayWebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: RazorpayWebhookPayload,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RazorpayWebhookPayload {
    #[serde(default)]
    pub payment: Option<Entity<GatewayPayment>>,
    #[serde(default)]
    pub order: Option<Entity<RazorpayOrderEntity>>,
    #[serde(default)]
    pub refund: Option<Entity<RazorpayRefund>>,
}

#[derive(Debug, Deserialize)]
pub struct Entity<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayOrderEntity {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl RazorpayWebhookEvent {
    pub fn payment(&self) -> Option<&GatewayPayment> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }

    pub fn order(&self) -> Option<&RazorpayOrderEntity> {
        self.payload.order.as_ref().map(|o| &o.entity)
    }

    pub fn refund(&self) -> Option<&RazorpayRefund> {
        self.payload.refund.as_ref().map(|r| &r.entity)
    }
}
