mod razorpay;

pub use razorpay::*;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Order to create at the gateway. Amounts are in minor units (paise).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

/// Order as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

/// Payment entity, both from the fetch API and inside webhook payloads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    /// Minor units
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    /// Razorpay sends `[]` instead of `{}` when there are no notes.
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl GatewayPayment {
    pub fn amount_major(&self) -> f64 {
        from_minor_units(self.amount)
    }

    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).and_then(|v| v.as_str())
    }
}

/// The operations the payment flow needs from a gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the hosted checkout.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment>;
}

/// Rupees -> paise, rounded to the nearest paisa.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Largest amount in paise that an `f64` still holds exactly.
const MAX_MINOR_UNITS: f64 = 9_007_199_254_740_991.0;

/// Rupees -> paise for an amount a payer can be charged: at least one paisa
/// after rounding and small enough to convert without saturating.
pub fn checked_minor_units(amount: f64) -> Option<i64> {
    if !amount.is_finite() {
        return None;
    }
    let minor = (amount * 100.0).round();
    (minor >= 1.0 && minor <= MAX_MINOR_UNITS).then_some(minor as i64)
}

pub fn from_minor_units(amount: i64) -> f64 {
    amount as f64 / 100.0
}
