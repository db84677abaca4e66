use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

/// Payment status of an application's final fee.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Status implied by a payment event name.
    ///
    /// The latest event always wins: a `payment.failed` delivered after
    /// `payment.captured` moves the status back to `failed`.
    /// Returns `None` for events that only get recorded in history.
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "payment.captured" | "order.paid" | "client.verified" => Some(PaymentStatus::Paid),
            "payment.failed" => Some(PaymentStatus::Failed),
            "payment.authorized" => Some(PaymentStatus::Authorized),
            "refund.created" | "refund.processed" | "payment.refunded" => {
                Some(PaymentStatus::Refunded)
            }
            _ => None,
        }
    }
}

/// Accepts amounts stored either as JSON numbers or numeric strings.
///
/// The admin dashboard historically wrote `payable_amount` as a string.
pub fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid amount: {}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid amount type: {}",
            other
        ))),
    }
}

/// One immutable entry in `final_fee_payment.payment_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    pub event: String,
    pub payment_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Amount in rupees (major units)
    pub amount: f64,
    /// Status reported by the gateway for this event
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    /// "webhook" or "client"
    #[serde(default)]
    pub source: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Gateway-side creation time (Unix seconds)
    #[serde(default)]
    pub gateway_created_at: Option<i64>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Metadata of one generated invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceEntry {
    pub number: String,
    pub date: DateTime<Utc>,
    pub amount_paid: f64,
    #[serde(default)]
    pub total_course_fees: Option<f64>,
    #[serde(default)]
    pub discount: Option<f64>,
    pub payment_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Public URL of the uploaded PDF (absent when the upload failed)
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub emailed_to: Vec<String>,
}

/// The `final_fee_payment` sub-document embedded in each application row.
///
/// Unknown keys written by the admin dashboard are preserved in `extra`
/// so read-modify-write cycles never drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalFeePayment {
    #[serde(
        default,
        deserialize_with = "lenient_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub payable_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_order_created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Legacy plain payment token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_used: bool,
    #[serde(default)]
    pub payment_history: Vec<PaymentHistoryEntry>,
    #[serde(default)]
    pub invoice: Vec<InvoiceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FinalFeePayment {
    pub fn is_paid(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Paid)
    }

    /// Whether any history entry references this payment id.
    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.payment_history
            .iter()
            .any(|e| e.payment_id == payment_id)
    }

    /// Whether this exact (payment id, event) pair was already applied.
    pub fn has_event(&self, payment_id: &str, event: &str) -> bool {
        self.payment_history
            .iter()
            .any(|e| e.payment_id == payment_id && e.event == event)
    }
}
