use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Hint strings returned to the payment page alongside the error code.
pub mod msg {
    pub const INVALID_TOKEN: &str = "The payment link is invalid or has expired. Ask the admissions team for a new link.";
    pub const TOKEN_NOT_FOUND: &str = "No pending payment matches this link.";
    pub const TOKEN_EXPIRED: &str = "This payment link has expired. Ask the admissions team for a new link.";
    pub const TOKEN_USED: &str = "This payment link has already been used.";
    pub const ALREADY_PAID: &str = "The fee for this application has already been paid.";
    pub const UNAUTHORIZED: &str = "Sign in again and retry the payment.";
    pub const INVALID_AMOUNT: &str = "Amount must be a positive number.";
    pub const INVALID_SIGNATURE: &str = "Payment could not be verified. If money was debited it will be reconciled automatically.";
    pub const APPLICATION_NOT_FOUND: &str = "No application is linked to this payment.";
    pub const ORDER_CREATE_FAILED: &str = "Could not start the payment. Please try again in a few minutes.";
    pub const UPDATE_FAILED: &str = "Payment received but could not be recorded yet. It will be reconciled automatically.";
    pub const SERVER_MISCONFIGURED: &str = "Payments are temporarily unavailable.";

    pub const GATEWAY_NOT_CONFIGURED: &str = "payment gateway credentials are not configured";
    pub const TOKEN_SECRET_NOT_CONFIGURED: &str = "payment token secret is not configured";
    pub const IDENTITY_NOT_CONFIGURED: &str = "identity provider is not configured";
    pub const ADMIN_KEY_NOT_CONFIGURED: &str = "admin API key is not configured";
    pub const MISSING_PAYMENT_SOURCE: &str = "Provide either a payment token or an amount";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid payment token")]
    InvalidToken,

    #[error("Payment token not found")]
    TokenNotFound,

    #[error("Payment token expired")]
    TokenExpired,

    #[error("Payment token already used")]
    TokenUsed,

    #[error("Fee already paid")]
    AlreadyPaid,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Application not found")]
    ApplicationNotFound,

    #[error("Order creation failed: {0}")]
    OrderCreateFailed(String),

    #[error("Payment update failed: {0}")]
    UpdateFailed(String),

    #[error("Server misconfigured: {0}")]
    ServerMisconfigured(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code returned in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidToken => "invalid_token",
            AppError::TokenNotFound => "token_not_found",
            AppError::TokenExpired => "token_expired",
            AppError::TokenUsed => "token_used",
            AppError::AlreadyPaid => "already_paid",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidAmount => "invalid_amount",
            AppError::InvalidSignature => "invalid_signature",
            AppError::ApplicationNotFound => "application_not_found",
            AppError::OrderCreateFailed(_) => "order_create_failed",
            AppError::UpdateFailed(_) => "update_failed",
            AppError::ServerMisconfigured(_) => "server_misconfigured",
            AppError::BadRequest(_) => "bad_request",
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Json(_)
            | AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidToken
            | AppError::TokenNotFound
            | AppError::TokenExpired
            | AppError::TokenUsed
            | AppError::AlreadyPaid
            | AppError::InvalidAmount
            | AppError::InvalidSignature
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ApplicationNotFound => StatusCode::NOT_FOUND,
            AppError::OrderCreateFailed(_)
            | AppError::UpdateFailed(_)
            | AppError::ServerMisconfigured(_)
            | AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Json(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let hint = match &self {
            AppError::InvalidToken => Some(msg::INVALID_TOKEN.to_string()),
            AppError::TokenNotFound => Some(msg::TOKEN_NOT_FOUND.to_string()),
            AppError::TokenExpired => Some(msg::TOKEN_EXPIRED.to_string()),
            AppError::TokenUsed => Some(msg::TOKEN_USED.to_string()),
            AppError::AlreadyPaid => Some(msg::ALREADY_PAID.to_string()),
            AppError::Unauthorized => Some(msg::UNAUTHORIZED.to_string()),
            AppError::InvalidAmount => {
                tracing::warn!("Rejected payment request with invalid amount");
                Some(msg::INVALID_AMOUNT.to_string())
            }
            AppError::InvalidSignature => {
                tracing::warn!("Rejected payment with invalid signature");
                Some(msg::INVALID_SIGNATURE.to_string())
            }
            AppError::ApplicationNotFound => Some(msg::APPLICATION_NOT_FOUND.to_string()),
            AppError::OrderCreateFailed(detail) => {
                tracing::error!("Order creation failed: {}", detail);
                Some(msg::ORDER_CREATE_FAILED.to_string())
            }
            AppError::UpdateFailed(detail) => {
                tracing::error!("Payment update failed: {}", detail);
                Some(msg::UPDATE_FAILED.to_string())
            }
            AppError::ServerMisconfigured(what) => {
                tracing::error!("Server misconfigured: {}", what);
                Some(msg::SERVER_MISCONFIGURED.to_string())
            }
            AppError::BadRequest(detail) => Some(detail.clone()),
            AppError::Json(e) => {
                tracing::error!("Stored document error: {}", e);
                None
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                None
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                None
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                None
            }
        };

        let body = ErrorResponse {
            error: self.code(),
            hint,
        };

        (self.status(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
