pub mod razorpay;

pub use razorpay::handle_razorpay_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/razorpay", post(handle_razorpay_webhook))
}
