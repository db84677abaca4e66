mod order;
mod token;
mod verify;

pub use order::*;
pub use token::*;
pub use verify::*;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/payment/order", post(create_order))
        .route("/api/payment/verify", post(verify_payment))
        .route("/api/payment/token/preview", get(preview_token))
        .route("/api/payment/status", get(payment_status))
}
