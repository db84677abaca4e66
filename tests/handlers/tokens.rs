//! Token preview and payment status endpoints

#[path = "../common/mod.rs"]
mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn test_preview_decodes_without_verifying() {
    let app = TestApp::new();
    let foreign = PaymentTokenCodec::new("not-our-secret", 30)
        .encode(&PaymentTokenClaims {
            user_id: "app-123".to_string(),
            amount: 45000.0,
            token_type: FINAL_FEE_TOKEN.to_string(),
        })
        .unwrap();

    let (status, body) = app
        .send(get(&format!("/api/payment/token/preview?token={}", foreign)))
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["userId"], "app-123");
    assert_eq!(body["amount"], 45000.0);
    assert_eq!(body["type"], "final_fee");
    assert_eq!(body["expired"], false);
}

#[tokio::test]
async fn test_preview_flags_expired_token() {
    let app = TestApp::new();
    let now = chrono::Utc::now().timestamp();
    let token = app
        .codec()
        .encode_at(
            &PaymentTokenClaims {
                user_id: "app-123".to_string(),
                amount: 10.0,
                token_type: FINAL_FEE_TOKEN.to_string(),
            },
            now - 600,
            now - 60,
        )
        .unwrap();

    let (status, body) = app
        .send(get(&format!("/api/payment/token/preview?token={}", token)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], true);
}

#[tokio::test]
async fn test_preview_rejects_garbage() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/api/payment/token/preview?token=abc.def")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_status_after_payment_with_receipt_token() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    attach_order(&app, &application.id, "order_1", 4_500_000);
    let signature = checkout_signature("order_1", "pay_1");
    let (_, verified) = app
        .send(post_json(
            "/api/payment/verify",
            &serde_json::json!({
                "razorpay_order_id": "order_1",
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": signature,
            }),
        ))
        .await;
    let receipt = verified["redirectToken"].as_str().unwrap();

    let (status, body) = app
        .send(get(&format!("/api/payment/status?token={}", receipt)))
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["applicationId"], application.id.as_str());
    assert_eq!(body["paymentStatus"], "paid");
    assert_eq!(body["razorpayPaymentId"], "pay_1");
    assert_eq!(body["historyCount"], 1);
    assert_eq!(body["invoices"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_with_payment_token_before_payment() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let token = app.payment_token(&application.id, 45000.0);

    let (status, body) = app
        .send(get(&format!("/api/payment/status?token={}", token)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentStatus"], "pending");
    assert_eq!(body["payableAmount"], 45000.0);
    assert_eq!(body["historyCount"], 0);
}

#[tokio::test]
async fn test_status_rejects_forged_token() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let forged = PaymentTokenCodec::new("not-our-secret", 30)
        .encode(&PaymentTokenClaims {
            user_id: application.id.clone(),
            amount: 45000.0,
            token_type: RECEIPT_TOKEN.to_string(),
        })
        .unwrap();

    let (status, body) = app
        .send(get(&format!("/api/payment/status?token={}", forged)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
