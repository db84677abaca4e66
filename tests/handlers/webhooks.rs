//! Razorpay webhook signature verification and ledger updates

#[path = "../common/mod.rs"]
mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

fn paid_application(app: &TestApp) -> Application {
    let application = app.create_application(45000.0);
    attach_order(app, &application.id, "order_1", 4_500_000);
    application
}

// ============ Signature ============

#[tokio::test]
async fn test_invalid_signature_leaves_row_untouched() {
    let app = TestApp::new();
    let application = paid_application(&app);
    let before = app.fee_payment(&application.id);
    let body = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);

    let (status, response) = app
        .send(webhook_request(&body, Some(&"ab".repeat(32))))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!("Invalid signature"));
    assert_eq!(app.fee_payment(&application.id), before);
}

#[tokio::test]
async fn test_signature_over_different_body_rejected() {
    let app = TestApp::new();
    let application = paid_application(&app);
    let signed = payment_webhook("payment.captured", "pay_1", "order_1", 100);
    let tampered = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);
    let sig = sign_hex(WEBHOOK_SECRET, signed.as_bytes()).unwrap();

    let (status, _) = app.send(webhook_request(&tampered, Some(&sig))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!app.fee_payment(&application.id).is_paid());
}

#[tokio::test]
async fn test_missing_signature() {
    let app = TestApp::new();
    let body = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);

    let (status, response) = app.send(webhook_request(&body, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!("Missing signature"));
}

#[tokio::test]
async fn test_uppercase_hex_signature_accepted() {
    let app = TestApp::new();
    let application = paid_application(&app);
    let body = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);
    let sig = sign_hex(WEBHOOK_SECRET, body.as_bytes()).unwrap().to_uppercase();

    let (status, _) = app.send(webhook_request(&body, Some(&sig))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.fee_payment(&application.id).is_paid());
}

#[tokio::test]
async fn test_secret_not_configured() {
    let app = TestApp::builder()
        .config(|c| c.razorpay_webhook_secret = None)
        .build();
    let body = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);

    let (status, response) = app.send(signed_webhook(&body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response, json!("Webhook secret not configured"));
}

#[tokio::test]
async fn test_invalid_json_with_valid_signature() {
    let app = TestApp::new();

    let (status, response) = app.send(signed_webhook("{\"event\": ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!("Invalid JSON"));
}

// ============ Events ============

#[tokio::test]
async fn test_captured_marks_paid() {
    let app = TestApp::new();
    let application = paid_application(&app);
    let body = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);

    let (status, response) = app.send(signed_webhook(&body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!("OK"));
    let payment = app.fee_payment(&application.id);
    assert!(payment.is_paid());
    assert_eq!(payment.razorpay_payment_id.as_deref(), Some("pay_1"));
    assert_eq!(payment.payment_method.as_deref(), Some("upi"));
    assert_eq!(payment.payment_history.len(), 1);
    let entry = &payment.payment_history[0];
    assert_eq!(entry.event, "payment.captured");
    assert_eq!(entry.amount, 45000.0);
    assert_eq!(entry.source.as_deref(), Some("webhook"));
    assert_eq!(entry.gateway_created_at, Some(1_700_000_000));
    assert_eq!(payment.invoice.len(), 1);
}

#[tokio::test]
async fn test_duplicate_delivery_already_processed() {
    let app = TestApp::new();
    let application = paid_application(&app);
    let body = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);

    app.send(signed_webhook(&body)).await;
    let after_first = app.fee_payment(&application.id);
    let (status, response) = app.send(signed_webhook(&body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!("Already processed"));
    assert_eq!(app.fee_payment(&application.id), after_first);
    assert_eq!(app.store.uploads().len(), 1);
}

#[tokio::test]
async fn test_failed_after_paid_overwrites_status() {
    let app = TestApp::new();
    let application = paid_application(&app);

    let captured = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);
    let failed = payment_webhook("payment.failed", "pay_1", "order_1", 4_500_000);
    app.send(signed_webhook(&captured)).await;
    let (status, _) = app.send(signed_webhook(&failed)).await;

    assert_eq!(status, StatusCode::OK);
    let payment = app.fee_payment(&application.id);
    assert_eq!(payment.payment_status, Some(PaymentStatus::Failed));
    let events: Vec<&str> = payment.payment_history.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(events, ["payment.captured", "payment.failed"]);
}

#[tokio::test]
async fn test_authorized_then_captured() {
    let app = TestApp::new();
    let application = paid_application(&app);

    let authorized = payment_webhook("payment.authorized", "pay_1", "order_1", 4_500_000);
    app.send(signed_webhook(&authorized)).await;
    assert_eq!(
        app.fee_payment(&application.id).payment_status,
        Some(PaymentStatus::Authorized)
    );

    let captured = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);
    app.send(signed_webhook(&captured)).await;

    let payment = app.fee_payment(&application.id);
    assert!(payment.is_paid());
    assert_eq!(payment.payment_history.len(), 2);
}

#[tokio::test]
async fn test_unhandled_event_ignored() {
    let app = TestApp::new();
    let application = paid_application(&app);
    let before = app.fee_payment(&application.id);
    let body = payment_webhook("payment.dispute.created", "pay_1", "order_1", 4_500_000);

    let (status, response) = app.send(signed_webhook(&body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!("Event ignored"));
    assert_eq!(app.fee_payment(&application.id), before);
}

#[tokio::test]
async fn test_unknown_order_acknowledged() {
    let app = TestApp::new();
    let body = payment_webhook("payment.captured", "pay_1", "order_unknown", 4_500_000);

    let (status, response) = app.send(signed_webhook(&body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!("Application not found"));
}

#[tokio::test]
async fn test_resolves_application_from_notes() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let body = json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {
            "id": "pay_9",
            "amount": 4_500_000,
            "order_id": "order_not_indexed",
            "status": "captured",
            "notes": {"applicationId": application.id}
        }}}
    })
    .to_string();

    let (status, response) = app.send(signed_webhook(&body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!("OK"));
    assert!(app.fee_payment(&application.id).is_paid());
}

#[tokio::test]
async fn test_refund_resolved_by_payment_id() {
    let app = TestApp::new();
    let application = paid_application(&app);
    let captured = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);
    app.send(signed_webhook(&captured)).await;

    let refund = json!({
        "event": "refund.processed",
        "payload": {"refund": {"entity": {
            "id": "rfnd_1",
            "amount": 4_500_000,
            "payment_id": "pay_1",
            "status": "processed"
        }}}
    })
    .to_string();
    let (status, response) = app.send(signed_webhook(&refund)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!("OK"));
    let payment = app.fee_payment(&application.id);
    assert_eq!(payment.payment_status, Some(PaymentStatus::Refunded));
    assert_eq!(payment.payment_history.len(), 2);
}
