//! POST /api/payment/verify

#[path = "../common/mod.rs"]
mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{Value, json};

const VERIFY_URI: &str = "/api/payment/verify";

fn verify_body(order_id: &str, payment_id: &str, signature: &str) -> Value {
    json!({
        "razorpay_order_id": order_id,
        "razorpay_payment_id": payment_id,
        "razorpay_signature": signature,
    })
}

fn gateway_payment(payment_id: &str, order_id: &str, amount_minor: i64) -> GatewayPayment {
    GatewayPayment {
        id: payment_id.to_string(),
        amount: amount_minor,
        currency: Some("INR".to_string()),
        status: Some("captured".to_string()),
        method: Some("card".to_string()),
        order_id: Some(order_id.to_string()),
        email: None,
        created_at: Some(1_700_000_000),
        error_code: None,
        error_description: None,
        notes: Value::Null,
    }
}

fn noted_payment(payment_id: &str, order_id: &str, amount_minor: i64, notes: Value) -> GatewayPayment {
    GatewayPayment {
        notes,
        ..gateway_payment(payment_id, order_id, amount_minor)
    }
}

#[tokio::test]
async fn test_invalid_signature_changes_nothing() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    attach_order(&app, &application.id, "order_1", 4_500_000);
    let before = app.fee_payment(&application.id);

    let (status, body) = app
        .send(post_json(VERIFY_URI, &verify_body("order_1", "pay_1", &"0".repeat(64))))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_signature");
    assert_eq!(app.fee_payment(&application.id), before);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_signature_for_other_payment_rejected() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    attach_order(&app, &application.id, "order_1", 4_500_000);
    let signature = checkout_signature("order_1", "pay_other");

    let (status, _) = app
        .send(post_json(VERIFY_URI, &verify_body("order_1", "pay_1", &signature)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!app.fee_payment(&application.id).is_paid());
}

#[tokio::test]
async fn test_valid_checkout_marks_paid_and_issues_invoice() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    attach_order(&app, &application.id, "order_1", 4_500_000);
    app.gateway.set_payment(gateway_payment("pay_1", "order_1", 4_500_000));
    let signature = checkout_signature("order_1", "pay_1");

    let (status, body) = app
        .send(post_json(VERIFY_URI, &verify_body("order_1", "pay_1", &signature)))
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["ok"], true);

    let payment = app.fee_payment(&application.id);
    assert!(payment.is_paid());
    assert_eq!(payment.razorpay_payment_id.as_deref(), Some("pay_1"));
    assert_eq!(payment.payment_method.as_deref(), Some("card"));
    assert!(payment.paid_at.is_some());
    assert_eq!(payment.payment_history.len(), 1);
    let entry = &payment.payment_history[0];
    assert_eq!(entry.event, "client.verified");
    assert_eq!(entry.amount, 45000.0);
    assert_eq!(entry.source.as_deref(), Some("client"));

    assert_eq!(payment.invoice.len(), 1);
    let invoice = &payment.invoice[0];
    assert!(invoice.number.starts_with("INV-"));
    assert_eq!(invoice.amount_paid, 45000.0);
    assert!(invoice.url.is_some());
    assert_eq!(app.store.uploads().len(), 1);

    let recipients: Vec<String> = app.mailer.sent().iter().map(|m| m.to.clone()).collect();
    assert!(recipients.contains(&"asha@example.com".to_string()));
    assert!(recipients.contains(&ADMIN_EMAIL.to_string()));

    let redirect = body["redirectToken"].as_str().expect("redirect token");
    let claims = app.codec().verify_typed(redirect, RECEIPT_TOKEN).unwrap();
    assert_eq!(claims.user_id, application.id);
    assert_eq!(claims.amount, 45000.0);
}

#[tokio::test]
async fn test_repeat_verify_is_idempotent() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    attach_order(&app, &application.id, "order_1", 4_500_000);
    let signature = checkout_signature("order_1", "pay_1");
    let request = verify_body("order_1", "pay_1", &signature);

    let (first, _) = app.send(post_json(VERIFY_URI, &request)).await;
    let after_first = app.fee_payment(&application.id);
    let (second, body) = app.send(post_json(VERIFY_URI, &request)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(app.fee_payment(&application.id), after_first);
    assert_eq!(after_first.invoice.len(), 1, "one invoice per payment");
}

#[tokio::test]
async fn test_fallback_amount_from_recorded_order() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    attach_order(&app, &application.id, "order_1", 2_000_000);
    let signature = checkout_signature("order_1", "pay_1");

    let (status, _) = app
        .send(post_json(VERIFY_URI, &verify_body("order_1", "pay_1", &signature)))
        .await;

    assert_eq!(status, StatusCode::OK);
    let payment = app.fee_payment(&application.id);
    assert_eq!(payment.payment_history[0].amount, 20000.0);
}

#[tokio::test]
async fn test_resolves_application_from_token() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    app.gateway.set_payment(noted_payment(
        "pay_1",
        "order_unindexed",
        4_500_000,
        json!({ "applicationId": application.id }),
    ));
    let signature = checkout_signature("order_unindexed", "pay_1");
    let mut body = verify_body("order_unindexed", "pay_1", &signature);
    body["token"] = json!(app.payment_token(&application.id, 45000.0));

    let (status, _) = app.send(post_json(VERIFY_URI, &body)).await;

    assert_eq!(status, StatusCode::OK);
    let payment = app.fee_payment(&application.id);
    assert!(payment.is_paid());
    assert_eq!(payment.razorpay_order_id.as_deref(), Some("order_unindexed"));
}

#[tokio::test]
async fn test_resolves_application_from_user_id() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    app.gateway.set_payment(noted_payment(
        "pay_1",
        "order_unindexed",
        4_500_000,
        json!({ "source": "direct", "userId": TEST_UID }),
    ));
    let signature = checkout_signature("order_unindexed", "pay_1");
    let mut body = verify_body("order_unindexed", "pay_1", &signature);
    body["userId"] = json!(TEST_UID);

    let (status, _) = app.send(post_json(VERIFY_URI, &body)).await;

    assert_eq!(status, StatusCode::OK);
    let payment = app.fee_payment(&application.id);
    assert!(payment.is_paid());
    assert_eq!(payment.payment_history[0].amount, 45000.0);
}

#[tokio::test]
async fn test_small_direct_order_cannot_settle_named_application() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let before = app.fee_payment(&application.id);

    let (status, order) = app
        .send(post_json_with_bearer(
            "/api/payment/order",
            &json!({ "amount": 1 }),
            VALID_ID_TOKEN,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", order);
    let order_id = order["orderId"].as_str().expect("order id").to_string();

    let signature = checkout_signature(&order_id, "pay_small");
    let mut body = verify_body(&order_id, "pay_small", &signature);
    body["userId"] = json!(application.id);

    let (status, response) = app.send(post_json(VERIFY_URI, &body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["error"], "application_not_found");
    assert_eq!(app.fee_payment(&application.id), before);
    assert!(app.store.uploads().is_empty());
}

#[tokio::test]
async fn test_underpaid_unrecorded_order_rejected() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    app.gateway.set_payment(noted_payment(
        "pay_1",
        "order_unindexed",
        100,
        json!({ "source": "direct", "userId": TEST_UID }),
    ));
    let signature = checkout_signature("order_unindexed", "pay_1");
    let mut body = verify_body("order_unindexed", "pay_1", &signature);
    body["userId"] = json!(TEST_UID);

    let (status, response) = app.send(post_json(VERIFY_URI, &body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["error"], "application_not_found");
    let payment = app.fee_payment(&application.id);
    assert!(!payment.is_paid());
    assert!(payment.payment_history.is_empty());
}

#[tokio::test]
async fn test_payment_for_other_application_rejected() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    app.gateway.set_payment(noted_payment(
        "pay_1",
        "order_unindexed",
        4_500_000,
        json!({ "applicationId": "someone-else" }),
    ));
    let signature = checkout_signature("order_unindexed", "pay_1");
    let mut body = verify_body("order_unindexed", "pay_1", &signature);
    body["token"] = json!(app.payment_token(&application.id, 45000.0));

    let (status, _) = app.send(post_json(VERIFY_URI, &body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!app.fee_payment(&application.id).is_paid());
}

#[tokio::test]
async fn test_unrecorded_order_without_gateway_details_left_to_webhook() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let signature = checkout_signature("order_unindexed", "pay_1");
    let mut body = verify_body("order_unindexed", "pay_1", &signature);
    body["userId"] = json!(TEST_UID);

    let (status, body) = app.send(post_json(VERIFY_URI, &body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "application_not_found");
    assert!(app.fee_payment(&application.id).payment_history.is_empty());
}

#[tokio::test]
async fn test_unresolvable_application() {
    let app = TestApp::new();
    let signature = checkout_signature("order_ghost", "pay_1");

    let (status, body) = app
        .send(post_json(VERIFY_URI, &verify_body("order_ghost", "pay_1", &signature)))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "application_not_found");
}

#[tokio::test]
async fn test_verify_after_webhook_does_not_duplicate() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    attach_order(&app, &application.id, "order_1", 4_500_000);

    let webhook = payment_webhook("payment.captured", "pay_1", "order_1", 4_500_000);
    let (status, _) = app.send(signed_webhook(&webhook)).await;
    assert_eq!(status, StatusCode::OK);

    let signature = checkout_signature("order_1", "pay_1");
    let (status, _) = app
        .send(post_json(VERIFY_URI, &verify_body("order_1", "pay_1", &signature)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let payment = app.fee_payment(&application.id);
    assert_eq!(payment.payment_history.len(), 1);
    assert_eq!(payment.invoice.len(), 1);
}
