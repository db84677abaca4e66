//! POST /api/payment/order

#[path = "../common/mod.rs"]
mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::*;
use serde_json::json;

const ORDER_URI: &str = "/api/payment/order";

// ============ Signed token ============

#[tokio::test]
async fn test_signed_token_creates_and_records_order() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let token = app.payment_token(&application.id, 45000.0);

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["keyId"], KEY_ID);
    assert_eq!(body["amount"], 4_500_000);
    assert_eq!(body["currency"], "INR");
    let order_id = body["orderId"].as_str().unwrap().to_string();

    let sent = app.gateway.last_order().unwrap();
    assert_eq!(sent.amount, 4_500_000);
    assert_eq!(sent.notes.get("applicationId"), Some(&application.id));
    assert_eq!(sent.notes.get("source").map(String::as_str), Some("signed_token"));
    assert!(sent.receipt.starts_with("fee_"), "receipt: {}", sent.receipt);

    let payment = app.fee_payment(&application.id);
    assert_eq!(payment.razorpay_order_id.as_deref(), Some(order_id.as_str()));
    assert!(payment.razorpay_order_created_at.is_some());

    let conn = app.db.pool.get().unwrap();
    let found = queries::find_application_by_order_id(&conn, &order_id)
        .unwrap()
        .expect("order index row");
    assert_eq!(found.id, application.id);
    let recorded = queries::get_payment_order(&conn, &order_id).unwrap().unwrap();
    assert_eq!(recorded.amount_minor, 4_500_000);
}

#[tokio::test]
async fn test_signed_token_resolves_by_auth_uid() {
    let app = TestApp::new();
    let application = app.create_application(1000.0);
    let token = app.payment_token(TEST_UID, 1000.0);

    let (status, _) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.fee_payment(&application.id).razorpay_order_id.is_some());
}

#[tokio::test]
async fn test_already_paid_makes_no_gateway_call() {
    let app = TestApp::new();
    let application = app.create_application_with(FinalFeePayment {
        payable_amount: Some(45000.0),
        payment_status: Some(PaymentStatus::Paid),
        ..Default::default()
    });
    let token = app.payment_token(&application.id, 45000.0);

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "already_paid");
    assert_eq!(app.gateway.order_count(), 0);
}

#[tokio::test]
async fn test_expired_signed_token_rejected() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let now = Utc::now().timestamp();
    let token = app
        .codec()
        .encode_at(
            &PaymentTokenClaims {
                user_id: application.id.clone(),
                amount: 45000.0,
                token_type: FINAL_FEE_TOKEN.to_string(),
            },
            now - 7200,
            now - 3600,
        )
        .unwrap();

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_token");
    assert_eq!(app.gateway.order_count(), 0);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_rejected() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let forged = PaymentTokenCodec::new("some-other-secret", 30)
        .encode(&PaymentTokenClaims {
            user_id: application.id.clone(),
            amount: 1.0,
            token_type: FINAL_FEE_TOKEN.to_string(),
        })
        .unwrap();

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": forged }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_receipt_token_cannot_create_order() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let receipt = app
        .codec()
        .encode(&PaymentTokenClaims {
            user_id: application.id.clone(),
            amount: 45000.0,
            token_type: RECEIPT_TOKEN.to_string(),
        })
        .unwrap();

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": receipt }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_signed_token_for_unknown_application() {
    let app = TestApp::new();
    let token = app.payment_token("no-such-application", 100.0);

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "application_not_found");
}

#[tokio::test]
async fn test_signed_token_with_zero_amount_rejected() {
    let app = TestApp::new();
    let application = app.create_application(45000.0);
    let token = app.payment_token(&application.id, 0.0);

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_amount");
    assert_eq!(app.gateway.order_count(), 0);
}

// ============ Legacy token ============

fn legacy(token: &str, expires_in: Duration, used: bool, status: PaymentStatus) -> FinalFeePayment {
    FinalFeePayment {
        payable_amount: Some(30000.0),
        payment_status: Some(status),
        token: Some(token.to_string()),
        token_expires: Some(Utc::now() + expires_in),
        token_used: used,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_legacy_token_creates_order_for_payable_amount() {
    let app = TestApp::new();
    let application =
        app.create_application_with(legacy("legacy-abc", Duration::days(1), false, PaymentStatus::Pending));

    let (status, body) = app
        .send(post_json(ORDER_URI, &json!({ "token": "legacy-abc" })))
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["amount"], 3_000_000);
    let sent = app.gateway.last_order().unwrap();
    assert_eq!(sent.notes.get("source").map(String::as_str), Some("legacy_token"));
    assert!(app.fee_payment(&application.id).razorpay_order_id.is_some());
}

#[tokio::test]
async fn test_legacy_token_errors() {
    let app = TestApp::new();
    app.create_application_with(legacy("expired-tok", -Duration::hours(1), false, PaymentStatus::Pending));
    app.create_application_with(legacy("used-tok", Duration::days(1), true, PaymentStatus::Pending));
    app.create_application_with(legacy("paid-tok", Duration::days(1), false, PaymentStatus::Paid));

    let cases = [
        ("missing-tok", "token_not_found"),
        ("expired-tok", "token_expired"),
        ("used-tok", "token_used"),
        ("paid-tok", "already_paid"),
    ];

    for (token, expected) in cases {
        let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "token {}", token);
        assert_eq!(body["error"], expected, "token {}", token);
    }
    assert_eq!(app.gateway.order_count(), 0);
}

// ============ Direct amount ============

#[tokio::test]
async fn test_direct_amount_requires_bearer() {
    let app = TestApp::new();

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "amount": 500 }))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(app.gateway.order_count(), 0);
}

#[tokio::test]
async fn test_direct_amount_rejects_bad_bearer() {
    let app = TestApp::new();

    let (status, body) = app
        .send(post_json_with_bearer(ORDER_URI, &json!({ "amount": 500 }), "forged"))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_direct_amount_with_identity() {
    let app = TestApp::new();

    let (status, body) = app
        .send(post_json_with_bearer(ORDER_URI, &json!({ "amount": "1250.50" }), VALID_ID_TOKEN))
        .await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["amount"], 125_050);
    let sent = app.gateway.last_order().unwrap();
    assert_eq!(sent.notes.get("userId").map(String::as_str), Some(TEST_UID));
    assert_eq!(sent.notes.get("source").map(String::as_str), Some("direct"));
    assert!(!sent.notes.contains_key("applicationId"));
}

#[tokio::test]
async fn test_direct_amount_without_auth_requirement() {
    let app = TestApp::builder()
        .config(|c| c.require_auth_for_direct_payment = false)
        .build();

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "amount": 500 }))).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["amount"], 50_000);
}

#[tokio::test]
async fn test_invalid_amounts_never_reach_gateway() {
    let app = TestApp::new();

    for amount in [
        json!(0),
        json!(-10),
        json!("NaN"),
        json!("abc"),
        json!(true),
        json!(0.004),
        json!("0.001"),
        json!(1e20),
    ] {
        let (status, body) = app
            .send(post_json_with_bearer(ORDER_URI, &json!({ "amount": amount }), VALID_ID_TOKEN))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {}", amount);
        assert_eq!(body["error"], "invalid_amount", "amount {}", amount);
    }
    assert_eq!(app.gateway.order_count(), 0);
}

#[tokio::test]
async fn test_neither_token_nor_amount() {
    let app = TestApp::new();

    let (status, body) = app.send(post_json(ORDER_URI, &json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

// ============ Failures ============

#[tokio::test]
async fn test_gateway_failure_reported() {
    let app = TestApp::builder().failing_gateway().build();
    let application = app.create_application(45000.0);
    let token = app.payment_token(&application.id, 45000.0);

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "order_create_failed");
    assert_eq!(app.gateway.order_count(), 1, "no retries");
    assert!(app.fee_payment(&application.id).razorpay_order_id.is_none());
}

#[tokio::test]
async fn test_missing_gateway_is_misconfiguration() {
    let app = TestApp::builder().without_gateway().build();
    let application = app.create_application(45000.0);
    let token = app.payment_token(&application.id, 45000.0);

    let (status, body) = app.send(post_json(ORDER_URI, &json!({ "token": token }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "server_misconfigured");
}

#[tokio::test]
async fn test_malformed_json_body() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri(ORDER_URI)
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}
