//! Webhook reconciliation tests: signature gating, event-type filtering,
//! order creation with snapshots, and idempotent redelivery.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{assert_status, response_json, TestApp};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use palito_api::entities::{coupon_redemption, customer, order};

/// Builds a `payment_intent.succeeded` payload whose metadata mirrors what
/// intent creation attaches.
fn succeeded_event(
    intent_id: &str,
    customer_id: Uuid,
    product_id: Uuid,
    unit_price: i64,
    quantity: i32,
    coupon_code: Option<&str>,
    shipping_fee: i64,
    discount: i64,
    total: i64,
) -> String {
    let order_items = json!([{
        "product_id": product_id,
        "unit_price": unit_price,
        "quantity": quantity
    }])
    .to_string();

    let shipping_address = json!({
        "full_name": "Ana Gómez",
        "street_address": "Calle 10 # 4-32",
        "city": "Medellín",
        "phone_number": "3001234567"
    })
    .to_string();

    json!({
        "id": "evt_test",
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": intent_id,
                "metadata": {
                    "customer_id": customer_id.to_string(),
                    "auth_subject": "user_webhook",
                    "order_items": order_items,
                    "shipping_address": shipping_address,
                    "coupon_code": coupon_code.unwrap_or(""),
                    "shipping_fee": shipping_fee.to_string(),
                    "discount": discount.to_string(),
                    "total": total.to_string()
                }
            }
        }
    })
    .to_string()
}

async fn provisioned_customer(app: &TestApp, subject: &str, email: &str) -> customer::Model {
    let token = app.customer_token(subject, email, "Ana");
    let response = app
        .request(Method::GET, "/api/v1/orders", Some(&token), None)
        .await;
    assert_status(&response, StatusCode::OK);
    app.find_customer_by_subject(subject).await.unwrap()
}

#[tokio::test]
async fn unsigned_webhook_is_rejected_without_side_effects() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"type": "payment_intent.succeeded"}).to_string(),
        ))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let app = TestApp::new().await;
    let payload = json!({"type": "payment_intent.succeeded"}).to_string();

    let timestamp = chrono::Utc::now().timestamp();
    let signature = common::webhook_signature("wrong_secret", timestamp, payload.as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            "Stripe-Signature",
            format!("t={},v1={}", timestamp, signature),
        )
        .body(Body::from(payload))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_status(&response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_success_event_types_are_acknowledged_without_effects() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;

    let payload = json!({
        "id": "evt_other",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_ignored", "metadata": {} } }
    })
    .to_string();

    let response = app.signed_webhook(&payload).await;
    assert_status(&response, StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["received"], true);

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product_stock(product.id).await, 5);
}

#[tokio::test]
async fn succeeded_event_creates_paid_order_and_applies_effects() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 10).await;
    let coupon = app.seed_percentage_coupon("PALITO15", 15).await;
    let customer = provisioned_customer(&app, "user_webhook", "wh@test.local").await;

    let payload = succeeded_event(
        "pi_test_123",
        customer.id,
        product.id,
        10_000,
        5,
        Some("PALITO15"),
        10_000,
        7_500,
        52_500,
    );

    let response = app.signed_webhook(&payload).await;
    assert_status(&response, StatusCode::OK);

    // Order exists with paid semantics
    let created = app
        .state
        .services
        .orders
        .find_by_payment_id("pi_test_123")
        .await
        .unwrap()
        .expect("order created");

    assert_eq!(created.status, order::OrderStatus::Paid);
    assert_eq!(created.payment_status, order::PaymentStatus::Succeeded);
    assert_eq!(created.payment_method, order::PaymentMethod::Card);
    assert_eq!(created.subtotal, 50_000);
    assert_eq!(created.shipping_fee, 10_000);
    assert_eq!(created.discount, 7_500);
    assert_eq!(created.total_price, 52_500);
    assert!(created.paid_at.is_some());

    // Stock decremented and coupon redeemed
    assert_eq!(app.product_stock(product.id).await, 5);
    let redemptions = coupon_redemption::Entity::find()
        .filter(coupon_redemption::Column::CouponId.eq(coupon.id))
        .filter(coupon_redemption::Column::CustomerId.eq(customer.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(redemptions.len(), 1);
}

#[tokio::test]
async fn redelivered_webhook_is_idempotent() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 10).await;
    let coupon = app.seed_percentage_coupon("PALITO15", 15).await;
    let customer = provisioned_customer(&app, "user_webhook", "wh2@test.local").await;

    let payload = succeeded_event(
        "pi_retry_1",
        customer.id,
        product.id,
        10_000,
        5,
        Some("PALITO15"),
        10_000,
        7_500,
        52_500,
    );

    for _ in 0..3 {
        let response = app.signed_webhook(&payload).await;
        assert_status(&response, StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["received"], true);
    }

    // Exactly one order, one decrement, one redemption
    assert_eq!(app.order_count().await, 1);
    assert_eq!(app.product_stock(product.id).await, 5);

    let redemptions = coupon_redemption::Entity::find()
        .filter(coupon_redemption::Column::CouponId.eq(coupon.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(redemptions.len(), 1);
}

#[tokio::test]
async fn vanished_product_gets_placeholder_name_but_line_survives() {
    let app = TestApp::new().await;
    let customer = provisioned_customer(&app, "user_webhook", "wh3@test.local").await;
    let vanished_product_id = Uuid::new_v4();

    let payload = succeeded_event(
        "pi_ghost",
        customer.id,
        vanished_product_id,
        8_000,
        2,
        None,
        10_000,
        0,
        26_000,
    );

    let response = app.signed_webhook(&payload).await;
    assert_status(&response, StatusCode::OK);

    let created = app
        .state
        .services
        .orders
        .find_by_payment_id("pi_ghost")
        .await
        .unwrap()
        .expect("order created");

    let items = app
        .state
        .services
        .orders
        .get_order_items(created.id)
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Producto no disponible");
    assert_eq!(items[0].unit_price, 8_000);
    assert_eq!(items[0].quantity, 2);
}

#[tokio::test]
async fn malformed_metadata_fails_processing_for_retry() {
    let app = TestApp::new().await;

    let payload = json!({
        "id": "evt_bad",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_bad", "metadata": { "total": "52500" } } }
    })
    .to_string();

    let response = app.signed_webhook(&payload).await;
    // Missing metadata keys are a client-fault response; the gateway keeps
    // the event and no local state was touched.
    assert_status(&response, StatusCode::BAD_REQUEST);
    assert_eq!(app.order_count().await, 0);
}
