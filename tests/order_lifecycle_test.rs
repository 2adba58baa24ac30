//! Admin status-transition tests: enum validation, set-once timestamps,
//! no-op transitions, and the owner-only invoice download.

mod common;

use axum::http::{Method, StatusCode};
use common::{assert_status, response_bytes, response_json, TestApp};
use serde_json::json;

async fn place_transfer_order(app: &TestApp, token: &str, product_id: &str) -> String {
    let body = json!({
        "cart_items": [{ "product_id": product_id, "quantity": 1 }],
        "shipping_address": {
            "full_name": "Ana Gómez",
            "street_address": "Calle 10 # 4-32",
            "city": "Medellín"
        }
    });

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create-transfer-order",
            Some(token),
            Some(body),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);

    let body = response_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn status_updates_require_admin() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;
    let token = app.customer_token("user_lc", "lc@test.local", "Ana");
    let order_id = place_transfer_order(&app, &token, &product.id.to_string()).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(&token),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_status_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;
    let token = app.customer_token("user_lc", "lc@test.local", "Ana");
    let order_id = place_transfer_order(&app, &token, &product.id.to_string()).await;

    let admin = app.admin_token();
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({ "status": "shipped" })),
        )
        .await;

    assert_status(&response, StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Invalid status"));
}

#[tokio::test]
async fn unknown_order_returns_not_found() {
    let app = TestApp::new().await;
    let admin = app.admin_token();

    let response = app
        .request(
            Method::PUT,
            "/api/v1/admin/orders/550e8400-e29b-41d4-a716-446655440000/status",
            Some(&admin),
            Some(json!({ "status": "paid" })),
        )
        .await;

    assert_status(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn paid_and_delivered_timestamps_are_set_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;
    let token = app.customer_token("user_ts", "ts@test.local", "Ana");
    let order_id = place_transfer_order(&app, &token, &product.id.to_string()).await;
    let admin = app.admin_token();

    // pending -> paid stamps paid_at
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    let paid_at = body["data"]["paid_at"].as_str().unwrap().to_string();
    assert!(body["data"]["delivered_at"].is_null());

    // Re-sending paid persists but does not move the timestamp
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["paid_at"].as_str().unwrap(), paid_at);

    // paid -> delivered stamps delivered_at
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    let delivered_at = body["data"]["delivered_at"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["paid_at"].as_str().unwrap(), paid_at);

    // Bouncing back and forth never rewrites either timestamp
    for status in ["in_preparation", "delivered"] {
        let response = app
            .request(
                Method::PUT,
                &format!("/api/v1/admin/orders/{}/status", order_id),
                Some(&admin),
                Some(json!({ "status": status })),
            )
            .await;
        assert_status(&response, StatusCode::OK);
    }

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            Some(&token),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["paid_at"].as_str().unwrap(), paid_at);
    assert_eq!(body["data"]["delivered_at"].as_str().unwrap(), delivered_at);
    assert_eq!(body["data"]["status"], "delivered");
}

#[tokio::test]
async fn customers_cannot_read_each_others_orders() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;
    let owner = app.customer_token("user_owner", "owner@test.local", "Ana");
    let other = app.customer_token("user_other", "other@test.local", "Berta");
    let order_id = place_transfer_order(&app, &owner, &product.id.to_string()).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            Some(&other),
            None,
        )
        .await;
    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invoice_download_requires_paid_or_delivered() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;
    let token = app.customer_token("user_inv", "inv@test.local", "Ana");
    let order_id = place_transfer_order(&app, &token, &product.id.to_string()).await;

    // Pending order: no invoice yet
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}/invoice", order_id),
            Some(&token),
            None,
        )
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    // Mark paid, then the PDF is served with an attachment disposition
    let admin = app.admin_token();
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}/invoice", order_id),
            Some(&token),
            None,
        )
        .await;
    assert_status(&response, StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "application/pdf");

    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("factura-FV-"));

    let bytes = response_bytes(response).await;
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn no_op_transition_still_persists() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;
    let token = app.customer_token("user_noop", "noop@test.local", "Ana");
    let order_id = place_transfer_order(&app, &token, &product.id.to_string()).await;
    let admin = app.admin_token();

    // pending -> pending is accepted and persisted (version bump), with no
    // timestamps stamped.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["paid_at"].is_null());
}
