//! End-to-end checkout tests for the bank-transfer flow and cart pricing:
//! stock validation fails before any mutation, coupons discount once per
//! customer, and totals follow the documented formula.

mod common;

use axum::http::{Method, StatusCode};
use common::{assert_status, response_json, TestApp};
use serde_json::json;

fn checkout_body(product_id: &str, quantity: i32, coupon: Option<&str>) -> serde_json::Value {
    json!({
        "cart_items": [{ "product_id": product_id, "quantity": quantity }],
        "shipping_address": {
            "full_name": "Ana Gómez",
            "street_address": "Calle 10 # 4-32",
            "city": "Medellín",
            "phone_number": "3001234567"
        },
        "coupon_code": coupon
    })
}

#[tokio::test]
async fn transfer_checkout_requires_authentication() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 5).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create-transfer-order",
            None,
            Some(checkout_body(&product.id.to_string(), 1, None)),
        )
        .await;

    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let token = app.customer_token("user_empty", "empty@test.local", "Ana");

    let body = json!({
        "cart_items": [],
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
            Some(&token),
            Some(body),
        )
        .await;

    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn insufficient_stock_fails_before_any_mutation() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 2).await;
    let token = app.customer_token("user_stock", "stock@test.local", "Ana");

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create-transfer-order",
            Some(&token),
            Some(checkout_body(&product.id.to_string(), 3, None)),
        )
        .await;

    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Stock insuficiente"));

    // Nothing was created or decremented
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product_stock(product.id).await, 2);
}

#[tokio::test]
async fn unknown_product_returns_not_found() {
    let app = TestApp::new().await;
    let token = app.customer_token("user_missing", "missing@test.local", "Ana");

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create-transfer-order",
            Some(&token),
            Some(checkout_body(
                "550e8400-e29b-41d4-a716-446655440000",
                1,
                None,
            )),
        )
        .await;

    assert_status(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transfer_order_decrements_stock_and_redeems_coupon() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 10).await;
    let coupon = app.seed_percentage_coupon("PALITO15", 15).await;
    let token = app.customer_token("user_happy", "happy@test.local", "Ana");

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create-transfer-order",
            Some(&token),
            Some(checkout_body(&product.id.to_string(), 5, Some("palito15"))),
        )
        .await;

    assert_status(&response, StatusCode::CREATED);
    let body = response_json(response).await;
    let order = &body["data"];

    // Subtotal 50,000; transfer flow has no shipping fee; 15% off = 7,500
    assert_eq!(order["subtotal"], 50_000);
    assert_eq!(order["shipping_fee"], 0);
    assert_eq!(order["discount"], 7_500);
    assert_eq!(order["total_price"], 42_500);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_method"], "bank_transfer");
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(order["coupon_code"], "PALITO15");
    assert!(order["payment_id"]
        .as_str()
        .unwrap()
        .starts_with("transfer_"));
    assert!(order["paid_at"].is_null());

    // Snapshot item
    assert_eq!(order["items"][0]["name"], "Palito de queso");
    assert_eq!(order["items"][0]["unit_price"], 10_000);
    assert_eq!(order["items"][0]["quantity"], 5);

    // Stock decremented exactly once
    assert_eq!(app.product_stock(product.id).await, 5);

    // Coupon is now spent for this customer
    let customer = app
        .find_customer_by_subject("user_happy")
        .await
        .expect("provisioned customer");
    let err = app
        .state
        .services
        .coupons
        .find_valid_for_customer("PALITO15", customer.id)
        .await
        .expect_err("coupon must be spent for this customer");
    assert!(err.to_string().contains("Ya usaste este cupón"));
    let _ = coupon;
}

#[tokio::test]
async fn coupon_is_single_use_per_customer_across_orders() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 20).await;
    app.seed_percentage_coupon("PALITO15", 15).await;
    let token = app.customer_token("user_reuse", "reuse@test.local", "Ana");

    let first = app
        .request(
            Method::POST,
            "/api/v1/payments/create-transfer-order",
            Some(&token),
            Some(checkout_body(&product.id.to_string(), 1, Some("PALITO15"))),
        )
        .await;
    assert_status(&first, StatusCode::CREATED);

    let second = app
        .request(
            Method::POST,
            "/api/v1/payments/create-transfer-order",
            Some(&token),
            Some(checkout_body(&product.id.to_string(), 1, Some("PALITO15"))),
        )
        .await;
    assert_status(&second, StatusCode::BAD_REQUEST);
    let body = response_json(second).await;
    assert!(body["message"].as_str().unwrap().contains("Ya usaste"));

    // The failed second attempt changed nothing
    assert_eq!(app.order_count().await, 1);
    assert_eq!(app.product_stock(product.id).await, 19);
}

#[tokio::test]
async fn same_coupon_works_for_a_different_customer() {
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 20).await;
    app.seed_percentage_coupon("PALITO15", 15).await;

    let first_token = app.customer_token("user_a", "a@test.local", "Ana");
    let second_token = app.customer_token("user_b", "b@test.local", "Berta");

    for token in [&first_token, &second_token] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/payments/create-transfer-order",
                Some(token),
                Some(checkout_body(&product.id.to_string(), 1, Some("PALITO15"))),
            )
            .await;
        assert_status(&response, StatusCode::CREATED);
    }

    assert_eq!(app.order_count().await, 2);
}

#[tokio::test]
async fn card_quote_adds_shipping_fee() {
    // The documented scenario: subtotal 50,000 + shipping 10,000 − 15% of
    // subtotal (7,500) = 52,500.
    let app = TestApp::new().await;
    let product = app.seed_product("Palito de queso", 10_000, 10).await;
    app.seed_percentage_coupon("PALITO15", 15).await;
    let token = app.customer_token("user_quote", "quote@test.local", "Ana");

    // Provision the customer row through an authenticated request.
    let response = app
        .request(Method::GET, "/api/v1/orders", Some(&token), None)
        .await;
    assert_status(&response, StatusCode::OK);
    let customer = app.find_customer_by_subject("user_quote").await.unwrap();

    let checkout = &app.state.services.checkout;
    let cart = checkout
        .validate_cart(&[palito_api::services::checkout::CartItemInput {
            product_id: product.id,
            quantity: 5,
        }])
        .await
        .unwrap();

    let quote = checkout
        .quote(cart, Some("PALITO15"), customer.id, true)
        .await
        .unwrap();

    assert_eq!(quote.subtotal, 50_000);
    assert_eq!(quote.shipping_fee, 10_000);
    assert_eq!(quote.discount, 7_500);
    assert_eq!(quote.total, 52_500);
    assert!(checkout.ensure_chargeable(quote.total).is_ok());

    // Quoting is side-effect-free: nothing was created or decremented.
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product_stock(product.id).await, 10);
    let still_valid = app
        .state
        .services
        .coupons
        .find_valid_for_customer("PALITO15", customer.id)
        .await;
    assert!(still_valid.is_ok());
}

#[tokio::test]
async fn deactivated_customer_is_locked_out() {
    let app = TestApp::new().await;
    let token = app.customer_token("user_gone", "gone@test.local", "Ana");

    // First request provisions; deactivate; then any call fails.
    let response = app
        .request(Method::GET, "/api/v1/orders", Some(&token), None)
        .await;
    assert_status(&response, StatusCode::OK);

    let response = app
        .request(Method::PATCH, "/api/v1/me/deactivate", Some(&token), None)
        .await;
    assert_status(&response, StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/orders", Some(&token), None)
        .await;
    assert_status(&response, StatusCode::FORBIDDEN);
}
