use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::AuthenticatedCustomer,
    errors::ServiceError,
    handlers::orders::OrderResponse,
    services::checkout::{CartItemInput, ShippingAddressInput},
    services::payments::{CheckoutMetadata, MetadataItem, StripeGateway},
    ApiResponse, AppState,
};

/// Webhook event type that triggers reconciliation; everything else is
/// acknowledged without side effects.
const PAYMENT_SUCCEEDED_EVENT: &str = "payment_intent.succeeded";

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-intent", post(create_payment_intent))
        .route("/create-transfer-order", post(create_transfer_order))
}

/// The webhook is routed separately: it must not sit behind customer auth.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub cart_items: Vec<CartItemInput>,
    #[validate]
    pub shipping_address: ShippingAddressInput,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// POST /api/v1/payments/create-intent — card checkout step one.
///
/// Validates and prices the cart, then creates a gateway payment intent
/// carrying the checkout as metadata. Deliberately side-effect-free on local
/// state: no order, no stock change, no coupon redemption happens here.
#[utoipa::path(
    post,
    path = "/api/v1/payments/create-intent",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment intent created", body = CreateIntentResponse),
        (status = 400, description = "Empty cart, invalid coupon, or total below the gateway minimum", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart references a missing product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
async fn create_payment_intent(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<CreateIntentResponse>>, ServiceError> {
    request.validate()?;

    let cart = state
        .services
        .checkout
        .validate_cart(&request.cart_items)
        .await?;

    let quote = state
        .services
        .checkout
        .quote(cart, request.coupon_code.as_deref(), auth.customer.id, true)
        .await?;

    state.services.checkout.ensure_chargeable(quote.total)?;

    let gateway_customer_id = state
        .services
        .gateway
        .ensure_customer(&auth.customer)
        .await?;

    if auth.customer.gateway_customer_id.as_deref() != Some(gateway_customer_id.as_str()) {
        state
            .services
            .customers
            .set_gateway_customer_id(auth.customer.id, &gateway_customer_id)
            .await?;
    }

    let metadata = CheckoutMetadata {
        customer_id: auth.customer.id,
        auth_subject: auth.customer.auth_subject.clone(),
        order_items: quote.items.iter().map(MetadataItem::from).collect(),
        shipping_address: request.shipping_address,
        coupon_code: quote.coupon.as_ref().map(|c| c.code.clone()),
        shipping_fee: quote.shipping_fee,
        discount: quote.discount,
        total: quote.total,
    };

    let intent = state
        .services
        .gateway
        .create_payment_intent(
            quote.total,
            &state.config.currency,
            &gateway_customer_id,
            &metadata,
        )
        .await?;

    Ok(Json(ApiResponse::success(CreateIntentResponse {
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
    })))
}

/// POST /api/v1/payments/create-transfer-order — synchronous bank-transfer
/// checkout: the order is created right away as `pending` and confirmed
/// manually by an admin once the transfer shows up.
#[utoipa::path(
    post,
    path = "/api/v1/payments/create-transfer-order",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Empty cart or invalid coupon", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart references a missing product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
async fn create_transfer_order(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;

    let cart = state
        .services
        .checkout
        .validate_cart(&request.cart_items)
        .await?;

    // Transfer orders are picked up in person; no shipping fee applies.
    let quote = state
        .services
        .checkout
        .quote(cart, request.coupon_code.as_deref(), auth.customer.id, false)
        .await?;

    let order = state
        .services
        .orders
        .place_transfer_order(
            auth.customer.id,
            &auth.customer.auth_subject,
            quote,
            request.shipping_address,
        )
        .await?;

    let items = state.services.orders.get_order_items(order.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderResponse::from_model(order, items))),
    ))
}

/// POST /api/v1/payments/webhook — inbound gateway notification.
///
/// Signature verification failures return 401 without touching state. Only
/// `payment_intent.succeeded` is acted on; reconciliation is idempotent by
/// payment id. Processing errors return 5xx so the gateway retries.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if !state
        .services
        .gateway
        .verify_webhook_signature(&headers, &body)
    {
        warn!("payment webhook signature verification failed");
        metrics::counter!("palito_webhook.bad_signature", 1);
        return Err(ServiceError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }

    let event = StripeGateway::parse_webhook_event(&body)?;

    if event.event_type != PAYMENT_SUCCEEDED_EVENT {
        info!(event_type = %event.event_type, "ignoring webhook event type");
        return Ok(Json(json!({ "received": true })));
    }

    let metadata = CheckoutMetadata::from_intent_metadata(&event.data.object.metadata)?;

    state
        .services
        .orders
        .reconcile_card_payment(&event.data.object.id, metadata)
        .await?;

    Ok(Json(json!({ "received": true })))
}
