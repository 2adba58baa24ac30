use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedCustomer,
    entities::order::{Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus},
    entities::order_item::Model as OrderItemModel,
    errors::ServiceError,
    events,
    services::invoicing::{self, SellerInfo},
    ApiResponse, AppState,
};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_orders))
        .route("/:id", get(get_order))
        .route("/:id/invoice", get(download_invoice))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl From<OrderItemModel> for OrderItemResponse {
    fn from(item: OrderItemModel) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name,
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShippingAddressResponse {
    pub full_name: String,
    pub street_address: String,
    pub city: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub discount: i64,
    pub shipping_fee: i64,
    pub total_price: i64,
    pub coupon_code: Option<String>,
    pub payment_id: String,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: ShippingAddressResponse,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    pub fn from_model(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        Self {
            id: order.id,
            status: order.status,
            subtotal: order.subtotal,
            discount: order.discount,
            shipping_fee: order.shipping_fee,
            total_price: order.total_price,
            coupon_code: order.coupon_code,
            payment_id: order.payment_id,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            shipping_address: ShippingAddressResponse {
                full_name: order.shipping_full_name,
                street_address: order.shipping_street_address,
                city: order.shipping_city,
                phone_number: order.shipping_phone_number,
            },
            paid_at: order.paid_at,
            delivered_at: order.delivered_at,
            created_at: order.created_at,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

/// GET /api/v1/orders — the authenticated customer's orders, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Orders for the authenticated customer"),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
async fn list_my_orders(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state
        .services
        .orders
        .list_for_customer(auth.customer.id)
        .await?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in orders {
        let items = state.services.orders.get_order_items(order.id).await?;
        responses.push(OrderResponse::from_model(order, items));
    }

    Ok(Json(ApiResponse::success(responses)))
}

/// GET /api/v1/orders/{id} — a single order, visible to its owner only.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail"),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
async fn get_order(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;

    if order.customer_id != auth.customer.id {
        return Err(ServiceError::Forbidden("No autorizado.".to_string()));
    }

    let items = state.services.orders.get_order_items(order.id).await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(
        order, items,
    ))))
}

/// GET /api/v1/orders/{id}/invoice — the invoice PDF, only for paid or
/// delivered orders, only for the owner.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Invoice PDF", content_type = "application/pdf"),
        (status = 400, description = "Order is not paid or delivered", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
async fn download_invoice(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;

    if order.customer_id != auth.customer.id {
        return Err(ServiceError::Forbidden("No autorizado.".to_string()));
    }

    if order.status != OrderStatus::Paid && order.status != OrderStatus::Delivered {
        return Err(ServiceError::ValidationError(
            "La factura solo está disponible para pedidos pagados o entregados.".to_string(),
        ));
    }

    let (invoice, _, _, _) = events::build_invoice_data(&state.db, order.id).await?;
    let seller = SellerInfo::from_config(&state.config);
    let pdf = invoicing::render_pdf(&invoice, &seller)?;

    let filename = format!("factura-{}.pdf", invoice.invoice_number());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        pdf,
    ))
}
