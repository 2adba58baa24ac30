use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    entities::coupon::DiscountType,
    entities::customer::Model as CustomerModel,
    errors::ServiceError,
    handlers::orders::OrderResponse,
    handlers::products::ProductResponse,
    services::catalog::{CreateProductInput, UpdateProductInput},
    ApiResponse, AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id", delete(delete_product))
        .route("/orders", get(list_orders))
        .route("/orders/:id/status", put(update_order_status))
        .route("/coupons", post(create_coupon))
        .route("/coupons", get(list_coupons))
        .route("/coupons/:id/status", patch(update_coupon_status))
        .route("/customers", get(list_customers))
        .route("/customers/:id/status", patch(update_customer_status))
        .route("/stats", get(dashboard_stats))
}

/// POST /api/v1/admin/products
#[utoipa::path(
    post,
    path = "/api/v1/admin/products",
    responses(
        (status = 201, description = "Product created"),
        (status = 400, description = "Missing fields or more than three images", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.create_product(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ProductResponse::from(product))),
    ))
}

/// PUT /api/v1/admin/products/{id}
#[utoipa::path(
    put,
    path = "/api/v1/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product updated"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state
        .services
        .catalog
        .update_product(product_id, input)
        .await?;
    Ok(Json(ApiResponse::success(ProductResponse::from(product))))
}

/// DELETE /api/v1/admin/products/{id}
#[utoipa::path(
    delete,
    path = "/api/v1/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    state.services.catalog.delete_product(product_id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Product deleted successfully"
    }))))
}

/// GET /api/v1/admin/orders — every order, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    responses((status = 200, description = "All orders")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.orders.list_all().await?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in orders {
        let items = state.services.orders.get_order_items(order.id).await?;
        responses.push(OrderResponse::from_model(order, items));
    }

    Ok(Json(ApiResponse::success(responses)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

/// PUT /api/v1/admin/orders/{id}/status — the admin side of the order state
/// machine. The target status must be one of the fixed set; a no-op
/// transition persists but triggers no notifications.
#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated"),
        (status = 400, description = "Invalid status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn update_order_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let status = crate::services::order_status::OrderStatusService::parse_status(&request.status)?;

    let order = state
        .services
        .order_status
        .update_status(order_id, status)
        .await?;

    let items = state.services.orders.get_order_items(order.id).await?;
    Ok(Json(ApiResponse::success(OrderResponse::from_model(
        order, items,
    ))))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/admin/coupons
#[utoipa::path(
    post,
    path = "/api/v1/admin/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created"),
        (status = 400, description = "Invalid coupon definition", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn create_coupon(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<CreateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state
        .services
        .coupons
        .create_coupon(
            &request.code,
            request.discount_type,
            request.discount_value,
            request.expires_at,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(coupon))))
}

/// GET /api/v1/admin/coupons
#[utoipa::path(
    get,
    path = "/api/v1/admin/coupons",
    responses((status = 200, description = "All coupons")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn list_coupons(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ServiceError> {
    let coupons = state.services.coupons.list_coupons().await?;
    Ok(Json(ApiResponse::success(coupons)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// PATCH /api/v1/admin/coupons/{id}/status
#[utoipa::path(
    patch,
    path = "/api/v1/admin/coupons/{id}/status",
    params(("id" = Uuid, Path, description = "Coupon id")),
    request_body = SetActiveRequest,
    responses(
        (status = 200, description = "Coupon updated"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn update_coupon_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(coupon_id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state
        .services
        .coupons
        .set_active(coupon_id, request.is_active)
        .await?;
    Ok(Json(ApiResponse::success(coupon)))
}

/// Roster entry without notification or gateway internals.
#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub document_type: Option<crate::entities::customer::DocumentType>,
    pub document_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CustomerModel> for CustomerSummary {
    fn from(model: CustomerModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            is_active: model.is_active,
            document_type: model.document_type,
            document_number: model.document_number,
            created_at: model.created_at,
        }
    }
}

/// GET /api/v1/admin/customers
#[utoipa::path(
    get,
    path = "/api/v1/admin/customers",
    responses((status = 200, description = "Customer roster")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn list_customers(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<Vec<CustomerSummary>>>, ServiceError> {
    let customers = state.services.customers.list_customers().await?;
    Ok(Json(ApiResponse::success(
        customers.into_iter().map(CustomerSummary::from).collect(),
    )))
}

/// PATCH /api/v1/admin/customers/{id}/status — activate or deactivate.
#[utoipa::path(
    patch,
    path = "/api/v1/admin/customers/{id}/status",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = SetActiveRequest,
    responses(
        (status = 200, description = "Customer updated"),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn update_customer_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<ApiResponse<CustomerSummary>>, ServiceError> {
    let customer = state
        .services
        .customers
        .set_active(customer_id, request.is_active)
        .await?;
    Ok(Json(ApiResponse::success(CustomerSummary::from(customer))))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_revenue: i64,
    pub total_orders: u64,
    pub total_customers: u64,
    pub total_products: u64,
}

/// GET /api/v1/admin/stats — storefront totals for the dashboard.
#[utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    responses((status = 200, description = "Dashboard totals", body = DashboardStats)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
async fn dashboard_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<DashboardStats>>, ServiceError> {
    let stats = DashboardStats {
        total_revenue: state.services.orders.total_revenue().await?,
        total_orders: state.services.orders.count_orders().await?,
        total_customers: state.services.customers.count_customers().await?,
        total_products: state.services.catalog.count_products().await?,
    };

    Ok(Json(ApiResponse::success(stats)))
}
