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
    auth::AuthenticatedCustomer,
    entities::customer::{DocumentType, Gender},
    errors::ServiceError,
    handlers::products::ProductResponse,
    services::customers::{AddressInput, UpdateAddressInput, UpdateProfileInput},
    ApiResponse, AppState,
};

pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", post(add_address))
        .route("/addresses", get(list_addresses))
        .route("/addresses/:id", put(update_address))
        .route("/addresses/:id", delete(delete_address))
        .route("/wishlist", post(add_to_wishlist))
        .route("/wishlist", get(get_wishlist))
        .route("/wishlist/:product_id", delete(remove_from_wishlist))
        .route("/profile", get(get_profile))
        .route("/profile", put(update_profile))
        .route("/notification-preferences", put(update_notification_preferences))
        .route("/deactivate", patch(deactivate_account))
}

/// POST /api/v1/me/addresses
#[utoipa::path(
    post,
    path = "/api/v1/me/addresses",
    responses(
        (status = 201, description = "Address added; full address list returned"),
        (status = 400, description = "Missing required address fields", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn add_address(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Json(input): Json<AddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state
        .services
        .customers
        .add_address(auth.customer.id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(addresses))))
}

/// GET /api/v1/me/addresses
#[utoipa::path(
    get,
    path = "/api/v1/me/addresses",
    responses((status = 200, description = "Saved addresses")),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn list_addresses(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state
        .services
        .customers
        .list_addresses(auth.customer.id)
        .await?;
    Ok(Json(ApiResponse::success(addresses)))
}

/// PUT /api/v1/me/addresses/{id}
#[utoipa::path(
    put,
    path = "/api/v1/me/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Address updated; full address list returned"),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn update_address(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Path(address_id): Path<Uuid>,
    Json(input): Json<UpdateAddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state
        .services
        .customers
        .update_address(auth.customer.id, address_id, input)
        .await?;
    Ok(Json(ApiResponse::success(addresses)))
}

/// DELETE /api/v1/me/addresses/{id}
#[utoipa::path(
    delete,
    path = "/api/v1/me/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Address deleted; full address list returned"),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn delete_address(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Path(address_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state
        .services
        .customers
        .delete_address(auth.customer.id, address_id)
        .await?;
    Ok(Json(ApiResponse::success(addresses)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WishlistRequest {
    pub product_id: Uuid,
}

/// POST /api/v1/me/wishlist
#[utoipa::path(
    post,
    path = "/api/v1/me/wishlist",
    request_body = WishlistRequest,
    responses(
        (status = 200, description = "Product added to wishlist"),
        (status = 400, description = "Product already in wishlist", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn add_to_wishlist(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Json(request): Json<WishlistRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .customers
        .add_to_wishlist(auth.customer.id, request.product_id)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Product added to wishlist"
    }))))
}

/// GET /api/v1/me/wishlist — wishlisted products with details.
#[utoipa::path(
    get,
    path = "/api/v1/me/wishlist",
    responses((status = 200, description = "Wishlisted products")),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn get_wishlist(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ServiceError> {
    let products = state
        .services
        .customers
        .wishlist_products(auth.customer.id)
        .await?;
    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductResponse::from).collect(),
    )))
}

/// DELETE /api/v1/me/wishlist/{product_id}
#[utoipa::path(
    delete,
    path = "/api/v1/me/wishlist/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product removed from wishlist"),
        (status = 400, description = "Product not in wishlist", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn remove_from_wishlist(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .customers
        .remove_from_wishlist(auth.customer.id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Product removed from wishlist"
    }))))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub name: String,
    pub email: String,
    pub email_notifications: bool,
    pub marketing_emails: bool,
    pub document_type: Option<DocumentType>,
    pub document_number: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<DateTime<Utc>>,
}

/// GET /api/v1/me/profile
#[utoipa::path(
    get,
    path = "/api/v1/me/profile",
    responses((status = 200, description = "Profile", body = ProfileResponse)),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn get_profile(
    auth: AuthenticatedCustomer,
) -> Result<Json<ApiResponse<ProfileResponse>>, ServiceError> {
    let customer = auth.customer;
    Ok(Json(ApiResponse::success(ProfileResponse {
        name: customer.name,
        email: customer.email,
        email_notifications: customer.email_notifications,
        marketing_emails: customer.marketing_emails,
        document_type: customer.document_type,
        document_number: customer.document_number,
        gender: customer.gender,
        date_of_birth: customer.date_of_birth,
    })))
}

/// PUT /api/v1/me/profile — identity-document and demographic fields.
#[utoipa::path(
    put,
    path = "/api/v1/me/profile",
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid document type, gender, or future birth date", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn update_profile(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Json<ApiResponse<ProfileResponse>>, ServiceError> {
    let customer = state
        .services
        .customers
        .update_profile(auth.customer.id, input)
        .await?;

    Ok(Json(ApiResponse::success(ProfileResponse {
        name: customer.name,
        email: customer.email,
        email_notifications: customer.email_notifications,
        marketing_emails: customer.marketing_emails,
        document_type: customer.document_type,
        document_number: customer.document_number,
        gender: customer.gender,
        date_of_birth: customer.date_of_birth,
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotificationPreferencesRequest {
    pub email_notifications: Option<bool>,
    pub marketing_emails: Option<bool>,
}

/// PUT /api/v1/me/notification-preferences
#[utoipa::path(
    put,
    path = "/api/v1/me/notification-preferences",
    request_body = NotificationPreferencesRequest,
    responses((status = 200, description = "Preferences updated")),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn update_notification_preferences(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
    Json(request): Json<NotificationPreferencesRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state
        .services
        .customers
        .update_notification_preferences(
            auth.customer.id,
            request.email_notifications,
            request.marketing_emails,
        )
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Notification preferences updated successfully",
        "email_notifications": customer.email_notifications,
        "marketing_emails": customer.marketing_emails,
    }))))
}

/// PATCH /api/v1/me/deactivate — self-service account deactivation.
#[utoipa::path(
    patch,
    path = "/api/v1/me/deactivate",
    responses((status = 200, description = "Account deactivated")),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
async fn deactivate_account(
    State(state): State<AppState>,
    auth: AuthenticatedCustomer,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.customers.deactivate(auth.customer.id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Account deactivated successfully"
    }))))
}
