use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Palito API",
        version = "0.2.0",
        description = r#"
# Palito Storefront API

Backend API for a small food business: product catalog, checkout with card
and bank-transfer payments, order lifecycle management, coupons, wishlists,
addresses, and automated email/invoice generation.

## Authentication

Customer and admin endpoints require a bearer token issued by the auth
provider. The payment webhook is authenticated by signature instead:

```
Authorization: Bearer <token>
```

## Error handling

Errors use a consistent shape with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "Validation error: quantity must be at least 1",
  "timestamp": "2025-03-09T10:30:00.000Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Public catalog"),
        (name = "Payments", description = "Checkout, payment intents, and the gateway webhook"),
        (name = "Orders", description = "Customer order history and invoices"),
        (name = "Customers", description = "Addresses, wishlist, profile, preferences"),
        (name = "Admin", description = "Catalog, order, coupon, and customer administration")
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::handlers::payments::CheckoutRequest,
        crate::handlers::payments::CreateIntentResponse,
        crate::handlers::admin::UpdateOrderStatusRequest,
        crate::handlers::admin::CreateCouponRequest,
        crate::handlers::admin::SetActiveRequest,
        crate::handlers::admin::DashboardStats,
        crate::handlers::customers::WishlistRequest,
        crate::handlers::customers::NotificationPreferencesRequest,
        crate::handlers::customers::ProfileResponse,
    ))
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
