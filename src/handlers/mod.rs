pub mod admin;
pub mod customers;
pub mod orders;
pub mod payments;
pub mod products;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        catalog::ProductCatalogService, checkout::CheckoutService, coupons::CouponService,
        customers::CustomerService, order_status::OrderStatusService, orders::OrderService,
        payments::StripeGateway,
    },
};
use std::sync::Arc;
use std::time::Duration;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub catalog: Arc<ProductCatalogService>,
    pub coupons: Arc<CouponService>,
    pub checkout: Arc<CheckoutService>,
    pub customers: Arc<CustomerService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub gateway: Arc<StripeGateway>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, cfg: &AppConfig, event_sender: Option<Arc<EventSender>>) -> Self {
        let auth = Arc::new(AuthService::new(
            &cfg.jwt_secret,
            Duration::from_secs(cfg.jwt_expiration as u64),
        ));
        let catalog = Arc::new(ProductCatalogService::new(db.clone()));
        let coupons = Arc::new(CouponService::new(db.clone()));
        let checkout = Arc::new(CheckoutService::new(
            catalog.clone(),
            coupons.clone(),
            cfg.shipping_fee,
            cfg.min_charge_amount,
        ));
        let customers = Arc::new(CustomerService::new(db.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            catalog.clone(),
            coupons.clone(),
            event_sender.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(db.clone(), event_sender));
        let gateway = Arc::new(StripeGateway::new(
            cfg.stripe_secret_key.clone(),
            cfg.stripe_webhook_secret.clone(),
            cfg.stripe_webhook_tolerance_secs,
        ));

        Self {
            auth,
            catalog,
            coupons,
            checkout,
            customers,
            orders,
            order_status,
            gateway,
        }
    }
}
