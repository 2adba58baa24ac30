use crate::{
    entities::coupon::Model as CouponModel,
    errors::ServiceError,
    services::{catalog::ProductCatalogService, coupons::CouponService},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Cart line as submitted by a client. Prices are never taken from the
/// client; every quote re-reads them from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddressInput {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "Street address is required"))]
    pub street_address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    pub phone_number: Option<String>,
}

/// Cart line after server-side re-pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedItem {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl PricedItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone)]
pub struct PricedCart {
    pub items: Vec<PricedItem>,
    pub subtotal: i64,
}

/// A fully priced checkout, ready to become a payment intent or an order.
#[derive(Debug, Clone)]
pub struct Quote {
    pub items: Vec<PricedItem>,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub coupon: Option<CouponModel>,
}

/// Validates carts against live catalog state and turns them into quotes.
/// This service never mutates anything; order creation, stock decrement and
/// coupon redemption happen downstream.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<ProductCatalogService>,
    coupons: Arc<CouponService>,
    shipping_fee: i64,
    min_charge_amount: i64,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<ProductCatalogService>,
        coupons: Arc<CouponService>,
        shipping_fee: i64,
        min_charge_amount: i64,
    ) -> Self {
        Self {
            catalog,
            coupons,
            shipping_fee,
            min_charge_amount,
        }
    }

    /// Re-fetches every product and verifies stock. Fails before anything is
    /// mutated anywhere: a cart that does not validate leaves no trace.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn validate_cart(&self, items: &[CartItemInput]) -> Result<PricedCart, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let mut priced = Vec::with_capacity(items.len());
        let mut subtotal: i64 = 0;

        for item in items {
            item.validate()?;

            let product = self
                .catalog
                .find_product(item.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            if product.stock < item.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Stock insuficiente para {}",
                    product.name
                )));
            }

            subtotal += product.price * i64::from(item.quantity);

            priced.push(PricedItem {
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                quantity: item.quantity,
            });
        }

        Ok(PricedCart {
            items: priced,
            subtotal,
        })
    }

    /// Prices a validated cart. `include_shipping` distinguishes the card
    /// flow (flat shipping fee added) from the bank-transfer flow (picked up
    /// in person, no fee).
    #[instrument(skip(self, cart), fields(customer_id = %customer_id, subtotal = cart.subtotal))]
    pub async fn quote(
        &self,
        cart: PricedCart,
        coupon_code: Option<&str>,
        customer_id: Uuid,
        include_shipping: bool,
    ) -> Result<Quote, ServiceError> {
        let coupon = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(
                self.coupons
                    .find_valid_for_customer(code, customer_id)
                    .await?,
            ),
            None => None,
        };

        let discount = coupon
            .as_ref()
            .map(|c| self.coupons.calculate_discount(c, cart.subtotal))
            .unwrap_or(0);

        let shipping_fee = if include_shipping { self.shipping_fee } else { 0 };
        let total = cart.subtotal + shipping_fee - discount;

        Ok(Quote {
            items: cart.items,
            subtotal: cart.subtotal,
            shipping_fee,
            discount,
            total,
            coupon,
        })
    }

    /// Gate for the card path: the gateway rejects sub-minimum charges, so
    /// the API fails fast with a user-facing message.
    pub fn ensure_chargeable(&self, total: i64) -> Result<(), ServiceError> {
        if total <= 0 {
            return Err(ServiceError::ValidationError(
                "Invalid order total".to_string(),
            ));
        }
        if total < self.min_charge_amount {
            return Err(ServiceError::ValidationError(format!(
                "The minimum amount to process payments is ${} COP",
                self.min_charge_amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_total_multiplies() {
        let item = PricedItem {
            product_id: Uuid::new_v4(),
            name: "Palito".into(),
            unit_price: 2_500,
            quantity: 4,
        };
        assert_eq!(item.line_total(), 10_000);
    }

    #[test]
    fn chargeable_gate() {
        let service = CheckoutService::new(
            Arc::new(ProductCatalogService::new(Arc::new(
                sea_orm::DatabaseConnection::Disconnected,
            ))),
            Arc::new(CouponService::new(Arc::new(
                sea_orm::DatabaseConnection::Disconnected,
            ))),
            10_000,
            2_000,
        );

        assert!(service.ensure_chargeable(0).is_err());
        assert!(service.ensure_chargeable(-500).is_err());
        assert!(service.ensure_chargeable(1_999).is_err());
        assert!(service.ensure_chargeable(2_000).is_ok());
        assert!(service.ensure_chargeable(52_500).is_ok());
    }

    #[test]
    fn cart_item_quantity_must_be_positive() {
        let item = CartItemInput {
            product_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(item.validate().is_err());
    }
}
