use crate::{
    entities::order::{
        self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus,
    },
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::ProductCatalogService,
        checkout::{PricedItem, Quote, ShippingAddressInput},
        coupons::CouponService,
        payments::{self, CheckoutMetadata},
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Placeholder line-item name for products deleted between intent creation
/// and webhook delivery.
const MISSING_PRODUCT_NAME: &str = "Producto no disponible";

/// Outcome of a webhook reconciliation attempt.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// A new order was created and side effects were applied.
    Created(OrderModel),
    /// An order with this payment id already exists; nothing was changed.
    AlreadyProcessed,
}

/// Everything needed to persist one order row plus its items.
struct NewOrder {
    customer_id: Uuid,
    auth_subject: String,
    status: OrderStatus,
    items: Vec<PricedItem>,
    shipping: ShippingAddressInput,
    subtotal: i64,
    discount: i64,
    shipping_fee: i64,
    total_price: i64,
    coupon_code: Option<String>,
    payment_id: String,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    paid_at: Option<chrono::DateTime<Utc>>,
}

/// Order persistence and payment reconciliation. The two entry points —
/// [`OrderService::place_transfer_order`] and
/// [`OrderService::reconcile_card_payment`] — share the same effect order as
/// each other: create the order, decrement stock, redeem the coupon, emit
/// the created event. None of it runs inside one spanning transaction; the
/// webhook's idempotency guard (unique payment id) is the only replay
/// protection.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<ProductCatalogService>,
    coupons: Arc<CouponService>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<ProductCatalogService>,
        coupons: Arc<CouponService>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            catalog,
            coupons,
            event_sender,
        }
    }

    /// Inserts the order row and its line items in one transaction.
    async fn insert_order(&self, new_order: NewOrder) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(new_order.customer_id),
            auth_subject: Set(new_order.auth_subject),
            status: Set(new_order.status),
            subtotal: Set(new_order.subtotal),
            discount: Set(new_order.discount),
            shipping_fee: Set(new_order.shipping_fee),
            total_price: Set(new_order.total_price),
            coupon_code: Set(new_order.coupon_code),
            payment_id: Set(new_order.payment_id),
            payment_status: Set(new_order.payment_status),
            payment_method: Set(new_order.payment_method),
            shipping_full_name: Set(new_order.shipping.full_name),
            shipping_street_address: Set(new_order.shipping.street_address),
            shipping_city: Set(new_order.shipping.city),
            shipping_phone_number: Set(new_order.shipping.phone_number),
            paid_at: Set(new_order.paid_at),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };

        let order = order.insert(&txn).await?;

        for item in &new_order.items {
            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(Some(item.product_id)),
                name: Set(item.name.clone()),
                unit_price: Set(item.unit_price),
                quantity: Set(item.quantity),
                created_at: Set(now),
            };
            line.insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(order)
    }

    /// Applies the post-creation side effects shared by both payment flows:
    /// sequential stock decrements, coupon redemption, created event.
    async fn apply_order_effects(
        &self,
        order: &OrderModel,
        items: &[PricedItem],
        coupon_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        for item in items {
            self.catalog
                .decrement_stock(item.product_id, item.quantity)
                .await?;
        }

        if let Some(coupon_id) = coupon_id {
            self.coupons.redeem(coupon_id, order.customer_id).await?;
        }

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderCreated { order_id: order.id }).await {
                warn!(error = %e, order_id = %order.id, "failed to emit order created event");
            }
        }

        Ok(())
    }

    /// Bank-transfer checkout: the order is created immediately as `pending`
    /// and the actual transfer is confirmed later by an admin status change.
    #[instrument(skip(self, quote, shipping), fields(customer_id = %customer_id))]
    pub async fn place_transfer_order(
        &self,
        customer_id: Uuid,
        auth_subject: &str,
        quote: Quote,
        shipping: ShippingAddressInput,
    ) -> Result<OrderModel, ServiceError> {
        let coupon_id = quote.coupon.as_ref().map(|c| c.id);
        let coupon_code = quote.coupon.as_ref().map(|c| c.code.clone());

        let order = self
            .insert_order(NewOrder {
                customer_id,
                auth_subject: auth_subject.to_string(),
                status: OrderStatus::Pending,
                items: quote.items.clone(),
                shipping,
                subtotal: quote.subtotal,
                discount: quote.discount,
                shipping_fee: quote.shipping_fee,
                total_price: quote.total,
                coupon_code,
                payment_id: payments::transfer_payment_id(),
                payment_status: PaymentStatus::Pending,
                payment_method: PaymentMethod::BankTransfer,
                paid_at: None,
            })
            .await?;

        info!(order_id = %order.id, "transfer order created");

        self.apply_order_effects(&order, &quote.items, coupon_id)
            .await?;

        Ok(order)
    }

    /// Card-payment reconciliation, driven by the gateway webhook. Replays
    /// are detected by payment id and acknowledged without effect; a failure
    /// after the order insert is surfaced so the gateway retries, and the
    /// retry then stops at the idempotency guard.
    #[instrument(skip(self, metadata), fields(payment_id = %payment_id))]
    pub async fn reconcile_card_payment(
        &self,
        payment_id: &str,
        metadata: CheckoutMetadata,
    ) -> Result<ReconcileOutcome, ServiceError> {
        if let Some(existing) = self.find_by_payment_id(payment_id).await? {
            info!(order_id = %existing.id, "order already exists for payment; skipping");
            metrics::counter!("palito_webhook.duplicate", 1);
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        // Re-fetch each product for its current name; items whose product
        // vanished since intent creation still become line items.
        let mut items = Vec::with_capacity(metadata.order_items.len());
        for meta_item in &metadata.order_items {
            let name = match self.catalog.find_product(meta_item.product_id).await? {
                Some(product) => product.name,
                None => {
                    warn!(product_id = %meta_item.product_id, "product vanished before reconciliation");
                    MISSING_PRODUCT_NAME.to_string()
                }
            };

            items.push(PricedItem {
                product_id: meta_item.product_id,
                name,
                unit_price: meta_item.unit_price,
                quantity: meta_item.quantity,
            });
        }

        let subtotal: i64 = items.iter().map(PricedItem::line_total).sum();

        let coupon_id = match metadata.coupon_code.as_deref() {
            Some(code) => {
                let normalized = CouponService::normalize_code(code);
                let coupon = crate::entities::coupon::Entity::find()
                    .filter(crate::entities::coupon::Column::Code.eq(normalized))
                    .one(&*self.db)
                    .await?;
                if coupon.is_none() {
                    warn!(code = %code, "coupon from intent metadata no longer exists");
                }
                coupon.map(|c| c.id)
            }
            None => None,
        };

        let order = self
            .insert_order(NewOrder {
                customer_id: metadata.customer_id,
                auth_subject: metadata.auth_subject.clone(),
                status: OrderStatus::Paid,
                items: items.clone(),
                shipping: metadata.shipping_address.clone(),
                subtotal,
                discount: metadata.discount,
                shipping_fee: metadata.shipping_fee,
                total_price: metadata.total,
                coupon_code: metadata.coupon_code.clone(),
                payment_id: payment_id.to_string(),
                payment_status: PaymentStatus::Succeeded,
                payment_method: PaymentMethod::Card,
                paid_at: Some(Utc::now()),
            })
            .await?;

        info!(order_id = %order.id, "order created from webhook");
        metrics::counter!("palito_webhook.order_created", 1);

        self.apply_order_effects(&order, &items, coupon_id).await?;

        Ok(ReconcileOutcome::Created(order))
    }

    pub async fn find_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::PaymentId.eq(payment_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    /// Orders belonging to one customer, newest first.
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Every order, newest first (admin roster).
    pub async fn list_all(&self) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn count_orders(&self) -> Result<u64, ServiceError> {
        Ok(OrderEntity::find().count(&*self.db).await?)
    }

    /// Sum of every order's total, for the dashboard.
    pub async fn total_revenue(&self) -> Result<i64, ServiceError> {
        let orders = OrderEntity::find().all(&*self.db).await?;
        Ok(orders.iter().map(|o| o.total_price).sum())
    }
}
