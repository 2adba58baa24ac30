//! Domain events and the background side-effect worker.
//!
//! Request paths publish events on a bounded mpsc channel and return
//! immediately; a single spawned task consumes them and performs the slow,
//! failure-prone work (emails, invoice rendering). Worker failures are
//! logged and counted, never propagated back to a request.

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    entities::customer::{self, DocumentType, Entity as CustomerEntity},
    entities::order::{Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    services::invoicing::{self, InvoiceCustomer, InvoiceData, InvoiceLine, SellerInfo},
    services::notifications::{EmailLineItem, EmailService, InvoiceEmailData, OrderEmailData},
};

/// Events emitted after a state change is durable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A new order exists (either payment flow).
    OrderCreated { order_id: Uuid },
    /// An order entered `paid` via the admin path: invoice time.
    OrderPaid { order_id: Uuid },
    /// Any other admin status change.
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; the error case (worker gone) is reported as a string
    /// so callers can log it without failing their own operation.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Everything the worker needs to turn an event into outbound email.
pub struct EventContext {
    pub db: Arc<DatabaseConnection>,
    pub mailer: Option<EmailService>,
    pub seller: SellerInfo,
}

/// Consumes events until every sender is dropped. Spawned once from `main`.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, ctx: EventContext) {
    info!("event worker started");

    while let Some(event) = rx.recv().await {
        if let Err(e) = handle_event(&ctx, &event).await {
            metrics::counter!("palito_events.failed", 1);
            error!(error = %e, event = ?event, "event side effects failed");
        }
    }

    info!("event worker stopped");
}

async fn handle_event(ctx: &EventContext, event: &Event) -> Result<(), ServiceError> {
    let Some(mailer) = &ctx.mailer else {
        debug!(event = ?event, "smtp not configured; skipping notification");
        return Ok(());
    };

    match event {
        Event::OrderCreated { order_id } => {
            let data = build_order_email_data(&ctx.db, *order_id, None).await?;
            mailer.send_order_created(&data).await?;
            metrics::counter!("palito_events.order_created_emails", 1);
        }
        Event::OrderStatusChanged {
            order_id,
            new_status,
            ..
        } => {
            let data = build_order_email_data(&ctx.db, *order_id, Some(*new_status)).await?;
            mailer.send_order_updated(&data).await?;
            metrics::counter!("palito_events.order_updated_emails", 1);
        }
        Event::OrderPaid { order_id } => {
            let (invoice, email_notifications, user_email, user_name) =
                build_invoice_data(&ctx.db, *order_id).await?;

            let pdf = invoicing::render_pdf(&invoice, &ctx.seller)?;
            let csv = invoicing::render_csv(&invoice)?;

            mailer
                .send_invoice_emails(&InvoiceEmailData {
                    order_id: *order_id,
                    user_email,
                    user_name,
                    invoice_number: invoice.invoice_number(),
                    pdf,
                    csv,
                    email_notifications,
                })
                .await?;
            metrics::counter!("palito_events.invoice_emails", 1);
        }
    }

    Ok(())
}

async fn load_order_with_customer(
    db: &DatabaseConnection,
    order_id: Uuid,
) -> Result<(OrderModel, Vec<order_item::Model>, customer::Model), ServiceError> {
    let order = OrderEntity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    let items = OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(db)
        .await?;

    let customer = CustomerEntity::find_by_id(order.customer_id)
        .one(db)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Customer {} not found", order.customer_id))
        })?;

    Ok((order, items, customer))
}

async fn build_order_email_data(
    db: &DatabaseConnection,
    order_id: Uuid,
    status: Option<OrderStatus>,
) -> Result<OrderEmailData, ServiceError> {
    let (order, items, customer) = load_order_with_customer(db, order_id).await?;

    Ok(OrderEmailData {
        order_id,
        status,
        user_email: customer.email,
        user_name: customer.name,
        items: items
            .iter()
            .map(|item| EmailLineItem {
                name: item.name.clone(),
                quantity: item.quantity,
                price: item.unit_price,
            })
            .collect(),
        subtotal: order.subtotal,
        shipping_fee: order.shipping_fee,
        discount: order.discount,
        total: order.total_price,
        shipping_full_name: order.shipping_full_name,
        shipping_street_address: order.shipping_street_address,
        shipping_city: order.shipping_city,
        shipping_phone_number: order.shipping_phone_number,
        email_notifications: customer.email_notifications,
    })
}

/// Builds the invoice for an order. Shared by the paid-transition event and
/// the on-demand download endpoint so the two can never disagree.
pub async fn build_invoice_data(
    db: &DatabaseConnection,
    order_id: Uuid,
) -> Result<(InvoiceData, bool, String, String), ServiceError> {
    let (order, items, customer) = load_order_with_customer(db, order_id).await?;

    let document_label = match customer.document_type {
        Some(DocumentType::CedulaExtranjeria) => "C.E.",
        _ => "C.C.",
    };

    let phone = order
        .shipping_phone_number
        .clone()
        .or_else(|| customer.phone.clone())
        .unwrap_or_else(|| "—".to_string());

    if items.is_empty() {
        warn!(order_id = %order_id, "invoice requested for an order without line items");
    }

    let invoice = InvoiceData {
        order_id,
        date: order.paid_at.unwrap_or(order.created_at),
        payment_method: order.payment_method,
        items: items
            .iter()
            .map(|item| InvoiceLine {
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect(),
        shipping: order.shipping_fee,
        discount: order.discount,
        customer: InvoiceCustomer {
            name: customer.name.clone(),
            document_label: document_label.to_string(),
            document_number: customer
                .document_number
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "—".to_string()),
            email: customer.email.clone(),
            phone,
            address: order.shipping_street_address.clone(),
            city: order.shipping_city.clone(),
        },
    };

    Ok((
        invoice,
        customer.email_notifications,
        customer.email,
        customer.name,
    ))
}
