use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{
        ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Admin-driven order status transitions.
///
/// A transition to the current status still persists (bumping `version`)
/// but emits no event, so repeated "paid" submissions cannot produce a
/// second invoice email. `paid_at` and `delivered_at` are stamped only on
/// the first entry into their status.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Parses an admin-supplied status string against the fixed enum.
    pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
        OrderStatus::from_str(raw)
            .map_err(|_| ServiceError::ValidationError(format!("Invalid status: {}", raw)))
    }

    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                warn!("order not found for status update");
                ServiceError::NotFound(format!("Order {} not found", order_id))
            })?;

        let old_status = order.status;
        let now = Utc::now();

        let mut active: OrderActiveModel = order.clone().into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(now));
        active.version = Set(order.version + 1);

        if new_status == OrderStatus::Paid && order.paid_at.is_none() {
            active.paid_at = Set(Some(now));
        }
        if new_status == OrderStatus::Delivered && order.delivered_at.is_none() {
            active.delivered_at = Set(Some(now));
        }

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            old_status = %old_status,
            "order status updated"
        );

        // Side effects ride the event channel, and only an actual change
        // triggers them.
        if old_status != new_status {
            if let Some(sender) = &self.event_sender {
                let event = if new_status == OrderStatus::Paid {
                    Event::OrderPaid { order_id }
                } else {
                    Event::OrderStatusChanged {
                        order_id,
                        old_status,
                        new_status,
                    }
                };

                if let Err(e) = sender.send(event).await {
                    warn!(error = %e, "failed to emit status change event");
                }
            }
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("pending", OrderStatus::Pending)]
    #[test_case("paid", OrderStatus::Paid)]
    #[test_case("in_preparation", OrderStatus::InPreparation)]
    #[test_case("ready", OrderStatus::Ready)]
    #[test_case("delivered", OrderStatus::Delivered)]
    #[test_case("canceled", OrderStatus::Canceled)]
    #[test_case("rejected", OrderStatus::Rejected)]
    fn parses_every_valid_status(raw: &str, expected: OrderStatus) {
        assert_eq!(OrderStatusService::parse_status(raw).unwrap(), expected);
    }

    #[test_case("shipped")]
    #[test_case("PAID")]
    #[test_case("")]
    #[test_case("refunded")]
    fn rejects_statuses_outside_the_enum(raw: &str) {
        assert!(OrderStatusService::parse_status(raw).is_err());
    }
}
