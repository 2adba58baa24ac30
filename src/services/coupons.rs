use crate::{
    entities::coupon::{self, DiscountType, Entity as Coupon, Model as CouponModel},
    entities::coupon_redemption::{self, Entity as CouponRedemption},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Uppercases and trims a user-supplied code; all lookups go through this.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Find a coupon the given customer may still redeem. Fails with a
    /// user-facing error when the code is unknown, inactive, expired, or
    /// already used by this customer.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn find_valid_for_customer(
        &self,
        code: &str,
        customer_id: Uuid,
    ) -> Result<CouponModel, ServiceError> {
        let normalized = Self::normalize_code(code);

        let found = Coupon::find()
            .filter(coupon::Column::Code.eq(normalized.clone()))
            .one(&*self.db)
            .await?;

        let found = found.filter(|c| c.is_redeemable_at(Utc::now())).ok_or_else(|| {
            ServiceError::CouponError("El cupón no es válido o ha expirado.".to_string())
        })?;

        let already_used = CouponRedemption::find()
            .filter(coupon_redemption::Column::CouponId.eq(found.id))
            .filter(coupon_redemption::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .is_some();

        if already_used {
            return Err(ServiceError::CouponError(
                "Ya usaste este cupón anteriormente.".to_string(),
            ));
        }

        Ok(found)
    }

    /// Discount for a subtotal, in minor currency units. Percentage coupons
    /// round half-up; fixed coupons never discount more than the subtotal.
    pub fn calculate_discount(&self, coupon: &CouponModel, subtotal: i64) -> i64 {
        let discount = match coupon.discount_type {
            DiscountType::Percentage => {
                let rate = Decimal::from(coupon.discount_value) / Decimal::from(100);
                (Decimal::from(subtotal) * rate)
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .to_i64()
                    .unwrap_or(0)
            }
            DiscountType::Fixed => coupon.discount_value,
        };

        discount.clamp(0, subtotal)
    }

    /// Records that `customer_id` used this coupon. Set-add semantics: a
    /// replayed webhook hits the unique (coupon, customer) index and the
    /// redemption stays recorded exactly once.
    #[instrument(skip(self), fields(coupon_id = %coupon_id, customer_id = %customer_id))]
    pub async fn redeem(&self, coupon_id: Uuid, customer_id: Uuid) -> Result<(), ServiceError> {
        let redemption = coupon_redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon_id),
            customer_id: Set(customer_id),
            redeemed_at: Set(Utc::now()),
        };

        let insert = CouponRedemption::insert(redemption)
            .on_conflict(
                OnConflict::columns([
                    coupon_redemption::Column::CouponId,
                    coupon_redemption::Column::CustomerId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&*self.db)
            .await;

        match insert {
            Ok(_) => {
                info!("coupon redeemed");
                Ok(())
            }
            Err(DbErr::RecordNotInserted) => {
                info!("coupon already redeemed by this customer");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Admin: create a coupon. The code is stored normalized.
    #[instrument(skip(self))]
    pub async fn create_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        discount_value: i64,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<CouponModel, ServiceError> {
        if discount_value <= 0 {
            return Err(ServiceError::ValidationError(
                "Discount value must be positive".to_string(),
            ));
        }
        if discount_type == DiscountType::Percentage && discount_value > 100 {
            return Err(ServiceError::ValidationError(
                "Percentage discount cannot exceed 100".to_string(),
            ));
        }

        let normalized = Self::normalize_code(code);
        if normalized.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }

        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(normalized),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            is_active: Set(true),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
        };

        Ok(model.insert(&*self.db).await?)
    }

    /// Admin: list every coupon, newest first.
    pub async fn list_coupons(&self) -> Result<Vec<CouponModel>, ServiceError> {
        use sea_orm::QueryOrder;
        Ok(Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Admin: activate or deactivate a coupon.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn set_active(&self, coupon_id: Uuid, is_active: bool) -> Result<CouponModel, ServiceError> {
        let found = Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        if found.is_active == is_active {
            warn!("coupon active flag unchanged");
            return Ok(found);
        }

        let mut active: coupon::ActiveModel = found.into();
        active.is_active = Set(is_active);
        Ok(active.update(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percentage(value: i64) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "PALITO15".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: value,
            is_active: true,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    fn fixed(value: i64) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "SAVE5000".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: value,
            is_active: true,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    fn service() -> CouponService {
        CouponService::new(Arc::new(DatabaseConnection::Disconnected))
    }

    #[test]
    fn normalizes_codes() {
        assert_eq!(CouponService::normalize_code("  palito15 "), "PALITO15");
        assert_eq!(CouponService::normalize_code("Palito15"), "PALITO15");
    }

    #[test]
    fn percentage_discount_rounds_half_up() {
        let service = service();
        // 15% of 50,000 = 7,500
        assert_eq!(service.calculate_discount(&percentage(15), 50_000), 7_500);
        // 15% of 1,010 = 151.5 -> 152
        assert_eq!(service.calculate_discount(&percentage(15), 1_010), 152);
        // 33% of 100 = 33
        assert_eq!(service.calculate_discount(&percentage(33), 100), 33);
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let service = service();
        assert_eq!(service.calculate_discount(&fixed(5_000), 50_000), 5_000);
        assert_eq!(service.calculate_discount(&fixed(80_000), 50_000), 50_000);
    }

    #[test]
    fn discount_is_never_negative() {
        let service = service();
        assert_eq!(service.calculate_discount(&fixed(-100), 50_000), 0);
        assert_eq!(service.calculate_discount(&percentage(15), 0), 0);
    }
}
