use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the subtotal
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// `discount_value` is a fixed amount in minor currency units
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Discount code. Codes are stored uppercase and matched case-insensitively.
/// A coupon is multi-use across customers but single-use per customer; the
/// per-customer usage lives in [`super::coupon_redemption`].
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Active and not past its expiry. Per-customer usage is checked
    /// separately against the redemptions table.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expiry| now < expiry)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_redemption::Entity")]
    Redemptions,
}

impl Related<super::coupon_redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(is_active: bool, expires_at: Option<DateTime<Utc>>) -> Model {
        Model {
            id: Uuid::new_v4(),
            code: "PALITO15".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 15,
            is_active,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn active_coupon_without_expiry_is_redeemable() {
        assert!(coupon(true, None).is_redeemable_at(Utc::now()));
    }

    #[test]
    fn inactive_coupon_is_not_redeemable() {
        assert!(!coupon(false, None).is_redeemable_at(Utc::now()));
    }

    #[test]
    fn expired_coupon_is_not_redeemable() {
        let yesterday = Utc::now() - Duration::days(1);
        assert!(!coupon(true, Some(yesterday)).is_redeemable_at(Utc::now()));
    }

    #[test]
    fn future_expiry_is_redeemable() {
        let next_week = Utc::now() + Duration::days(7);
        assert!(coupon(true, Some(next_week)).is_redeemable_at(Utc::now()));
    }
}
