//! Property-based checks over the money math: discounts stay within
//! bounds and the VAT split always reassembles the original amount.

use chrono::Utc;
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use palito_api::entities::coupon::{DiscountType, Model as CouponModel};
use palito_api::services::coupons::CouponService;
use palito_api::services::invoicing::{embedded_tax, tax_base};

fn coupon(discount_type: DiscountType, value: i64) -> CouponModel {
    CouponModel {
        id: Uuid::new_v4(),
        code: "PROP".to_string(),
        discount_type,
        discount_value: value,
        is_active: true,
        expires_at: None,
        created_at: Utc::now(),
    }
}

fn service() -> CouponService {
    CouponService::new(Arc::new(sea_orm::DatabaseConnection::Disconnected))
}

proptest! {
    #[test]
    fn percentage_discount_is_bounded_by_subtotal(
        subtotal in 0i64..10_000_000,
        percent in 0i64..=100,
    ) {
        let discount = service().calculate_discount(&coupon(DiscountType::Percentage, percent), subtotal);
        prop_assert!(discount >= 0);
        prop_assert!(discount <= subtotal);
    }

    #[test]
    fn fixed_discount_is_bounded_by_subtotal(
        subtotal in 0i64..10_000_000,
        value in 0i64..20_000_000,
    ) {
        let discount = service().calculate_discount(&coupon(DiscountType::Fixed, value), subtotal);
        prop_assert!(discount >= 0);
        prop_assert!(discount <= subtotal);
    }

    #[test]
    fn totals_never_go_negative(
        subtotal in 0i64..10_000_000,
        shipping in 0i64..100_000,
        percent in 0i64..=100,
    ) {
        let discount = service().calculate_discount(&coupon(DiscountType::Percentage, percent), subtotal);
        prop_assert!(subtotal + shipping - discount >= 0);
    }

    #[test]
    fn tax_split_reassembles(amount in 0i64..100_000_000) {
        prop_assert_eq!(tax_base(amount) + embedded_tax(amount), amount);
        prop_assert!(tax_base(amount) <= amount);
        prop_assert!(embedded_tax(amount) >= 0);
    }
}
