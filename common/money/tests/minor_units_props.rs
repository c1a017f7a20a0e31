use bigdecimal::BigDecimal;
use common_money::{line_subtotal, normalize_scale, to_minor_units};
use proptest::prelude::*;

proptest! {
    #[test]
    fn minor_units_round_trip(cents in 0i64..10_000_000) {
        let major = BigDecimal::from(cents).with_scale(2) / BigDecimal::from(100);
        prop_assert_eq!(to_minor_units(&major), Some(cents));
    }

    #[test]
    fn normalization_is_idempotent(cents in 0i64..10_000_000) {
        let major = BigDecimal::from(cents) / BigDecimal::from(100);
        let once = normalize_scale(&major);
        prop_assert_eq!(normalize_scale(&once), once.clone());
    }

    #[test]
    fn subtotal_scales_linearly(cents in 1i64..1_000_000, qty in 1i32..50) {
        let unit = BigDecimal::from(cents) / BigDecimal::from(100);
        let subtotal = line_subtotal(&unit, qty);
        prop_assert_eq!(to_minor_units(&subtotal), Some(cents * qty as i64));
    }
}
