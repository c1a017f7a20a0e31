use bigdecimal::BigDecimal;
use bigdecimal::ToPrimitive;

/// Normalize a monetary value to 2 decimal places (plain truncation when reducing scale).
pub fn normalize_scale(value: &BigDecimal) -> BigDecimal {
    value.with_scale(2)
}

/// Compare two monetary values allowing a tolerance (in cents) after normalization.
pub fn nearly_equal(a: &BigDecimal, b: &BigDecimal, cents_tolerance: i64) -> bool {
    let na = normalize_scale(a);
    let nb = normalize_scale(b);
    let diff = (na - nb).with_scale(2);
    let cents = diff.to_f64().unwrap_or(0.0) * 100.0;
    cents.abs() <= cents_tolerance as f64
}

/// Convert a major-unit decimal amount to integer minor units (e.g. rupees -> paise).
/// Sub-cent precision rounds half away from zero, matching how the gateway
/// quotes amounts. `with_scale` truncates toward zero, so the half is added
/// explicitly before the scale drop.
pub fn to_minor_units(value: &BigDecimal) -> Option<i64> {
    let shifted = value * BigDecimal::from(100);
    let half = BigDecimal::from(1) / BigDecimal::from(2);
    let adjusted =
        if shifted < BigDecimal::from(0) { shifted - half } else { shifted + half };
    adjusted.with_scale(0).to_i64()
}

/// Line subtotal: unit price x quantity, normalized.
pub fn line_subtotal(unit_price: &BigDecimal, qty: i32) -> BigDecimal {
    normalize_scale(&(unit_price * BigDecimal::from(qty)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    #[test]
    fn test_normalize() {
        let v = BigDecimal::parse_bytes(b"12.3456", 10).unwrap();
        assert_eq!(normalize_scale(&v).to_string(), "12.34");
    }

    #[test]
    fn test_nearly_equal() {
        let a = BigDecimal::parse_bytes(b"10.001", 10).unwrap();
        let b = BigDecimal::parse_bytes(b"10.009", 10).unwrap();
        assert!(nearly_equal(&a, &b, 1)); // 1 cent tolerance
    }

    #[test]
    fn test_minor_units() {
        let v = BigDecimal::parse_bytes(b"499.50", 10).unwrap();
        assert_eq!(to_minor_units(&v), Some(49950));
        let whole = BigDecimal::from(1000);
        assert_eq!(to_minor_units(&whole), Some(100000));
    }

    #[test]
    fn test_minor_units_rounds_half_up() {
        let v = BigDecimal::parse_bytes(b"499.999", 10).unwrap();
        assert_eq!(to_minor_units(&v), Some(50000));
        let v = BigDecimal::parse_bytes(b"12.345", 10).unwrap();
        assert_eq!(to_minor_units(&v), Some(1235));
        let v = BigDecimal::parse_bytes(b"0.004", 10).unwrap();
        assert_eq!(to_minor_units(&v), Some(0));
    }

    #[test]
    fn test_line_subtotal() {
        let price = BigDecimal::parse_bytes(b"12.34", 10).unwrap();
        assert_eq!(line_subtotal(&price, 3).to_string(), "37.02");
    }
}
