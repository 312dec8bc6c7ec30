//! Decimal rounding shared by both nodes

/// Round `value` to `decimals` places, resolving ties away from zero.
///
/// The arithmetic is done in `f64` so the scaled value is exact for every
/// reading the nodes produce. Non-finite values are returned unchanged.
pub fn round_to(value: f32, decimals: u32) -> f32 {
    if !value.is_finite() {
        return value;
    }

    let scale = libm::pow(10.0, decimals as f64);
    (libm::round(value as f64 * scale) / scale) as f32
}

/// Round to one decimal place (tilt and temperature on the wire).
pub fn round1(value: f32) -> f32 {
    round_to(value, 1)
}

/// Round to three decimal places (derived gravity).
pub fn round3(value: f32) -> f32 {
    round_to(value, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_round_away_from_zero() {
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(-0.125, 2), -0.13);
        assert_eq!(round1(0.25), 0.3);
        assert_eq!(round1(-0.25), -0.3);
    }

    #[test]
    fn test_round3_is_idempotent() {
        let values = [
            0.0, 1.0, -1.0, 1.0125, 1.0494999, 0.0005, -0.0005, 3.14159, 1234.5678, -98.7654,
            1.012, 0.999_999, 42.4242,
        ];

        for value in values {
            let once = round3(value);
            assert_eq!(round3(once), once, "round3 not idempotent for {value}");
        }
    }

    #[test]
    fn test_non_finite_passthrough() {
        assert!(round3(f32::NAN).is_nan());
        assert_eq!(round1(f32::INFINITY), f32::INFINITY);
    }
}
