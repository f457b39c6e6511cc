//! Fixed-point helpers for the controllers

use az::CheckedAs;

#[allow(unused_imports)]
use crate::float_polyfill::FloatPolyfill;

/// Round a non-negative float to the nearest integer. Negative, NaN and
/// out-of-range values become zero, which coefficient validation rejects.
pub(crate) fn round_u64(value: f64) -> u64 {
    value.round().checked_as::<u64>().unwrap_or(0)
}

/// `limit << scale` as a symmetric clamp for a wide accumulator
pub(crate) fn clamp_scaled(value: i128, limit: u64, scale: u32) -> i128 {
    let bound = (limit as i128).saturating_mul(1i128 << scale);
    value.clamp(-bound, bound)
}

/// Drop `scale` fractional bits, rounding half up, and saturate to i64
pub(crate) fn wide_output(value: i128, scale: u32) -> i64 {
    let rounded = value.saturating_add(1i128 << (scale - 1)) >> scale;
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// `(a * b) >> shift` without an intermediate overflow, for `shift >= 64`.
/// Rounds towards zero.
pub(crate) fn mul_shr(a: i128, b: u64, shift: u32) -> i128 {
    debug_assert!(shift >= 64);
    let magnitude = a.unsigned_abs();
    let lo = (magnitude as u64 as u128) * b as u128;
    let hi = (magnitude >> 64) * b as u128;
    // the full product is hi * 2^64 + lo
    let product = hi.saturating_add(lo >> 64) >> (shift - 64);
    let product = product.min(i128::MAX as u128) as i128;
    if a < 0 {
        -product
    } else {
        product
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficients_round_to_nearest() {
        assert_eq!(round_u64(7.5), 8);
        assert_eq!(round_u64(7.49), 7);
        assert_eq!(round_u64(-3.0), 0);
        assert_eq!(round_u64(f64::NAN), 0);
    }

    #[test]
    fn rounding_output() {
        assert_eq!(wide_output(3 << 10, 10), 3);
        assert_eq!(wide_output((3 << 10) + 512, 10), 4);
        assert_eq!(wide_output((3 << 10) + 511, 10), 3);
        assert_eq!(wide_output(-(3 << 10) - 512, 10), -3);
        assert_eq!(wide_output(i128::MAX, 10), i64::MAX);
    }

    #[test]
    fn wide_multiply_matches_narrow() {
        assert_eq!(mul_shr(3 << 70, 5, 64), 15 << 6);
        assert_eq!(mul_shr(-(1 << 100), 1 << 40, 100), -(1 << 40));
        assert_eq!(mul_shr(12345, 1 << 63, 64), 12345 / 2);
        // beyond 128 bits before the shift
        assert_eq!(mul_shr(1 << 120, 1 << 60, 120), 1 << 60);
    }

    #[test]
    fn coefficient_rounding() {
        assert_eq!(round_u64(2.5), 3);
        assert_eq!(round_u64(-1.0), 0);
        assert_eq!(round_u64(f64::NAN), 0);
        assert_eq!(round_u64(1e30), 0);
    }

    #[test]
    fn clamp_is_symmetric() {
        assert_eq!(clamp_scaled(1 << 40, 3, 4), 48);
        assert_eq!(clamp_scaled(-(1 << 40), 3, 4), -48);
        assert_eq!(clamp_scaled(5, 3, 4), 5);
    }
}
