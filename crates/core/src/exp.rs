//! Checked fixed-point arithmetic on U256 mantissas.
//!
//! Two scales are in use:
//! - `EXP_SCALE` (1e18) for exchange rates, collateral factors, prices,
//!   interest rates and borrow indices
//! - `DOUBLE_SCALE` (1e36) for reward indices
//!
//! Every helper returns [`MathError`] instead of wrapping or panicking.

use alloy::primitives::U256;

use crate::error::MathError;

/// 1e18
pub const EXP_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// 1e36
pub const DOUBLE_SCALE: U256 =
    U256::from_limbs([12_919_594_847_110_692_864u64, 54_210_108_624_275_221u64, 0, 0]);

/// Pre-computed powers of 10 up to 1e18 for decimal parsing.
const POW10: [u64; 19] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
];

#[inline(always)]
pub fn add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::IntegerOverflow)
}

#[inline(always)]
pub fn sub(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_sub(b).ok_or(MathError::IntegerUnderflow)
}

#[inline(always)]
pub fn mul(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_mul(b).ok_or(MathError::IntegerOverflow)
}

#[inline(always)]
pub fn div(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_div(b).ok_or(MathError::DivisionByZero)
}

/// `exp * scalar / 1e18`, truncated.
#[inline]
pub fn mul_scalar_truncate(exp: U256, scalar: U256) -> Result<U256, MathError> {
    Ok(mul(exp, scalar)? / EXP_SCALE)
}

/// `exp * scalar / 1e18 + addend`, truncated.
#[inline]
pub fn mul_scalar_truncate_add(exp: U256, scalar: U256, addend: U256) -> Result<U256, MathError> {
    add(mul_scalar_truncate(exp, scalar)?, addend)
}

/// Product of two mantissas, `a * b / 1e18`.
#[inline]
pub fn mul_exp(a: U256, b: U256) -> Result<U256, MathError> {
    mul_scalar_truncate(a, b)
}

/// Product of three mantissas, rescaled after each step.
#[inline]
pub fn mul_exp3(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    mul_exp(mul_exp(a, b)?, c)
}

/// Quotient of two mantissas, `a * 1e18 / b`.
#[inline]
pub fn div_exp(a: U256, b: U256) -> Result<U256, MathError> {
    div(mul(a, EXP_SCALE)?, b)
}

/// Unscaled amount divided by a mantissa: `scalar * 1e18 / exp`.
#[inline]
pub fn div_scalar_by_exp_truncate(scalar: U256, exp: U256) -> Result<U256, MathError> {
    div_exp(scalar, exp)
}

/// Ratio `a / b` as a 1e36 double mantissa.
#[inline]
pub fn fraction(a: U256, b: U256) -> Result<U256, MathError> {
    div(mul(a, DOUBLE_SCALE)?, b)
}

/// Unscaled amount times a double mantissa: `a * double / 1e36`.
#[inline]
pub fn mul_double(a: U256, double: U256) -> Result<U256, MathError> {
    Ok(mul(a, double)? / DOUBLE_SCALE)
}

/// Parse an exact decimal string ("0.5", "1.08", "1000") into a value
/// scaled by `10^decimals`. Returns `None` on malformed input or when the
/// string carries more fractional digits than `decimals`.
pub fn parse_decimal(s: &str, decimals: u8) -> Option<U256> {
    let s = s.trim().replace('_', "");
    if s.is_empty() || decimals as usize >= POW10.len() {
        return None;
    }
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s.as_str(), ""),
    };
    if frac_part.len() > decimals as usize
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || (int_part.is_empty() && frac_part.is_empty())
    {
        return None;
    }

    let scale = U256::from(POW10[decimals as usize]);
    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        int_part.parse::<U256>().ok()?
    };
    let frac_value = if frac_part.is_empty() {
        U256::ZERO
    } else {
        let padding = decimals as usize - frac_part.len();
        frac_part.parse::<U256>().ok()?.checked_mul(U256::from(POW10[padding]))?
    };
    int_value.checked_mul(scale)?.checked_add(frac_value)
}

/// Parse a decimal string into a 1e18 mantissa.
pub fn parse_mantissa(s: &str) -> Option<U256> {
    parse_decimal(s, 18)
}

/// Convert a mantissa to f64. Use only for display/logging.
#[inline(always)]
pub fn mantissa_to_f64(mantissa: U256) -> f64 {
    if mantissa <= U256::from(u128::MAX) {
        let value: u128 = mantissa.to();
        value as f64 / 1e18
    } else {
        let limbs = mantissa.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        (high + limbs[0] as f64) / 1e18
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_constants() {
        assert_eq!(EXP_SCALE, U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(DOUBLE_SCALE, U256::from(10u64).pow(U256::from(36u64)));
    }

    #[test]
    fn test_checked_ops_report_distinct_errors() {
        assert_eq!(add(U256::MAX, U256::from(1u64)), Err(MathError::IntegerOverflow));
        assert_eq!(sub(U256::ZERO, U256::from(1u64)), Err(MathError::IntegerUnderflow));
        assert_eq!(mul(U256::MAX, U256::from(2u64)), Err(MathError::IntegerOverflow));
        assert_eq!(div(U256::from(1u64), U256::ZERO), Err(MathError::DivisionByZero));
    }

    #[test]
    fn test_mul_scalar_truncate() {
        // 0.5 * 3 = 1 (truncated)
        let half = EXP_SCALE / U256::from(2u64);
        assert_eq!(mul_scalar_truncate(half, U256::from(3u64)).unwrap(), U256::from(1u64));
        assert_eq!(
            mul_scalar_truncate_add(half, U256::from(4u64), U256::from(10u64)).unwrap(),
            U256::from(12u64)
        );
    }

    #[test]
    fn test_div_scalar_by_exp() {
        // 100 / 0.02 = 5000
        let rate = parse_mantissa("0.02").unwrap();
        assert_eq!(
            div_scalar_by_exp_truncate(U256::from(100u64), rate).unwrap(),
            U256::from(5000u64)
        );
        assert_eq!(
            div_scalar_by_exp_truncate(U256::from(1u64), U256::ZERO),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_fraction_and_mul_double() {
        let third = fraction(U256::from(1u64), U256::from(3u64)).unwrap();
        assert_eq!(mul_double(U256::from(300u64), third).unwrap(), U256::from(99u64));
        assert_eq!(mul_double(U256::from(7u64), DOUBLE_SCALE).unwrap(), U256::from(7u64));
    }

    #[test]
    fn test_mul_exp3() {
        // 0.5 * 2 * 1.5 = 1.5
        let v = mul_exp3(
            parse_mantissa("0.5").unwrap(),
            parse_mantissa("2").unwrap(),
            parse_mantissa("1.5").unwrap(),
        )
        .unwrap();
        assert_eq!(v, parse_mantissa("1.5").unwrap());
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_mantissa("1"), Some(EXP_SCALE));
        assert_eq!(parse_mantissa("0.5"), Some(EXP_SCALE / U256::from(2u64)));
        assert_eq!(parse_mantissa(".25"), Some(EXP_SCALE / U256::from(4u64)));
        assert_eq!(parse_mantissa("1_000"), Some(EXP_SCALE * U256::from(1000u64)));
        assert_eq!(parse_decimal("12.34", 2), Some(U256::from(1234u64)));
        assert_eq!(parse_decimal("1.234", 2), None);
        assert_eq!(parse_mantissa("abc"), None);
        assert_eq!(parse_mantissa("-1"), None);
        assert_eq!(parse_mantissa(""), None);
    }

    #[test]
    fn test_mantissa_to_f64() {
        let v = mantissa_to_f64(parse_mantissa("1.08").unwrap());
        assert!((v - 1.08).abs() < 1e-9);
    }
}
