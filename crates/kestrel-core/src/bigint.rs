//! Arbitrary-precision integers.

use kestrel_gc::GcTraceable;
use num_bigint::BigInt as Big;
use num_traits::{Signed, Zero};

/// A JavaScript `BigInt`.
///
/// Backed by [`num_bigint::BigInt`] (sign + little-endian limbs), matching
/// spec.md §3's "sign + little-endian vector of 32-bit limbs, normalized"
/// contract — `num-bigint` normalizes its own representation the same way
/// (no leading zero limbs, zero carries no sign).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigInt(pub Big);

impl GcTraceable for BigInt {
    const NEEDS_TRACE: bool = false;
}

impl BigInt {
    /// Parse a BigInt literal body (digits only, no trailing `n`), honoring
    /// `0x`/`0o`/`0b` radix prefixes and `_` separators.
    pub fn parse(text: &str) -> Option<Self> {
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        let (radix, digits) = if let Some(rest) = cleaned.strip_prefix("0x").or(cleaned.strip_prefix("0X")) {
            (16, rest)
        } else if let Some(rest) = cleaned.strip_prefix("0o").or(cleaned.strip_prefix("0O")) {
            (8, rest)
        } else if let Some(rest) = cleaned.strip_prefix("0b").or(cleaned.strip_prefix("0B")) {
            (2, rest)
        } else {
            (10, cleaned.as_str())
        };
        Big::parse_bytes(digits.as_bytes(), radix).map(BigInt)
    }

    /// Construct from a signed 64-bit integer (e.g. array length, loop counters).
    pub fn from_i64(n: i64) -> Self {
        BigInt(Big::from(n))
    }

    /// `true` unless the value is exactly zero.
    pub fn is_truthy(&self) -> bool {
        !self.0.is_zero()
    }

    /// Decimal string, as produced by `ToString(bigint)`.
    pub fn to_decimal_string(&self) -> String {
        self.0.to_string()
    }

    /// Lossy conversion to `f64`, used only when mixed arithmetic is
    /// explicitly requested by a builtin (never by `+`/`-`/etc, which
    /// reject mixing per spec.md §3).
    pub fn to_f64_lossy(&self) -> f64 {
        use num_traits::ToPrimitive;
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    /// ES2020 `**` for BigInt: negative exponents throw `RangeError`.
    pub fn checked_pow(&self, exp: &BigInt) -> Result<BigInt, &'static str> {
        if exp.0.is_negative() {
            return Err("Exponent must be non-negative");
        }
        let exp_u32: u32 = exp
            .0
            .to_u32_digits()
            .1
            .first()
            .copied()
            .unwrap_or(0);
        Ok(BigInt(self.0.pow(exp_u32)))
    }
}

impl std::ops::Add for &BigInt {
    type Output = BigInt;
    fn add(self, rhs: Self) -> BigInt {
        BigInt(&self.0 + &rhs.0)
    }
}
impl std::ops::Sub for &BigInt {
    type Output = BigInt;
    fn sub(self, rhs: Self) -> BigInt {
        BigInt(&self.0 - &rhs.0)
    }
}
impl std::ops::Mul for &BigInt {
    type Output = BigInt;
    fn mul(self, rhs: Self) -> BigInt {
        BigInt(&self.0 * &rhs.0)
    }
}
impl std::ops::Div for &BigInt {
    type Output = Result<BigInt, &'static str>;
    fn div(self, rhs: Self) -> Result<BigInt, &'static str> {
        if rhs.0.is_zero() {
            return Err("Division by zero");
        }
        Ok(BigInt(&self.0 / &rhs.0))
    }
}
impl std::ops::Rem for &BigInt {
    type Output = Result<BigInt, &'static str>;
    fn rem(self, rhs: Self) -> Result<BigInt, &'static str> {
        if rhs.0.is_zero() {
            return Err("Division by zero");
        }
        Ok(BigInt(&self.0 % &rhs.0))
    }
}
impl std::ops::Neg for &BigInt {
    type Output = BigInt;
    fn neg(self) -> BigInt {
        BigInt(-&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_radix_prefixes_and_separators() {
        assert_eq!(BigInt::parse("1_000").unwrap().to_decimal_string(), "1000");
        assert_eq!(BigInt::parse("0xff").unwrap().to_decimal_string(), "255");
        assert_eq!(BigInt::parse("0b101").unwrap().to_decimal_string(), "5");
        assert_eq!(BigInt::parse("0o17").unwrap().to_decimal_string(), "15");
    }

    #[test]
    fn sum_one_to_twenty_is_210() {
        let mut n = BigInt::from_i64(0);
        for i in 1..=20 {
            n = &n + &BigInt::from_i64(i);
        }
        assert_eq!(n.to_decimal_string(), "210");
    }
}
