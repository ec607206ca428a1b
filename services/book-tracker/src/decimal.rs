//! Exact fixed-point decimal parsed from the feed's price/volume strings
//!
//! Values keep the mantissa exactly as written (minus the point and leading
//! zeros) so the checksum can be rebuilt from them, while ordering and
//! equality follow the rational value.

use crate::errors::FeedError;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Largest fractional digit count whose power of ten fits an i128
const MAX_SCALE: u32 = 38;

/// Decimal number `mantissa * 10^-scale`
#[derive(Clone, Copy)]
pub struct ExactDecimal {
    mantissa: i128,
    scale: u32,
}

impl ExactDecimal {
    /// Zero with no fractional digits
    pub const ZERO: Self = Self {
        mantissa: 0,
        scale: 0,
    };

    /// Build from raw parts
    #[inline]
    pub const fn new(mantissa: i128, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    /// Digits as written, point removed
    #[inline]
    pub const fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Number of digits after the point
    #[inline]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// True for any spelling of zero
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Digit string used by the feed checksum: no point, no leading zeros
    pub fn checksum_digits(&self) -> String {
        self.mantissa.to_string()
    }

    /// Lossy conversion for display and latency maths only
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// Same value with trailing fractional zeros stripped
    fn normalized(&self) -> (i128, u32) {
        let (mut mantissa, mut scale) = (self.mantissa, self.scale);
        if mantissa == 0 {
            return (0, 0);
        }
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        (mantissa, scale)
    }
}

/// Compare `lhs * 10^shift` against `rhs` without leaving integer arithmetic
fn cmp_scaled(lhs: i128, shift: u32, rhs: i128) -> Ordering {
    match 10i128
        .checked_pow(shift)
        .and_then(|factor| lhs.checked_mul(factor))
    {
        Some(scaled) => scaled.cmp(&rhs),
        // |lhs * 10^shift| exceeds every i128, so only its sign matters
        None => match lhs.cmp(&0) {
            Ordering::Equal => 0i128.cmp(&rhs),
            sign => sign,
        },
    }
}

impl Ord for ExactDecimal {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.scale.cmp(&other.scale) {
            Ordering::Equal => self.mantissa.cmp(&other.mantissa),
            Ordering::Less => cmp_scaled(self.mantissa, other.scale - self.scale, other.mantissa),
            Ordering::Greater => {
                cmp_scaled(other.mantissa, self.scale - other.scale, self.mantissa).reverse()
            }
        }
    }
}

impl PartialOrd for ExactDecimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ExactDecimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ExactDecimal {}

impl Hash for ExactDecimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl FromStr for ExactDecimal {
    type Err = FeedError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || FeedError::InvalidDecimal(text.to_string());

        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (unsigned, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let scale = u32::try_from(frac_part.len()).map_err(|_| invalid())?;
        if scale > MAX_SCALE {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for digit in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(invalid)?;
        }

        Ok(Self {
            mantissa: if negative { -mantissa } else { mantissa },
            scale,
        })
    }
}

impl fmt::Display for ExactDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl fmt::Debug for ExactDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExactDecimal({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn d(text: &str) -> ExactDecimal {
        text.parse().expect("valid decimal")
    }

    #[rstest]
    #[case("123.0", "123.0", Ordering::Equal)]
    #[case("0123.0", "123.0", Ordering::Equal)]
    #[case("000123.0", "123.0", Ordering::Equal)]
    #[case("123.00", "123.0", Ordering::Equal)]
    #[case("1230.00", "1230.0", Ordering::Equal)]
    #[case("123.1", "123.0", Ordering::Greater)]
    #[case("123.10", "123.00", Ordering::Greater)]
    #[case("123.10", "123.001", Ordering::Greater)]
    #[case("0123.10", "0123.01", Ordering::Greater)]
    #[case("0123.10", "0123.001", Ordering::Greater)]
    #[case("321.0", "123.1", Ordering::Greater)]
    #[case("0321.00", "123.10", Ordering::Greater)]
    #[case("0321.00", "123.001", Ordering::Greater)]
    #[case("12300.0", "1230.0", Ordering::Greater)]
    #[case("12300.00", "1230.0", Ordering::Greater)]
    #[case("123.00", "123.10", Ordering::Less)]
    #[case("123.001", "123.10", Ordering::Less)]
    #[case("0123.01", "0123.10", Ordering::Less)]
    #[case("123.1", "321.0", Ordering::Less)]
    #[case("123.10", "0321.00", Ordering::Less)]
    #[case("123.000", "1230.0", Ordering::Less)]
    #[case("1230.00", "12300.0", Ordering::Less)]
    #[case("1230.000", "12300.00", Ordering::Less)]
    #[case("-1.5", "1.5", Ordering::Less)]
    #[case("-0.10", "-0.2", Ordering::Greater)]
    #[case("0.00000000", "0", Ordering::Equal)]
    fn compares_by_value(#[case] lhs: &str, #[case] rhs: &str, #[case] expected: Ordering) {
        assert_eq!(d(lhs).cmp(&d(rhs)), expected);
        assert_eq!(d(rhs).cmp(&d(lhs)), expected.reverse());
    }

    #[rstest]
    #[case("61074.90000", 6_107_490_000, 5)]
    #[case("0.00100000", 100_000, 8)]
    #[case("0123.010", 123_010, 3)]
    #[case("123", 123, 0)]
    #[case(".5", 5, 1)]
    #[case("7.", 7, 0)]
    #[case("-2.50", -250, 2)]
    fn parses_mantissa_and_scale(#[case] text: &str, #[case] mantissa: i128, #[case] scale: u32) {
        let value = d(text);
        assert_eq!(value.mantissa(), mantissa);
        assert_eq!(value.scale(), scale);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("-")]
    #[case("1.2.3")]
    #[case("1e5")]
    #[case("+1.0")]
    #[case(" 1.0")]
    #[case("NaN")]
    #[case("123456789012345678901234567890123456789012")]
    fn rejects_non_decimals(#[case] text: &str) {
        assert_eq!(
            text.parse::<ExactDecimal>(),
            Err(FeedError::InvalidDecimal(text.to_string()))
        );
    }

    #[test]
    fn checksum_digits_drop_point_and_leading_zeros() {
        assert_eq!(d("61074.90000").checksum_digits(), "6107490000");
        assert_eq!(d("0.03300000").checksum_digits(), "3300000");
        assert_eq!(d("2.0").checksum_digits(), "20");
    }

    #[test]
    fn zero_in_any_spelling() {
        assert!(d("0.00000000").is_zero());
        assert!(d("000").is_zero());
        assert!(!d("0.00000001").is_zero());
        assert_eq!(d("0.000"), ExactDecimal::ZERO);
    }

    #[test]
    fn alignment_overflow_resolves_by_sign() {
        let wide = ExactDecimal::new(i128::MAX / 10, 0);
        let tiny = d("0.00000000000000000000000000000000000001");
        assert!(wide > tiny);
        assert!(ExactDecimal::new(-(i128::MAX / 10), 0) < tiny);
    }

    #[test]
    fn display_restores_fixed_point_text() {
        assert_eq!(d("61074.90000").to_string(), "61074.90000");
        assert_eq!(d("0123.010").to_string(), "123.010");
        assert_eq!(d(".5").to_string(), "0.5");
        assert_eq!(d("-0.05").to_string(), "-0.05");
        assert_eq!(d("42").to_string(), "42");
    }

    #[test]
    fn equal_values_hash_equally() {
        use std::collections::hash_map::DefaultHasher;

        let hash = |value: ExactDecimal| {
            let mut hasher = DefaultHasher::new();
            value.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(d("1.10")), hash(d("01.1000")));
        assert_eq!(hash(d("0.0")), hash(d("0")));
    }

    proptest! {
        #[test]
        fn order_matches_integer_order_under_padding(
            a in -1_000_000_000i64..1_000_000_000,
            b in -1_000_000_000i64..1_000_000_000,
            pad_a in 0u32..8,
            pad_b in 0u32..8,
        ) {
            // Same integers written with different numbers of trailing zeros
            let lhs = ExactDecimal::new(i128::from(a) * 10i128.pow(pad_a), pad_a);
            let rhs = ExactDecimal::new(i128::from(b) * 10i128.pow(pad_b), pad_b);
            prop_assert_eq!(lhs.cmp(&rhs), a.cmp(&b));
        }

        #[test]
        fn parse_of_display_is_identity(mantissa in -10_000_000_000i64..10_000_000_000, scale in 0u32..12) {
            let value = ExactDecimal::new(i128::from(mantissa), scale);
            let reparsed: ExactDecimal = value.to_string().parse().expect("display output parses");
            prop_assert_eq!(reparsed.mantissa(), value.mantissa());
            prop_assert_eq!(reparsed.scale(), value.scale());
        }

        #[test]
        fn order_is_antisymmetric(a in any::<i64>(), sa in 0u32..20, b in any::<i64>(), sb in 0u32..20) {
            let lhs = ExactDecimal::new(i128::from(a), sa);
            let rhs = ExactDecimal::new(i128::from(b), sb);
            prop_assert_eq!(lhs.cmp(&rhs), rhs.cmp(&lhs).reverse());
        }
    }
}
