//! Exact rational numbers for tick resolutions and sample rates

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A normalised fraction with a positive denominator.
///
/// Tick resolutions (`1/1000` s per tick) and sample rates (`250/1` Hz) are kept
/// exact so that rate alignment never accumulates floating point error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RatioRepr", into = "RatioRepr")]
pub struct Ratio {
    numerator: i64,
    denominator: i64,
}

#[derive(Serialize, Deserialize)]
struct RatioRepr {
    numerator: i64,
    denominator: i64,
}

impl TryFrom<RatioRepr> for Ratio {
    type Error = String;

    fn try_from(repr: RatioRepr) -> std::result::Result<Self, Self::Error> {
        Ratio::new(repr.numerator, repr.denominator)
            .ok_or_else(|| format!("{}/{} is not a valid ratio", repr.numerator, repr.denominator))
    }
}

impl From<Ratio> for RatioRepr {
    fn from(ratio: Ratio) -> Self {
        RatioRepr { numerator: ratio.numerator, denominator: ratio.denominator }
    }
}

pub(crate) fn gcd_i128(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl Ratio {
    pub const ZERO: Ratio = Ratio { numerator: 0, denominator: 1 };
    pub const ONE: Ratio = Ratio { numerator: 1, denominator: 1 };

    /// Create a normalised ratio. Returns `None` for a zero denominator.
    pub fn new(numerator: i64, denominator: i64) -> Option<Self> {
        Self::from_i128(numerator as i128, denominator as i128)
    }

    pub const fn from_integer(value: i64) -> Self {
        Ratio { numerator: value, denominator: 1 }
    }

    pub(crate) fn from_i128(numerator: i128, denominator: i128) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let g = gcd_i128(numerator, denominator).max(1);
        let (mut n, mut d) = (numerator / g, denominator / g);
        if d < 0 {
            n = -n;
            d = -d;
        }
        Some(Ratio { numerator: i64::try_from(n).ok()?, denominator: i64::try_from(d).ok()? })
    }

    pub const fn numerator(&self) -> i64 {
        self.numerator
    }

    pub const fn denominator(&self) -> i64 {
        self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    pub fn is_positive(&self) -> bool {
        self.numerator > 0
    }

    pub fn is_integer(&self) -> bool {
        self.denominator == 1
    }

    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    pub fn checked_mul(&self, other: &Ratio) -> Option<Ratio> {
        Self::from_i128(
            self.numerator as i128 * other.numerator as i128,
            self.denominator as i128 * other.denominator as i128,
        )
    }

    pub fn checked_div(&self, other: &Ratio) -> Option<Ratio> {
        Self::from_i128(
            self.numerator as i128 * other.denominator as i128,
            self.denominator as i128 * other.numerator as i128,
        )
    }

    pub fn checked_add(&self, other: &Ratio) -> Option<Ratio> {
        Self::from_i128(
            self.numerator as i128 * other.denominator as i128
                + other.numerator as i128 * self.denominator as i128,
            self.denominator as i128 * other.denominator as i128,
        )
    }

    pub fn checked_sub(&self, other: &Ratio) -> Option<Ratio> {
        Self::from_i128(
            self.numerator as i128 * other.denominator as i128
                - other.numerator as i128 * self.denominator as i128,
            self.denominator as i128 * other.denominator as i128,
        )
    }

    pub fn recip(&self) -> Option<Ratio> {
        Self::from_i128(self.denominator as i128, self.numerator as i128)
    }

    /// Least common multiple of two positive ratios: `lcm(a, c) / gcd(b, d)`.
    pub fn lcm(&self, other: &Ratio) -> Option<Ratio> {
        let num_gcd = gcd_i128(self.numerator as i128, other.numerator as i128);
        if num_gcd == 0 {
            return None;
        }
        let num_lcm = (self.numerator as i128 / num_gcd) * other.numerator as i128;
        let den_gcd = gcd_i128(self.denominator as i128, other.denominator as i128);
        Self::from_i128(num_lcm.abs(), den_gcd)
    }

    /// Greatest common divisor of two positive ratios: `gcd(a, c) / lcm(b, d)`.
    pub fn gcd(&self, other: &Ratio) -> Option<Ratio> {
        let num_gcd = gcd_i128(self.numerator as i128, other.numerator as i128);
        let den_gcd = gcd_i128(self.denominator as i128, other.denominator as i128);
        if den_gcd == 0 {
            return None;
        }
        let den_lcm = (self.denominator as i128 / den_gcd) * other.denominator as i128;
        Self::from_i128(num_gcd, den_lcm)
    }

    /// Whether `other / self` is a whole number.
    pub fn divides(&self, other: &Ratio) -> bool {
        if self.is_zero() {
            return false;
        }
        other.checked_div(self).is_some_and(|q| q.is_integer())
    }

    /// Largest integer not greater than the ratio.
    pub fn floor(&self) -> i64 {
        self.numerator.div_euclid(self.denominator)
    }

    /// Smallest integer not less than the ratio.
    pub fn ceil(&self) -> i64 {
        let floor = self.floor();
        if self.numerator.rem_euclid(self.denominator) == 0 { floor } else { floor + 1 }
    }
}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as i128 * other.denominator as i128;
        let rhs = other.numerator as i128 * self.denominator as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalises_sign_and_terms() {
        let r = Ratio::new(10, -4).unwrap();
        assert_eq!(r.numerator(), -5);
        assert_eq!(r.denominator(), 2);
        assert!(Ratio::new(1, 0).is_none());
    }

    #[test]
    fn lcm_of_rates() {
        let a = Ratio::from_integer(1000);
        let b = Ratio::from_integer(250);
        assert_eq!(a.lcm(&b), Some(Ratio::from_integer(1000)));
        assert_eq!(a.gcd(&b), Some(Ratio::from_integer(250)));

        let third = Ratio::new(1, 3).unwrap();
        let half = Ratio::new(1, 2).unwrap();
        assert_eq!(third.lcm(&half), Some(Ratio::from_integer(1)));
        assert_eq!(third.gcd(&half), Some(Ratio::new(1, 6).unwrap()));
    }

    #[test]
    fn floor_and_ceil() {
        let r = Ratio::new(7, 2).unwrap();
        assert_eq!(r.floor(), 3);
        assert_eq!(r.ceil(), 4);
        let n = Ratio::new(-7, 2).unwrap();
        assert_eq!(n.floor(), -4);
        assert_eq!(n.ceil(), -3);
        assert_eq!(Ratio::from_integer(5).ceil(), 5);
    }

    #[test]
    fn serde_rejects_zero_denominator() {
        let ok: Ratio = serde_yaml_ng::from_str("numerator: 2\ndenominator: 4").unwrap();
        assert_eq!(ok, Ratio::new(1, 2).unwrap());
        assert!(serde_yaml_ng::from_str::<Ratio>("numerator: 1\ndenominator: 0").is_err());
    }

    proptest! {
        #[test]
        fn lcm_is_divisible_by_both(
            a in 1i64..10_000,
            b in 1i64..10_000,
            c in 1i64..100,
            d in 1i64..100,
        ) {
            let x = Ratio::new(a, c).unwrap();
            let y = Ratio::new(b, d).unwrap();
            let l = x.lcm(&y).unwrap();
            prop_assert!(x.divides(&l));
            prop_assert!(y.divides(&l));
            let g = x.gcd(&y).unwrap();
            prop_assert!(g.divides(&x));
            prop_assert!(g.divides(&y));
        }

        #[test]
        fn ordering_matches_float(
            a in -10_000i64..10_000,
            b in 1i64..1000,
            c in -10_000i64..10_000,
            d in 1i64..1000,
        ) {
            let x = Ratio::new(a, b).unwrap();
            let y = Ratio::new(c, d).unwrap();
            if x.to_f64() < y.to_f64() {
                prop_assert!(x < y);
            }
        }
    }
}
