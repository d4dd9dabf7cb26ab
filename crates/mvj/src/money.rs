//! Currency amounts and exact share arithmetic.
//!
//! Amounts are held as integer cents so sums never drift. Shares between tenants or
//! invoices are reduced rationals, and converting a share of an amount back to cents
//! rounds half away from zero.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Monetary amount in euro cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    /// Largest magnitude accepted from input: ten digits, two of them decimals.
    pub const MAX: Money = Money(9_999_999_999);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_euros(euros: i64) -> Self {
        Self(euros * 100)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn saturating_mul(self, factor: i64) -> Money {
        Money(self.0.saturating_mul(factor))
    }

    /// Whether the amount fits the ten-digit bound of stored amounts.
    pub fn is_in_range(self) -> bool {
        self.0.unsigned_abs() <= Money::MAX.0.unsigned_abs()
    }

    fn bounded(cents: i64, raw: impl fmt::Display) -> Result<Money, MoneyParseError> {
        let amount = Money(cents);
        if !amount.is_in_range() {
            return Err(MoneyParseError::OutOfRange(raw.to_string()));
        }
        Ok(amount)
    }

    /// Multiply by an exact share, rounding half away from zero to the nearest cent.
    pub fn mul_fraction(self, share: Fraction) -> Money {
        let product = self.0 as i128 * share.numerator();
        let denominator = share.denominator();
        let quotient = product / denominator;
        let remainder = product % denominator;

        let rounded = if remainder.abs() * 2 >= denominator {
            quotient + product.signum()
        } else {
            quotient
        };

        Money(rounded as i64)
    }

    /// Shorthand for `mul_fraction(Fraction::new(numerator, denominator))`.
    pub fn mul_ratio(self, numerator: i64, denominator: i64) -> Option<Money> {
        Fraction::new(numerator as i128, denominator as i128).map(|share| self.mul_fraction(share))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyParseError {
    #[error("'{0}' is not a valid amount")]
    Invalid(String),
    #[error("'{0}' has more than two decimal places")]
    TooPrecise(String),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };

        let valid_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !valid_digits(whole) || !valid_digits(fraction)
        {
            return Err(MoneyParseError::Invalid(raw.to_string()));
        }
        if fraction.len() > 2 {
            return Err(MoneyParseError::TooPrecise(raw.to_string()));
        }

        let euros: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| MoneyParseError::OutOfRange(raw.to_string()))?
        };
        let cents: i64 = format!("{fraction:0<2}")
            .parse()
            .map_err(|_| MoneyParseError::Invalid(raw.to_string()))?;

        let total = euros
            .checked_mul(100)
            .and_then(|value| value.checked_add(cents))
            .ok_or_else(|| MoneyParseError::OutOfRange(raw.to_string()))?;

        Money::bounded(if negative { -total } else { total }, raw)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal amount with at most two decimal places")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Money, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Money, E> {
        let cents = value
            .checked_mul(100)
            .ok_or_else(|| E::custom(MoneyParseError::OutOfRange(value.to_string())))?;
        Money::bounded(cents, value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Money, E> {
        i64::try_from(value)
            .map_err(|_| E::custom(MoneyParseError::OutOfRange(value.to_string())))
            .and_then(|value| self.visit_i64(value))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Money, E> {
        if !value.is_finite() {
            return Err(E::custom("amount must be finite"));
        }
        // Go through the shortest decimal rendering so 0.1 + 0.2 style noise never leaks in.
        value.to_string().parse().map_err(E::custom)
    }
}

// Operators saturate at the i64 bounds instead of panicking.
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// Reduced rational number with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    num: i128,
    den: i128,
}

impl Fraction {
    pub const ZERO: Fraction = Fraction { num: 0, den: 1 };
    pub const ONE: Fraction = Fraction { num: 1, den: 1 };

    /// Returns `None` for a zero denominator.
    pub fn new(numerator: i128, denominator: i128) -> Option<Self> {
        if denominator == 0 {
            return None;
        }

        let sign = if denominator < 0 { -1 } else { 1 };
        let divisor = gcd(numerator.abs(), denominator.abs()).max(1);
        Some(Self {
            num: sign * numerator / divisor,
            den: sign * denominator / divisor,
        })
    }

    pub const fn numerator(self) -> i128 {
        self.num
    }

    pub const fn denominator(self) -> i128 {
        self.den
    }

    pub fn is_one(self) -> bool {
        self == Fraction::ONE
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Fraction::ZERO
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl Add for Fraction {
    type Output = Fraction;

    fn add(self, rhs: Fraction) -> Fraction {
        let den = lcm(self.den, rhs.den);
        let num = self.num * (den / self.den) + rhs.num * (den / rhs.den);
        // den is a positive lcm, never zero
        Fraction::new(num, den).unwrap_or(Fraction::ZERO)
    }
}

impl AddAssign for Fraction {
    fn add_assign(&mut self, rhs: Fraction) {
        *self = *self + rhs;
    }
}

impl Mul for Fraction {
    type Output = Fraction;

    fn mul(self, rhs: Fraction) -> Fraction {
        let left = gcd(self.num.abs(), rhs.den).max(1);
        let right = gcd(rhs.num.abs(), self.den).max(1);
        Fraction::new(
            (self.num / left) * (rhs.num / right),
            (self.den / right) * (rhs.den / left),
        )
        .unwrap_or(Fraction::ZERO)
    }
}

impl Sum for Fraction {
    fn sum<I: Iterator<Item = Fraction>>(iter: I) -> Fraction {
        iter.fold(Fraction::ZERO, Add::add)
    }
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: i128, b: i128) -> i128 {
    a / gcd(a, b) * b
}
