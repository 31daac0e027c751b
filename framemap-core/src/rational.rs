//! Exact rational arithmetic for time bases and timestamps in seconds.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A reduced fraction with a positive denominator.
///
/// Intermediate products are computed in `i128` so that converting
/// between tick counts and seconds does not overflow for realistic
/// stream lengths.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// Numerator
    pub num: i64,
    /// Denominator (always positive)
    pub den: i64,
}

impl Rational {
    /// Create a new rational number in lowest terms.
    ///
    /// # Panics
    ///
    /// Panics if denominator is zero.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Denominator cannot be zero");
        Self::reduced(num as i128, den as i128)
    }

    /// Create a rational from an integer.
    pub const fn from_int(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    /// Zero.
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    /// One.
    pub const fn one() -> Self {
        Self { num: 1, den: 1 }
    }

    /// Check if this rational is zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Check if this rational is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Get the reciprocal of this rational.
    ///
    /// # Panics
    ///
    /// Panics if the numerator is zero.
    pub fn recip(&self) -> Self {
        assert!(self.num != 0, "Cannot take reciprocal of zero");
        Self::new(self.den, self.num)
    }

    /// Largest integer not greater than this value.
    pub fn floor(&self) -> i64 {
        self.num.div_euclid(self.den)
    }

    /// Smallest integer not less than this value.
    pub fn ceil(&self) -> i64 {
        -(-self.num).div_euclid(self.den)
    }

    /// Nearest integer, ties rounded away from zero.
    pub fn round(&self) -> i64 {
        let twice = 2 * self.num as i128;
        let den = self.den as i128;
        if twice >= 0 {
            ((twice + den) / (2 * den)) as i64
        } else {
            -(((-twice) + den) / (2 * den)) as i64
        }
    }

    /// Multiply by an integer.
    pub fn mul_int(&self, n: i64) -> Self {
        Self::reduced(self.num as i128 * n as i128, self.den as i128)
    }

    /// Divide by an integer.
    pub fn div_int(&self, n: i64) -> Self {
        assert!(n != 0, "Cannot divide by zero");
        Self::reduced(self.num as i128, self.den as i128 * n as i128)
    }

    fn reduced(num: i128, den: i128) -> Self {
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        if num == 0 {
            return Self::zero();
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i128;
        Self {
            num: (num / g) as i64,
            den: (den / g) as i64,
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl Add for Rational {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let num = self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128;
        Self::reduced(num, self.den as i128 * rhs.den as i128)
    }
}

impl Sub for Rational {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl Neg for Rational {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            num: -self.num,
            den: self.den,
        }
    }
}

impl Mul for Rational {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::reduced(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl Div for Rational {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        assert!(rhs.num != 0, "Cannot divide by zero");
        Self::reduced(
            self.num as i128 * rhs.den as i128,
            self.den as i128 * rhs.num as i128,
        )
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self {
        Self::from_int(n)
    }
}

impl From<(i64, i64)> for Rational {
    fn from((num, den): (i64, i64)) -> Self {
        Self::new(num, den)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
