//! Time bases and frame positions.
//!
//! Every pts in the engine is an integer tick count; a [`TimeBase`]
//! gives the number of seconds per tick.

use crate::rational::Rational;
use std::fmt;

/// Seconds per tick.
///
/// Common time bases:
/// - 1/90000 for MPEG-TS
/// - 1/24000 for 24000/1001 fps film
/// - 1/1000 for milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBase(pub Rational);

impl TimeBase {
    /// Create a new time base from numerator and denominator.
    pub fn new(num: i64, den: i64) -> Self {
        Self(Rational::new(num, den))
    }

    /// Standard MPEG time base (1/90000).
    pub const MPEG: Self = Self(Rational { num: 1, den: 90000 });

    /// Millisecond time base (1/1000).
    pub const MILLISECONDS: Self = Self(Rational { num: 1, den: 1000 });

    /// Exact duration of `ticks` in seconds.
    pub fn ticks_to_seconds(&self, ticks: i64) -> Rational {
        self.0.mul_int(ticks)
    }

    /// Exact number of ticks spanned by `seconds`, possibly fractional.
    pub fn seconds_to_ticks(&self, seconds: Rational) -> Rational {
        seconds / self.0
    }

    /// Convert to seconds as f64.
    pub fn to_seconds(&self, ticks: i64) -> f64 {
        ticks as f64 * self.0.to_f64()
    }

    /// Rescale a tick count into another time base, rounding to nearest.
    pub fn convert(&self, ticks: i64, target: TimeBase) -> i64 {
        (self.0.mul_int(ticks) / target.0).round()
    }

    /// Get the time base as a rational.
    pub fn as_rational(&self) -> Rational {
        self.0
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MPEG
    }
}

impl From<Rational> for TimeBase {
    fn from(r: Rational) -> Self {
        Self(r)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.num, self.0.den)
    }
}

/// A position in a frame sequence, expressed in one of three units.
///
/// Used as the start/end bounds of `iter_frames`. A position resolves to
/// the index of the first frame whose pts is at or after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Direct frame index.
    FrameNumber(usize),
    /// Raw tick count in the stream's time base.
    Pts(i64),
    /// Seconds, converted through the stream's time base.
    Seconds(Rational),
}

impl Position {
    /// Resolve to a frame index, clamped to `pts.len()`.
    ///
    /// `pts` must be non-decreasing.
    pub fn resolve(&self, pts: &[i64], time_base: TimeBase) -> usize {
        match *self {
            Position::FrameNumber(n) => n.min(pts.len()),
            Position::Pts(t) => pts.partition_point(|&p| p < t),
            Position::Seconds(s) => {
                let ticks = time_base.seconds_to_ticks(s);
                pts.partition_point(|&p| Rational::from_int(p) < ticks)
            }
        }
    }
}

impl From<usize> for Position {
    fn from(n: usize) -> Self {
        Position::FrameNumber(n)
    }
}
