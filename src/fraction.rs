//! Rational frame rate.
//!
//! Frame rates are stored as exact numerator/denominator pairs so NTSC
//! rates (30000/1001) survive arithmetic without float drift. Conversion
//! to float happens only at the edges (sleep timing, byte estimates).

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact rational number, used for frames-per-second values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
    num: i32,
    den: i32,
}

impl Fraction {
    /// 24 fps (film)
    pub const FPS_24: Fraction = Fraction { num: 24, den: 1 };
    /// 30 fps
    pub const FPS_30: Fraction = Fraction { num: 30, den: 1 };
    /// 29.97 fps (NTSC)
    pub const FPS_NTSC: Fraction = Fraction { num: 30000, den: 1001 };

    /// Create a new fraction, reduced to lowest terms.
    ///
    /// A zero denominator is kept as-is; `to_f64()` then yields a
    /// non-finite value which downstream timing code guards against.
    pub fn new(num: i32, den: i32) -> Self {
        if den == 0 {
            return Self { num, den };
        }
        let r = Ratio::new(num, den);
        Self {
            num: *r.numer(),
            den: *r.denom(),
        }
    }

    pub fn num(&self) -> i32 {
        self.num
    }

    pub fn den(&self) -> i32 {
        self.den
    }

    pub fn to_f32(&self) -> f32 {
        self.num as f32 / self.den as f32
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Rounded integer value (29.97 -> 30).
    pub fn to_int(&self) -> i32 {
        self.to_f64().round() as i32
    }

    /// Swap numerator and denominator (fps -> seconds per frame).
    pub fn reciprocal(&self) -> Fraction {
        Fraction::new(self.den, self.num)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
