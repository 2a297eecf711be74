// SPDX-License-Identifier: GPL-3.0-only

//! Rational numbers for frame rates and time bases

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `num/den` fraction
///
/// Used for frame rates (frames per second) and packet time bases (seconds
/// per tick). A zero denominator marks an invalid value; a zero numerator is
/// a valid "unknown" frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fraction {
    pub num: i64,
    pub den: i64,
}

impl Fraction {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// An integer value, e.g. 30 becomes 30/1
    pub const fn from_int(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    pub fn is_valid(&self) -> bool {
        self.den != 0
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Floating point value, or 0.0 when invalid
    pub fn value(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    pub fn invert(&self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /// Format as a GStreamer fraction string (e.g. "30000/1001")
    pub fn as_gst_fraction(&self) -> String {
        format!("{}/{}", self.num, self.den)
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self { num: 0, den: 1 }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_and_invert() {
        let ntsc = Fraction::new(30000, 1001);
        assert!((ntsc.value() - 29.97).abs() < 0.01);
        assert_eq!(ntsc.invert(), Fraction::new(1001, 30000));
    }

    #[test]
    fn test_invalid_is_zero_valued() {
        let bad = Fraction::new(1, 0);
        assert!(!bad.is_valid());
        assert_eq!(bad.value(), 0.0);
        assert!(Fraction::default().is_zero());
    }
}
