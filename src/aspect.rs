//! Reduced width:height ratios.
//!
//! An [`AspectRatio`] is always stored in lowest terms (`gcd(width, height) == 1`)
//! so that `16:9`, `32:18` and `1920:1080` compare equal and render to the same
//! storage path segment. The single exception is the degenerate `0:0`, produced
//! whenever either input dimension is zero, which stands for "unknown".

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AspectRatioError {
    #[error("invalid aspect ratio {0:?}: expected <width>:<height>")]
    Invalid(String),
}

/// A width:height ratio in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// The "unknown" ratio.
    pub const DEGENERATE: AspectRatio = AspectRatio {
        width: 0,
        height: 0,
    };

    /// Reduce `width:height` to lowest terms.
    ///
    /// Returns [`AspectRatio::DEGENERATE`] if either side is zero.
    ///
    /// ```
    /// # use derivo::AspectRatio;
    /// assert_eq!(AspectRatio::reduce(1920, 1080).to_string(), "16:9");
    /// assert!(AspectRatio::reduce(0, 1080).is_degenerate());
    /// ```
    pub fn reduce(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self::DEGENERATE;
        }
        let divisor = gcd(width, height);
        Self {
            width: width / divisor,
            height: height / divisor,
        }
    }

    pub fn width(self) -> u32 {
        self.width
    }

    pub fn height(self) -> u32 {
        self.height
    }

    pub fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `width / height` as a float.
    ///
    /// Callers must rule out the degenerate ratio first; for `0:0` this is NaN.
    pub fn to_f64(self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Greatest common divisor (Euclid). `gcd(a, 0) == a`.
pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioError;

    /// Parse `"<width>:<height>"`. Exactly two unsigned integer components are
    /// required; the result is reduced.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AspectRatioError::Invalid(s.to_string());
        let (w, h) = s.split_once(':').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        Ok(Self::reduce(width, height))
    }
}
