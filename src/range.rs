//! Validated closed-open integer intervals
//!
//! Every randomized knob in a [`Profile`](crate::config::Profile) is a
//! `[lo, hi)` interval sampled through an injected random source, so runs
//! are reproducible when a master seed is supplied.

use crate::error::RangeError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed-open interval `[lo, hi)` over `u32` with validated bounds
///
/// Construction fails when `lo >= hi`, so a value of this type always
/// contains at least one integer and `sample` cannot panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct ClosedOpenRange {
    lo: u32,
    hi: u32,
}

impl ClosedOpenRange {
    /// Create a new range `[lo, hi)`
    ///
    /// # Errors
    /// Returns [`RangeError`] when `lo >= hi`.
    pub fn new(lo: u32, hi: u32) -> Result<Self, RangeError> {
        if lo >= hi {
            return Err(RangeError { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    /// Inclusive lower bound
    pub fn lo(&self) -> u32 {
        self.lo
    }

    /// Exclusive upper bound
    pub fn hi(&self) -> u32 {
        self.hi
    }

    /// Largest value the range can produce
    pub fn max_value(&self) -> u32 {
        self.hi - 1
    }

    /// Number of integers in the range
    pub fn span(&self) -> u32 {
        self.hi - self.lo
    }

    /// Whether `value` lies within `[lo, hi)`
    pub fn contains(&self, value: u32) -> bool {
        value >= self.lo && value < self.hi
    }

    /// Draw a uniform value from `[lo, hi)`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.lo..self.hi)
    }
}

impl TryFrom<(u32, u32)> for ClosedOpenRange {
    type Error = RangeError;

    fn try_from((lo, hi): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(lo, hi)
    }
}

impl From<ClosedOpenRange> for (u32, u32) {
    fn from(range: ClosedOpenRange) -> Self {
        (range.lo, range.hi)
    }
}

impl fmt::Display for ClosedOpenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lo, self.hi)
    }
}
