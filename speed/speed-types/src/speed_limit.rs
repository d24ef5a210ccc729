//! Road speed limit as a piecewise-constant curve over station.

use crate::error::{PlanningError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Speed limit curve: `(station, limit)` breakpoints, each governing from its
/// station up to the next breakpoint. Lookups clamp at both ends.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedLimit {
    points: Vec<(f64, f64)>,
}

impl SpeedLimit {
    /// Creates a curve from `(station, limit)` breakpoints.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] if the list is empty, the
    /// stations are not monotonically non-decreasing, or any limit is
    /// negative.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(PlanningError::invalid_input("empty speed limit curve"));
        }
        if points.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(PlanningError::invalid_input(
                "speed limit stations must be monotonically non-decreasing",
            ));
        }
        if points.iter().any(|&(_, v)| v < 0.0) {
            return Err(PlanningError::invalid_input("negative speed limit"));
        }
        Ok(Self { points })
    }

    /// Creates a curve with one uniform limit over `[0, length]`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] if the limit is negative.
    pub fn uniform(limit: f64, length: f64) -> Result<Self> {
        Self::new(vec![(0.0, limit), (length, limit)])
    }

    /// Limit governing at a station (staircase lookup, clamped).
    #[must_use]
    pub fn speed_limit_by_s(&self, s: f64) -> f64 {
        let idx = self.points.partition_point(|&(ps, _)| ps <= s);
        if idx == 0 {
            return self.points[0].1;
        }
        self.points[idx - 1].1
    }

    /// Smallest limit anywhere on the curve.
    #[must_use]
    pub fn min_limit(&self) -> f64 {
        self.points
            .iter()
            .map(|&(_, v)| v)
            .fold(f64::INFINITY, f64::min)
    }

    /// Breakpoints as a slice.
    #[must_use]
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}
