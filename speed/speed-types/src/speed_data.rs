//! Speed profiles: time-indexed (s, v, a, j) sequences.

use crate::error::{PlanningError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time tolerance when matching a query against profile endpoints, s.
const TIME_EPSILON: f64 = 1e-6;

/// One sample of a speed profile.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedPoint {
    /// Station, m.
    pub s: f64,
    /// Relative time, s.
    pub t: f64,
    /// Longitudinal speed, m/s.
    pub v: f64,
    /// Longitudinal acceleration, m/s².
    pub a: f64,
    /// Longitudinal jerk, m/s³.
    pub j: f64,
}

/// A speed profile: an ordered sequence of [`SpeedPoint`]s with strictly
/// increasing time, queryable by time with linear interpolation.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedData {
    points: Vec<SpeedPoint>,
}

impl SpeedData {
    /// Creates an empty profile.
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Creates a profile from a point list.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] if the times are not strictly
    /// increasing.
    pub fn from_points(points: Vec<SpeedPoint>) -> Result<Self> {
        if points.windows(2).any(|w| w[1].t <= w[0].t) {
            return Err(PlanningError::invalid_input(
                "speed profile times must be strictly increasing",
            ));
        }
        Ok(Self { points })
    }

    /// Appends one sample.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] if `t` does not strictly
    /// exceed the last sample's time.
    pub fn push_speed_point(&mut self, s: f64, t: f64, v: f64, a: f64, j: f64) -> Result<()> {
        if let Some(last) = self.points.last() {
            if t <= last.t {
                return Err(PlanningError::invalid_input(format!(
                    "speed point time {t} does not advance past {}",
                    last.t
                )));
            }
        }
        self.points.push(SpeedPoint { s, t, v, a, j });
        Ok(())
    }

    /// Evaluates the profile at a time by linear interpolation.
    ///
    /// Returns `None` when the profile is empty or the time lies outside the
    /// covered span (beyond a small tolerance).
    #[must_use]
    pub fn evaluate_by_time(&self, t: f64) -> Option<SpeedPoint> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if t < first.t - TIME_EPSILON || t > last.t + TIME_EPSILON {
            return None;
        }
        let t = t.clamp(first.t, last.t);
        let idx = self.points.partition_point(|p| p.t < t);
        if idx == 0 {
            return Some(*first);
        }
        if idx == self.points.len() {
            return Some(*last);
        }
        let p0 = self.points[idx - 1];
        let p1 = self.points[idx];
        let span = p1.t - p0.t;
        if span.abs() < f64::EPSILON {
            return Some(p0);
        }
        let w = (t - p0.t) / span;
        let lerp = |a: f64, b: f64| w.mul_add(b - a, a);
        Some(SpeedPoint {
            s: lerp(p0.s, p1.s),
            t,
            v: lerp(p0.v, p1.v),
            a: lerp(p0.a, p1.a),
            j: lerp(p0.j, p1.j),
        })
    }

    /// Time covered by the profile, s.
    #[must_use]
    pub fn total_time(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.t - first.t,
            _ => 0.0,
        }
    }

    /// Station covered by the profile, m.
    #[must_use]
    pub fn total_length(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.s - first.s,
            _ => 0.0,
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the profile holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First sample.
    #[must_use]
    pub fn first(&self) -> Option<&SpeedPoint> {
        self.points.first()
    }

    /// Last sample.
    #[must_use]
    pub fn last(&self) -> Option<&SpeedPoint> {
        self.points.last()
    }

    /// Samples as a slice.
    #[must_use]
    pub fn points(&self) -> &[SpeedPoint] {
        &self.points
    }

    /// Removes all samples.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}
