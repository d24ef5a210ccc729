//! Discretized geometric path and path-point interpolation.

use crate::error::{PlanningError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single point on a geometric path, indexed by station (arclength).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathPoint {
    /// Station along the path, m. Monotonically non-decreasing.
    pub s: f64,
    /// X coordinate, m.
    pub x: f64,
    /// Y coordinate, m.
    pub y: f64,
    /// Heading, rad.
    pub theta: f64,
    /// Curvature, 1/m.
    pub kappa: f64,
    /// Curvature derivative with respect to station, 1/m².
    pub dkappa: f64,
    /// Second curvature derivative with respect to station, 1/m³.
    pub ddkappa: f64,
}

impl PathPoint {
    /// Creates a path point with only station and curvature set.
    ///
    /// Convenient for speed planning, which never reads the Cartesian fields.
    #[must_use]
    pub fn from_station_curvature(s: f64, kappa: f64) -> Self {
        Self {
            s,
            kappa,
            ..Self::default()
        }
    }
}

/// An ordered sequence of [`PathPoint`]s with station-based interpolation.
///
/// Wraps the point list by composition and exposes ordered-sequence access
/// plus `evaluate`/`length`/`max_s`. Points are validated to be non-empty
/// with monotonically non-decreasing station at construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscretizedPath {
    points: Vec<PathPoint>,
}

impl DiscretizedPath {
    /// Creates a path from an ordered point list.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] if the list is empty or the
    /// stations are not monotonically non-decreasing.
    pub fn new(points: Vec<PathPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(PlanningError::invalid_input("empty path point list"));
        }
        if points.windows(2).any(|w| w[1].s < w[0].s) {
            return Err(PlanningError::invalid_input(
                "path stations must be monotonically non-decreasing",
            ));
        }
        Ok(Self { points })
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false: construction rejects empty paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First point.
    #[must_use]
    pub fn front(&self) -> &PathPoint {
        &self.points[0]
    }

    /// Last point.
    #[must_use]
    pub fn back(&self) -> &PathPoint {
        &self.points[self.points.len() - 1]
    }

    /// Path length: `back().s - front().s`.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.back().s - self.front().s
    }

    /// Largest station on the path.
    #[must_use]
    pub fn max_s(&self) -> f64 {
        self.back().s
    }

    /// Points as a slice.
    #[must_use]
    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    /// Evaluates the path at a station by linear interpolation.
    ///
    /// Stations before the first point return the first point; stations past
    /// the last point return the last point.
    #[must_use]
    pub fn evaluate(&self, path_s: f64) -> PathPoint {
        let idx = self.points.partition_point(|p| p.s < path_s);
        if idx == 0 {
            return *self.front();
        }
        if idx == self.points.len() {
            return *self.back();
        }
        interpolate(&self.points[idx - 1], &self.points[idx], path_s)
    }

    /// Upper-bound variant of [`evaluate`](Self::evaluate): at a station
    /// shared by several points, interpolates against the segment ending at
    /// the last of them.
    #[must_use]
    pub fn evaluate_reverse(&self, path_s: f64) -> PathPoint {
        let idx = self.points.partition_point(|p| p.s <= path_s);
        if idx == 0 {
            return *self.front();
        }
        if idx == self.points.len() {
            return *self.back();
        }
        interpolate(&self.points[idx - 1], &self.points[idx], path_s)
    }
}

fn interpolate(p0: &PathPoint, p1: &PathPoint, s: f64) -> PathPoint {
    let span = p1.s - p0.s;
    if span.abs() < f64::EPSILON {
        return *p0;
    }
    let w = (s - p0.s) / span;
    let lerp = |a: f64, b: f64| w.mul_add(b - a, a);
    PathPoint {
        s,
        x: lerp(p0.x, p1.x),
        y: lerp(p0.y, p1.y),
        theta: lerp(p0.theta, p1.theta),
        kappa: lerp(p0.kappa, p1.kappa),
        dkappa: lerp(p0.dkappa, p1.dkappa),
        ddkappa: lerp(p0.ddkappa, p1.ddkappa),
    }
}
