//! Spatiotemporal obstacle boundaries on the station-time plane.

use crate::error::{PlanningError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the ego's station is constrained relative to a boundary's edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BoundaryType {
    /// Hard wall: ego stays below the boundary's lower edge.
    Stop,
    /// Crossing traffic: ego stays below the lower edge minus a gap.
    Yield,
    /// Leading vehicle: ego stays below the lower edge minus a follow gap.
    Follow,
    /// Ego passes in front: ego stays above the boundary's upper edge.
    Overtake,
}

/// A point where an interaction with the boundary's obstacle ends, carrying a
/// gap override applied near that time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InteractionPoint {
    /// Interaction end time, s.
    pub time: f64,
    /// Gap to hold near the interaction end, m.
    pub s_gap: f64,
}

/// One sample of a boundary's blocked station band at a time instant.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StBoundaryPoint {
    /// Time, s.
    pub t: f64,
    /// Lower edge of the blocked band, m.
    pub s_lower: f64,
    /// Upper edge of the blocked band, m.
    pub s_upper: f64,
}

/// The drivable range a boundary leaves open at a queried time.
///
/// `s_upper` is the boundary's lower edge (the ceiling for STOP, YIELD, and
/// FOLLOW); `s_lower` is the boundary's upper edge (the floor for OVERTAKE).
/// The caller picks the side its boundary type dictates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnblockRange {
    /// Largest station still below the boundary, m.
    pub s_upper: f64,
    /// Smallest station already above the boundary, m.
    pub s_lower: f64,
}

/// A typed forbidden region over (t, s), sampled as a band of
/// [`StBoundaryPoint`]s with linear interpolation between samples.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StBoundary {
    boundary_type: BoundaryType,
    characteristic_length: f64,
    points: Vec<StBoundaryPoint>,
    end_interaction: Option<InteractionPoint>,
}

impl StBoundary {
    /// Creates a boundary from ordered band samples.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] if the sample list is empty,
    /// the times are not monotonically non-decreasing, or any sample has its
    /// lower edge above its upper edge.
    pub fn new(
        boundary_type: BoundaryType,
        characteristic_length: f64,
        points: Vec<StBoundaryPoint>,
    ) -> Result<Self> {
        if points.is_empty() {
            return Err(PlanningError::invalid_input("empty ST boundary"));
        }
        if points.windows(2).any(|w| w[1].t < w[0].t) {
            return Err(PlanningError::invalid_input(
                "ST boundary times must be monotonically non-decreasing",
            ));
        }
        if points.iter().any(|p| p.s_lower > p.s_upper) {
            return Err(PlanningError::invalid_input(
                "ST boundary band has lower edge above upper edge",
            ));
        }
        Ok(Self {
            boundary_type,
            characteristic_length,
            points,
            end_interaction: None,
        })
    }

    /// Creates a boundary whose band does not move over `[t_start, t_end]`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] on an inverted band or span.
    pub fn stationary(
        boundary_type: BoundaryType,
        s_lower: f64,
        s_upper: f64,
        t_start: f64,
        t_end: f64,
        characteristic_length: f64,
    ) -> Result<Self> {
        Self::new(
            boundary_type,
            characteristic_length,
            vec![
                StBoundaryPoint {
                    t: t_start,
                    s_lower,
                    s_upper,
                },
                StBoundaryPoint {
                    t: t_end,
                    s_lower,
                    s_upper,
                },
            ],
        )
    }

    /// Attaches an end-interaction point.
    #[must_use]
    pub const fn with_end_interaction(mut self, point: InteractionPoint) -> Self {
        self.end_interaction = Some(point);
        self
    }

    /// Boundary type.
    #[must_use]
    pub const fn boundary_type(&self) -> BoundaryType {
        self.boundary_type
    }

    /// Characteristic gap distance, m.
    #[must_use]
    pub const fn characteristic_length(&self) -> f64 {
        self.characteristic_length
    }

    /// End-interaction point, when one is attached.
    #[must_use]
    pub const fn end_interaction(&self) -> Option<InteractionPoint> {
        self.end_interaction
    }

    /// Earliest sampled time.
    #[must_use]
    pub fn min_t(&self) -> f64 {
        self.points[0].t
    }

    /// Latest sampled time.
    #[must_use]
    pub fn max_t(&self) -> f64 {
        self.points[self.points.len() - 1].t
    }

    /// Drivable range left open at a time, or `None` when the boundary does
    /// not cover that time.
    #[must_use]
    pub fn unblock_s_range(&self, t: f64) -> Option<UnblockRange> {
        if t < self.min_t() || t > self.max_t() {
            return None;
        }
        let idx = self.points.partition_point(|p| p.t < t);
        let (lower_edge, upper_edge) = if idx == 0 {
            (self.points[0].s_lower, self.points[0].s_upper)
        } else if idx == self.points.len() {
            let last = self.points[self.points.len() - 1];
            (last.s_lower, last.s_upper)
        } else {
            let p0 = self.points[idx - 1];
            let p1 = self.points[idx];
            let span = p1.t - p0.t;
            if span.abs() < f64::EPSILON {
                (p0.s_lower, p0.s_upper)
            } else {
                let w = (t - p0.t) / span;
                (
                    w.mul_add(p1.s_lower - p0.s_lower, p0.s_lower),
                    w.mul_add(p1.s_upper - p0.s_upper, p0.s_upper),
                )
            }
        };
        Some(UnblockRange {
            s_upper: lower_edge,
            s_lower: upper_edge,
        })
    }
}
