//! Station-time graph data and the per-tick planning context.

use crate::boundary::StBoundary;
use crate::speed_data::SpeedData;
use crate::speed_limit::SpeedLimit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ego kinematic state at the start of the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InitialState {
    /// Longitudinal speed, m/s.
    pub v: f64,
    /// Longitudinal acceleration, m/s².
    pub a: f64,
}

/// Longitudinal acceleration envelope of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleLimits {
    /// Maximum acceleration, m/s² (positive).
    pub max_acceleration: f64,
    /// Maximum deceleration, m/s². Sign is normalized by consumers; either
    /// convention is accepted.
    pub max_deceleration: f64,
}

impl Default for VehicleLimits {
    fn default() -> Self {
        Self {
            max_acceleration: 2.0,
            max_deceleration: -6.0,
        }
    }
}

/// Everything the speed optimizer reads off the station-time graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StGraphData {
    /// Drivable path length, m.
    pub path_length: f64,
    /// Planning horizon, s.
    pub total_time: f64,
    /// Ego state at t = 0.
    pub init_point: InitialState,
    /// Obstacle boundaries on the (t, s) plane.
    pub boundaries: Vec<StBoundary>,
    /// Road speed limit over station.
    pub speed_limit: SpeedLimit,
}

impl StGraphData {
    /// True when no obstacle boundary is present.
    #[must_use]
    pub fn is_boundaries_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}

/// Per-tick borrow bundle handed to the speed optimizer.
///
/// All fields are read-only for the duration of one `process` call; nothing
/// here survives across planning cycles.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedPlanningContext {
    /// Station-time graph data.
    pub st_graph: StGraphData,
    /// Road-level maximum speed, m/s.
    pub max_speed: f64,
    /// Preferred cruise speed, m/s.
    pub cruise_speed: f64,
    /// True when the destination is already reached this cycle.
    pub reached_destination: bool,
    /// Emergency-brake speed profile, used as a lower envelope when folding
    /// boundaries. May be empty.
    pub emergency_brake: SpeedData,
    /// Vehicle acceleration envelope.
    pub vehicle: VehicleLimits,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_empty_flag() {
        let data = StGraphData {
            path_length: 100.0,
            total_time: 7.0,
            init_point: InitialState::default(),
            boundaries: vec![],
            speed_limit: SpeedLimit::uniform(20.0, 100.0).unwrap(),
        };
        assert!(data.is_boundaries_empty());
    }

    #[test]
    fn vehicle_limits_default_signs() {
        let limits = VehicleLimits::default();
        assert!(limits.max_acceleration > 0.0);
        assert!(limits.max_deceleration < 0.0);
    }
}
