//! Data model for longitudinal speed planning.
//!
//! This crate holds the value types shared across the speed planning stack:
//!
//! # Paths
//!
//! - [`PathPoint`] - one point of a geometric path with curvature derivatives
//! - [`DiscretizedPath`] - ordered points with station-based interpolation
//!
//! # Speed profiles
//!
//! - [`SpeedPoint`] / [`SpeedData`] - time-indexed (s, v, a, j) sequences
//! - [`SpeedLimit`] - piecewise-constant limit over station
//!
//! # Station-time obstacles
//!
//! - [`StBoundary`] - typed forbidden region over (t, s)
//! - [`BoundaryType`] - STOP / YIELD / FOLLOW / OVERTAKE semantics
//! - [`StGraphData`] / [`SpeedPlanningContext`] - per-tick inputs
//!
//! # Errors
//!
//! - [`PlanningError`] - every failure kind of the planning pipeline
//!
//! All types are plain owned values; `serde` derives are available behind the
//! `serde` feature.

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod boundary;
mod error;
mod path;
mod speed_data;
mod speed_limit;
mod st_graph;

pub use boundary::{BoundaryType, InteractionPoint, StBoundary, StBoundaryPoint, UnblockRange};
pub use error::{PlanningError, Result};
pub use path::{DiscretizedPath, PathPoint};
pub use speed_data::{SpeedData, SpeedPoint};
pub use speed_limit::SpeedLimit;
pub use st_graph::{InitialState, SpeedPlanningContext, StGraphData, VehicleLimits};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        BoundaryType, DiscretizedPath, InitialState, InteractionPoint, PathPoint, PlanningError,
        Result, SpeedData, SpeedLimit, SpeedPlanningContext, SpeedPoint, StBoundary,
        StBoundaryPoint, StGraphData, UnblockRange, VehicleLimits,
    };
}
