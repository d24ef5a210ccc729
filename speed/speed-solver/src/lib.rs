//! Piecewise-jerk optimization for 1-D speed and curve profiles.
//!
//! This crate carries the numerical core of the speed planner:
//!
//! # Quadratic programming
//!
//! - [`QpProblem`] / [`QpBackend`] - operator-splitting form and the backend
//!   seam consumers inject (mockable in tests)
//! - [`AdmmSolver`] / [`AdmmConfig`] - ADMM with active-set polishing
//! - [`PiecewiseJerkProblem`] - the 3N-variable piecewise-jerk formulation
//!
//! # Trajectories and curve fitting
//!
//! - [`PiecewiseJerkTrajectory1d`] - constant-jerk segments with closed-form
//!   derivative queries
//! - [`fit_curve`] / [`FitConfig`] - smoothing of sampled speed-limit and
//!   curvature curves
//!
//! # Nonlinear refinement
//!
//! - [`SpeedNlp`] - pointwise speed-limit and centripetal constraints plus
//!   soft station bounds
//! - [`SqpSolver`] / [`SqpConfig`] - sequential quadratic programming driver,
//!   serialized process-wide

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod nlp;
mod piecewise;
mod qp;
mod smoother;
mod trajectory;

pub use nlp::{NlpSolution, NlpWarmStart, SpeedNlp, SqpConfig, SqpSolver};
pub use piecewise::{PiecewiseJerkProblem, PiecewiseJerkSolution};
pub use qp::{AdmmConfig, AdmmSolver, QpBackend, QpProblem, QpSolution, QpWarmStart};
pub use smoother::{FitConfig, fit_curve};
pub use trajectory::{ConstantJerkSegment, PiecewiseJerkTrajectory1d};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        AdmmConfig, AdmmSolver, ConstantJerkSegment, FitConfig, NlpSolution, NlpWarmStart,
        PiecewiseJerkProblem, PiecewiseJerkSolution, PiecewiseJerkTrajectory1d, QpBackend,
        QpProblem, QpSolution, QpWarmStart, SpeedNlp, SqpConfig, SqpSolver, fit_curve,
    };
}
