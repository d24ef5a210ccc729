//! Curve fitting through piecewise-jerk quadratic programming.
//!
//! Fits a smooth piecewise-jerk trajectory to a sampled curve over one
//! independent variable. Two fits run per planning cycle: the road speed
//! limit over station and the path curvature over station, both consumed by
//! the nonlinear refinement stage as order-0/order-1 queries.

use speed_types::{PlanningError, Result};

use crate::piecewise::PiecewiseJerkProblem;
use crate::qp::QpBackend;
use crate::trajectory::PiecewiseJerkTrajectory1d;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of one curve fit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitConfig {
    /// Sample spacing along the independent variable.
    pub delta: f64,
    /// Bounds on the fitted value.
    pub x_bounds: (f64, f64),
    /// Bounds on the fitted first derivative.
    pub dx_bounds: (f64, f64),
    /// Bounds on the fitted second derivative.
    pub ddx_bounds: (f64, f64),
    /// Bounds on the fitted third derivative.
    pub dddx_bound: (f64, f64),
    /// Weights on value, first, second, and third derivative.
    pub weights: [f64; 4],
    /// Weight pulling the fit toward the samples.
    pub ref_weight: f64,
}

impl FitConfig {
    /// Fit parameters for smoothing a road speed limit over station.
    #[must_use]
    pub const fn speed_limit() -> Self {
        Self {
            delta: 2.0,
            x_bounds: (0.0, 50.0),
            dx_bounds: (-10.0, 10.0),
            ddx_bounds: (-10.0, 10.0),
            dddx_bound: (-10.0, 10.0),
            weights: [0.0, 10.0, 10.0, 10.0],
            ref_weight: 10.0,
        }
    }

    /// Fit parameters for smoothing path curvature over station.
    #[must_use]
    pub const fn path_curvature() -> Self {
        Self {
            delta: 0.5,
            x_bounds: (-1.0, 1.0),
            dx_bounds: (-10.0, 10.0),
            ddx_bounds: (-10.0, 10.0),
            dddx_bound: (-10.0, 10.0),
            weights: [0.0, 10.0, 10.0, 10.0],
            ref_weight: 10.0,
        }
    }
}

/// Fits a piecewise-jerk trajectory to `samples` spaced `config.delta` apart,
/// starting from `init_state` = (x₀, ẋ₀, ẍ₀).
///
/// The returned trajectory has one constant-jerk segment per sample interval.
///
/// # Errors
///
/// Returns [`PlanningError::InvalidInput`] on fewer than two samples and
/// [`PlanningError::SmoothingFailed`] when the fitting QP does not converge.
pub fn fit_curve(
    samples: &[f64],
    init_state: [f64; 3],
    config: &FitConfig,
    backend: &impl QpBackend,
) -> Result<PiecewiseJerkTrajectory1d> {
    if samples.len() < 2 {
        return Err(PlanningError::invalid_input(format!(
            "curve fit needs at least 2 samples, got {}",
            samples.len()
        )));
    }

    let mut problem = PiecewiseJerkProblem::new(samples.len(), config.delta, init_state)?;
    problem.set_uniform_x_bounds(config.x_bounds.0, config.x_bounds.1);
    problem.set_dx_bounds(config.dx_bounds.0, config.dx_bounds.1);
    problem.set_ddx_bounds(config.ddx_bounds.0, config.ddx_bounds.1);
    problem.set_dddx_bound(config.dddx_bound.0, config.dddx_bound.1);
    problem.set_weights(
        config.weights[0],
        config.weights[1],
        config.weights[2],
        config.weights[3],
    )?;
    problem.set_x_ref(config.ref_weight, samples.to_vec())?;

    let solution = problem.solve(backend).map_err(|err| match err {
        PlanningError::QpInfeasible(msg) => PlanningError::SmoothingFailed(msg),
        other => other,
    })?;

    let mut trajectory = PiecewiseJerkTrajectory1d::new(
        solution.x()[0],
        solution.dx()[0],
        solution.ddx()[0],
    );
    for i in 1..solution.ddx().len() {
        let jerk = (solution.ddx()[i] - solution.ddx()[i - 1]) / config.delta;
        trajectory.append_segment(jerk, config.delta)?;
    }
    Ok(trajectory)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::qp::AdmmSolver;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_short_sample_lists() {
        let solver = AdmmSolver::default_solver();
        let config = FitConfig::speed_limit();
        assert!(fit_curve(&[1.0], [1.0, 0.0, 0.0], &config, &solver).is_err());
    }

    #[test]
    fn constant_samples_are_reproduced() {
        let solver = AdmmSolver::default_solver();
        let config = FitConfig::speed_limit();
        let samples = vec![12.0; 50];
        let trajectory = fit_curve(&samples, [12.0, 0.0, 0.0], &config, &solver).unwrap();

        for i in 0..50 {
            let s = i as f64 * config.delta;
            assert_relative_eq!(trajectory.evaluate(0, s), 12.0, epsilon = 1e-2);
        }
        assert_relative_eq!(trajectory.param_length(), 49.0 * config.delta);
    }

    #[test]
    fn step_input_is_smoothed_monotonically_bounded() {
        // A limit drop from 15 to 8: the fit must stay within the sample
        // range and end near the lower level.
        let solver = AdmmSolver::default_solver();
        let config = FitConfig::speed_limit();
        let samples: Vec<f64> = (0..60).map(|i| if i < 30 { 15.0 } else { 8.0 }).collect();
        let trajectory = fit_curve(&samples, [15.0, 0.0, 0.0], &config, &solver).unwrap();

        for i in 0..60 {
            let v = trajectory.evaluate(0, i as f64 * config.delta);
            assert!(v >= 6.0 && v <= 16.0, "fit value {v} escaped sample range");
        }
        let tail = trajectory.evaluate(0, 59.0 * config.delta);
        assert_relative_eq!(tail, 8.0, epsilon = 1.0);
    }

    #[test]
    fn curvature_fit_respects_bounds() {
        let solver = AdmmSolver::default_solver();
        let config = FitConfig::path_curvature();
        // Curvature bump of 0.05 over the middle third.
        let samples: Vec<f64> = (0..120)
            .map(|i| if (40..80).contains(&i) { 0.05 } else { 0.0 })
            .collect();
        let trajectory = fit_curve(&samples, [0.0, 0.0, 0.0], &config, &solver).unwrap();

        let mid = trajectory.evaluate(0, 60.0 * config.delta);
        assert_relative_eq!(mid, 0.05, epsilon = 1e-2);
        for i in 0..120 {
            let kappa = trajectory.evaluate(0, i as f64 * config.delta);
            assert!(kappa >= -1.0 - 1e-6 && kappa <= 1.0 + 1e-6);
        }
    }
}
