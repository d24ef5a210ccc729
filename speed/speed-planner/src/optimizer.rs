//! Two-stage speed optimizer.
//!
//! One `process` call runs the full pipeline for a planning tick:
//!
//! ```text
//! validate → bounds → speed QP → [curvature fit; speed-limit fit; NLP] → emit
//! ```
//!
//! The QP produces a kinematically feasible profile inside the hard station
//! bounds; the nonlinear stage refines it under the station-dependent speed
//! limit and the centripetal acceleration bound. Every nonlinear-stage
//! failure is non-fatal: the QP profile is what gets emitted then.

use speed_solver::{
    AdmmSolver, FitConfig, NlpWarmStart, PiecewiseJerkProblem, PiecewiseJerkTrajectory1d,
    SpeedNlp, SqpSolver, fit_curve,
};
use speed_types::{
    DiscretizedPath, PlanningError, Result, SpeedData, SpeedLimit, SpeedPlanningContext,
};
use tracing::{debug, info, warn};

use crate::bounds::{SBounds, build_s_bounds};
use crate::config::SpeedOptimizerConfig;
use crate::profile::fill_enough_speed_points;
use crate::records::{PlannerRecords, drive_boundary_polyline, speed_plan_from_arrays};

/// Tolerance on the initial-speed feasibility check, m/s.
const SPEED_LIMIT_EPSILON: f64 = 1e-6;

/// Weight on the QP guide line when smoothed guidance is enabled.
const GUIDE_LINE_REF_WEIGHT: f64 = 0.05;

/// Headroom added to the QP speed ceiling so an ego already above the road
/// maximum still has a feasible start, m/s.
const QP_SPEED_BOUND_RELAXATION: f64 = 0.1;

/// Headroom added to the NLP speed ceiling, m/s.
const NLP_SPEED_BOUND_RELAXATION: f64 = 1.0;

/// Number of samples fed to the speed-limit smoothing fit.
const SPEED_LIMIT_SAMPLES: usize = 100;

/// Per-cycle problem dimensions and limits derived from the inputs.
#[derive(Debug, Clone)]
struct ProblemSetup {
    num_knots: usize,
    total_length: f64,
    total_time: f64,
    init_state: [f64; 3],
    qp_speed_bound: f64,
    nlp_speed_bound: f64,
    ddx_bounds: (f64, f64),
    dddx_bound: (f64, f64),
    bounds: SBounds,
}

/// The two-stage piecewise-jerk speed optimizer.
#[derive(Debug, Clone, Default)]
pub struct SpeedOptimizer {
    config: SpeedOptimizerConfig,
}

impl SpeedOptimizer {
    /// Creates an optimizer with the given configuration.
    #[must_use]
    pub const fn new(config: SpeedOptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimizer configuration.
    #[must_use]
    pub const fn config(&self) -> &SpeedOptimizerConfig {
        &self.config
    }

    /// Runs one planning cycle.
    ///
    /// `speed_data` carries the rough speed profile in and the optimized
    /// profile out; it is cleared on fatal failure.
    ///
    /// # Errors
    ///
    /// - [`PlanningError::InvalidInput`] on an empty path or rough profile
    /// - [`PlanningError::InfeasibleBounds`] when the station bounds collapse
    /// - [`PlanningError::QpInfeasible`] when the convex stage fails
    ///
    /// Nonlinear-stage failures are logged and absorbed; the QP result is
    /// emitted in that case.
    pub fn process(
        &self,
        path: &DiscretizedPath,
        context: &SpeedPlanningContext,
        speed_data: &mut SpeedData,
    ) -> Result<PlannerRecords> {
        if path.is_empty() {
            return Err(PlanningError::invalid_input("empty path data"));
        }
        if context.reached_destination {
            info!("destination reached, skipping speed optimization");
            return Ok(PlannerRecords::default());
        }
        if speed_data.is_empty() {
            return Err(PlanningError::invalid_input("empty rough speed profile"));
        }

        let setup = match self.set_up_states_and_bounds(context, speed_data) {
            Ok(setup) => setup,
            Err(err) => {
                speed_data.clear();
                return Err(err);
            }
        };
        let delta_t = self.config.delta_t;

        let (mut distance, mut velocity, mut acceleration) =
            match self.optimize_by_qp(&setup, speed_data) {
                Ok(arrays) => arrays,
                Err(err) => {
                    speed_data.clear();
                    return Err(err);
                }
            };

        let mut records = PlannerRecords {
            qp_plan: speed_plan_from_arrays(&distance, &velocity, &acceleration, delta_t),
            nlp_plan: None,
            emergency_profile: (!context.emergency_brake.is_empty())
                .then(|| context.emergency_brake.clone()),
            drive_boundary: drive_boundary_polyline(&setup.bounds.hard, delta_t),
            smoothed_speed_limit: Vec::new(),
        };

        if self.config.enable_nonlinear_refinement {
            match self.refine_by_nlp(
                path,
                context,
                &setup,
                &mut distance,
                &mut velocity,
                &mut acceleration,
                &mut records,
            ) {
                Ok(()) => debug!("nonlinear refinement accepted"),
                Err(err) => warn!(%err, "nonlinear refinement skipped, keeping qp result"),
            }
        }

        speed_data.clear();
        speed_data.push_speed_point(distance[0], 0.0, velocity[0], acceleration[0], 0.0)?;
        for i in 1..setup.num_knots {
            // Avoid the very last points when already stopped.
            if velocity[i] < 0.0 {
                break;
            }
            speed_data.push_speed_point(
                distance[i],
                delta_t * i as f64,
                velocity[i],
                acceleration[i],
                (acceleration[i] - acceleration[i - 1]) / delta_t,
            )?;
        }
        fill_enough_speed_points(speed_data, setup.total_time, delta_t)?;

        Ok(records)
    }

    fn set_up_states_and_bounds(
        &self,
        context: &SpeedPlanningContext,
        rough_profile: &SpeedData,
    ) -> Result<ProblemSetup> {
        let st = &context.st_graph;
        let cfg = &self.config;

        if st.total_time <= 0.0 || st.path_length <= 0.0 {
            return Err(PlanningError::invalid_input(format!(
                "degenerate horizon: length {} over {} s",
                st.path_length, st.total_time
            )));
        }
        if context.vehicle.max_acceleration <= 0.0 {
            return Err(PlanningError::invalid_input(
                "non-positive maximum acceleration",
            ));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let num_knots = (st.total_time / cfg.delta_t).round() as usize + 1;
        if num_knots < 2 {
            return Err(PlanningError::invalid_input(
                "horizon shorter than one knot step",
            ));
        }

        let init_state = [0.0, st.init_point.v, st.init_point.a];
        let bounds = build_s_bounds(
            num_knots,
            cfg.delta_t,
            st.path_length,
            &st.boundaries,
            &context.emergency_brake,
            rough_profile,
            cfg,
        )?;

        Ok(ProblemSetup {
            num_knots,
            total_length: st.path_length,
            total_time: st.total_time,
            init_state,
            qp_speed_bound: context.max_speed.max(init_state[1] + QP_SPEED_BOUND_RELAXATION),
            nlp_speed_bound: context.max_speed.max(init_state[1] + NLP_SPEED_BOUND_RELAXATION),
            ddx_bounds: (
                -context.vehicle.max_deceleration.abs(),
                context.vehicle.max_acceleration,
            ),
            dddx_bound: (
                -cfg.longitudinal_jerk_lower_bound.abs(),
                cfg.longitudinal_jerk_upper_bound,
            ),
            bounds,
        })
    }

    /// Convex warm-start stage: track the rough profile inside the hard
    /// bounds.
    fn optimize_by_qp(
        &self,
        setup: &ProblemSetup,
        rough_profile: &SpeedData,
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let cfg = &self.config;
        let mut problem =
            PiecewiseJerkProblem::new(setup.num_knots, cfg.delta_t, setup.init_state)?;
        problem.set_dx_bounds(0.0, setup.qp_speed_bound);
        problem.set_ddx_bounds(setup.ddx_bounds.0, setup.ddx_bounds.1);
        problem.set_dddx_bound(setup.dddx_bound.0, setup.dddx_bound.1);
        problem.set_x_bounds(setup.bounds.hard.clone())?;
        problem.set_weights(0.0, 0.0, cfg.acc_weight, cfg.jerk_weight)?;

        let fallback_s = rough_profile.last().map_or(0.0, |p| p.s);
        let x_ref: Vec<f64> = (0..setup.num_knots)
            .map(|i| {
                rough_profile
                    .evaluate_by_time(i as f64 * cfg.delta_t)
                    .map_or(fallback_s, |p| p.s)
            })
            .collect();
        problem.set_x_ref(cfg.ref_s_weight, x_ref)?;

        let solution = problem.solve(&AdmmSolver::new(cfg.qp))?;
        debug!(
            iterations = solution.raw().iterations,
            "speed qp converged"
        );
        Ok((
            solution.x().to_vec(),
            solution.dx().to_vec(),
            solution.ddx().to_vec(),
        ))
    }

    /// A naive check on the first point of the speed limit.
    fn check_speed_limit_feasibility(
        &self,
        context: &SpeedPlanningContext,
        init_speed: f64,
    ) -> Result<()> {
        let init_limit = context.st_graph.speed_limit.speed_limit_by_s(0.0);
        if init_limit + SPEED_LIMIT_EPSILON < init_speed {
            return Err(PlanningError::speed_over_limit(init_speed, init_limit));
        }
        Ok(())
    }

    fn smooth_speed_limit(&self, speed_limit: &SpeedLimit) -> Result<PiecewiseJerkTrajectory1d> {
        let fit = FitConfig::speed_limit();
        let samples: Vec<f64> = (0..SPEED_LIMIT_SAMPLES)
            .map(|k| speed_limit.speed_limit_by_s(k as f64 * fit.delta))
            .collect();
        let init_state = [samples[0], 0.0, 0.0];
        fit_curve(&samples, init_state, &fit, &AdmmSolver::new(self.config.qp))
    }

    fn smooth_path_curvature(&self, path: &DiscretizedPath) -> Result<PiecewiseJerkTrajectory1d> {
        let fit = FitConfig::path_curvature();
        let mut samples = Vec::new();
        let mut path_s = path.front().s;
        let end_s = path.back().s + fit.delta;
        while path_s < end_s {
            samples.push(path.evaluate(path_s).kappa);
            path_s += fit.delta;
        }
        let front = path.front();
        let init_state = [front.kappa, front.dkappa, front.ddkappa];
        fit_curve(&samples, init_state, &fit, &AdmmSolver::new(self.config.qp))
    }

    /// Nonlinear refinement stage. Any error here leaves the QP arrays
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    fn refine_by_nlp(
        &self,
        path: &DiscretizedPath,
        context: &SpeedPlanningContext,
        setup: &ProblemSetup,
        distance: &mut Vec<f64>,
        velocity: &mut Vec<f64>,
        acceleration: &mut Vec<f64>,
        records: &mut PlannerRecords,
    ) -> Result<()> {
        self.check_speed_limit_feasibility(context, setup.init_state[1])?;

        let curvature = self.smooth_path_curvature(path)?;
        let speed_limit_curve = self.smooth_speed_limit(&context.st_graph.speed_limit)?;
        records.smoothed_speed_limit = context
            .st_graph
            .speed_limit
            .points()
            .iter()
            .map(|&(s, _)| (s, speed_limit_curve.evaluate(0, s)))
            .collect();

        let cfg = &self.config;
        let mut nlp = SpeedNlp::new(
            setup.num_knots,
            cfg.delta_t,
            setup.init_state,
            setup.bounds.hard.clone(),
            speed_limit_curve,
            curvature,
        )?;
        nlp.set_dx_max(setup.nlp_speed_bound);
        nlp.set_ddx_bounds(setup.ddx_bounds.0, setup.ddx_bounds.1);
        nlp.set_dddx_bound(setup.dddx_bound.0, setup.dddx_bound.1);
        nlp.set_lat_acc_bound(cfg.lateral_acceleration_bound);

        if cfg.use_smoothed_guide_line {
            nlp.set_reference_spatial(GUIDE_LINE_REF_WEIGHT, distance.clone())?;
        } else {
            nlp.set_reference_spatial(
                cfg.s_potential_weight,
                vec![setup.total_length; setup.num_knots],
            )?;
        }
        if cfg.use_soft_bound_in_nonlinear_speed_opt {
            if let Some(soft) = &setup.bounds.soft {
                nlp.set_soft_bounds(cfg.soft_s_bound_weight, soft.clone())?;
            }
        }
        nlp.set_reference_speed(cfg.ref_v_weight, context.cruise_speed);
        nlp.set_accel_weight(cfg.acc_weight);
        nlp.set_jerk_weight(cfg.jerk_weight);
        nlp.set_lat_acc_weight(cfg.lat_acc_weight);

        let warm_start = if cfg.use_warm_start {
            Some(NlpWarmStart::new(
                distance.clone(),
                velocity.clone(),
                acceleration.clone(),
            )?)
        } else {
            None
        };

        let solution = SqpSolver::new(cfg.sqp).solve(&nlp, warm_start.as_ref())?;
        debug!(
            major_iterations = solution.major_iterations,
            violation = solution.constraint_violation,
            "nonlinear refinement converged"
        );

        *distance = solution.x().to_vec();
        *velocity = solution.dx().to_vec();
        *acceleration = solution.ddx().to_vec();
        records.nlp_plan = Some(speed_plan_from_arrays(
            distance,
            velocity,
            acceleration,
            cfg.delta_t,
        ));
        Ok(())
    }
}
