//! Configuration of the two-stage speed optimizer.

use speed_solver::{AdmmConfig, SqpConfig};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning knobs and feature switches for [`SpeedOptimizer`].
///
/// [`SpeedOptimizer`]: crate::SpeedOptimizer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedOptimizerConfig {
    /// Knot spacing over time, s.
    pub delta_t: f64,

    /// Weight on squared acceleration, shared by the QP and NLP stages.
    pub acc_weight: f64,

    /// Weight on squared jerk, shared by the QP and NLP stages.
    pub jerk_weight: f64,

    /// Weight on the squared centripetal acceleration cost in the NLP.
    pub lat_acc_weight: f64,

    /// Weight pulling the QP toward the rough speed profile's stations.
    pub ref_s_weight: f64,

    /// Weight pulling the NLP toward the cruise speed.
    pub ref_v_weight: f64,

    /// Weight of the uniform terminal-attraction reference used when the
    /// smoothed guide line is disabled.
    pub s_potential_weight: f64,

    /// Penalty weight on soft station-bound slack.
    pub soft_s_bound_weight: f64,

    /// Minimum distance held behind a followed vehicle, m.
    pub follow_min_distance: f64,

    /// Headway time feeding the speed-dependent soft follow distance, s.
    pub follow_time_buffer: f64,

    /// Lower jerk bound, m/s³ (sign-normalized to negative).
    pub longitudinal_jerk_lower_bound: f64,

    /// Upper jerk bound, m/s³.
    pub longitudinal_jerk_upper_bound: f64,

    /// Centripetal acceleration bound, m/s².
    pub lateral_acceleration_bound: f64,

    /// Build two-tier bounds and penalize soft violations in the NLP; with
    /// this off only the single-tier bounds are built.
    pub use_soft_bound_in_nonlinear_speed_opt: bool,

    /// Prime the NLP with the QP trajectory.
    pub use_warm_start: bool,

    /// Track the QP stations in the NLP; with this off a uniform reference
    /// at the path end attracts the trajectory instead.
    pub use_smoothed_guide_line: bool,

    /// Run the nonlinear refinement stage at all.
    pub enable_nonlinear_refinement: bool,

    /// Backend configuration for the speed QP and the smoothing fits.
    pub qp: AdmmConfig,

    /// Configuration for the nonlinear refinement driver.
    pub sqp: SqpConfig,
}

impl Default for SpeedOptimizerConfig {
    fn default() -> Self {
        Self {
            delta_t: 0.1,
            acc_weight: 500.0,
            jerk_weight: 600.0,
            lat_acc_weight: 1000.0,
            ref_s_weight: 10.0,
            ref_v_weight: 10.0,
            s_potential_weight: 0.05,
            soft_s_bound_weight: 1e5,
            follow_min_distance: 3.0,
            follow_time_buffer: 2.5,
            longitudinal_jerk_lower_bound: -4.0,
            longitudinal_jerk_upper_bound: 2.0,
            lateral_acceleration_bound: 4.0,
            use_soft_bound_in_nonlinear_speed_opt: true,
            use_warm_start: true,
            use_smoothed_guide_line: true,
            enable_nonlinear_refinement: true,
            qp: AdmmConfig::default(),
            sqp: SqpConfig::default(),
        }
    }
}

impl SpeedOptimizerConfig {
    /// Enable or disable the nonlinear refinement stage.
    #[must_use]
    pub const fn with_nonlinear_refinement(mut self, enabled: bool) -> Self {
        self.enable_nonlinear_refinement = enabled;
        self
    }

    /// Enable or disable two-tier soft bounds.
    #[must_use]
    pub const fn with_soft_bounds(mut self, enabled: bool) -> Self {
        self.use_soft_bound_in_nonlinear_speed_opt = enabled;
        self
    }

    /// Set the centripetal acceleration bound.
    #[must_use]
    pub const fn with_lateral_acceleration_bound(mut self, bound: f64) -> Self {
        self.lateral_acceleration_bound = bound;
        self
    }

    /// Set the follow gap tuning.
    #[must_use]
    pub const fn with_follow_tuning(mut self, min_distance: f64, time_buffer: f64) -> Self {
        self.follow_min_distance = min_distance;
        self.follow_time_buffer = time_buffer;
        self
    }
}
