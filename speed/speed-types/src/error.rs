//! Error types for speed planning.

use thiserror::Error;

/// Convenience alias for planning results.
pub type Result<T> = std::result::Result<T, PlanningError>;

/// Errors surfaced by the speed planning pipeline.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// Caller handed in data the planner cannot work with (empty path,
    /// mismatched vector lengths, negative weights).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Per-knot station bounds collapsed (lower above upper), or the rough
    /// speed profile could not be evaluated while building soft bounds.
    #[error("infeasible station bounds: {0}")]
    InfeasibleBounds(String),

    /// The initial speed exceeds the speed limit at the start station.
    /// Non-fatal: the nonlinear stage is skipped and the QP result stands.
    #[error("initial speed {speed} exceeds speed limit {limit}")]
    InitialSpeedOverLimit {
        /// Initial longitudinal speed, m/s.
        speed: f64,
        /// Speed limit at the initial station, m/s.
        limit: f64,
    },

    /// The quadratic program did not converge.
    #[error("quadratic program infeasible: {0}")]
    QpInfeasible(String),

    /// The nonlinear refinement did not converge. Non-fatal for the overall
    /// result: the QP trajectory is kept.
    #[error("nonlinear refinement failed: {0}")]
    NlpInfeasible(String),

    /// A curve-smoothing sub-problem (speed limit or curvature fit) did not
    /// converge; the nonlinear stage is skipped.
    #[error("curve smoothing failed: {0}")]
    SmoothingFailed(String),
}

impl PlanningError {
    /// Creates an invalid-input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an infeasible-bounds error.
    #[must_use]
    pub fn infeasible_bounds(msg: impl Into<String>) -> Self {
        Self::InfeasibleBounds(msg.into())
    }

    /// Creates an initial-speed-over-limit error.
    #[must_use]
    pub const fn speed_over_limit(speed: f64, limit: f64) -> Self {
        Self::InitialSpeedOverLimit { speed, limit }
    }

    /// True for failure kinds that leave the QP result usable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InitialSpeedOverLimit { .. } | Self::NlpInfeasible(_) | Self::SmoothingFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PlanningError::invalid_input("empty path");
        let msg = format!("{err}");
        assert!(msg.contains("invalid input"));
        assert!(msg.contains("empty path"));
    }

    #[test]
    fn error_speed_over_limit() {
        let err = PlanningError::speed_over_limit(12.0, 10.0);
        let msg = format!("{err}");
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn recoverable_kinds() {
        assert!(PlanningError::speed_over_limit(1.0, 0.5).is_recoverable());
        assert!(PlanningError::NlpInfeasible("max iterations".into()).is_recoverable());
        assert!(PlanningError::SmoothingFailed("kappa fit".into()).is_recoverable());
        assert!(!PlanningError::QpInfeasible("max iterations".into()).is_recoverable());
        assert!(!PlanningError::infeasible_bounds("knot 3").is_recoverable());
    }
}
