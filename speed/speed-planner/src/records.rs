//! Debug records emitted alongside the optimized profile.

use speed_types::SpeedData;

/// Diagnostic by-products of one `process` call.
///
/// Everything here is an echo for tooling; the planning result itself is the
/// written-back [`SpeedData`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannerRecords {
    /// Speed plan produced by the convex warm-start stage.
    pub qp_plan: SpeedData,
    /// Speed plan produced by the nonlinear refinement, when it ran and
    /// converged.
    pub nlp_plan: Option<SpeedData>,
    /// Echo of the emergency-brake profile used as a lower envelope.
    pub emergency_profile: Option<SpeedData>,
    /// ST drive-boundary polyline: the lower edge forward in time, then the
    /// upper edge in reverse, forming a closed band.
    pub drive_boundary: Vec<(f64, f64)>,
    /// `(station, value)` samples of the smoothed speed limit at the raw
    /// curve's breakpoints.
    pub smoothed_speed_limit: Vec<(f64, f64)>,
}

/// Builds a speed plan from per-knot arrays, with jerk as the backward
/// difference of acceleration.
#[must_use]
pub(crate) fn speed_plan_from_arrays(
    distance: &[f64],
    velocity: &[f64],
    acceleration: &[f64],
    delta_t: f64,
) -> SpeedData {
    let mut plan = SpeedData::new();
    for i in 0..distance.len() {
        let jerk = if i == 0 {
            0.0
        } else {
            (acceleration[i] - acceleration[i - 1]) / delta_t
        };
        // Knot times strictly increase, so the push cannot fail.
        if plan
            .push_speed_point(
                distance[i],
                i as f64 * delta_t,
                velocity[i],
                acceleration[i],
                jerk,
            )
            .is_err()
        {
            break;
        }
    }
    plan
}

/// Builds the closed drive-boundary polyline from per-knot hard bounds.
#[must_use]
pub(crate) fn drive_boundary_polyline(bounds: &[(f64, f64)], delta_t: f64) -> Vec<(f64, f64)> {
    let mut polyline = Vec::with_capacity(2 * bounds.len());
    for (i, &(lower, _)) in bounds.iter().enumerate() {
        polyline.push((i as f64 * delta_t, lower));
    }
    for (i, &(_, upper)) in bounds.iter().enumerate().rev() {
        polyline.push((i as f64 * delta_t, upper));
    }
    polyline
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plan_jerk_is_backward_difference() {
        let plan = speed_plan_from_arrays(
            &[0.0, 0.1, 0.4],
            &[1.0, 2.0, 3.0],
            &[0.0, 1.0, 0.5],
            0.1,
        );
        assert_eq!(plan.len(), 3);
        assert_relative_eq!(plan.points()[0].j, 0.0);
        assert_relative_eq!(plan.points()[1].j, 10.0);
        assert_relative_eq!(plan.points()[2].j, -5.0);
    }

    #[test]
    fn polyline_closes_the_band() {
        let bounds = vec![(0.0, 10.0), (1.0, 11.0), (2.0, 12.0)];
        let polyline = drive_boundary_polyline(&bounds, 0.1);
        assert_eq!(polyline.len(), 6);
        // Lower edge forward.
        assert_relative_eq!(polyline[0].1, 0.0);
        assert_relative_eq!(polyline[2].1, 2.0);
        // Upper edge reversed.
        assert_relative_eq!(polyline[3].1, 12.0);
        assert_relative_eq!(polyline[5].1, 10.0);
        assert_relative_eq!(polyline[5].0, 0.0);
    }
}
