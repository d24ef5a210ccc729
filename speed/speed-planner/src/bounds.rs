//! Per-knot drivable station bounds folded from ST boundaries.
//!
//! For every time knot the builder intersects the drivable ranges the
//! boundaries leave open, honoring per-type semantics:
//!
//! - STOP caps the hard and soft ceilings at the boundary edge
//! - YIELD caps the hard ceiling at the edge minus the characteristic gap
//! - FOLLOW additionally lowers the soft ceiling by a speed-dependent
//!   follow distance read off the rough profile
//! - OVERTAKE raises the floor, with an extra soft clearance
//!
//! A collapsed pair is repaired by stepping away from the other bound, and
//! the emergency-brake envelope is never allowed to be blocked from above.

use speed_types::{BoundaryType, PlanningError, Result, SpeedData, StBoundary};

use crate::config::SpeedOptimizerConfig;

/// Step used to re-open a collapsed bound pair, m.
const BOUND_REPAIR_STEP: f64 = 0.1;

/// Soft clearance added above an overtaken boundary, m.
const OVERTAKE_SAFE_DISTANCE: f64 = 10.0;

/// Margin kept above the emergency-brake envelope, m.
const EMERGENCY_BRAKE_MARGIN: f64 = 0.2;

/// Cap on the speed-dependent part of the soft follow distance, m.
const FOLLOW_SOFT_DISTANCE_CAP: f64 = 7.0;

/// Half-width of the window around an end-interaction point, s.
const INTERACTION_TIME_WINDOW: f64 = 0.05;

/// Follow gap used by the single-tier strategy, m.
const SINGLE_TIER_FOLLOW_GAP: f64 = 8.0;

/// Hard and (optionally) soft per-knot station bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct SBounds {
    /// Inviolable per-knot `(lower, upper)` pairs.
    pub hard: Vec<(f64, f64)>,
    /// Slack-penalized per-knot pairs, present with two-tier construction.
    pub soft: Option<Vec<(f64, f64)>>,
}

/// Builds per-knot station bounds for `num_knots` knots spaced `delta_t`
/// apart.
///
/// The two-tier strategy runs when
/// `config.use_soft_bound_in_nonlinear_speed_opt` is set; the single-tier
/// strategy otherwise. Both share the output contract.
///
/// # Errors
///
/// Returns [`PlanningError::InfeasibleBounds`] when the rough profile cannot
/// be evaluated at a knot that has boundaries, or when a knot's hard pair
/// ends up inverted.
pub fn build_s_bounds(
    num_knots: usize,
    delta_t: f64,
    total_length: f64,
    boundaries: &[StBoundary],
    emergency_brake: &SpeedData,
    rough_profile: &SpeedData,
    config: &SpeedOptimizerConfig,
) -> Result<SBounds> {
    if config.use_soft_bound_in_nonlinear_speed_opt {
        build_two_tier(
            num_knots,
            delta_t,
            total_length,
            boundaries,
            emergency_brake,
            rough_profile,
            config,
        )
    } else {
        build_single_tier(num_knots, delta_t, total_length, boundaries)
    }
}

/// Effective hard gap of a YIELD or FOLLOW boundary at a time, taking a
/// near-coincident end-interaction override into account.
fn effective_gap(boundary: &StBoundary, curr_t: f64) -> f64 {
    let mut gap = boundary.characteristic_length();
    if let Some(poi) = boundary.end_interaction() {
        if (poi.time - curr_t).abs() < INTERACTION_TIME_WINDOW {
            gap = gap.max(poi.s_gap);
        }
    }
    gap
}

#[allow(clippy::too_many_lines)]
fn build_two_tier(
    num_knots: usize,
    delta_t: f64,
    total_length: f64,
    boundaries: &[StBoundary],
    emergency_brake: &SpeedData,
    rough_profile: &SpeedData,
    config: &SpeedOptimizerConfig,
) -> Result<SBounds> {
    let mut hard = Vec::with_capacity(num_knots);
    let mut soft = Vec::with_capacity(num_knots);

    for i in 0..num_knots {
        let curr_t = i as f64 * delta_t;
        let mut s_lower = 0.0f64;
        let mut s_upper = total_length;
        let mut s_soft_lower = 0.0f64;
        let mut s_soft_upper = total_length;

        let mut ebk_point = None;
        let mut dp_speed = 0.0;
        if !boundaries.is_empty() {
            ebk_point = emergency_brake.evaluate_by_time(curr_t);
            dp_speed = rough_profile
                .evaluate_by_time(curr_t)
                .ok_or_else(|| {
                    PlanningError::infeasible_bounds(format!(
                        "rough speed profile lookup failed at t = {curr_t:.2}"
                    ))
                })?
                .v;
        }

        for boundary in boundaries {
            let Some(range) = boundary.unblock_s_range(curr_t) else {
                continue;
            };
            match boundary.boundary_type() {
                BoundaryType::Stop => {
                    s_upper = s_upper.min(range.s_upper);
                    s_soft_upper = s_soft_upper.min(range.s_upper);
                }
                BoundaryType::Yield => {
                    let gap = effective_gap(boundary, curr_t);
                    s_upper = s_upper.min(range.s_upper - gap);
                    s_soft_upper = s_soft_upper.min(range.s_upper);
                }
                BoundaryType::Follow => {
                    let gap = effective_gap(boundary, curr_t);
                    s_upper = s_upper.min(range.s_upper - gap);
                    let soft_follow_distance = config.follow_min_distance
                        + (config.follow_time_buffer * dp_speed).min(FOLLOW_SOFT_DISTANCE_CAP);
                    s_soft_upper = s_soft_upper.min(range.s_upper - soft_follow_distance);
                }
                BoundaryType::Overtake => {
                    s_lower = s_lower.max(range.s_lower);
                    s_soft_lower = s_soft_lower.max(range.s_lower + OVERTAKE_SAFE_DISTANCE);
                }
            }

            // Re-open collapsed pairs: ceilings step up from the floor,
            // floors step down from the ceiling.
            if matches!(boundary.boundary_type(), BoundaryType::Overtake) {
                if s_upper <= s_lower {
                    s_lower = s_upper - BOUND_REPAIR_STEP;
                }
                if s_soft_upper <= s_soft_lower {
                    s_soft_lower = s_soft_upper - BOUND_REPAIR_STEP;
                }
            } else {
                if s_upper <= s_lower {
                    s_upper = s_lower + BOUND_REPAIR_STEP;
                }
                if s_soft_upper <= s_soft_lower {
                    s_soft_upper = s_soft_lower + BOUND_REPAIR_STEP;
                }
            }
        }

        // A leader decelerating harder than the emergency profile must not
        // squeeze the ceiling below the envelope.
        if let Some(ebk) = ebk_point {
            s_upper = s_upper.max(ebk.s + EMERGENCY_BRAKE_MARGIN);
        }

        if s_lower > s_upper {
            return Err(PlanningError::infeasible_bounds(format!(
                "station floor {s_lower:.2} above ceiling {s_upper:.2} at t = {curr_t:.2}"
            )));
        }

        hard.push((s_lower, s_upper));
        soft.push((s_soft_lower, s_soft_upper));
    }

    Ok(SBounds {
        hard,
        soft: Some(soft),
    })
}

fn build_single_tier(
    num_knots: usize,
    delta_t: f64,
    total_length: f64,
    boundaries: &[StBoundary],
) -> Result<SBounds> {
    let mut hard = Vec::with_capacity(num_knots);

    for i in 0..num_knots {
        let curr_t = i as f64 * delta_t;
        let mut s_lower = 0.0f64;
        let mut s_upper = total_length;

        for boundary in boundaries {
            let Some(range) = boundary.unblock_s_range(curr_t) else {
                continue;
            };
            match boundary.boundary_type() {
                BoundaryType::Stop | BoundaryType::Yield => {
                    s_upper = s_upper.min(range.s_upper);
                }
                BoundaryType::Follow => {
                    s_upper = s_upper.min(range.s_upper - SINGLE_TIER_FOLLOW_GAP);
                }
                BoundaryType::Overtake => {
                    s_lower = s_lower.max(range.s_lower);
                }
            }
        }

        if s_lower > s_upper {
            return Err(PlanningError::infeasible_bounds(format!(
                "station floor {s_lower:.2} above ceiling {s_upper:.2} at t = {curr_t:.2}"
            )));
        }
        hard.push((s_lower, s_upper));
    }

    Ok(SBounds { hard, soft: None })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use speed_types::{InteractionPoint, SpeedPoint};

    const N: usize = 71;
    const DT: f64 = 0.1;
    const LENGTH: f64 = 100.0;

    fn constant_profile(v: f64) -> SpeedData {
        let points = (0..N)
            .map(|i| SpeedPoint {
                s: v * i as f64 * DT,
                t: i as f64 * DT,
                v,
                a: 0.0,
                j: 0.0,
            })
            .collect();
        SpeedData::from_points(points).unwrap()
    }

    fn two_tier_config() -> SpeedOptimizerConfig {
        SpeedOptimizerConfig::default()
    }

    #[test]
    fn empty_boundaries_give_full_range() {
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[],
            &SpeedData::new(),
            &SpeedData::new(),
            &two_tier_config(),
        )
        .unwrap();
        assert_eq!(bounds.hard.len(), N);
        for &(lo, hi) in &bounds.hard {
            assert_relative_eq!(lo, 0.0);
            assert_relative_eq!(hi, LENGTH);
        }
        let soft = bounds.soft.unwrap();
        assert_eq!(soft.len(), N);
    }

    #[test]
    fn stop_caps_both_tiers() {
        let wall = StBoundary::stationary(BoundaryType::Stop, 30.0, 35.0, 0.0, 7.0, 0.0).unwrap();
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[wall],
            &SpeedData::new(),
            &constant_profile(5.0),
            &two_tier_config(),
        )
        .unwrap();
        for (i, &(_, hi)) in bounds.hard.iter().enumerate() {
            assert_relative_eq!(hi, 30.0, epsilon = 1e-9);
            assert_relative_eq!(bounds.soft.as_ref().unwrap()[i].1, 30.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn yield_gap_applies_to_hard_tier_only() {
        let boundary =
            StBoundary::stationary(BoundaryType::Yield, 40.0, 45.0, 0.0, 7.0, 4.0).unwrap();
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[boundary],
            &SpeedData::new(),
            &constant_profile(5.0),
            &two_tier_config(),
        )
        .unwrap();
        assert_relative_eq!(bounds.hard[10].1, 36.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.soft.as_ref().unwrap()[10].1, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn follow_soft_distance_tracks_rough_speed() {
        let leader =
            StBoundary::stationary(BoundaryType::Follow, 50.0, 55.0, 0.0, 7.0, 5.0).unwrap();
        let config = two_tier_config().with_follow_tuning(3.0, 2.5);
        // Rough speed 2 m/s: soft distance = 3 + min(7, 5) = 8.
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[leader],
            &SpeedData::new(),
            &constant_profile(2.0),
            &config,
        )
        .unwrap();
        assert_relative_eq!(bounds.hard[0].1, 45.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.soft.as_ref().unwrap()[0].1, 42.0, epsilon = 1e-9);

        // Fast rough speed saturates the cap: 3 + 7 = 10.
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[StBoundary::stationary(BoundaryType::Follow, 50.0, 55.0, 0.0, 7.0, 5.0).unwrap()],
            &SpeedData::new(),
            &constant_profile(10.0),
            &config,
        )
        .unwrap();
        assert_relative_eq!(bounds.soft.as_ref().unwrap()[0].1, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn overtake_raises_floor_with_soft_clearance() {
        let boundary =
            StBoundary::stationary(BoundaryType::Overtake, 10.0, 20.0, 0.0, 7.0, 0.0).unwrap();
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[boundary],
            &SpeedData::new(),
            &constant_profile(5.0),
            &two_tier_config(),
        )
        .unwrap();
        assert_relative_eq!(bounds.hard[5].0, 20.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.soft.as_ref().unwrap()[5].0, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn end_interaction_overrides_gap_in_window() {
        let boundary = StBoundary::stationary(BoundaryType::Yield, 40.0, 45.0, 0.0, 7.0, 2.0)
            .unwrap()
            .with_end_interaction(InteractionPoint {
                time: 3.0,
                s_gap: 6.0,
            });
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[boundary],
            &SpeedData::new(),
            &constant_profile(5.0),
            &two_tier_config(),
        )
        .unwrap();
        // Knot 30 sits exactly on the interaction time: gap 6 applies.
        assert_relative_eq!(bounds.hard[30].1, 34.0, epsilon = 1e-9);
        // One second away the characteristic gap applies.
        assert_relative_eq!(bounds.hard[40].1, 38.0, epsilon = 1e-9);
    }

    #[test]
    fn collapsed_ceiling_is_reopened() {
        // STOP at the origin collapses the ceiling onto the floor.
        let wall = StBoundary::stationary(BoundaryType::Stop, 0.0, 5.0, 0.0, 7.0, 0.0).unwrap();
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[wall],
            &SpeedData::new(),
            &constant_profile(5.0),
            &two_tier_config(),
        )
        .unwrap();
        for &(lo, hi) in &bounds.hard {
            assert!(hi > lo);
            assert_relative_eq!(hi, BOUND_REPAIR_STEP, epsilon = 1e-9);
        }
    }

    #[test]
    fn emergency_envelope_unblocks_ceiling() {
        let wall = StBoundary::stationary(BoundaryType::Stop, 10.0, 15.0, 0.0, 7.0, 0.0).unwrap();
        // Emergency profile still travelling past 10 m early on.
        let ebk = constant_profile(12.0);
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[wall],
            &ebk,
            &constant_profile(5.0),
            &two_tier_config(),
        )
        .unwrap();
        // At t = 1.0 the envelope sits at 12 m: ceiling must be 12.2, not 10.
        assert_relative_eq!(bounds.hard[10].1, 12.2, epsilon = 1e-9);
        // At t = 0 the envelope is at 0: wall governs.
        assert_relative_eq!(bounds.hard[0].1, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_rough_profile_sample_fails() {
        let wall = StBoundary::stationary(BoundaryType::Stop, 30.0, 35.0, 0.0, 7.0, 0.0).unwrap();
        // Profile covering only the first second.
        let short: Vec<SpeedPoint> = (0..=10)
            .map(|i| SpeedPoint {
                s: 0.0,
                t: i as f64 * DT,
                v: 5.0,
                a: 0.0,
                j: 0.0,
            })
            .collect();
        let short = SpeedData::from_points(short).unwrap();
        let result = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[wall],
            &SpeedData::new(),
            &short,
            &two_tier_config(),
        );
        assert!(matches!(result, Err(PlanningError::InfeasibleBounds(_))));
    }

    #[test]
    fn single_tier_strategy() {
        let config = two_tier_config().with_soft_bounds(false);
        let leader =
            StBoundary::stationary(BoundaryType::Follow, 50.0, 55.0, 0.0, 7.0, 5.0).unwrap();
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[leader],
            &SpeedData::new(),
            &SpeedData::new(),
            &config,
        )
        .unwrap();
        assert!(bounds.soft.is_none());
        assert_relative_eq!(bounds.hard[0].1, 42.0, epsilon = 1e-9);
    }

    #[test]
    fn boundary_outside_horizon_is_skipped() {
        let late = StBoundary::stationary(BoundaryType::Stop, 30.0, 35.0, 10.0, 12.0, 0.0).unwrap();
        let bounds = build_s_bounds(
            N,
            DT,
            LENGTH,
            &[late],
            &SpeedData::new(),
            &constant_profile(5.0),
            &two_tier_config(),
        )
        .unwrap();
        for &(_, hi) in &bounds.hard {
            assert_relative_eq!(hi, LENGTH);
        }
    }
}
