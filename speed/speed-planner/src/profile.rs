//! Speed-profile helpers: tail padding and rough-profile generation.

use speed_types::{PlanningError, Result, SpeedData};

/// Pads a profile with stationary points until it covers `total_time`.
///
/// The optimizer stops emitting knots once the vehicle has halted; downstream
/// consumers still expect samples across the whole horizon.
///
/// # Errors
///
/// Returns [`PlanningError::InvalidInput`] for a non-positive `delta_t`.
pub fn fill_enough_speed_points(
    speed_data: &mut SpeedData,
    total_time: f64,
    delta_t: f64,
) -> Result<()> {
    if delta_t <= 0.0 {
        return Err(PlanningError::invalid_input(format!(
            "padding step must be positive, got {delta_t}"
        )));
    }
    let Some(last) = speed_data.last().copied() else {
        return Ok(());
    };
    let mut t = last.t + delta_t;
    while t < total_time + delta_t * 0.5 {
        speed_data.push_speed_point(last.s, t, 0.0, 0.0, 0.0)?;
        t += delta_t;
    }
    Ok(())
}

/// Generates a constant-acceleration profile capped at a target speed.
///
/// Stands in for the rough dynamic-programming profile in tests and
/// fallbacks: speed ramps from `v0` toward `v_target` at `accel`, station is
/// integrated trapezoidally, and speed never drops below zero.
///
/// # Errors
///
/// Returns [`PlanningError::InvalidInput`] for a non-positive `delta_t` or a
/// negative horizon.
pub fn constant_acceleration_profile(
    v0: f64,
    accel: f64,
    v_target: f64,
    total_time: f64,
    delta_t: f64,
) -> Result<SpeedData> {
    if delta_t <= 0.0 || total_time < 0.0 {
        return Err(PlanningError::invalid_input(format!(
            "profile horizon {total_time} / step {delta_t} is degenerate"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_points = (total_time / delta_t).round() as usize + 1;

    let mut data = SpeedData::new();
    let mut s = 0.0;
    let mut prev_v = v0.max(0.0);
    for i in 0..num_points {
        let t = i as f64 * delta_t;
        let mut v = accel.mul_add(t, v0);
        v = if accel >= 0.0 {
            v.min(v_target)
        } else {
            v.max(v_target)
        };
        v = v.max(0.0);
        if i > 0 {
            s += 0.5 * (prev_v + v) * delta_t;
        }
        let a = if (v - v_target).abs() < f64::EPSILON || v == 0.0 {
            0.0
        } else {
            accel
        };
        data.push_speed_point(s, t, v, a, 0.0)?;
        prev_v = v;
    }
    Ok(data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn padding_extends_to_horizon() {
        let mut data = SpeedData::new();
        data.push_speed_point(0.0, 0.0, 2.0, 0.0, 0.0).unwrap();
        data.push_speed_point(2.0, 1.0, 0.0, 0.0, 0.0).unwrap();

        fill_enough_speed_points(&mut data, 3.0, 0.5).unwrap();
        let last = data.last().unwrap();
        assert_relative_eq!(last.t, 3.0, epsilon = 1e-9);
        assert_relative_eq!(last.s, 2.0);
        assert_relative_eq!(last.v, 0.0);
    }

    #[test]
    fn padding_is_noop_when_covered() {
        let mut data = SpeedData::new();
        data.push_speed_point(0.0, 0.0, 1.0, 0.0, 0.0).unwrap();
        data.push_speed_point(5.0, 5.0, 1.0, 0.0, 0.0).unwrap();

        fill_enough_speed_points(&mut data, 5.0, 0.1).unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn padding_empty_profile_is_noop() {
        let mut data = SpeedData::new();
        fill_enough_speed_points(&mut data, 5.0, 0.1).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn ramp_profile_caps_at_target() {
        let data = constant_acceleration_profile(0.0, 2.0, 10.0, 7.0, 0.1).unwrap();
        assert_eq!(data.len(), 71);
        let mid = data.evaluate_by_time(2.0).unwrap();
        assert_relative_eq!(mid.v, 4.0, epsilon = 1e-9);
        let late = data.evaluate_by_time(6.0).unwrap();
        assert_relative_eq!(late.v, 10.0, epsilon = 1e-9);
        // Station is monotone.
        for pair in data.points().windows(2) {
            assert!(pair[1].s >= pair[0].s);
        }
    }

    #[test]
    fn braking_profile_stops_at_zero() {
        let data = constant_acceleration_profile(5.0, -2.0, 0.0, 7.0, 0.1).unwrap();
        let late = data.evaluate_by_time(5.0).unwrap();
        assert_relative_eq!(late.v, 0.0, epsilon = 1e-9);
        assert!(late.s > 0.0);
    }
}
