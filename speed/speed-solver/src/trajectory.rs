//! Piecewise constant-jerk trajectories over one independent variable.

use speed_types::{PlanningError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum admissible segment duration.
const MIN_SEGMENT_DURATION: f64 = 1e-9;

/// One constant-jerk segment with its start state.
///
/// Over the segment's local parameter `t ∈ [0, duration]`:
///
/// ```text
/// x(t) = x₀ + ẋ₀ t + 1/2 ẍ₀ t² + 1/6 j t³
/// ẋ(t) = ẋ₀ + ẍ₀ t + 1/2 j t²
/// ẍ(t) = ẍ₀ + j t
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstantJerkSegment {
    start_position: f64,
    start_velocity: f64,
    start_acceleration: f64,
    jerk: f64,
    duration: f64,
}

impl ConstantJerkSegment {
    /// Position at the segment start.
    #[must_use]
    pub const fn start_position(&self) -> f64 {
        self.start_position
    }

    /// Jerk over the segment.
    #[must_use]
    pub const fn jerk(&self) -> f64 {
        self.jerk
    }

    /// Segment duration.
    #[must_use]
    pub const fn duration(&self) -> f64 {
        self.duration
    }

    /// Evaluates the requested derivative order at a local parameter.
    /// Orders above 3 are identically zero for a cubic.
    #[must_use]
    pub fn evaluate(&self, order: u32, t: f64) -> f64 {
        match order {
            0 => {
                let quad = 0.5 * self.start_acceleration + self.jerk * t / 6.0;
                (quad * t + self.start_velocity).mul_add(t, self.start_position)
            }
            1 => (0.5 * self.jerk * t + self.start_acceleration)
                .mul_add(t, self.start_velocity),
            2 => self.jerk.mul_add(t, self.start_acceleration),
            3 => self.jerk,
            _ => 0.0,
        }
    }

    fn end_state(&self) -> (f64, f64, f64) {
        (
            self.evaluate(0, self.duration),
            self.evaluate(1, self.duration),
            self.evaluate(2, self.duration),
        )
    }
}

/// An ordered sequence of constant-jerk segments, continuous through the
/// second derivative at every joint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PiecewiseJerkTrajectory1d {
    segments: Vec<ConstantJerkSegment>,
    head: (f64, f64, f64),
    last_state: (f64, f64, f64),
    param_length: f64,
}

impl PiecewiseJerkTrajectory1d {
    /// Creates a trajectory with only a head state and no segments.
    #[must_use]
    pub const fn new(position: f64, velocity: f64, acceleration: f64) -> Self {
        Self {
            segments: Vec::new(),
            head: (position, velocity, acceleration),
            last_state: (position, velocity, acceleration),
            param_length: 0.0,
        }
    }

    /// Appends one constant-jerk segment continuing from the current end
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] on a non-positive duration.
    pub fn append_segment(&mut self, jerk: f64, duration: f64) -> Result<()> {
        if duration < MIN_SEGMENT_DURATION {
            return Err(PlanningError::invalid_input(format!(
                "segment duration {duration} is not positive"
            )));
        }
        let segment = ConstantJerkSegment {
            start_position: self.last_state.0,
            start_velocity: self.last_state.1,
            start_acceleration: self.last_state.2,
            jerk,
            duration,
        };
        self.last_state = segment.end_state();
        self.param_length += duration;
        self.segments.push(segment);
        Ok(())
    }

    /// Total parameter span covered by the segments.
    #[must_use]
    pub const fn param_length(&self) -> f64 {
        self.param_length
    }

    /// Segments as a slice.
    #[must_use]
    pub fn segments(&self) -> &[ConstantJerkSegment] {
        &self.segments
    }

    /// Evaluates the requested derivative order at a parameter value.
    ///
    /// The parameter is clamped to `[0, param_length]`; a trajectory without
    /// segments evaluates to its head state everywhere.
    #[must_use]
    pub fn evaluate(&self, order: u32, param: f64) -> f64 {
        if self.segments.is_empty() {
            return match order {
                0 => self.head.0,
                1 => self.head.1,
                2 => self.head.2,
                _ => 0.0,
            };
        }
        let param = param.clamp(0.0, self.param_length);
        let mut offset = 0.0;
        for segment in &self.segments {
            if param <= offset + segment.duration {
                return segment.evaluate(order, param - offset);
            }
            offset += segment.duration;
        }
        // Numerical tail: evaluate the last segment at its end.
        let last = &self.segments[self.segments.len() - 1];
        last.evaluate(order, last.duration)
    }
}
