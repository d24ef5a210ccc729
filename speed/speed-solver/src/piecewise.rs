//! Piecewise-jerk quadratic program over a discretized 1-D trajectory.
//!
//! The decision vector stacks position, first and second derivatives at every
//! knot: z = [x₀…x_{N-1}, ẋ₀…ẋ_{N-1}, ẍ₀…ẍ_{N-1}] ∈ ℝ^{3N}. Between knots
//! the third derivative is constant, which yields the coupling equalities
//!
//! ```text
//! x_{i+1} = x_i + ẋ_i Δ + 1/3 ẍ_i Δ² + 1/6 ẍ_{i+1} Δ²
//! ẋ_{i+1} = ẋ_i + 1/2 (ẍ_i + ẍ_{i+1}) Δ
//! ```
//!
//! plus jerk bounds encoded as `⃛x_min Δ ≤ ẍ_{i+1} - ẍ_i ≤ ⃛x_max Δ`.
//!
//! Two consumers share this formulation: the speed QP (x = station over
//! time) and the curve-fitting QPs (x = speed limit or curvature over
//! station).

use nalgebra::{DMatrix, DVector};
use speed_types::{PlanningError, Result};

use crate::qp::{QpBackend, QpProblem, QpSolution, QpWarmStart};

/// Builder for the piecewise-jerk QP.
#[derive(Debug, Clone)]
pub struct PiecewiseJerkProblem {
    num_knots: usize,
    delta: f64,
    init_state: [f64; 3],
    x_bounds: Vec<(f64, f64)>,
    dx_bounds: (f64, f64),
    ddx_bounds: (f64, f64),
    dddx_bound: (f64, f64),
    weight_x: f64,
    weight_dx: f64,
    weight_ddx: f64,
    weight_dddx: f64,
    x_ref: Option<(f64, Vec<f64>)>,
    end_state_ref: Option<([f64; 3], [f64; 3])>,
}

impl PiecewiseJerkProblem {
    /// Creates a problem over `num_knots` knots spaced `delta` apart, with
    /// the first knot pinned to `init_state` = (x₀, ẋ₀, ẍ₀).
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] for fewer than two knots or a
    /// non-positive spacing.
    pub fn new(num_knots: usize, delta: f64, init_state: [f64; 3]) -> Result<Self> {
        if num_knots < 2 {
            return Err(PlanningError::invalid_input(format!(
                "piecewise-jerk problem needs at least 2 knots, got {num_knots}"
            )));
        }
        if delta <= 0.0 {
            return Err(PlanningError::invalid_input(format!(
                "knot spacing must be positive, got {delta}"
            )));
        }
        Ok(Self {
            num_knots,
            delta,
            init_state,
            x_bounds: vec![(f64::NEG_INFINITY, f64::INFINITY); num_knots],
            dx_bounds: (f64::NEG_INFINITY, f64::INFINITY),
            ddx_bounds: (f64::NEG_INFINITY, f64::INFINITY),
            dddx_bound: (f64::NEG_INFINITY, f64::INFINITY),
            weight_x: 0.0,
            weight_dx: 0.0,
            weight_ddx: 0.0,
            weight_dddx: 0.0,
            x_ref: None,
            end_state_ref: None,
        })
    }

    /// Number of knots.
    #[must_use]
    pub const fn num_knots(&self) -> usize {
        self.num_knots
    }

    /// Per-knot position bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] when the vector length does
    /// not match the knot count.
    pub fn set_x_bounds(&mut self, bounds: Vec<(f64, f64)>) -> Result<()> {
        if bounds.len() != self.num_knots {
            return Err(PlanningError::invalid_input(format!(
                "x bounds length {} does not match knot count {}",
                bounds.len(),
                self.num_knots
            )));
        }
        self.x_bounds = bounds;
        Ok(())
    }

    /// Uniform position bounds applied at every knot.
    pub fn set_uniform_x_bounds(&mut self, lower: f64, upper: f64) {
        self.x_bounds = vec![(lower, upper); self.num_knots];
    }

    /// Global first-derivative bounds.
    pub fn set_dx_bounds(&mut self, lower: f64, upper: f64) {
        self.dx_bounds = (lower, upper);
    }

    /// Global second-derivative bounds.
    pub fn set_ddx_bounds(&mut self, lower: f64, upper: f64) {
        self.ddx_bounds = (lower, upper);
    }

    /// Global third-derivative bounds.
    pub fn set_dddx_bound(&mut self, lower: f64, upper: f64) {
        self.dddx_bound = (lower, upper);
    }

    /// Quadratic weights on position, first, second, and third derivative.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] on a negative weight.
    pub fn set_weights(&mut self, w_x: f64, w_dx: f64, w_ddx: f64, w_dddx: f64) -> Result<()> {
        if w_x < 0.0 || w_dx < 0.0 || w_ddx < 0.0 || w_dddx < 0.0 {
            return Err(PlanningError::invalid_input("negative cost weight"));
        }
        self.weight_x = w_x;
        self.weight_dx = w_dx;
        self.weight_ddx = w_ddx;
        self.weight_dddx = w_dddx;
        Ok(())
    }

    /// Position reference tracked with the given weight.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] when the weight is negative or
    /// the reference length does not match the knot count.
    pub fn set_x_ref(&mut self, weight: f64, x_ref: Vec<f64>) -> Result<()> {
        if weight < 0.0 {
            return Err(PlanningError::invalid_input("negative reference weight"));
        }
        if x_ref.len() != self.num_knots {
            return Err(PlanningError::invalid_input(format!(
                "x reference length {} does not match knot count {}",
                x_ref.len(),
                self.num_knots
            )));
        }
        self.x_ref = Some((weight, x_ref));
        Ok(())
    }

    /// Terminal state attraction: `weights` = (w_x, w_ẋ, w_ẍ) applied to the
    /// squared distance between the last knot and `state`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] on a negative weight.
    pub fn set_end_state_ref(&mut self, weights: [f64; 3], state: [f64; 3]) -> Result<()> {
        if weights.iter().any(|&w| w < 0.0) {
            return Err(PlanningError::invalid_input("negative end-state weight"));
        }
        self.end_state_ref = Some((weights, state));
        Ok(())
    }

    /// Assembles the QP in operator-splitting form.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] when any per-knot bound pair
    /// is crossed.
    pub fn build(&self) -> Result<QpProblem> {
        let n = self.num_knots;
        let nv = 3 * n;
        let dt = self.delta;

        // Cost: 1/2 zᵀPz + qᵀz.
        let mut p = DMatrix::<f64>::zeros(nv, nv);
        let mut q = DVector::<f64>::zeros(nv);

        for i in 0..n {
            p[(i, i)] += 2.0 * self.weight_x;
            p[(n + i, n + i)] += 2.0 * self.weight_dx;
            p[(2 * n + i, 2 * n + i)] += 2.0 * self.weight_ddx;
        }
        if let Some((weight, x_ref)) = &self.x_ref {
            for i in 0..n {
                p[(i, i)] += 2.0 * weight;
                q[i] -= 2.0 * weight * x_ref[i];
            }
        }
        // Third-derivative cost over backward differences of ẍ.
        let w_jerk = 2.0 * self.weight_dddx / (dt * dt);
        for i in 0..n - 1 {
            p[(2 * n + i, 2 * n + i)] += w_jerk;
            p[(2 * n + i + 1, 2 * n + i + 1)] += w_jerk;
            p[(2 * n + i, 2 * n + i + 1)] -= w_jerk;
            p[(2 * n + i + 1, 2 * n + i)] -= w_jerk;
        }
        if let Some((weights, state)) = &self.end_state_ref {
            let last = [n - 1, 2 * n - 1, 3 * n - 1];
            for k in 0..3 {
                p[(last[k], last[k])] += 2.0 * weights[k];
                q[last[k]] -= 2.0 * weights[k] * state[k];
            }
        }

        // Constraints: initial pin, coupling equalities, jerk rows, boxes.
        let m = 6 * n;
        let mut a = DMatrix::<f64>::zeros(m, nv);
        let mut l = DVector::<f64>::zeros(m);
        let mut u = DVector::<f64>::zeros(m);
        let mut row = 0;

        for k in 0..3 {
            a[(row, k * n)] = 1.0;
            l[row] = self.init_state[k];
            u[row] = self.init_state[k];
            row += 1;
        }

        for i in 0..n - 1 {
            a[(row, i + 1)] = 1.0;
            a[(row, i)] = -1.0;
            a[(row, n + i)] = -dt;
            a[(row, 2 * n + i)] = -dt * dt / 3.0;
            a[(row, 2 * n + i + 1)] = -dt * dt / 6.0;
            l[row] = 0.0;
            u[row] = 0.0;
            row += 1;
        }

        for i in 0..n - 1 {
            a[(row, n + i + 1)] = 1.0;
            a[(row, n + i)] = -1.0;
            a[(row, 2 * n + i)] = -0.5 * dt;
            a[(row, 2 * n + i + 1)] = -0.5 * dt;
            l[row] = 0.0;
            u[row] = 0.0;
            row += 1;
        }

        for i in 0..n - 1 {
            a[(row, 2 * n + i + 1)] = 1.0;
            a[(row, 2 * n + i)] = -1.0;
            l[row] = self.dddx_bound.0 * dt;
            u[row] = self.dddx_bound.1 * dt;
            row += 1;
        }

        for (i, &(lo, hi)) in self.x_bounds.iter().enumerate() {
            a[(row, i)] = 1.0;
            l[row] = lo;
            u[row] = hi;
            row += 1;
        }
        for i in 0..n {
            a[(row, n + i)] = 1.0;
            l[row] = self.dx_bounds.0;
            u[row] = self.dx_bounds.1;
            row += 1;
        }
        for i in 0..n {
            a[(row, 2 * n + i)] = 1.0;
            l[row] = self.ddx_bounds.0;
            u[row] = self.ddx_bounds.1;
            row += 1;
        }
        debug_assert_eq!(row, m);

        QpProblem::new(p, q, a, l, u)
    }

    /// Builds and solves the QP with the given backend.
    ///
    /// # Errors
    ///
    /// Propagates assembly errors and [`PlanningError::QpInfeasible`] from
    /// the backend.
    pub fn solve(&self, backend: &impl QpBackend) -> Result<PiecewiseJerkSolution> {
        self.solve_with_warm_start(backend, None)
    }

    /// Like [`solve`](Self::solve), seeded with a primal/dual warm start.
    ///
    /// # Errors
    ///
    /// Propagates assembly and backend errors.
    pub fn solve_with_warm_start(
        &self,
        backend: &impl QpBackend,
        warm_start: Option<&QpWarmStart>,
    ) -> Result<PiecewiseJerkSolution> {
        let problem = self.build()?;
        let raw = backend.solve(&problem, warm_start)?;
        Ok(PiecewiseJerkSolution::from_raw(self.num_knots, raw))
    }
}

/// Solution of a [`PiecewiseJerkProblem`], split back into per-derivative
/// arrays of length N.
#[derive(Debug, Clone)]
pub struct PiecewiseJerkSolution {
    x: Vec<f64>,
    dx: Vec<f64>,
    ddx: Vec<f64>,
    raw: QpSolution,
}

impl PiecewiseJerkSolution {
    fn from_raw(num_knots: usize, raw: QpSolution) -> Self {
        let n = num_knots;
        let x = raw.x.as_slice()[..n].to_vec();
        let dx = raw.x.as_slice()[n..2 * n].to_vec();
        let ddx = raw.x.as_slice()[2 * n..3 * n].to_vec();
        Self { x, dx, ddx, raw }
    }

    /// Optimal positions.
    #[must_use]
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Optimal first derivatives.
    #[must_use]
    pub fn dx(&self) -> &[f64] {
        &self.dx
    }

    /// Optimal second derivatives.
    #[must_use]
    pub fn ddx(&self) -> &[f64] {
        &self.ddx
    }

    /// Underlying QP solution (duals, residuals, iteration count).
    #[must_use]
    pub const fn raw(&self) -> &QpSolution {
        &self.raw
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::qp::AdmmSolver;
    use approx::assert_relative_eq;

    const N: usize = 31;
    const DT: f64 = 0.1;

    fn braking_problem() -> PiecewiseJerkProblem {
        // From 10 m/s, track a reference that stops at 20 m.
        let mut problem = PiecewiseJerkProblem::new(N, DT, [0.0, 10.0, 0.0]).unwrap();
        problem.set_uniform_x_bounds(0.0, 20.0);
        problem.set_dx_bounds(0.0, 20.0);
        problem.set_ddx_bounds(-6.0, 2.0);
        problem.set_dddx_bound(-4.0, 2.0);
        problem.set_weights(0.0, 0.0, 500.0, 600.0).unwrap();
        let x_ref: Vec<f64> = (0..N).map(|i| (i as f64 * DT * 10.0).min(20.0)).collect();
        problem.set_x_ref(10.0, x_ref).unwrap();
        problem
    }

    #[test]
    fn validates_setters() {
        assert!(PiecewiseJerkProblem::new(1, 0.1, [0.0; 3]).is_err());
        assert!(PiecewiseJerkProblem::new(10, 0.0, [0.0; 3]).is_err());

        let mut problem = PiecewiseJerkProblem::new(10, 0.1, [0.0; 3]).unwrap();
        assert!(problem.set_x_bounds(vec![(0.0, 1.0); 9]).is_err());
        assert!(problem.set_x_ref(1.0, vec![0.0; 9]).is_err());
        assert!(problem.set_x_ref(-1.0, vec![0.0; 10]).is_err());
        assert!(problem.set_weights(-1.0, 0.0, 0.0, 0.0).is_err());
        assert!(problem.set_end_state_ref([-1.0, 0.0, 0.0], [0.0; 3]).is_err());
    }

    #[test]
    fn initial_state_is_pinned() {
        let solution = braking_problem().solve(&AdmmSolver::default_solver()).unwrap();
        assert_relative_eq!(solution.x()[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(solution.dx()[0], 10.0, epsilon = 1e-5);
        assert_relative_eq!(solution.ddx()[0], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn kinematic_coupling_holds() {
        let solution = braking_problem().solve(&AdmmSolver::default_solver()).unwrap();
        let (x, dx, ddx) = (solution.x(), solution.dx(), solution.ddx());
        for i in 0..N - 1 {
            let x_pred = x[i]
                + dx[i] * DT
                + ddx[i] * DT * DT / 3.0
                + ddx[i + 1] * DT * DT / 6.0;
            assert_relative_eq!(x[i + 1], x_pred, epsilon = 1e-4);

            let dx_pred = dx[i] + 0.5 * (ddx[i] + ddx[i + 1]) * DT;
            assert_relative_eq!(dx[i + 1], dx_pred, epsilon = 1e-4);
        }
    }

    #[test]
    fn box_and_jerk_bounds_hold() {
        let solution = braking_problem().solve(&AdmmSolver::default_solver()).unwrap();
        let (x, dx, ddx) = (solution.x(), solution.dx(), solution.ddx());
        for i in 0..N {
            assert!(x[i] >= -1e-3 && x[i] <= 20.0 + 1e-3, "x[{i}] = {}", x[i]);
            assert!(dx[i] >= -1e-3 && dx[i] <= 20.0 + 1e-3);
            assert!(ddx[i] >= -6.0 - 1e-3 && ddx[i] <= 2.0 + 1e-3);
        }
        for i in 0..N - 1 {
            let jerk = (ddx[i + 1] - ddx[i]) / DT;
            assert!(jerk >= -4.0 - 1e-2 && jerk <= 2.0 + 1e-2, "jerk[{i}] = {jerk}");
        }
    }

    #[test]
    fn tracks_reference_when_unconstrained() {
        // Constant reference at the initial position with generous bounds:
        // the optimum is to stay put.
        let mut problem = PiecewiseJerkProblem::new(N, DT, [5.0, 0.0, 0.0]).unwrap();
        problem.set_uniform_x_bounds(0.0, 10.0);
        problem.set_dx_bounds(-5.0, 5.0);
        problem.set_ddx_bounds(-5.0, 5.0);
        problem.set_dddx_bound(-10.0, 10.0);
        problem.set_weights(0.0, 1.0, 1.0, 1.0).unwrap();
        problem.set_x_ref(10.0, vec![5.0; N]).unwrap();

        let solution = problem.solve(&AdmmSolver::default_solver()).unwrap();
        for i in 0..N {
            assert_relative_eq!(solution.x()[i], 5.0, epsilon = 1e-3);
            assert_relative_eq!(solution.dx()[i], 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn end_state_ref_pulls_terminal_knot() {
        let mut problem = PiecewiseJerkProblem::new(N, DT, [0.0, 0.0, 0.0]).unwrap();
        problem.set_uniform_x_bounds(0.0, 100.0);
        problem.set_dx_bounds(-20.0, 20.0);
        problem.set_ddx_bounds(-10.0, 10.0);
        problem.set_dddx_bound(-40.0, 40.0);
        problem.set_weights(0.0, 0.0, 0.1, 0.1).unwrap();
        problem
            .set_end_state_ref([1000.0, 1000.0, 0.0], [3.0, 0.0, 0.0])
            .unwrap();

        let solution = problem.solve(&AdmmSolver::default_solver()).unwrap();
        assert_relative_eq!(solution.x()[N - 1], 3.0, epsilon = 0.2);
        assert_relative_eq!(solution.dx()[N - 1], 0.0, epsilon = 0.2);
    }

    #[test]
    fn mock_backend_is_injectable() {
        struct CannedBackend;
        impl QpBackend for CannedBackend {
            fn solve(
                &self,
                problem: &QpProblem,
                _warm_start: Option<&QpWarmStart>,
            ) -> Result<QpSolution> {
                Ok(QpSolution {
                    x: nalgebra::DVector::zeros(problem.num_vars()),
                    y: nalgebra::DVector::zeros(problem.num_constraints()),
                    iterations: 0,
                    primal_residual: 0.0,
                    dual_residual: 0.0,
                    polished: false,
                })
            }
        }

        let problem = PiecewiseJerkProblem::new(5, 0.1, [0.0; 3]).unwrap();
        let solution = problem.solve(&CannedBackend).unwrap();
        assert_eq!(solution.x().len(), 5);
        assert_eq!(solution.dx().len(), 5);
        assert_eq!(solution.ddx().len(), 5);
    }
}
