//! ADMM backend for box-and-linear-constrained quadratic programs.
//!
//! Solves problems of the form
//!
//! ```text
//! minimize   1/2 xᵀPx + qᵀx
//! subject to l ≤ Ax ≤ u
//! ```
//!
//! where P is positive semidefinite and equality constraints are encoded as
//! rows with l = u.
//!
//! # Algorithm
//!
//! Operator splitting (the OSQP scheme) with per-row step sizes:
//!
//! ```text
//! 1. Factor K = P + σI + AᵀRA once (Cholesky), R = diag(ρ_i)
//! 2. For k = 0, 1, 2, ...:
//!    x̃ = K⁻¹ (σx - q + Aᵀ(Rz - y))
//!    x ← αx̃ + (1-α)x
//!    z ← Π[l,u](αAx̃ + (1-α)z + y/ρ)
//!    y ← y + ρ ∘ (αAx̃ + (1-α)z_prev - z)
//! 3. Stop when primal and dual residuals pass tolerance
//! ```
//!
//! Equality rows get a ρ several orders larger than inequality rows, which
//! drives their residuals far below the global tolerance.
//!
//! # Polishing
//!
//! After convergence the active constraints are guessed from the signs of the
//! dual variables and the reduced KKT system is solved directly with a small
//! regularization plus one iterative-refinement pass. The polished iterate is
//! kept only when it does not regress either residual.

use nalgebra::{DMatrix, DVector};
use speed_types::{PlanningError, Result};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bound gap below which a row is treated as an equality.
const EQUALITY_GAP: f64 = 1e-12;

/// Dual magnitude above which a constraint is considered active when
/// polishing.
const ACTIVE_DUAL_EPS: f64 = 1e-9;

/// Residual level at which a polished iterate is accepted unconditionally.
const POLISH_ACCEPT_EPS: f64 = 1e-8;

/// Quadratic program data in operator-splitting form.
#[derive(Debug, Clone, PartialEq)]
pub struct QpProblem {
    /// Quadratic cost matrix, n × n, positive semidefinite.
    pub p: DMatrix<f64>,
    /// Linear cost vector, length n.
    pub q: DVector<f64>,
    /// Constraint matrix, m × n.
    pub a: DMatrix<f64>,
    /// Lower constraint bounds, length m.
    pub l: DVector<f64>,
    /// Upper constraint bounds, length m.
    pub u: DVector<f64>,
}

impl QpProblem {
    /// Creates a problem after validating dimensions and bound ordering.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::InvalidInput`] on mismatched dimensions or
    /// any `l[i] > u[i]`.
    pub fn new(
        p: DMatrix<f64>,
        q: DVector<f64>,
        a: DMatrix<f64>,
        l: DVector<f64>,
        u: DVector<f64>,
    ) -> Result<Self> {
        let n = q.len();
        let m = l.len();
        if p.nrows() != n || p.ncols() != n {
            return Err(PlanningError::invalid_input(format!(
                "cost matrix is {}x{}, expected {n}x{n}",
                p.nrows(),
                p.ncols()
            )));
        }
        if a.nrows() != m || a.ncols() != n || u.len() != m {
            return Err(PlanningError::invalid_input(format!(
                "constraint matrix is {}x{}, bounds {}/{}, expected {m}x{n}",
                a.nrows(),
                a.ncols(),
                l.len(),
                u.len()
            )));
        }
        if l.iter().zip(u.iter()).any(|(&lo, &hi)| lo > hi) {
            return Err(PlanningError::invalid_input(
                "constraint lower bound above upper bound",
            ));
        }
        Ok(Self { p, q, a, l, u })
    }

    /// Number of decision variables.
    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.q.len()
    }

    /// Number of constraint rows.
    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.l.len()
    }

    /// Objective value at a point.
    #[must_use]
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * (x.transpose() * &self.p * x)[(0, 0)] + self.q.dot(x)
    }
}

/// Primal/dual pair used to seed the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct QpWarmStart {
    /// Primal iterate, length n.
    pub x: DVector<f64>,
    /// Dual iterate, length m.
    pub y: DVector<f64>,
}

/// Configuration for the ADMM solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdmmConfig {
    /// Maximum number of iterations.
    pub max_iterations: usize,

    /// Absolute residual tolerance.
    pub eps_abs: f64,

    /// Relative residual tolerance.
    pub eps_rel: f64,

    /// Step size on inequality rows.
    pub rho: f64,

    /// Multiplier applied to `rho` on equality rows.
    pub rho_eq_scale: f64,

    /// Proximal regularization on the primal update.
    pub sigma: f64,

    /// Over-relaxation factor (1-2).
    pub alpha: f64,

    /// Residuals are checked every this many iterations.
    pub check_interval: usize,

    /// Run the active-set polish step after convergence.
    pub polish: bool,

    /// Regularization added to the polish KKT system.
    pub polish_delta: f64,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4000,
            eps_abs: 1e-4,
            eps_rel: 1e-5,
            rho: 0.1,
            rho_eq_scale: 1e3,
            sigma: 1e-6,
            alpha: 1.6,
            check_interval: 25,
            polish: true,
            polish_delta: 1e-7,
        }
    }
}

impl AdmmConfig {
    /// Tight-tolerance configuration for reference solves.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            max_iterations: 10_000,
            eps_abs: 1e-6,
            eps_rel: 1e-6,
            ..Self::default()
        }
    }

    /// Loose-tolerance configuration bounded for real-time use; polishing
    /// recovers most of the lost accuracy.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            max_iterations: 500,
            eps_abs: 1e-3,
            eps_rel: 1e-3,
            ..Self::default()
        }
    }

    /// Set the iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enable or disable polishing.
    #[must_use]
    pub const fn with_polish(mut self, polish: bool) -> Self {
        self.polish = polish;
        self
    }
}

/// Converged solution of a [`QpProblem`].
#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution {
    /// Primal solution, length n.
    pub x: DVector<f64>,
    /// Dual solution, length m.
    pub y: DVector<f64>,
    /// Iterations used.
    pub iterations: usize,
    /// Final primal residual (infinity norm).
    pub primal_residual: f64,
    /// Final dual residual (infinity norm).
    pub dual_residual: f64,
    /// Whether the polish step was applied.
    pub polished: bool,
}

/// Abstraction over QP backends so consumers can inject a mock in tests.
pub trait QpBackend {
    /// Solves the problem, optionally seeded with a warm start.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::QpInfeasible`] when no iterate passes the
    /// residual tolerances within the iteration cap, and
    /// [`PlanningError::InvalidInput`] on malformed warm starts.
    fn solve(&self, problem: &QpProblem, warm_start: Option<&QpWarmStart>) -> Result<QpSolution>;
}

/// ADMM solver with active-set polishing.
#[derive(Debug, Clone, Default)]
pub struct AdmmSolver {
    config: AdmmConfig,
}

impl AdmmSolver {
    /// Creates a solver with the given configuration.
    #[must_use]
    pub const fn new(config: AdmmConfig) -> Self {
        Self { config }
    }

    /// Creates a solver with default configuration.
    #[must_use]
    pub fn default_solver() -> Self {
        Self::new(AdmmConfig::default())
    }

    /// Solver configuration.
    #[must_use]
    pub const fn config(&self) -> &AdmmConfig {
        &self.config
    }

    fn rho_vector(&self, problem: &QpProblem) -> DVector<f64> {
        let cfg = &self.config;
        DVector::from_fn(problem.num_constraints(), |i, _| {
            let gap = (problem.u[i] - problem.l[i]).abs();
            if gap < EQUALITY_GAP {
                cfg.rho * cfg.rho_eq_scale
            } else {
                cfg.rho
            }
        })
    }

    /// Primal/dual residuals plus their tolerances and the residual
    /// restricted to equality rows, which must meet the absolute tolerance
    /// on its own.
    #[allow(clippy::similar_names)]
    fn residuals(
        &self,
        problem: &QpProblem,
        x: &DVector<f64>,
        z: &DVector<f64>,
        y: &DVector<f64>,
    ) -> (f64, f64, f64, f64, f64) {
        let ax = &problem.a * x;
        let px = &problem.p * x;
        let aty = problem.a.transpose() * y;

        let r_prim = (&ax - z).amax();
        let r_dual = (&px + &problem.q + &aty).amax();
        let mut r_eq = 0.0f64;
        for i in 0..problem.num_constraints() {
            if (problem.u[i] - problem.l[i]).abs() < EQUALITY_GAP {
                r_eq = r_eq.max((ax[i] - z[i]).abs());
            }
        }

        let eps = &self.config;
        let eps_prim = eps.eps_rel.mul_add(ax.amax().max(z.amax()), eps.eps_abs);
        let eps_dual = eps.eps_rel.mul_add(
            px.amax().max(problem.q.amax()).max(aty.amax()),
            eps.eps_abs,
        );
        (r_prim, r_dual, r_eq, eps_prim, eps_dual)
    }

    /// Guess the active set from dual signs and solve the reduced KKT system
    /// directly. Returns `None` when the KKT solve fails or the polished
    /// iterate regresses.
    #[allow(clippy::similar_names)]
    fn polish(
        &self,
        problem: &QpProblem,
        y: &DVector<f64>,
        r_prim: f64,
        r_dual: f64,
    ) -> Option<(DVector<f64>, DVector<f64>, DVector<f64>, f64, f64)> {
        let n = problem.num_vars();
        let m = problem.num_constraints();

        let mut active_rows: Vec<(usize, f64)> = Vec::new();
        for i in 0..m {
            let gap = (problem.u[i] - problem.l[i]).abs();
            if gap < EQUALITY_GAP {
                active_rows.push((i, problem.l[i]));
            } else if y[i] > ACTIVE_DUAL_EPS && problem.u[i].is_finite() {
                active_rows.push((i, problem.u[i]));
            } else if y[i] < -ACTIVE_DUAL_EPS && problem.l[i].is_finite() {
                active_rows.push((i, problem.l[i]));
            }
        }
        let na = active_rows.len();
        let delta = self.config.polish_delta;

        // Regularized KKT: [[P + δI, A_actᵀ], [A_act, -δI]].
        let dim = n + na;
        let mut kkt = DMatrix::<f64>::zeros(dim, dim);
        kkt.view_mut((0, 0), (n, n)).copy_from(&problem.p);
        for i in 0..n {
            kkt[(i, i)] += delta;
        }
        let mut rhs = DVector::<f64>::zeros(dim);
        for i in 0..n {
            rhs[i] = -problem.q[i];
        }
        for (k, &(row, bound)) in active_rows.iter().enumerate() {
            for col in 0..n {
                let v = problem.a[(row, col)];
                kkt[(n + k, col)] = v;
                kkt[(col, n + k)] = v;
            }
            kkt[(n + k, n + k)] = -delta;
            rhs[n + k] = bound;
        }

        let lu = kkt.lu();
        let mut sol = lu.solve(&rhs)?;

        // One refinement pass against the unregularized system.
        let mut residual = rhs.clone();
        {
            let x = sol.rows(0, n).into_owned();
            let nu = sol.rows(n, na).into_owned();
            let mut top = &problem.p * &x;
            for (k, &(row, _)) in active_rows.iter().enumerate() {
                for col in 0..n {
                    top[col] += problem.a[(row, col)] * nu[k];
                }
            }
            for i in 0..n {
                residual[i] -= top[i];
            }
            for (k, &(row, _)) in active_rows.iter().enumerate() {
                let mut ax = 0.0;
                for col in 0..n {
                    ax += problem.a[(row, col)] * x[col];
                }
                residual[n + k] -= ax;
            }
        }
        if let Some(correction) = lu.solve(&residual) {
            sol += correction;
        }

        let x_pol = sol.rows(0, n).into_owned();
        let mut y_pol = DVector::<f64>::zeros(m);
        for (k, &(row, _)) in active_rows.iter().enumerate() {
            y_pol[row] = sol[n + k];
        }

        let ax = &problem.a * &x_pol;
        let z_pol = DVector::from_fn(m, |i, _| ax[i].clamp(problem.l[i], problem.u[i]));
        let r_prim_pol = (&ax - &z_pol).amax();
        let r_dual_pol =
            (&problem.p * &x_pol + &problem.q + problem.a.transpose() * &y_pol).amax();

        let prim_ok = r_prim_pol <= r_prim || r_prim_pol <= POLISH_ACCEPT_EPS;
        let dual_ok = r_dual_pol <= r_dual || r_dual_pol <= POLISH_ACCEPT_EPS;
        if r_prim_pol.is_finite() && r_dual_pol.is_finite() && prim_ok && dual_ok {
            Some((x_pol, y_pol, z_pol, r_prim_pol, r_dual_pol))
        } else {
            None
        }
    }
}

impl QpBackend for AdmmSolver {
    #[allow(clippy::similar_names, clippy::too_many_lines)]
    fn solve(&self, problem: &QpProblem, warm_start: Option<&QpWarmStart>) -> Result<QpSolution> {
        let n = problem.num_vars();
        let m = problem.num_constraints();
        let cfg = &self.config;

        if let Some(ws) = warm_start {
            if ws.x.len() != n || ws.y.len() != m {
                return Err(PlanningError::invalid_input(format!(
                    "warm start sized {}/{}, expected {n}/{m}",
                    ws.x.len(),
                    ws.y.len()
                )));
            }
        }

        let rho = self.rho_vector(problem);
        let a_t = problem.a.transpose();

        // K = P + σI + AᵀRA, factored once.
        let mut scaled_a = problem.a.clone();
        for i in 0..m {
            for j in 0..n {
                scaled_a[(i, j)] *= rho[i];
            }
        }
        let mut kkt = &problem.p + &a_t * &scaled_a;
        for i in 0..n {
            kkt[(i, i)] += cfg.sigma;
        }
        let Some(chol) = kkt.cholesky() else {
            return Err(PlanningError::QpInfeasible(
                "reduced KKT matrix is not positive definite".into(),
            ));
        };

        let mut x = warm_start.map_or_else(|| DVector::zeros(n), |ws| ws.x.clone());
        let mut y = warm_start.map_or_else(|| DVector::zeros(m), |ws| ws.y.clone());
        let mut z = &problem.a * &x;
        for i in 0..m {
            z[i] = z[i].clamp(problem.l[i], problem.u[i]);
        }

        let mut iterations = 0;
        let mut converged = false;
        let mut r_prim = f64::INFINITY;
        let mut r_dual = f64::INFINITY;

        for iter in 1..=cfg.max_iterations {
            iterations = iter;

            let mut rhs = &x * cfg.sigma - &problem.q;
            let adjoint = z.zip_map(&rho, |zi, ri| zi * ri) - &y;
            rhs += &a_t * adjoint;
            let x_tilde = chol.solve(&rhs);
            let z_tilde = &problem.a * &x_tilde;

            let x_next = &x_tilde * cfg.alpha + &x * (1.0 - cfg.alpha);
            let z_interp = &z_tilde * cfg.alpha + &z * (1.0 - cfg.alpha);
            let z_next = DVector::from_fn(m, |i, _| {
                (z_interp[i] + y[i] / rho[i]).clamp(problem.l[i], problem.u[i])
            });
            let y_next = &y + (&z_interp - &z_next).zip_map(&rho, |d, ri| d * ri);

            x = x_next;
            z = z_next;
            y = y_next;

            if iter % cfg.check_interval == 0 || iter == cfg.max_iterations {
                let (rp, rd, r_eq, eps_prim, eps_dual) = self.residuals(problem, &x, &z, &y);
                r_prim = rp;
                r_dual = rd;
                if rp <= eps_prim && rd <= eps_dual && r_eq <= cfg.eps_abs {
                    converged = true;
                    break;
                }
            }
        }

        if !converged {
            return Err(PlanningError::QpInfeasible(format!(
                "no convergence in {iterations} iterations \
                 (primal residual {r_prim:.3e}, dual residual {r_dual:.3e})"
            )));
        }

        let mut polished = false;
        if cfg.polish {
            if let Some((x_pol, y_pol, _z_pol, rp, rd)) = self.polish(problem, &y, r_prim, r_dual)
            {
                x = x_pol;
                y = y_pol;
                r_prim = rp;
                r_dual = rd;
                polished = true;
            }
        }

        debug!(
            iterations,
            primal_residual = r_prim,
            dual_residual = r_dual,
            polished,
            "qp solve converged"
        );

        Ok(QpSolution {
            x,
            y,
            iterations,
            primal_residual: r_prim,
            dual_residual: r_dual,
            polished,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// The classic two-variable demo problem with a known optimum.
    fn demo_problem() -> QpProblem {
        let p = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let q = DVector::from_vec(vec![1.0, 1.0]);
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
        let l = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let u = DVector::from_vec(vec![1.0, 0.7, 0.7]);
        QpProblem::new(p, q, a, l, u).unwrap()
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let p = DMatrix::identity(2, 2);
        let q = DVector::zeros(3);
        let a = DMatrix::identity(2, 2);
        let l = DVector::zeros(2);
        let u = DVector::zeros(2);
        assert!(QpProblem::new(p, q, a, l, u).is_err());
    }

    #[test]
    fn rejects_crossed_bounds() {
        let p = DMatrix::identity(1, 1);
        let q = DVector::zeros(1);
        let a = DMatrix::identity(1, 1);
        let l = DVector::from_vec(vec![1.0]);
        let u = DVector::from_vec(vec![0.0]);
        assert!(QpProblem::new(p, q, a, l, u).is_err());
    }

    #[test]
    fn solves_demo_problem() {
        let problem = demo_problem();
        let solver = AdmmSolver::default_solver();
        let sol = solver.solve(&problem, None).unwrap();
        assert_relative_eq!(sol.x[0], 0.3, epsilon = 1e-3);
        assert_relative_eq!(sol.x[1], 0.7, epsilon = 1e-3);
        assert_relative_eq!(problem.objective(&sol.x), 1.88, epsilon = 1e-3);
    }

    #[test]
    fn equality_rows_are_tight() {
        // min ||x||² subject to x0 + x1 = 2 → x = (1, 1).
        let p = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]);
        let q = DVector::zeros(2);
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let l = DVector::from_vec(vec![2.0]);
        let u = DVector::from_vec(vec![2.0]);
        let problem = QpProblem::new(p, q, a, l, u).unwrap();

        let sol = AdmmSolver::default_solver().solve(&problem, None).unwrap();
        assert_relative_eq!(sol.x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(sol.x[1], 1.0, epsilon = 1e-6);
        assert!(sol.x[0] + sol.x[1] - 2.0 < 1e-6);
    }

    #[test]
    fn unconstrained_direction_with_infinite_bounds() {
        // min (x0 - 3)² with a vacuous constraint row.
        let p = DMatrix::from_row_slice(1, 1, &[2.0]);
        let q = DVector::from_vec(vec![-6.0]);
        let a = DMatrix::from_row_slice(1, 1, &[1.0]);
        let l = DVector::from_vec(vec![f64::NEG_INFINITY]);
        let u = DVector::from_vec(vec![f64::INFINITY]);
        let problem = QpProblem::new(p, q, a, l, u).unwrap();

        let sol = AdmmSolver::default_solver().solve(&problem, None).unwrap();
        assert_relative_eq!(sol.x[0], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn infeasible_problem_errors_out() {
        // x ≥ 1 and x ≤ 0 cannot both hold.
        let p = DMatrix::from_row_slice(1, 1, &[2.0]);
        let q = DVector::zeros(1);
        let a = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let l = DVector::from_vec(vec![1.0, f64::NEG_INFINITY]);
        let u = DVector::from_vec(vec![f64::INFINITY, 0.0]);
        let problem = QpProblem::new(p, q, a, l, u).unwrap();

        let solver = AdmmSolver::new(AdmmConfig::default().with_max_iterations(300));
        assert!(matches!(
            solver.solve(&problem, None),
            Err(PlanningError::QpInfeasible(_))
        ));
    }

    #[test]
    fn warm_start_reduces_iterations() {
        let problem = demo_problem();
        let solver = AdmmSolver::default_solver();
        let cold = solver.solve(&problem, None).unwrap();

        let warm = QpWarmStart {
            x: cold.x.clone(),
            y: cold.y.clone(),
        };
        let hot = solver.solve(&problem, Some(&warm)).unwrap();
        assert!(hot.iterations <= cold.iterations);
        assert_relative_eq!(hot.x[0], cold.x[0], epsilon = 1e-4);
    }

    #[test]
    fn warm_start_size_is_validated() {
        let problem = demo_problem();
        let solver = AdmmSolver::default_solver();
        let warm = QpWarmStart {
            x: DVector::zeros(5),
            y: DVector::zeros(3),
        };
        assert!(matches!(
            solver.solve(&problem, Some(&warm)),
            Err(PlanningError::InvalidInput(_))
        ));
    }

    #[test]
    fn config_presets() {
        let tight = AdmmConfig::high_accuracy();
        assert!(tight.eps_abs < AdmmConfig::default().eps_abs);
        let fast = AdmmConfig::realtime();
        assert!(fast.max_iterations < AdmmConfig::default().max_iterations);
    }
}
