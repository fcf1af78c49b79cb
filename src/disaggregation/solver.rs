//! Projected-gradient solver for the usage disaggregation problem
//!
//! The problem is a convex quadratic program:
//!
//! ```text
//! minimise   sum_i (h_i - mean(h))^2
//! subject to sum_i w_i * h_i = E
//!            l_i <= h_i <= u_i
//! ```
//!
//! where `w_i` is the appliance power in kW and `E` the metered energy in kWh.
//! Each iteration takes a gradient step on the evenness objective and projects
//! back onto the feasible set. The projection onto "box intersected with one
//! hyperplane" has the closed form `clamp(y - lambda * w, l, u)` for a scalar
//! multiplier `lambda`, found by bisection since `w . x(lambda)` is monotone.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DisaggregationError, UsageProblem};

/// Raw solver output, before it is turned into report rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub hours: Vec<f64>,
    pub iterations: usize,
    pub objective: f64,
    pub converged: bool,
}

/// Strategy seam for the disaggregation solver
pub trait DisaggregationStrategy: Send + Sync {
    fn solve(&self, problem: &UsageProblem) -> Result<SolverOutcome, DisaggregationError>;

    fn name(&self) -> &'static str;
}

/// Projected gradient descent with an exact box/hyperplane projection
#[derive(Debug, Clone)]
pub struct ProjectedGradientSolver {
    pub max_iterations: usize,
    /// Stop once no coordinate moves by more than this (hours, relative to scale)
    pub tolerance: f64,
}

impl Default for ProjectedGradientSolver {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-9,
        }
    }
}

impl ProjectedGradientSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// The objective's Hessian is 2 * (I - 11^T / n), largest eigenvalue 2
    const STEP: f64 = 0.5;
}

impl DisaggregationStrategy for ProjectedGradientSolver {
    fn solve(&self, problem: &UsageProblem) -> Result<SolverOutcome, DisaggregationError> {
        let w = DVector::from_iterator(
            problem.wattages.len(),
            problem.wattages.iter().map(|watts| watts / 1000.0),
        );
        let lower = DVector::from_column_slice(&problem.lower);
        let upper = DVector::from_column_slice(&problem.upper);
        let target = problem.target_kwh;

        check_feasible(&w, &lower, &upper, target)?;

        let mut x = project(
            &DVector::from_column_slice(&problem.initial),
            &w,
            &lower,
            &upper,
            target,
        );

        let mut converged = false;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let gradient = evenness_gradient(&x);
            let step = &x - gradient * Self::STEP;
            let next = project(&step, &w, &lower, &upper, target);
            let moved = (&next - &x).amax();
            x = next;
            if moved <= self.tolerance * (1.0 + x.amax()) {
                converged = true;
                break;
            }
        }

        let objective = evenness(&x);
        if converged {
            debug!(iterations, objective, "disaggregation converged");
        } else {
            warn!(
                iterations,
                objective, "disaggregation hit the iteration limit; returning feasible iterate"
            );
        }

        Ok(SolverOutcome {
            hours: x.iter().copied().collect(),
            iterations,
            objective,
            converged,
        })
    }

    fn name(&self) -> &'static str {
        "projected_gradient"
    }
}

fn check_feasible(
    w: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    target: f64,
) -> Result<(), DisaggregationError> {
    let min_kwh = w.dot(lower);
    let max_kwh = w.dot(upper);
    let slack = 1e-9 * target.abs().max(1.0);
    if target > max_kwh + slack || target < min_kwh - slack {
        return Err(DisaggregationError::InfeasibleConstraints {
            target_kwh: target,
            min_kwh,
            max_kwh,
        });
    }
    Ok(())
}

/// Sum of squared deviations from the mean
pub fn evenness(x: &DVector<f64>) -> f64 {
    let mean = x.mean();
    x.iter().map(|h| (h - mean).powi(2)).sum()
}

fn evenness_gradient(x: &DVector<f64>) -> DVector<f64> {
    let mean = x.mean();
    x.map(|h| 2.0 * (h - mean))
}

/// Euclidean projection of `y` onto `{x : lower <= x <= upper, w . x = target}`.
///
/// Assumes `w > 0` componentwise and that the set is non-empty.
pub fn project(
    y: &DVector<f64>,
    w: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    target: f64,
) -> DVector<f64> {
    let at = |lambda: f64| -> DVector<f64> {
        DVector::from_iterator(
            y.len(),
            (0..y.len()).map(|i| (y[i] - lambda * w[i]).clamp(lower[i], upper[i])),
        )
    };

    // Below `lo` every coordinate sits at its upper bound, above `hi` at its lower bound
    let mut lo = (0..y.len())
        .map(|i| (y[i] - upper[i]) / w[i])
        .fold(f64::INFINITY, f64::min);
    let mut hi = (0..y.len())
        .map(|i| (y[i] - lower[i]) / w[i])
        .fold(f64::NEG_INFINITY, f64::max);

    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if w.dot(&at(mid)) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    at(0.5 * (lo + hi))
}
