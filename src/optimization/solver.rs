//! Seam between a vehicle chain and the numerical optimizer

use nalgebra::{DMatrix, DVector};

use crate::common::PlanningResult;
use crate::optimization::problem::{Bindings, Problem};

/// Nonlinear solver computing spline coefficients for a registered problem
pub trait Solver {
    /// Solve `problem` with the numeric `bindings`, warm-started from
    /// `initial_guess` (one column per spline). Returns one coefficient vector
    /// per spline, outermost link first.
    fn solve(
        &mut self,
        problem: &Problem,
        bindings: &Bindings,
        initial_guess: &DMatrix<f64>,
    ) -> PlanningResult<Vec<DVector<f64>>>;
}
