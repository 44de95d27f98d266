//! Symbolic constraint registry and the solver interface
//!
//! # Components
//!
//! - `expr`: expression trees over splines, parameters and symbols
//! - `problem`: constraint/parameter/symbol registry with numeric checks
//! - `solver`: trait implemented by optimizer back-ends

pub mod expr;
pub mod problem;
pub mod solver;

pub use expr::{EvalContext, Expr, SplineVar};
pub use problem::{
    Bindings, BoundaryCondition, Constraint, ConstraintScope, ParameterHandle, Problem,
    TerminalConstraints,
};
pub use solver::Solver;
