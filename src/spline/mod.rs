//! Spline basis used to parameterise trajectories

pub mod bspline;

pub use bspline::{linspace, BSplineBasis, Spline};
