//! Articulated vehicle planning
//!
//! Kinematics and constraint composition for a holonomic base pulling a chain
//! of trailers. Every trajectory is a set of B-splines, one per heading
//! half-tangent plus the base position, and every constraint is polynomial in
//! their coefficients.

// Core modules
pub mod common;
pub mod geometry;
pub mod optimization;
pub mod spline;
pub mod utils;

// Vehicle models and the planning cycle
pub mod planner;
pub mod vehicles;

// Re-export common types for convenience
pub use common::{Kinematics, ParameterMap, Pose2D, Prediction, Signals, VehicleNode};
pub use common::{PlanningError, PlanningResult};
pub use planner::{ChainPlanner, CyclePhase, PlannerConfig};
pub use vehicles::{build_chain, HolonomicOrient, HolonomicOrientConfig, Trailer, TrailerConfig};
