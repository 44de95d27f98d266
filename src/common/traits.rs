//! Capability interface shared by every node of a vehicle chain

use nalgebra::{DMatrix, DVector};

use crate::common::error::PlanningResult;
use crate::common::types::{ParameterMap, Prediction, Signals};
use crate::geometry::Shape;
use crate::optimization::{BoundaryCondition, Expr, Problem, SplineVar, TerminalConstraints};
use crate::spline::{BSplineBasis, Spline};

/// Center velocity of a node as the rational expression `(vx, vy) / den`
/// together with the spline holding its heading half-tangent `tan(θ/2)`.
///
/// Derivatives are taken with respect to normalised time.
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    pub vx: Expr,
    pub vy: Expr,
    pub den: Expr,
    pub tg_ha: SplineVar,
}

/// A node of an articulated vehicle chain: either the innermost kinematic
/// model or a link wrapping exactly one other node.
///
/// Every operation of a link combines its own contribution with a recursive
/// call on its child. Spline slices, predictions and signals are ordered
/// outermost link first; a link handles its own leading part and passes the
/// remainder down.
pub trait VehicleNode {
    /// Splines of this node and of every node it wraps
    fn n_spl(&self) -> usize;

    fn degree(&self) -> usize;

    /// Length of the chain state vector from this node inwards
    fn n_st(&self) -> usize;

    /// Length of the shared input vector
    fn n_in(&self) -> usize;

    /// 0 for the innermost node, one more for each wrapping link
    fn link_index(&self) -> usize;

    /// Validate the configuration of this node and of the nodes it wraps
    fn init(&self) -> PlanningResult<()>;

    fn shapes(&self) -> &[Shape];

    fn kinematics(&self, splines: &[SplineVar]) -> PlanningResult<Kinematics>;

    fn define_trajectory_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<()>;

    fn get_initial_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<Vec<BoundaryCondition>>;

    fn get_terminal_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<TerminalConstraints>;

    /// Seed the prediction of this node. `input` defaults to zero for the
    /// innermost node and to the child's predicted input for a link.
    fn set_initial_conditions(&mut self, state: &[f64], input: Option<&[f64]>)
        -> PlanningResult<()>;

    fn set_terminal_conditions(&mut self, target: &[f64]) -> PlanningResult<()>;

    fn has_terminal_conditions(&self) -> bool;

    /// Prediction seeded by `set_initial_conditions`
    fn prediction(&self) -> Option<&Prediction>;

    /// Initial guess, one coefficient column per spline
    fn get_init_spline_value(
        &self,
        prediction: &Prediction,
        basis: &BSplineBasis,
    ) -> PlanningResult<DMatrix<f64>>;

    fn check_terminal_conditions(&self, signals: &Signals) -> bool;

    fn set_parameters(&self, prediction: &Prediction, current_time: f64)
        -> PlanningResult<ParameterMap>;

    fn ode(&self, state: &DVector<f64>, input: &DVector<f64>) -> PlanningResult<DVector<f64>>;

    fn state2pose(&self, state: &DVector<f64>) -> PlanningResult<DVector<f64>>;

    /// Reconstruct signals from splines expressed in physical time
    fn splines2signals(&self, splines: &[Spline], time: &[f64]) -> PlanningResult<Signals>;

    /// Outlines and connectors at sample `t` (negative counts from the end)
    fn draw(&self, signals: &Signals, t: isize) -> PlanningResult<Vec<DMatrix<f64>>>;
}
