//! Receding-horizon cycle around a vehicle chain
//!
//! One cycle: bind the current prediction to the registered problem, solve
//! it, reconstruct signals over the horizon, then predict the state one
//! update step ahead.
//!
//! ```text
//! Uninitialized --construct--> Constrained --parameterize--> Parameterized
//!                                      ^                          |  |
//!                                      +-------abandon_cycle------+  | solve
//!                                                                    v
//!                 Predicted <--------update_prediction---------- Solved
//!                     |
//!                     +--parameterize--> Parameterized
//! ```
//!
//! Parameters are only refreshed from a prediction that was advanced past
//! the previous solve, and each solve advances the clock once.

use tracing::{debug, info, warn};

use crate::common::{PlanningError, PlanningResult, Prediction, Signals, VehicleNode};
use crate::optimization::{Bindings, Problem, Solver};
use crate::spline::{linspace, BSplineBasis, Spline};

/// Receding-horizon options
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Horizon length T [s]
    pub horizon_time: f64,
    /// Time between two cycles [s]
    pub update_time: f64,
    /// Reconstruction step [s]
    pub sample_time: f64,
    /// Knot intervals of the spline basis
    pub knot_intervals: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon_time: 10.0,
            update_time: 0.1,
            sample_time: 0.01,
            knot_intervals: 10,
        }
    }
}

impl PlannerConfig {
    pub fn with_horizon_time(mut self, horizon_time: f64) -> Self {
        self.horizon_time = horizon_time;
        self
    }

    pub fn with_update_time(mut self, update_time: f64) -> Self {
        self.update_time = update_time;
        self
    }

    pub fn with_sample_time(mut self, sample_time: f64) -> Self {
        self.sample_time = sample_time;
        self
    }

    pub fn with_knot_intervals(mut self, knot_intervals: usize) -> Self {
        self.knot_intervals = knot_intervals;
        self
    }

    fn validate(&self) -> PlanningResult<()> {
        if !(self.horizon_time > 0.0 && self.sample_time > 0.0) {
            return Err(PlanningError::InvalidParameter(format!(
                "horizon_time={} and sample_time={} must be positive",
                self.horizon_time, self.sample_time
            )));
        }
        if !(self.update_time > 0.0 && self.update_time <= self.horizon_time) {
            return Err(PlanningError::InvalidParameter(format!(
                "update_time={} must lie in (0, horizon_time]",
                self.update_time
            )));
        }
        if self.knot_intervals == 0 {
            return Err(PlanningError::InvalidParameter(
                "knot_intervals must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Reconstruction times over the horizon, both ends included
    fn sample_times(&self) -> Vec<f64> {
        let n = (self.horizon_time / self.sample_time).round() as usize + 1;
        linspace(0.0, self.horizon_time, n.max(2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Uninitialized,
    Constrained,
    Parameterized,
    Solved,
    /// Prediction advanced along the last solved signals
    Predicted,
}

pub struct ChainPlanner<S: Solver> {
    vehicle: Box<dyn VehicleNode>,
    solver: S,
    config: PlannerConfig,
    basis: BSplineBasis,
    phase: CyclePhase,
    problem: Option<Problem>,
    bindings: Bindings,
    prediction: Prediction,
    signals: Option<Signals>,
    current_time: f64,
}

impl<S: Solver> ChainPlanner<S> {
    /// `vehicle` must carry initial conditions on every node
    pub fn new(vehicle: Box<dyn VehicleNode>, solver: S, config: PlannerConfig) -> PlanningResult<Self> {
        config.validate()?;
        vehicle.init()?;
        let prediction = vehicle.prediction().cloned().ok_or_else(|| {
            PlanningError::ChildNotInitialized(
                "vehicle chain has no initial conditions".to_string(),
            )
        })?;
        let basis = BSplineBasis::uniform(vehicle.degree(), config.knot_intervals);
        Ok(Self {
            vehicle,
            solver,
            config,
            basis,
            phase: CyclePhase::Uninitialized,
            problem: None,
            bindings: Bindings::default(),
            prediction,
            signals: None,
            current_time: 0.0,
        })
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn vehicle(&self) -> &dyn VehicleNode {
        self.vehicle.as_ref()
    }

    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }

    pub fn signals(&self) -> Option<&Signals> {
        self.signals.as_ref()
    }

    pub fn problem(&self) -> Option<&Problem> {
        self.problem.as_ref()
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    fn expect_phase(&self, allowed: &[CyclePhase], operation: &str) -> PlanningResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(PlanningError::PhaseError(format!(
                "{} is not allowed in phase {:?}",
                operation, self.phase
            )))
        }
    }

    /// Register trajectory, initial and terminal constraints of the whole chain
    pub fn construct(&mut self) -> PlanningResult<()> {
        self.expect_phase(&[CyclePhase::Uninitialized], "construct")?;
        let mut problem = Problem::new(self.vehicle.n_spl());
        let splines = problem.spline_vars();
        self.vehicle.define_trajectory_constraints(&mut problem, &splines)?;
        let initial = self.vehicle.get_initial_constraints(&mut problem, &splines)?;
        problem.add_initial_conditions(initial);
        let terminal = self.vehicle.get_terminal_constraints(&mut problem, &splines)?;
        problem.add_terminal_conditions(terminal);
        info!(
            n_spl = problem.n_spl(),
            n_constraints = problem.constraints().len(),
            "problem constructed"
        );
        self.problem = Some(problem);
        self.phase = CyclePhase::Constrained;
        Ok(())
    }

    /// Bind the horizon and the current prediction to the problem
    pub fn parameterize(&mut self) -> PlanningResult<()> {
        self.expect_phase(&[CyclePhase::Constrained, CyclePhase::Predicted], "parameterize")?;
        let parameters = self
            .vehicle
            .set_parameters(&self.prediction, self.current_time)?;
        let mut bindings = Bindings {
            parameters,
            ..Bindings::default()
        };
        bindings
            .symbols
            .insert("T".to_string(), self.config.horizon_time);
        if let Some(problem) = &self.problem {
            problem.check_bindings(&bindings)?;
        }
        self.bindings = bindings;
        self.phase = CyclePhase::Parameterized;
        Ok(())
    }

    /// Drop the bindings of the running cycle
    pub fn abandon_cycle(&mut self) -> PlanningResult<()> {
        self.expect_phase(&[CyclePhase::Parameterized], "abandon_cycle")?;
        warn!(time = self.current_time, "cycle abandoned");
        self.bindings = Bindings::default();
        self.phase = CyclePhase::Constrained;
        Ok(())
    }

    /// Solve the bound problem and reconstruct signals over the horizon
    pub fn solve(&mut self) -> PlanningResult<&Signals> {
        self.expect_phase(&[CyclePhase::Parameterized], "solve")?;
        let signals = match self.solve_and_reconstruct() {
            Ok(signals) => signals,
            Err(e) => {
                self.abandon_cycle()?;
                return Err(e);
            }
        };
        self.phase = CyclePhase::Solved;
        Ok(self.signals.insert(signals))
    }

    fn solve_and_reconstruct(&mut self) -> PlanningResult<Signals> {
        let problem = self.problem.as_ref().ok_or_else(|| {
            PlanningError::PhaseError("no problem constructed".to_string())
        })?;
        let guess = self
            .vehicle
            .get_init_spline_value(&self.prediction, &self.basis)?;
        let coeffs = self.solver.solve(problem, &self.bindings, &guess)?;
        if coeffs.len() != self.vehicle.n_spl() {
            return Err(PlanningError::SplineCountMismatch {
                expected: self.vehicle.n_spl(),
                found: coeffs.len(),
            });
        }
        let horizon = self.config.horizon_time;
        let splines = coeffs
            .into_iter()
            .map(|c| Ok(Spline::new(self.basis.clone(), c)?.scaled_domain(horizon)))
            .collect::<PlanningResult<Vec<_>>>()?;
        let signals = self
            .vehicle
            .splines2signals(&splines, &self.config.sample_times())?;
        debug!(
            time = self.current_time,
            samples = signals.n_samples(),
            "signals reconstructed"
        );
        Ok(signals)
    }

    /// Move the prediction one update step along the solved signals
    pub fn update_prediction(&mut self) -> PlanningResult<()> {
        self.expect_phase(&[CyclePhase::Solved], "update_prediction")?;
        let signals = self.signals.as_ref().ok_or_else(|| {
            PlanningError::PhaseError("no signals to predict from".to_string())
        })?;
        self.prediction = signals.interpolate(self.config.update_time)?;
        self.current_time += self.config.update_time;
        self.phase = CyclePhase::Predicted;
        Ok(())
    }

    /// All terminal conditions of the chain hold at the end of the last
    /// reconstructed horizon
    pub fn is_terminated(&self) -> bool {
        self.signals
            .as_ref()
            .map_or(false, |s| self.vehicle.check_terminal_conditions(s))
    }

    /// Parameterize, solve and advance the prediction. Returns whether the
    /// chain has reached its terminal conditions.
    pub fn run_cycle(&mut self) -> PlanningResult<bool> {
        if self.phase == CyclePhase::Uninitialized {
            self.construct()?;
        }
        self.parameterize()?;
        self.solve()?;
        self.update_prediction()?;
        let done = self.is_terminated();
        info!(time = self.current_time, done, "cycle finished");
        Ok(done)
    }
}
