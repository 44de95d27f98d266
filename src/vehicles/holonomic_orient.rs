//! Holonomic vehicle with an orientation
//!
//! Innermost node of every chain. It moves freely in the plane and turns
//! independently of its translation.
//!
//! splines = [x, y, tan(θ/2)]
//! state   = [x, y, θ]
//! input   = [ẋ, ẏ, θ̇]

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::common::{
    Kinematics, ParameterMap, PlanningError, PlanningResult, Prediction, Signals, VehicleNode,
};
use crate::geometry::Shape;
use crate::optimization::{BoundaryCondition, Expr, Problem, SplineVar, TerminalConstraints};
use crate::spline::{linspace, BSplineBasis, Spline};

const N_SPL: usize = 3;
const N_ST: usize = 3;
const N_IN: usize = 3;

/// Options of the holonomic base
#[derive(Debug, Clone)]
pub struct HolonomicOrientConfig {
    /// Velocity bounds per axis [m/s]
    pub vmin: f64,
    pub vmax: f64,
    /// Acceleration bounds per axis [m/s^2]
    pub amin: f64,
    pub amax: f64,
    /// Turn rate bounds [deg/s]
    pub wmin: f64,
    pub wmax: f64,
    /// Terminal pose tolerance
    pub stop_tol: f64,
    /// Body outlines in the vehicle frame, one `Circle { radius: 0.2 }` by default
    pub shapes: Vec<Shape>,
}

impl Default for HolonomicOrientConfig {
    fn default() -> Self {
        Self {
            vmin: -0.5,
            vmax: 0.5,
            amin: -1.0,
            amax: 1.0,
            wmin: -30.0,
            wmax: 30.0,
            stop_tol: 1e-2,
            shapes: vec![Shape::default()],
        }
    }
}

impl HolonomicOrientConfig {
    pub fn with_velocity_bounds(mut self, vmin: f64, vmax: f64) -> Self {
        self.vmin = vmin;
        self.vmax = vmax;
        self
    }

    pub fn with_acceleration_bounds(mut self, amin: f64, amax: f64) -> Self {
        self.amin = amin;
        self.amax = amax;
        self
    }

    pub fn with_turn_rate_bounds(mut self, wmin: f64, wmax: f64) -> Self {
        self.wmin = wmin;
        self.wmax = wmax;
        self
    }

    pub fn with_stop_tol(mut self, stop_tol: f64) -> Self {
        self.stop_tol = stop_tol;
        self
    }

    pub fn with_shapes(mut self, shapes: Vec<Shape>) -> Self {
        self.shapes = shapes;
        self
    }

    fn validate(&self) -> PlanningResult<()> {
        let ordered = [
            ("velocity", self.vmin, self.vmax),
            ("acceleration", self.amin, self.amax),
            ("turn rate", self.wmin, self.wmax),
        ];
        for (what, lo, hi) in ordered {
            if !(lo < hi) {
                return Err(PlanningError::InvalidParameter(format!(
                    "{} bounds [{}, {}] are empty",
                    what, lo, hi
                )));
            }
        }
        if !(self.stop_tol > 0.0) {
            return Err(PlanningError::InvalidParameter(format!(
                "stop_tol must be positive, got {}",
                self.stop_tol
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HolonomicOrient {
    config: HolonomicOrientConfig,
    prediction: Option<Prediction>,
    pose_t: Option<[f64; 3]>,
}

impl HolonomicOrient {
    pub fn new(config: HolonomicOrientConfig) -> Self {
        Self {
            config,
            prediction: None,
            pose_t: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HolonomicOrientConfig::default())
    }

    pub fn config(&self) -> &HolonomicOrientConfig {
        &self.config
    }

    pub fn terminal_pose(&self) -> Option<[f64; 3]> {
        self.pose_t
    }

    fn param(&self, name: &str) -> String {
        format!("leaf{}/{}", self.link_index(), name)
    }
}

impl Default for HolonomicOrient {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn check_splines<T>(splines: &[T]) -> PlanningResult<()> {
    if splines.len() != N_SPL {
        return Err(PlanningError::SplineCountMismatch {
            expected: N_SPL,
            found: splines.len(),
        });
    }
    Ok(())
}

fn check_len(what: &str, len: usize, expected: usize) -> PlanningResult<()> {
    if len != expected {
        return Err(PlanningError::DimensionMismatch(format!(
            "{} has {} entries, expected {}",
            what, len, expected
        )));
    }
    Ok(())
}

impl VehicleNode for HolonomicOrient {
    fn n_spl(&self) -> usize {
        N_SPL
    }

    fn degree(&self) -> usize {
        3
    }

    fn n_st(&self) -> usize {
        N_ST
    }

    fn n_in(&self) -> usize {
        N_IN
    }

    fn link_index(&self) -> usize {
        0
    }

    fn init(&self) -> PlanningResult<()> {
        self.config.validate()
    }

    fn shapes(&self) -> &[Shape] {
        &self.config.shapes
    }

    fn kinematics(&self, splines: &[SplineVar]) -> PlanningResult<Kinematics> {
        check_splines(splines)?;
        Ok(Kinematics {
            vx: splines[0].derivative().expr(),
            vy: splines[1].derivative().expr(),
            den: Expr::Const(1.0),
            tg_ha: splines[2],
        })
    }

    fn define_trajectory_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<()> {
        check_splines(splines)?;
        debug!("registering holonomic base constraints");
        let t = problem.define_symbol("T");
        let c = &self.config;
        let (x, y, r) = (splines[0], splines[1], splines[2]);

        for axis in [x, y] {
            let v = axis.derivative().expr();
            let a = axis.derivative().derivative().expr();
            problem.define_constraint(v.clone() - t.clone() * c.vmax, f64::NEG_INFINITY, 0.0);
            problem.define_constraint(-v + t.clone() * c.vmin, f64::NEG_INFINITY, 0.0);
            let t2 = t.clone().pow(2);
            problem.define_constraint(a.clone() - t2.clone() * c.amax, f64::NEG_INFINITY, 0.0);
            problem.define_constraint(-a + t2 * c.amin, f64::NEG_INFINITY, 0.0);
        }

        // θ̇ = 2ṙ / (1 + r²), bounded without trigonometry
        let two_dr = 2.0 * r.derivative().expr();
        let one_r2 = r.expr().pow(2) + 1.0;
        let (wmin, wmax) = (c.wmin.to_radians(), c.wmax.to_radians());
        problem.define_constraint(
            two_dr.clone() - t.clone() * wmax * one_r2.clone(),
            f64::NEG_INFINITY,
            0.0,
        );
        problem.define_constraint(-two_dr + t * wmin * one_r2, f64::NEG_INFINITY, 0.0);
        Ok(())
    }

    fn get_initial_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<Vec<BoundaryCondition>> {
        check_splines(splines)?;
        let t = problem.define_symbol("T");
        let state0 = problem.define_parameter(&self.param("state0"), N_ST)?;
        let input0 = problem.define_parameter(&self.param("input0"), N_IN)?;
        let mut con = Vec::with_capacity(2 * N_SPL);
        for (k, s) in splines.iter().enumerate() {
            con.push(BoundaryCondition::new(s.expr(), state0.at(k)));
        }
        for (k, s) in splines.iter().enumerate() {
            con.push(BoundaryCondition::new(
                s.derivative().expr(),
                t.clone() * input0.at(k),
            ));
        }
        Ok(con)
    }

    fn get_terminal_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<TerminalConstraints> {
        check_splines(splines)?;
        if self.pose_t.is_none() {
            return Ok(TerminalConstraints::default());
        }
        let pose_t = problem.define_parameter(&self.param("poseT"), N_ST)?;
        Ok(TerminalConstraints {
            values: splines
                .iter()
                .enumerate()
                .map(|(k, s)| BoundaryCondition::new(s.expr(), pose_t.at(k)))
                .collect(),
            derivatives: splines
                .iter()
                .map(|s| BoundaryCondition::new(s.derivative().expr(), Expr::Const(0.0)))
                .collect(),
        })
    }

    fn set_initial_conditions(
        &mut self,
        state: &[f64],
        input: Option<&[f64]>,
    ) -> PlanningResult<()> {
        check_len("initial state", state.len(), N_ST)?;
        let input = match input {
            Some(u) => {
                check_len("initial input", u.len(), N_IN)?;
                DVector::from_column_slice(u)
            }
            None => DVector::zeros(N_IN),
        };
        self.prediction = Some(Prediction::new(DVector::from_column_slice(state), input));
        Ok(())
    }

    fn set_terminal_conditions(&mut self, target: &[f64]) -> PlanningResult<()> {
        check_len("terminal pose", target.len(), N_ST)?;
        self.pose_t = Some([target[0], target[1], target[2]]);
        Ok(())
    }

    fn has_terminal_conditions(&self) -> bool {
        self.pose_t.is_some()
    }

    fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    fn get_init_spline_value(
        &self,
        prediction: &Prediction,
        basis: &BSplineBasis,
    ) -> PlanningResult<DMatrix<f64>> {
        check_len("predicted state", prediction.state.len(), N_ST)?;
        let s = &prediction.state;
        let start = [s[0], s[1], (s[2] / 2.0).tan()];
        let end = match self.pose_t {
            Some(p) => [p[0], p[1], (p[2] / 2.0).tan()],
            None => start,
        };
        let n = basis.len();
        let mut init = DMatrix::zeros(n, N_SPL);
        for k in 0..N_SPL {
            init.set_column(k, &DVector::from_vec(linspace(start[k], end[k], n)));
        }
        Ok(init)
    }

    fn check_terminal_conditions(&self, signals: &Signals) -> bool {
        let pose_t = match self.pose_t {
            Some(p) => p,
            None => return true,
        };
        let k = match signals.sample_index(-1) {
            Some(k) if signals.state.nrows() >= N_ST => k,
            _ => return false,
        };
        let err = (0..N_ST)
            .map(|i| (signals.state[(i, k)] - pose_t[i]).powi(2))
            .sum::<f64>()
            .sqrt();
        err <= self.config.stop_tol
    }

    fn set_parameters(
        &self,
        prediction: &Prediction,
        _current_time: f64,
    ) -> PlanningResult<ParameterMap> {
        check_len("predicted state", prediction.state.len(), N_ST)?;
        check_len("predicted input", prediction.input.len(), N_IN)?;
        let (s, u) = (&prediction.state, &prediction.input);
        let tg_ha0 = (s[2] / 2.0).tan();
        let mut parameters = ParameterMap::new();
        parameters.insert(
            self.param("state0"),
            DVector::from_vec(vec![s[0], s[1], tg_ha0]),
        );
        parameters.insert(
            self.param("input0"),
            DVector::from_vec(vec![u[0], u[1], 0.5 * u[2] * (1.0 + tg_ha0 * tg_ha0)]),
        );
        if let Some(p) = self.pose_t {
            parameters.insert(
                self.param("poseT"),
                DVector::from_vec(vec![p[0], p[1], (p[2] / 2.0).tan()]),
            );
        }
        Ok(parameters)
    }

    fn ode(&self, state: &DVector<f64>, input: &DVector<f64>) -> PlanningResult<DVector<f64>> {
        check_len("state", state.len(), N_ST)?;
        check_len("input", input.len(), N_IN)?;
        Ok(input.clone())
    }

    fn state2pose(&self, state: &DVector<f64>) -> PlanningResult<DVector<f64>> {
        check_len("state", state.len(), N_ST)?;
        Ok(state.clone())
    }

    fn splines2signals(&self, splines: &[Spline], time: &[f64]) -> PlanningResult<Signals> {
        check_splines(splines)?;
        let n = time.len();
        let x = splines[0].sample(time);
        let y = splines[1].sample(time);
        let r = splines[2].sample(time);
        let dx = splines[0].derivative().sample(time);
        let dy = splines[1].derivative().sample(time);
        let dr = splines[2].derivative().sample(time);

        let mut state = DMatrix::zeros(N_ST, n);
        let mut input = DMatrix::zeros(N_IN, n);
        let mut aux = DMatrix::zeros(2, n);
        for k in 0..n {
            state[(0, k)] = x[k];
            state[(1, k)] = y[k];
            state[(2, k)] = 2.0 * r[k].atan2(1.0);
            input[(0, k)] = dx[k];
            input[(1, k)] = dy[k];
            input[(2, k)] = 2.0 * dr[k] / (1.0 + r[k] * r[k]);
            aux[(0, k)] = r[k];
            aux[(1, k)] = dr[k];
        }
        let mut auxiliary = BTreeMap::new();
        auxiliary.insert(format!("r{}", self.link_index()), aux);
        Ok(Signals {
            time: time.to_vec(),
            pose: state.clone(),
            state,
            input,
            auxiliary,
        })
    }

    fn draw(&self, signals: &Signals, t: isize) -> PlanningResult<Vec<DMatrix<f64>>> {
        let k = signals.sample_index(t).ok_or_else(|| {
            PlanningError::DimensionMismatch(format!(
                "sample {} out of range for {} samples",
                t,
                signals.n_samples()
            ))
        })?;
        if signals.pose.nrows() < N_ST {
            return Err(PlanningError::DimensionMismatch(format!(
                "pose has {} rows, expected {}",
                signals.pose.nrows(),
                N_ST
            )));
        }
        let pose = signals.pose_at(k);
        Ok(self.config.shapes.iter().map(|s| s.draw(&pose)).collect())
    }
}
