//! Trailer hitched to another chain node
//!
//! A trailer adds one spline, its heading half-tangent r = tan(θ/2), and is
//! pulled by the node it wraps through a hitch:
//!
//! ```text
//!   trailer center --l_hitch1-- hitch --l_hitch-- child center
//! ```
//!
//! splines = [r, child splines...]
//! state   = [x, y, θ, child state...]
//! input   = child input
//!
//! The trailer center cannot slip sideways, which ties θ̇ to the hitch
//! velocity. Written in half-tangents the relation is polynomial in the
//! spline coefficients, so the solver never sees a trigonometric function.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::common::{
    merge_parameters, Kinematics, ParameterMap, PlanningError, PlanningResult, Prediction,
    Signals, VehicleNode,
};
use crate::geometry::{segment, Shape};
use crate::optimization::{BoundaryCondition, Expr, Problem, SplineVar, TerminalConstraints};
use crate::spline::{linspace, BSplineBasis, Spline};
use crate::vehicles::holonomic_orient::HolonomicOrient;

/// State components owned by a trailer
const OWN_ST: usize = 3;

/// Trailer options
#[derive(Debug, Clone)]
pub struct TrailerConfig {
    /// Distance between the child center and the hitch [m]
    pub l_hitch: f64,
    /// Distance between the hitch and the trailer center [m]
    pub l_hitch1: f64,
    /// Largest heading difference child - trailer [deg]
    pub tmax: f64,
    /// Smallest heading difference child - trailer [deg]
    pub tmin: f64,
    /// Terminal heading tolerance [rad]
    pub stop_tol: f64,
    /// Relaxation of the no-slip coupling, per unit of horizon time
    pub eps: f64,
    /// Also pin the initial heading rate
    pub impose_initial_rate: bool,
    /// Body outlines in the trailer frame, one `Circle { radius: 0.2 }` by
    /// default. Each shape also sizes its hitch connector.
    pub shapes: Vec<Shape>,
}

impl TrailerConfig {
    pub fn new(l_hitch: f64, l_hitch1: f64) -> Self {
        Self {
            l_hitch,
            l_hitch1,
            tmax: 45.0,
            tmin: -45.0,
            stop_tol: 1e-2,
            eps: 1e-3,
            impose_initial_rate: false,
            shapes: vec![Shape::default()],
        }
    }

    pub fn with_angle_bounds(mut self, tmin: f64, tmax: f64) -> Self {
        self.tmin = tmin;
        self.tmax = tmax;
        self
    }

    pub fn with_stop_tol(mut self, stop_tol: f64) -> Self {
        self.stop_tol = stop_tol;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_initial_rate(mut self, impose: bool) -> Self {
        self.impose_initial_rate = impose;
        self
    }

    pub fn with_shapes(mut self, shapes: Vec<Shape>) -> Self {
        self.shapes = shapes;
        self
    }

    fn validate(&self) -> PlanningResult<()> {
        if !(self.l_hitch > 0.0 && self.l_hitch1 > 0.0) {
            return Err(PlanningError::InvalidParameter(format!(
                "hitch lengths must be positive, got l_hitch={} l_hitch1={}",
                self.l_hitch, self.l_hitch1
            )));
        }
        if !(self.tmin < self.tmax && self.tmin > -180.0 && self.tmax < 180.0) {
            return Err(PlanningError::InvalidParameter(format!(
                "angle bounds [{}, {}] must be ordered within (-180, 180)",
                self.tmin, self.tmax
            )));
        }
        if !(self.eps >= 0.0 && self.stop_tol > 0.0) {
            return Err(PlanningError::InvalidParameter(format!(
                "eps={} and stop_tol={} must be non-negative and positive",
                self.eps, self.stop_tol
            )));
        }
        Ok(())
    }
}

pub struct Trailer {
    config: TrailerConfig,
    child: Box<dyn VehicleNode>,
    prediction: Option<Prediction>,
    theta_t: Option<f64>,
}

impl Trailer {
    pub fn new(child: Box<dyn VehicleNode>, config: TrailerConfig) -> Self {
        Self {
            config,
            child,
            prediction: None,
            theta_t: None,
        }
    }

    /// Trailer pulled by a default holonomic base
    pub fn with_default_leaf(config: TrailerConfig) -> Self {
        Self::new(Box::new(HolonomicOrient::with_defaults()), config)
    }

    pub fn config(&self) -> &TrailerConfig {
        &self.config
    }

    pub fn child(&self) -> &dyn VehicleNode {
        self.child.as_ref()
    }

    pub fn child_mut(&mut self) -> &mut dyn VehicleNode {
        self.child.as_mut()
    }

    /// Whether a terminal heading is required (parking) or the trailer is
    /// only transported
    pub fn has_terminal_spec(&self) -> bool {
        self.theta_t.is_some()
    }

    pub fn terminal_angle(&self) -> Option<f64> {
        self.theta_t
    }

    /// Back to transport mode
    pub fn clear_terminal_conditions(&mut self) {
        self.theta_t = None;
    }

    fn param(&self, name: &str) -> String {
        format!("link{}/{}", self.link_index(), name)
    }

    fn check_splines<T>(&self, splines: &[T]) -> PlanningResult<()> {
        if splines.len() != self.n_spl() {
            return Err(PlanningError::SplineCountMismatch {
                expected: self.n_spl(),
                found: splines.len(),
            });
        }
        Ok(())
    }

    fn check_state(&self, what: &str, len: usize) -> PlanningResult<()> {
        if len != self.n_st() {
            return Err(PlanningError::DimensionMismatch(format!(
                "{} has {} entries, expected {}",
                what,
                len,
                self.n_st()
            )));
        }
        Ok(())
    }

    /// Hitch velocity `(hx, hy) / dh` from the child's kinematics
    fn hitch_velocity(&self, child: &Kinematics) -> (Expr, Expr, Expr) {
        let l = self.config.l_hitch;
        let rc = child.tg_ha.expr();
        let drc = child.tg_ha.derivative().expr();
        let q = (rc.clone().pow(2) + 1.0).pow(2);
        let dh = child.den.clone() * q.clone();
        let hx = child.vx.clone() * q.clone()
            + 4.0 * l * drc.clone() * rc.clone() * child.den.clone();
        let hy = child.vy.clone() * q - 2.0 * l * drc * (1.0 - rc.pow(2)) * child.den.clone();
        (hx, hy, dh)
    }
}

impl VehicleNode for Trailer {
    fn n_spl(&self) -> usize {
        1 + self.child.n_spl()
    }

    fn degree(&self) -> usize {
        3
    }

    fn n_st(&self) -> usize {
        OWN_ST + self.child.n_st()
    }

    fn n_in(&self) -> usize {
        self.child.n_in()
    }

    fn link_index(&self) -> usize {
        self.child.link_index() + 1
    }

    fn init(&self) -> PlanningResult<()> {
        self.config.validate()?;
        self.child.init()
    }

    fn shapes(&self) -> &[Shape] {
        &self.config.shapes
    }

    fn kinematics(&self, splines: &[SplineVar]) -> PlanningResult<Kinematics> {
        self.check_splines(splines)?;
        let child = self.child.kinematics(&splines[1..])?;
        let (hx, hy, dh) = self.hitch_velocity(&child);
        let l1 = self.config.l_hitch1;
        let r = splines[0].expr();
        let dr = splines[0].derivative().expr();
        let q = (r.clone().pow(2) + 1.0).pow(2);
        Ok(Kinematics {
            vx: hx * q.clone() + 4.0 * l1 * dr.clone() * r.clone() * dh.clone(),
            vy: hy * q.clone() - 2.0 * l1 * dr * (1.0 - r.pow(2)) * dh.clone(),
            den: dh * q,
            tg_ha: splines[0],
        })
    }

    fn define_trajectory_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<()> {
        self.check_splines(splines)?;
        debug!(link = self.link_index(), "registering trailer coupling constraints");
        let t = problem.define_symbol("T");
        let child = self.child.kinematics(&splines[1..])?;
        let (hx, hy, dh) = self.hitch_velocity(&child);
        let r = splines[0].expr();
        let dr = splines[0].derivative().expr();

        // no-slip: l1·θ̇ = -sin θ·ḣx + cos θ·ḣy, times (1 + r²)·dh
        let coupling = 2.0 * self.config.l_hitch1 * dr * dh.clone() + 2.0 * r.clone() * hx
            - (1.0 - r.clone().pow(2)) * hy;
        let tolerance = dh * t * self.config.eps;
        problem.define_constraint(coupling.clone() - tolerance.clone(), f64::NEG_INFINITY, 0.0);
        problem.define_constraint(-coupling - tolerance, f64::NEG_INFINITY, 0.0);

        // heading difference with the child, on half-tangents directly
        let rc = child.tg_ha.expr();
        let tg_max = (self.config.tmax.to_radians() / 2.0).tan();
        let tg_min = (self.config.tmin.to_radians() / 2.0).tan();
        problem.define_constraint(rc.clone() - r.clone() - tg_max, f64::NEG_INFINITY, 0.0);
        problem.define_constraint(-rc + r + tg_min, f64::NEG_INFINITY, 0.0);

        self.child.define_trajectory_constraints(problem, &splines[1..])
    }

    fn get_initial_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<Vec<BoundaryCondition>> {
        self.check_splines(splines)?;
        let t = problem.define_symbol("T");
        let tg_ha0 = problem.define_parameter(&self.param("tg_ha0"), 1)?;
        let dtg_ha0 = problem.define_parameter(&self.param("dtg_ha0"), 1)?;
        let mut con = vec![BoundaryCondition::new(splines[0].expr(), tg_ha0.expr())];
        if self.config.impose_initial_rate {
            con.push(BoundaryCondition::new(
                splines[0].derivative().expr(),
                t * dtg_ha0.expr(),
            ));
        }
        con.extend(self.child.get_initial_constraints(problem, &splines[1..])?);
        Ok(con)
    }

    fn get_terminal_constraints(
        &self,
        problem: &mut Problem,
        splines: &[SplineVar],
    ) -> PlanningResult<TerminalConstraints> {
        self.check_splines(splines)?;
        let own = if self.theta_t.is_some() {
            let tg_ha_t = problem.define_parameter(&self.param("tg_haT"), 1)?;
            vec![BoundaryCondition::new(splines[0].expr(), tg_ha_t.expr())]
        } else {
            Vec::new()
        };
        let child = self.child.get_terminal_constraints(problem, &splines[1..])?;
        Ok(child.prepend(own, Vec::new()))
    }

    fn set_initial_conditions(
        &mut self,
        state: &[f64],
        input: Option<&[f64]>,
    ) -> PlanningResult<()> {
        if state.len() != 1 {
            return Err(PlanningError::DimensionMismatch(format!(
                "trailer initial condition is a single heading, got {} values",
                state.len()
            )));
        }
        // nodes are initialized from the inside out
        let child = self.child.prediction().ok_or_else(|| {
            PlanningError::ChildNotInitialized(format!(
                "link {} wraps a node without initial conditions",
                self.link_index()
            ))
        })?;
        let mut full = DVector::zeros(OWN_ST + child.state.len());
        full[2] = state[0];
        full.rows_mut(OWN_ST, child.state.len()).copy_from(&child.state);
        let input = match input {
            Some(u) if u.len() == child.input.len() => DVector::from_column_slice(u),
            Some(u) => {
                return Err(PlanningError::DimensionMismatch(format!(
                    "initial input has {} entries, expected {}",
                    u.len(),
                    child.input.len()
                )))
            }
            None => child.input.clone(),
        };
        self.prediction = Some(Prediction::new(full, input));
        Ok(())
    }

    fn set_terminal_conditions(&mut self, target: &[f64]) -> PlanningResult<()> {
        if target.len() != 1 {
            return Err(PlanningError::DimensionMismatch(format!(
                "trailer terminal condition is a single heading, got {} values",
                target.len()
            )));
        }
        self.theta_t = Some(target[0]);
        Ok(())
    }

    fn has_terminal_conditions(&self) -> bool {
        self.has_terminal_spec()
    }

    fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    fn get_init_spline_value(
        &self,
        prediction: &Prediction,
        basis: &BSplineBasis,
    ) -> PlanningResult<DMatrix<f64>> {
        self.check_state("predicted state", prediction.state.len())?;
        let tg_ha0 = (prediction.state[2] / 2.0).tan();
        let tg_ha_t = self.theta_t.map_or(tg_ha0, |th| (th / 2.0).tan());
        let n = basis.len();
        let child = self
            .child
            .get_init_spline_value(&prediction.tail(OWN_ST)?, basis)?;
        let mut init = DMatrix::zeros(n, 1 + child.ncols());
        init.set_column(0, &DVector::from_vec(linspace(tg_ha0, tg_ha_t, n)));
        init.columns_mut(1, child.ncols()).copy_from(&child);
        Ok(init)
    }

    fn check_terminal_conditions(&self, signals: &Signals) -> bool {
        let own = match self.theta_t {
            None => true,
            Some(theta_t) => match signals.sample_index(-1) {
                Some(k) if signals.state.nrows() >= OWN_ST => {
                    (signals.state[(2, k)] - theta_t).abs() <= self.config.stop_tol
                }
                _ => false,
            },
        };
        let child = match signals.tail(OWN_ST) {
            Ok(child_signals) => self.child.check_terminal_conditions(&child_signals),
            Err(_) => false,
        };
        own && child
    }

    fn set_parameters(
        &self,
        prediction: &Prediction,
        current_time: f64,
    ) -> PlanningResult<ParameterMap> {
        self.check_state("predicted state", prediction.state.len())?;
        let child = self
            .child
            .set_parameters(&prediction.tail(OWN_ST)?, current_time)?;

        let tg_ha0 = (prediction.state[2] / 2.0).tan();
        let dtheta = self.ode(&prediction.state, &prediction.input)?[2];
        let mut parameters = ParameterMap::new();
        parameters.insert(self.param("tg_ha0"), DVector::from_element(1, tg_ha0));
        parameters.insert(
            self.param("dtg_ha0"),
            DVector::from_element(1, 0.5 * dtheta * (1.0 + tg_ha0 * tg_ha0)),
        );
        if let Some(theta_t) = self.theta_t {
            parameters.insert(self.param("tg_haT"), DVector::from_element(1, (theta_t / 2.0).tan()));
        }
        merge_parameters(&mut parameters, child)?;
        debug!(link = self.link_index(), n = parameters.len(), "parameters refreshed");
        Ok(parameters)
    }

    fn ode(&self, state: &DVector<f64>, input: &DVector<f64>) -> PlanningResult<DVector<f64>> {
        self.check_state("state", state.len())?;
        let (l, l1) = (self.config.l_hitch, self.config.l_hitch1);
        let child_state = state.rows(OWN_ST, state.len() - OWN_ST).into_owned();
        let child = self.child.ode(&child_state, input)?;

        let theta_c = child_state[2];
        let dtheta_c = child[2];
        let hx = child[0] + l * theta_c.sin() * dtheta_c;
        let hy = child[1] - l * theta_c.cos() * dtheta_c;

        let theta = state[2];
        let dtheta = (-theta.sin() * hx + theta.cos() * hy) / l1;

        let mut d = DVector::zeros(state.len());
        d[0] = hx + l1 * theta.sin() * dtheta;
        d[1] = hy - l1 * theta.cos() * dtheta;
        d[2] = dtheta;
        d.rows_mut(OWN_ST, child.len()).copy_from(&child);
        Ok(d)
    }

    fn state2pose(&self, state: &DVector<f64>) -> PlanningResult<DVector<f64>> {
        self.check_state("state", state.len())?;
        let child = self
            .child
            .state2pose(&state.rows(OWN_ST, state.len() - OWN_ST).into_owned())?;
        let mut pose = DVector::zeros(OWN_ST + child.len());
        pose.rows_mut(0, OWN_ST).copy_from(&state.rows(0, OWN_ST));
        pose.rows_mut(OWN_ST, child.len()).copy_from(&child);
        Ok(pose)
    }

    fn splines2signals(&self, splines: &[Spline], time: &[f64]) -> PlanningResult<Signals> {
        self.check_splines(splines)?;
        let child = self.child.splines2signals(&splines[1..], time)?;
        let (l, l1) = (self.config.l_hitch, self.config.l_hitch1);
        let r = splines[0].sample(time);
        let dr = splines[0].derivative().sample(time);
        let n = time.len();

        let stack = |child_rows: &DMatrix<f64>| {
            let mut m = DMatrix::zeros(OWN_ST + child_rows.nrows(), n);
            m.rows_mut(OWN_ST, child_rows.nrows()).copy_from(child_rows);
            m
        };
        let mut state = stack(&child.state);
        let mut pose = stack(&child.pose);
        let mut aux = DMatrix::zeros(2, n);
        for k in 0..n {
            let theta = 2.0 * r[k].atan2(1.0);
            let theta_c = child.state[(2, k)];
            let x = child.state[(0, k)] - l * theta_c.cos() - l1 * theta.cos();
            let y = child.state[(1, k)] - l * theta_c.sin() - l1 * theta.sin();
            for m in [&mut state, &mut pose] {
                m[(0, k)] = x;
                m[(1, k)] = y;
                m[(2, k)] = theta;
            }
            aux[(0, k)] = r[k];
            aux[(1, k)] = dr[k];
        }

        let mut auxiliary = child.auxiliary;
        auxiliary.insert(format!("r{}", self.link_index()), aux);
        Ok(Signals {
            time: time.to_vec(),
            state,
            pose,
            input: child.input,
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
        if signals.pose.nrows() < OWN_ST + 3 {
            return Err(PlanningError::DimensionMismatch(format!(
                "pose has {} rows, a trailer needs its own and its child's heading",
                signals.pose.nrows()
            )));
        }
        let pose = signals.pose_at(k);
        let theta_c = signals.pose[(OWN_ST + 2, k)];
        let mut ret = Vec::with_capacity(3 * self.config.shapes.len());
        for shape in &self.config.shapes {
            let offset = shape.connector_offset()?;
            ret.push(shape.draw(&pose));
            // shape edge to hitch, then hitch to child center
            let edge = pose.ahead(offset);
            let hitch = pose.ahead(self.config.l_hitch1);
            let child_center = (
                hitch.0 + self.config.l_hitch * theta_c.cos(),
                hitch.1 + self.config.l_hitch * theta_c.sin(),
            );
            ret.push(segment(edge, hitch));
            ret.push(segment(hitch, child_center));
        }
        let child_signals = signals.tail(OWN_ST)?;
        ret.extend(self.child.draw(&child_signals, t)?);
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::Bindings;
    use crate::vehicles::build_chain;
    use rand::Rng;

    const HORIZON: f64 = 4.0;
    const L_HITCH: f64 = 0.2;
    const L_HITCH1: f64 = 0.2;

    /// Leaf motion x = 0.3t, y = 0.05t² - 0.005t³, tan(θ/2) = 0.05t
    fn leaf_input(t: f64) -> DVector<f64> {
        let r0 = 0.05 * t;
        DVector::from_vec(vec![0.3, 0.1 * t - 0.015 * t * t, 0.1 / (1.0 + r0 * r0)])
    }

    /// Leaf at the origin wrapped in trailers with headings `thetas`,
    /// innermost first
    fn initialized_chain(thetas: &[f64]) -> Box<dyn VehicleNode> {
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
        let links = thetas
            .iter()
            .map(|&th| (TrailerConfig::new(L_HITCH, L_HITCH1), th))
            .collect();
        build_chain(Box::new(leaf), links).unwrap()
    }

    /// Chain state with every trailer placed consistently behind its child
    fn consistent_state(thetas: &[f64]) -> DVector<f64> {
        let mut links: Vec<(f64, f64, f64)> = vec![(0.0, 0.0, 0.0)];
        for &th in thetas {
            let (xc, yc, thc) = links[links.len() - 1];
            links.push((
                xc - L_HITCH * thc.cos() - L_HITCH1 * th.cos(),
                yc - L_HITCH * thc.sin() - L_HITCH1 * th.sin(),
                th,
            ));
        }
        let values: Vec<f64> = links
            .iter()
            .rev()
            .flat_map(|&(x, y, th)| vec![x, y, th])
            .collect();
        DVector::from_vec(values)
    }

    fn rk4_step(
        chain: &dyn VehicleNode,
        x: &DVector<f64>,
        u0: &DVector<f64>,
        um: &DVector<f64>,
        u1: &DVector<f64>,
        dt: f64,
    ) -> DVector<f64> {
        let k1 = chain.ode(x, u0).unwrap();
        let k2 = chain.ode(&(x + &k1 * (0.5 * dt)), um).unwrap();
        let k3 = chain.ode(&(x + &k2 * (0.5 * dt)), um).unwrap();
        let k4 = chain.ode(&(x + &k3 * dt), u1).unwrap();
        x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
    }

    /// Splines over [0, HORIZON] of a trajectory that satisfies the hitch
    /// kinematics, obtained by integrating the chain dynamics
    fn reference_splines(chain: &dyn VehicleNode, thetas: &[f64]) -> Vec<Spline> {
        let n_links = thetas.len();
        let n_st = chain.n_st();
        let dt = 1e-3;
        let mut x = consistent_state(thetas);
        let mut times = Vec::new();
        let mut samples = vec![Vec::new(); chain.n_spl()];
        for step in 0..=4000 {
            let t = step as f64 * dt;
            if step % 10 == 0 {
                times.push(t);
                for i in 0..n_links {
                    samples[i].push((x[3 * i + 2] / 2.0).tan());
                }
                samples[n_links].push(x[n_st - 3]);
                samples[n_links + 1].push(x[n_st - 2]);
                samples[n_links + 2].push((x[n_st - 1] / 2.0).tan());
            }
            x = rk4_step(
                chain,
                &x,
                &leaf_input(t),
                &leaf_input(t + 0.5 * dt),
                &leaf_input(t + dt),
                dt,
            );
        }
        let basis = BSplineBasis::uniform(3, 40).scaled(HORIZON);
        samples
            .iter()
            .map(|values| Spline::fit(basis.clone(), &times, values).unwrap())
            .collect()
    }

    /// Same coefficients on the normalised horizon
    fn normalised(splines: &[Spline]) -> Vec<Spline> {
        let basis = BSplineBasis::uniform(3, 40);
        splines
            .iter()
            .map(|s| Spline::new(basis.clone(), s.coeffs().clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_concrete_two_link_scenario() {
        let chain = initialized_chain(&[0.0]);
        let pred = chain.prediction().unwrap();
        assert_eq!(pred.state, DVector::zeros(6));
        assert_eq!(pred.input, DVector::zeros(3));
        chain.init().unwrap();
    }

    #[test]
    fn test_default_shape_is_small_circle() {
        let config = TrailerConfig::new(0.3, 0.4);
        assert_eq!(config.shapes, vec![Shape::Circle { radius: 0.2 }]);
        assert!(!config.impose_initial_rate);
    }

    #[test]
    fn test_spline_count_grows_by_one_per_link() {
        for n_links in 0..4 {
            let chain = initialized_chain(&vec![0.0; n_links]);
            assert_eq!(chain.n_spl(), 3 + n_links);
            assert_eq!(chain.n_st(), 3 * (n_links + 1));
            assert_eq!(chain.link_index(), n_links);
        }
    }

    #[test]
    fn test_child_must_be_initialized_first() {
        let mut trailer = Trailer::with_default_leaf(TrailerConfig::new(L_HITCH, L_HITCH1));
        let err = trailer.set_initial_conditions(&[0.0], None).unwrap_err();
        assert!(matches!(err, PlanningError::ChildNotInitialized(_)));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_invalid_hitch_rejected_by_init() {
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
        let trailer = Trailer::new(Box::new(leaf), TrailerConfig::new(0.0, 0.2));
        assert!(matches!(trailer.init(), Err(PlanningError::InvalidParameter(_))));
    }

    #[test]
    fn test_init_spline_value_spans_start_and_target() {
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
        let mut trailer = Trailer::new(Box::new(leaf), TrailerConfig::new(L_HITCH, L_HITCH1));
        trailer.set_initial_conditions(&[0.3], None).unwrap();
        let basis = BSplineBasis::uniform(3, 10);

        let guess = trailer
            .get_init_spline_value(trailer.prediction().unwrap(), &basis)
            .unwrap();
        assert_eq!(guess.nrows(), basis.len());
        assert_eq!(guess.ncols(), 4);
        let r = Spline::new(basis.clone(), guess.column(0).into_owned()).unwrap();
        for &tau in &linspace(0.0, 1.0, 11) {
            assert!((2.0 * r.eval(tau).atan() - 0.3).abs() < 1e-12);
        }

        trailer.set_terminal_conditions(&[-0.2]).unwrap();
        let guess = trailer
            .get_init_spline_value(trailer.prediction().unwrap(), &basis)
            .unwrap();
        let r = Spline::new(basis, guess.column(0).into_owned()).unwrap();
        assert!((2.0 * r.eval(0.0).atan() - 0.3).abs() < 1e-12);
        assert!((2.0 * r.eval(1.0).atan() + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_signals_follow_ode() {
        for thetas in [vec![0.1], vec![0.1, -0.15]] {
            let chain = initialized_chain(&thetas);
            let splines = reference_splines(chain.as_ref(), &thetas);
            let time = linspace(0.0, HORIZON, 401);
            let signals = chain.splines2signals(&splines, &time).unwrap();
            assert_eq!(signals.state.nrows(), chain.n_st());
            assert_eq!(signals.input.nrows(), 3);

            let mut x = signals.state.column(0).into_owned();
            for k in 0..time.len() - 1 {
                let u0 = signals.input.column(k).into_owned();
                let u1 = signals.input.column(k + 1).into_owned();
                let um = (&u0 + &u1) * 0.5;
                x = rk4_step(chain.as_ref(), &x, &u0, &um, &u1, time[k + 1] - time[k]);
                let err = (&x - signals.state.column(k + 1)).norm();
                assert!(err < 1e-3, "sample {} drifted by {}", k + 1, err);
            }
        }
    }

    #[test]
    fn test_hitch_moves_rigidly_with_both_links() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let thetas: Vec<f64> = (0..2).map(|_| rng.gen_range(-0.6..0.6)).collect();
            let chain = initialized_chain(&thetas);
            let x = consistent_state(&thetas);
            let u = DVector::from_fn(3, |_, _| rng.gen_range(-0.5..0.5));
            let d = chain.ode(&x, &u).unwrap();
            for i in 0..thetas.len() {
                let (th, dth) = (x[3 * i + 2], d[3 * i + 2]);
                let (thc, dthc) = (x[3 * i + 5], d[3 * i + 5]);
                // hitch velocity seen from the trailer and from its child
                let behind = (
                    d[3 * i] - L_HITCH1 * th.sin() * dth,
                    d[3 * i + 1] + L_HITCH1 * th.cos() * dth,
                );
                let ahead = (
                    d[3 * i + 3] + L_HITCH * thc.sin() * dthc,
                    d[3 * i + 4] - L_HITCH * thc.cos() * dthc,
                );
                assert!((behind.0 - ahead.0).abs() < 1e-12);
                assert!((behind.1 - ahead.1).abs() < 1e-12);
                // no sideways slip of the trailer center
                assert!((-th.sin() * d[3 * i] + th.cos() * d[3 * i + 1]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_pose_matches_state() {
        let chain = initialized_chain(&[0.1, -0.15]);
        let x = consistent_state(&[0.1, -0.15]);
        assert_eq!(chain.state2pose(&x).unwrap(), x);
    }

    #[test]
    fn test_coupling_constraints_hold_on_feasible_motion() {
        for thetas in [vec![0.1], vec![0.1, -0.15]] {
            let chain = initialized_chain(&thetas);
            let splines = normalised(&reference_splines(chain.as_ref(), &thetas));
            let mut problem = Problem::new(chain.n_spl());
            let vars = problem.spline_vars();
            chain.define_trajectory_constraints(&mut problem, &vars).unwrap();
            assert_eq!(problem.constraints().len(), 10 + 4 * thetas.len());

            let mut bindings = Bindings::default();
            bindings.symbols.insert("T".to_string(), HORIZON);
            let taus = linspace(0.0, 1.0, 101);
            let violation = problem.max_violation(&splines, &bindings, &taus).unwrap();
            assert!(violation < 1e-9, "violation {}", violation);

            // a trailer heading frozen at 0.5 cannot follow the motion
            let mut frozen = splines.clone();
            frozen[0] = Spline::new(
                frozen[0].basis().clone(),
                DVector::from_element(frozen[0].coeffs().len(), 0.5),
            )
            .unwrap();
            let violation = problem.max_violation(&frozen, &bindings, &taus).unwrap();
            assert!(violation > 1e-3);
        }
    }

    #[test]
    fn test_angle_bounds() {
        let chain = initialized_chain(&[0.0]);
        let mut problem = Problem::new(chain.n_spl());
        let vars = problem.spline_vars();
        chain.define_trajectory_constraints(&mut problem, &vars).unwrap();
        let basis = BSplineBasis::uniform(3, 4);
        let constant = |c: f64| Spline::new(basis.clone(), DVector::from_element(basis.len(), c)).unwrap();
        let mut bindings = Bindings::default();
        bindings.symbols.insert("T".to_string(), 1.0);

        // parked, trailer heading 60° off the base: only the angle bound is hit
        let tg = (60f64.to_radians() / 2.0).tan();
        let splines = vec![constant(tg), constant(0.0), constant(0.0), constant(0.0)];
        let violation = problem.max_violation(&splines, &bindings, &[0.0, 0.5, 1.0]).unwrap();
        let expected = tg - (45f64.to_radians() / 2.0).tan();
        assert!((violation - expected).abs() < 1e-12);

        let splines = vec![constant(0.1), constant(0.0), constant(0.0), constant(0.0)];
        let violation = problem.max_violation(&splines, &bindings, &[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(violation, 0.0);
    }

    #[test]
    fn test_boundary_constraints_order_and_presence() {
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
        leaf.set_terminal_conditions(&[1.0, 0.0, 0.0]).unwrap();
        let config = TrailerConfig::new(L_HITCH, L_HITCH1).with_initial_rate(true);
        let mut trailer = Trailer::new(Box::new(leaf), config);
        trailer.set_initial_conditions(&[0.0], None).unwrap();

        let mut problem = Problem::new(trailer.n_spl());
        let vars = problem.spline_vars();
        let init = trailer.get_initial_constraints(&mut problem, &vars).unwrap();
        assert_eq!(init.len(), 2 + 6);
        assert_eq!(init[0].lhs, vars[0].expr());
        assert_eq!(init[1].lhs, vars[0].derivative().expr());

        // transported trailer: only the base's conditions
        let term = trailer.get_terminal_constraints(&mut problem, &vars).unwrap();
        assert_eq!(term.values.len(), 3);
        assert!(!problem.has_parameter("link1/tg_haT"));

        trailer.set_terminal_conditions(&[0.5]).unwrap();
        let mut problem = Problem::new(trailer.n_spl());
        let term = trailer.get_terminal_constraints(&mut problem, &vars).unwrap();
        assert_eq!(term.values.len(), 4);
        assert_eq!(term.derivatives.len(), 3);
        assert_eq!(term.values[0].lhs, vars[0].expr());
        assert!(problem.has_parameter("link1/tg_haT"));
    }

    #[test]
    fn test_terminal_check_folds_over_chain() {
        let thetas = [0.1];
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
        let config = TrailerConfig::new(L_HITCH, L_HITCH1);
        let tol = config.stop_tol;
        let mut trailer = Trailer::new(Box::new(leaf), config);
        trailer.set_initial_conditions(&thetas, None).unwrap();

        let splines = reference_splines(&trailer, &thetas);
        let signals = trailer
            .splines2signals(&splines, &linspace(0.0, HORIZON, 41))
            .unwrap();
        let last = signals.state.column(40).into_owned();
        assert!(trailer.check_terminal_conditions(&signals));

        trailer
            .child_mut()
            .set_terminal_conditions(&[last[3], last[4], last[5]])
            .unwrap();
        trailer.set_terminal_conditions(&[last[2] + 0.5 * tol]).unwrap();
        assert!(trailer.check_terminal_conditions(&signals));

        // base within tolerance, trailer off by twice the tolerance
        trailer.set_terminal_conditions(&[last[2] + 2.0 * tol]).unwrap();
        assert!(!trailer.check_terminal_conditions(&signals));

        // trailer within tolerance, base off
        trailer.set_terminal_conditions(&[last[2]]).unwrap();
        trailer
            .child_mut()
            .set_terminal_conditions(&[last[3] + 1.0, last[4], last[5]])
            .unwrap();
        assert!(!trailer.check_terminal_conditions(&signals));

        trailer.clear_terminal_conditions();
        assert!(!trailer.has_terminal_spec());
        assert_eq!(trailer.terminal_angle(), None);
    }

    #[test]
    fn test_parameter_names_unique_across_chain() {
        let thetas = [0.0, 0.1, -0.1];
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
        leaf.set_terminal_conditions(&[2.0, 1.0, 0.0]).unwrap();
        let mut node: Box<dyn VehicleNode> = Box::new(leaf);
        for &th in &thetas {
            let mut link = Trailer::new(node, TrailerConfig::new(L_HITCH, L_HITCH1));
            link.set_initial_conditions(&[th], None).unwrap();
            link.set_terminal_conditions(&[0.0]).unwrap();
            node = Box::new(link);
        }

        let parameters = node.set_parameters(node.prediction().unwrap(), 0.0).unwrap();
        // three per trailer, three for the base
        assert_eq!(parameters.len(), 3 * 3 + 3);
        for k in 1..=3 {
            assert!(parameters.contains_key(&format!("link{}/tg_ha0", k)));
        }

        let mut problem = Problem::new(node.n_spl());
        let vars = problem.spline_vars();
        let init = node.get_initial_constraints(&mut problem, &vars).unwrap();
        problem.add_initial_conditions(init);
        let term = node.get_terminal_constraints(&mut problem, &vars).unwrap();
        problem.add_terminal_conditions(term);
        let bindings = Bindings {
            symbols: [("T".to_string(), 1.0)].into_iter().collect(),
            parameters,
        };
        problem.check_bindings(&bindings).unwrap();
    }

    #[test]
    fn test_initial_rate_parameter_matches_ode() {
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], Some(&[0.0, 0.4, 0.0][..])).unwrap();
        let mut trailer = Trailer::new(Box::new(leaf), TrailerConfig::new(L_HITCH, L_HITCH1));
        trailer.set_initial_conditions(&[0.0], None).unwrap();
        let pred = trailer.prediction().unwrap().clone();
        assert_eq!(pred.input[1], 0.4);

        // sideways pull on a straight trailer turns it at v / l_hitch1
        let parameters = trailer.set_parameters(&pred, 0.0).unwrap();
        assert!((parameters["link1/dtg_ha0"][0] - 0.5 * 0.4 / L_HITCH1).abs() < 1e-12);
        assert_eq!(parameters["link1/tg_ha0"][0], 0.0);
    }

    #[test]
    fn test_draw_entries() {
        let thetas = [0.1];
        let chain = initialized_chain(&thetas);
        let splines = reference_splines(chain.as_ref(), &thetas);
        let signals = chain
            .splines2signals(&splines, &linspace(0.0, HORIZON, 41))
            .unwrap();

        for t in [0, 20, -1] {
            let lines = chain.draw(&signals, t).unwrap();
            // outline + two connectors for the trailer, outline for the base
            assert_eq!(lines.len(), 3 + 1);
            assert!(lines.iter().all(|l| l.nrows() == 2 && l.ncols() >= 2));

            // the hitch bar ends on the base center
            let k = signals.sample_index(t).unwrap();
            let bar = &lines[2];
            assert!((bar[(0, 1)] - signals.pose[(3, k)]).abs() < 1e-9);
            assert!((bar[(1, 1)] - signals.pose[(4, k)]).abs() < 1e-9);
        }
        assert!(chain.draw(&signals, 41).is_err());
    }

    #[test]
    fn test_draw_unsupported_shape() {
        let mut leaf = HolonomicOrient::with_defaults();
        leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
        let polygon = Shape::Polygon {
            vertices: vec![(0.1, 0.0), (-0.1, 0.1), (-0.1, -0.1)],
        };
        let config = TrailerConfig::new(L_HITCH, L_HITCH1).with_shapes(vec![polygon]);
        let mut trailer = Trailer::new(Box::new(leaf), config);
        trailer.set_initial_conditions(&[0.0], None).unwrap();

        let basis = BSplineBasis::uniform(3, 4);
        let splines: Vec<Spline> = (0..4)
            .map(|_| Spline::new(basis.clone(), DVector::zeros(basis.len())).unwrap())
            .collect();
        let signals = trailer.splines2signals(&splines, &[0.0, 1.0]).unwrap();
        assert!(matches!(
            trailer.draw(&signals, 0),
            Err(PlanningError::UnsupportedShape(_))
        ));
    }
}
