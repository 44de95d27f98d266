//! Symbolic expressions over spline variables, parameters and symbols
//!
//! Constraints are kept as small expression trees so that the solver adapter
//! can differentiate or code-generate them, and so that they can be evaluated
//! numerically for checks.

use std::collections::BTreeMap;
use std::ops::{Add, Mul, Neg, Sub};

use crate::common::{ParameterMap, PlanningError, PlanningResult};
use crate::spline::Spline;

/// Handle on one trajectory spline (or one of its derivatives)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplineVar {
    pub index: usize,
    pub derivative: usize,
}

impl SplineVar {
    pub fn new(index: usize) -> Self {
        Self { index, derivative: 0 }
    }

    pub fn derivative(&self) -> SplineVar {
        SplineVar {
            index: self.index,
            derivative: self.derivative + 1,
        }
    }

    pub fn expr(&self) -> Expr {
        Expr::Spline {
            index: self.index,
            derivative: self.derivative,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Symbol(String),
    Parameter { name: String, index: usize },
    Spline { index: usize, derivative: usize },
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Pow(Box<Expr>, u32),
}

impl Expr {
    pub fn pow(self, exponent: u32) -> Expr {
        match (self, exponent) {
            (_, 0) => Expr::Const(1.0),
            (e, 1) => e,
            (Expr::Const(c), n) => Expr::Const(c.powi(n as i32)),
            (e, n) => Expr::Pow(Box::new(e), n),
        }
    }

    /// Numeric value at normalised time `tau`
    pub fn eval(&self, ctx: &EvalContext<'_>, tau: f64) -> PlanningResult<f64> {
        Ok(match self {
            Expr::Const(c) => *c,
            Expr::Symbol(name) => ctx.symbol(name)?,
            Expr::Parameter { name, index } => ctx.parameter(name, *index)?,
            Expr::Spline { index, derivative } => ctx.spline(*index, *derivative)?.eval(tau),
            Expr::Add(a, b) => a.eval(ctx, tau)? + b.eval(ctx, tau)?,
            Expr::Mul(a, b) => a.eval(ctx, tau)? * b.eval(ctx, tau)?,
            Expr::Neg(a) => -a.eval(ctx, tau)?,
            Expr::Pow(a, n) => a.eval(ctx, tau)?.powi(*n as i32),
        })
    }

    /// Highest spline derivative order the expression refers to
    pub fn max_derivative(&self) -> usize {
        match self {
            Expr::Spline { derivative, .. } => *derivative,
            Expr::Add(a, b) | Expr::Mul(a, b) => a.max_derivative().max(b.max_derivative()),
            Expr::Neg(a) | Expr::Pow(a, _) => a.max_derivative(),
            _ => 0,
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
            (Expr::Const(z), e) | (e, Expr::Const(z)) if z == 0.0 => e,
            (a, b) => Expr::Add(Box::new(a), Box::new(b)),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
            (Expr::Const(z), _) | (_, Expr::Const(z)) if z == 0.0 => Expr::Const(0.0),
            (Expr::Const(o), e) | (e, Expr::Const(o)) if o == 1.0 => e,
            (a, b) => Expr::Mul(Box::new(a), Box::new(b)),
        }
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Const(c) => Expr::Const(-c),
            Expr::Neg(e) => *e,
            e => Expr::Neg(Box::new(e)),
        }
    }
}

impl Add<f64> for Expr {
    type Output = Expr;

    fn add(self, rhs: f64) -> Expr {
        self + Expr::Const(rhs)
    }
}

impl Sub<f64> for Expr {
    type Output = Expr;

    fn sub(self, rhs: f64) -> Expr {
        self + Expr::Const(-rhs)
    }
}

impl Mul<f64> for Expr {
    type Output = Expr;

    fn mul(self, rhs: f64) -> Expr {
        self * Expr::Const(rhs)
    }
}

impl Add<Expr> for f64 {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Const(self) + rhs
    }
}

impl Sub<Expr> for f64 {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Const(self) - rhs
    }
}

impl Mul<Expr> for f64 {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Const(self) * rhs
    }
}

/// Numeric values needed to evaluate expressions
pub struct EvalContext<'a> {
    derivatives: Vec<Vec<Spline>>,
    symbols: &'a BTreeMap<String, f64>,
    parameters: &'a ParameterMap,
}

impl<'a> EvalContext<'a> {
    /// Splines on the normalised horizon, derivatives cached up to `max_derivative`
    pub fn new(
        splines: &[Spline],
        max_derivative: usize,
        symbols: &'a BTreeMap<String, f64>,
        parameters: &'a ParameterMap,
    ) -> Self {
        let derivatives = splines
            .iter()
            .map(|s| {
                let mut chain = vec![s.clone()];
                for _ in 0..max_derivative {
                    let next = chain[chain.len() - 1].derivative();
                    chain.push(next);
                }
                chain
            })
            .collect();
        Self {
            derivatives,
            symbols,
            parameters,
        }
    }

    fn spline(&self, index: usize, derivative: usize) -> PlanningResult<&Spline> {
        self.derivatives
            .get(index)
            .and_then(|chain| chain.get(derivative))
            .ok_or_else(|| {
                PlanningError::DimensionMismatch(format!(
                    "no spline {} with derivative order {} in evaluation context",
                    index, derivative
                ))
            })
    }

    fn symbol(&self, name: &str) -> PlanningResult<f64> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| PlanningError::UnboundSymbol(name.to_string()))
    }

    fn parameter(&self, name: &str, index: usize) -> PlanningResult<f64> {
        self.parameters
            .get(name)
            .and_then(|v| v.get(index).copied())
            .ok_or_else(|| PlanningError::UnboundSymbol(format!("{}[{}]", name, index)))
    }
}
