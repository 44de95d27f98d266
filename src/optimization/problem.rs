//! Constraint, parameter and symbol registry handed to a solver

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::common::{ParameterMap, PlanningError, PlanningResult};
use crate::optimization::expr::{EvalContext, Expr, SplineVar};
use crate::spline::Spline;

/// Where along the normalised horizon a constraint applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintScope {
    Trajectory,
    Initial,
    Terminal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub expr: Expr,
    pub lower: f64,
    pub upper: f64,
    pub scope: ConstraintScope,
}

impl Constraint {
    /// Distance outside `[lower, upper]`, zero when satisfied
    pub fn violation(&self, value: f64) -> f64 {
        (self.lower - value).max(value - self.upper).max(0.0)
    }
}

/// Equality `lhs == rhs` imposed at one end of the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCondition {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl BoundaryCondition {
    pub fn new(lhs: Expr, rhs: Expr) -> Self {
        Self { lhs, rhs }
    }
}

/// Terminal conditions on values and on derivatives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerminalConstraints {
    pub values: Vec<BoundaryCondition>,
    pub derivatives: Vec<BoundaryCondition>,
}

impl TerminalConstraints {
    /// Own conditions first, then the nested node's
    pub fn prepend(mut self, values: Vec<BoundaryCondition>, derivatives: Vec<BoundaryCondition>) -> Self {
        self.values.splice(0..0, values);
        self.derivatives.splice(0..0, derivatives);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.derivatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Symbolic handle on a vector parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterHandle {
    pub name: String,
    pub dim: usize,
}

impl ParameterHandle {
    pub fn at(&self, index: usize) -> Expr {
        Expr::Parameter {
            name: self.name.clone(),
            index,
        }
    }

    pub fn expr(&self) -> Expr {
        self.at(0)
    }
}

/// Numeric values for every symbol and parameter of a problem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    pub symbols: BTreeMap<String, f64>,
    pub parameters: ParameterMap,
}

#[derive(Debug, Clone)]
pub struct Problem {
    n_spl: usize,
    symbols: BTreeSet<String>,
    parameters: BTreeMap<String, usize>,
    constraints: Vec<Constraint>,
}

impl Problem {
    pub fn new(n_spl: usize) -> Self {
        Self {
            n_spl,
            symbols: BTreeSet::new(),
            parameters: BTreeMap::new(),
            constraints: Vec::new(),
        }
    }

    pub fn n_spl(&self) -> usize {
        self.n_spl
    }

    /// Handles on all trajectory splines, outermost link first
    pub fn spline_vars(&self) -> Vec<SplineVar> {
        (0..self.n_spl).map(SplineVar::new).collect()
    }

    /// Shared symbol; defining it again returns the same handle
    pub fn define_symbol(&mut self, name: &str) -> Expr {
        self.symbols.insert(name.to_string());
        Expr::Symbol(name.to_string())
    }

    pub fn define_parameter(&mut self, name: &str, dim: usize) -> PlanningResult<ParameterHandle> {
        if self.parameters.contains_key(name) {
            return Err(PlanningError::DuplicateParameter(name.to_string()));
        }
        self.parameters.insert(name.to_string(), dim);
        Ok(ParameterHandle {
            name: name.to_string(),
            dim,
        })
    }

    pub fn define_constraint(&mut self, expr: Expr, lower: f64, upper: f64) {
        self.push(expr, lower, upper, ConstraintScope::Trajectory);
    }

    pub fn add_initial_conditions(&mut self, conditions: Vec<BoundaryCondition>) {
        for bc in conditions {
            self.push(bc.lhs - bc.rhs, 0.0, 0.0, ConstraintScope::Initial);
        }
    }

    pub fn add_terminal_conditions(&mut self, conditions: TerminalConstraints) {
        for bc in conditions.values.into_iter().chain(conditions.derivatives) {
            self.push(bc.lhs - bc.rhs, 0.0, 0.0, ConstraintScope::Terminal);
        }
    }

    fn push(&mut self, expr: Expr, lower: f64, upper: f64, scope: ConstraintScope) {
        trace!(?scope, lower, upper, "registering constraint");
        self.constraints.push(Constraint {
            expr,
            lower,
            upper,
            scope,
        });
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.as_str())
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, usize)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Every symbol and every declared parameter has a value of the right size
    pub fn check_bindings(&self, bindings: &Bindings) -> PlanningResult<()> {
        if let Some(missing) = self.symbols.iter().find(|s| !bindings.symbols.contains_key(*s)) {
            return Err(PlanningError::UnboundSymbol(missing.clone()));
        }
        for (name, &dim) in &self.parameters {
            match bindings.parameters.get(name) {
                None => return Err(PlanningError::UnboundSymbol(name.clone())),
                Some(value) if value.len() != dim => {
                    return Err(PlanningError::DimensionMismatch(format!(
                        "parameter '{}' declared with dimension {}, bound with {}",
                        name,
                        dim,
                        value.len()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Largest bound violation over the trajectory samples `taus` and both ends
    pub fn max_violation(
        &self,
        splines: &[Spline],
        bindings: &Bindings,
        taus: &[f64],
    ) -> PlanningResult<f64> {
        if splines.len() != self.n_spl {
            return Err(PlanningError::SplineCountMismatch {
                expected: self.n_spl,
                found: splines.len(),
            });
        }
        let max_derivative = self
            .constraints
            .iter()
            .map(|c| c.expr.max_derivative())
            .max()
            .unwrap_or(0);
        let ctx = EvalContext::new(splines, max_derivative, &bindings.symbols, &bindings.parameters);
        let mut worst = 0.0_f64;
        for c in &self.constraints {
            let at: &[f64] = match c.scope {
                ConstraintScope::Trajectory => taus,
                ConstraintScope::Initial => &[0.0],
                ConstraintScope::Terminal => &[1.0],
            };
            for &tau in at {
                worst = worst.max(c.violation(c.expr.eval(&ctx, tau)?));
            }
        }
        Ok(worst)
    }
}
