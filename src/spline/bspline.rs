//! Clamped B-spline basis and scalar splines
//!
//! Trajectory variables are scalar splines over a shared basis. Problems are
//! posed on the normalised horizon [0, 1]; reconstruction rescales the knots
//! to physical time so that derivatives come out in physical units.

use nalgebra::{DMatrix, DVector};

use crate::common::{PlanningError, PlanningResult};

/// Evenly spaced samples from `start` to `end`, both included
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// B-spline basis defined by a non-decreasing knot vector and a degree
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineBasis {
    knots: Vec<f64>,
    degree: usize,
}

impl BSplineBasis {
    pub fn new(knots: Vec<f64>, degree: usize) -> PlanningResult<Self> {
        if knots.len() < 2 * (degree + 1) {
            return Err(PlanningError::InvalidParameter(format!(
                "{} knots cannot carry a degree {} basis",
                knots.len(),
                degree
            )));
        }
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(PlanningError::InvalidParameter(
                "knot vector must be non-decreasing".to_string(),
            ));
        }
        Ok(Self { knots, degree })
    }

    /// Clamped basis on [0, 1] with `n_intervals` equal knot intervals
    pub fn uniform(degree: usize, n_intervals: usize) -> Self {
        let n_intervals = n_intervals.max(1);
        let mut knots = vec![0.0; degree];
        knots.extend(linspace(0.0, 1.0, n_intervals + 1));
        knots.extend(vec![1.0; degree]);
        Self { knots, degree }
    }

    /// Number of basis functions
    pub fn len(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.len()])
    }

    /// Same basis with every knot multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> BSplineBasis {
        BSplineBasis {
            knots: self.knots.iter().map(|k| k * factor).collect(),
            degree: self.degree,
        }
    }

    /// Index of the knot span containing `t`, clamped to the domain
    fn find_span(&self, t: f64) -> usize {
        let n = self.len();
        let (lo, hi) = self.domain();
        if t >= hi {
            // last non-degenerate span
            let mut k = n - 1;
            while k > self.degree && self.knots[k] >= hi {
                k -= 1;
            }
            return k;
        }
        if t <= lo {
            return self.degree;
        }
        let k = self.knots.partition_point(|&u| u <= t) - 1;
        k.clamp(self.degree, n - 1)
    }

    /// Evaluate the spline with coefficients `coeffs` at `t` (de Boor)
    pub fn evaluate(&self, coeffs: &DVector<f64>, t: f64) -> f64 {
        let p = self.degree;
        let k = self.find_span(t);
        let mut d: Vec<f64> = (0..=p).map(|j| coeffs[j + k - p]).collect();
        for r in 1..=p {
            for j in (r..=p).rev() {
                let left = self.knots[j + k - p];
                let denom = self.knots[j + 1 + k - r] - left;
                let alpha = if denom > 0.0 { (t - left) / denom } else { 0.0 };
                d[j] = (1.0 - alpha) * d[j - 1] + alpha * d[j];
            }
        }
        d[p]
    }

    /// Values of all basis functions at `t`
    pub fn basis_values(&self, t: f64) -> DVector<f64> {
        let n = self.len();
        let k = self.find_span(t);
        let mut values = DVector::zeros(n);
        let mut unit = DVector::zeros(n);
        for i in (k - self.degree)..=k {
            unit[i] = 1.0;
            values[i] = self.evaluate(&unit, t);
            unit[i] = 0.0;
        }
        values
    }

    /// Collocation matrix, one row per time and one column per basis function
    pub fn collocation_matrix(&self, times: &[f64]) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(times.len(), self.len());
        for (row, &t) in times.iter().enumerate() {
            m.set_row(row, &self.basis_values(t).transpose());
        }
        m
    }
}

/// Scalar spline: a basis together with its coefficient vector
#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    basis: BSplineBasis,
    coeffs: DVector<f64>,
}

impl Spline {
    pub fn new(basis: BSplineBasis, coeffs: DVector<f64>) -> PlanningResult<Self> {
        if coeffs.len() != basis.len() {
            return Err(PlanningError::DimensionMismatch(format!(
                "basis of dimension {} got {} coefficients",
                basis.len(),
                coeffs.len()
            )));
        }
        Ok(Self { basis, coeffs })
    }

    /// Least-squares fit of `values` sampled at `times`
    pub fn fit(basis: BSplineBasis, times: &[f64], values: &[f64]) -> PlanningResult<Self> {
        if times.len() != values.len() || times.len() < basis.len() {
            return Err(PlanningError::DimensionMismatch(format!(
                "cannot fit {} coefficients on {} times and {} values",
                basis.len(),
                times.len(),
                values.len()
            )));
        }
        let a = basis.collocation_matrix(times);
        let b = DVector::from_column_slice(values);
        let coeffs = a
            .svd(true, true)
            .solve(&b, 1e-12)
            .map_err(|e| PlanningError::NumericalError(e.to_string()))?;
        Spline::new(basis, coeffs)
    }

    pub fn basis(&self) -> &BSplineBasis {
        &self.basis
    }

    pub fn coeffs(&self) -> &DVector<f64> {
        &self.coeffs
    }

    pub fn eval(&self, t: f64) -> f64 {
        self.basis.evaluate(&self.coeffs, t)
    }

    pub fn sample(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|&t| self.eval(t)).collect()
    }

    /// Derivative spline, one degree lower
    pub fn derivative(&self) -> Spline {
        let p = self.basis.degree;
        let n = self.basis.len();
        if p == 0 || n < 2 {
            return Spline {
                basis: self.basis.clone(),
                coeffs: DVector::zeros(n),
            };
        }
        let knots = &self.basis.knots;
        let coeffs = DVector::from_iterator(
            n - 1,
            (0..n - 1).map(|i| {
                let span = knots[i + p + 1] - knots[i + 1];
                if span > 0.0 {
                    p as f64 * (self.coeffs[i + 1] - self.coeffs[i]) / span
                } else {
                    0.0
                }
            }),
        );
        Spline {
            basis: BSplineBasis {
                knots: knots[1..knots.len() - 1].to_vec(),
                degree: p - 1,
            },
            coeffs,
        }
    }

    /// `order`-th derivative
    pub fn nth_derivative(&self, order: usize) -> Spline {
        (0..order).fold(self.clone(), |s, _| s.derivative())
    }

    /// Same curve stretched over a domain `factor` times longer
    pub fn scaled_domain(&self, factor: f64) -> Spline {
        Spline {
            basis: self.basis.scaled(factor),
            coeffs: self.coeffs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_basis_dimension() {
        let basis = BSplineBasis::uniform(3, 10);
        assert_eq!(basis.len(), 13);
        assert_eq!(basis.domain(), (0.0, 1.0));
    }

    #[test]
    fn test_partition_of_unity() {
        let basis = BSplineBasis::uniform(3, 5);
        for &t in &[0.0, 0.13, 0.5, 0.77, 1.0] {
            let sum: f64 = basis.basis_values(t).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_clamped_end_values() {
        let basis = BSplineBasis::uniform(3, 4);
        let coeffs = DVector::from_vec(linspace(2.0, -1.0, basis.len()));
        let s = Spline::new(basis, coeffs).unwrap();
        assert!((s.eval(0.0) - 2.0).abs() < 1e-12);
        assert!((s.eval(1.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_coefficients_give_straight_line() {
        // uniform clamped coefficients ramp reproduces a line through the ends
        // only at the ends; the curve is still monotone in between
        let basis = BSplineBasis::uniform(3, 6);
        let s = Spline::new(basis.clone(), DVector::from_vec(linspace(0.0, 1.0, basis.len()))).unwrap();
        let values = s.sample(&linspace(0.0, 1.0, 50));
        assert!(values.windows(2).all(|w| w[1] >= w[0] - 1e-12));
    }

    #[test]
    fn test_derivative_of_fitted_cubic() {
        let basis = BSplineBasis::uniform(3, 8);
        let times = linspace(0.0, 1.0, 40);
        let values: Vec<f64> = times.iter().map(|t| t * t * t - 2.0 * t).collect();
        let s = Spline::fit(basis, &times, &values).unwrap();
        let ds = s.derivative();
        let dds = s.nth_derivative(2);
        for &t in &[0.0, 0.3, 0.6, 1.0] {
            assert!((s.eval(t) - (t * t * t - 2.0 * t)).abs() < 1e-9);
            assert!((ds.eval(t) - (3.0 * t * t - 2.0)).abs() < 1e-8);
            assert!((dds.eval(t) - 6.0 * t).abs() < 1e-7);
        }
    }

    #[test]
    fn test_scaled_domain_rescales_derivative() {
        let basis = BSplineBasis::uniform(3, 4);
        let times = linspace(0.0, 1.0, 20);
        let s = Spline::fit(basis, &times, &times).unwrap();
        let scaled = s.scaled_domain(4.0);
        assert!((scaled.eval(2.0) - 0.5).abs() < 1e-9);
        assert!((scaled.derivative().eval(2.0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_coefficient_length_checked() {
        let basis = BSplineBasis::uniform(3, 4);
        assert!(Spline::new(basis, DVector::zeros(3)).is_err());
    }
}
