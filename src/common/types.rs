//! Common types shared by every node of a vehicle chain

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::common::error::{PlanningError, PlanningResult};

/// 2D pose (position + orientation)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    /// Point `distance` ahead along the heading
    pub fn ahead(&self, distance: f64) -> (f64, f64) {
        (
            self.x + distance * self.yaw.cos(),
            self.y + distance * self.yaw.sin(),
        )
    }
}

/// Numeric parameter values bound into a problem, keyed by chain-wide unique name
pub type ParameterMap = BTreeMap<String, DVector<f64>>;

/// Merge `other` into `into`, refusing names that are already present
pub fn merge_parameters(into: &mut ParameterMap, other: ParameterMap) -> PlanningResult<()> {
    for (name, value) in other {
        if into.contains_key(&name) {
            return Err(PlanningError::DuplicateParameter(name));
        }
        into.insert(name, value);
    }
    Ok(())
}

/// Current best estimate of the full chain state and the shared input
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub state: DVector<f64>,
    pub input: DVector<f64>,
}

impl Prediction {
    pub fn new(state: DVector<f64>, input: DVector<f64>) -> Self {
        Self { state, input }
    }

    /// Prediction of the nested node: state rows from `offset` on, same input
    pub fn tail(&self, offset: usize) -> PlanningResult<Prediction> {
        if offset > self.state.len() {
            return Err(PlanningError::DimensionMismatch(format!(
                "cannot slice {} state rows off a {}-state prediction",
                offset,
                self.state.len()
            )));
        }
        Ok(Prediction {
            state: self.state.rows(offset, self.state.len() - offset).into_owned(),
            input: self.input.clone(),
        })
    }
}

/// Sampled trajectory of a whole chain, channels in rows and samples in columns
#[derive(Debug, Clone)]
pub struct Signals {
    pub time: Vec<f64>,
    pub state: DMatrix<f64>,
    pub pose: DMatrix<f64>,
    pub input: DMatrix<f64>,
    pub auxiliary: BTreeMap<String, DMatrix<f64>>,
}

impl Signals {
    pub fn n_samples(&self) -> usize {
        self.time.len()
    }

    /// Resolve a sample index, negative values counting from the end.
    /// The index must address a column of `time`, `state` and `pose` alike.
    pub fn sample_index(&self, index: isize) -> Option<usize> {
        let n = self
            .n_samples()
            .min(self.state.ncols())
            .min(self.pose.ncols()) as isize;
        let k = if index < 0 { n + index } else { index };
        if k >= 0 && k < n {
            Some(k as usize)
        } else {
            None
        }
    }

    /// Signals of the nested node: state and pose rows from `offset` on
    pub fn tail(&self, offset: usize) -> PlanningResult<Signals> {
        if offset > self.state.nrows() || offset > self.pose.nrows() {
            return Err(PlanningError::DimensionMismatch(format!(
                "cannot slice {} rows off signals with {} state rows",
                offset,
                self.state.nrows()
            )));
        }
        Ok(Signals {
            time: self.time.clone(),
            state: self.state.rows(offset, self.state.nrows() - offset).into_owned(),
            pose: self.pose.rows(offset, self.pose.nrows() - offset).into_owned(),
            input: self.input.clone(),
            auxiliary: self.auxiliary.clone(),
        })
    }

    /// Linearly interpolated state and input at time `t`, clamped to the horizon
    pub fn interpolate(&self, t: f64) -> PlanningResult<Prediction> {
        let n = self.n_samples();
        if n == 0 {
            return Err(PlanningError::DimensionMismatch(
                "cannot interpolate empty signals".to_string(),
            ));
        }
        let k = self.time.partition_point(|&s| s <= t);
        if k == 0 {
            return Ok(self.prediction_at(0));
        }
        if k >= n {
            return Ok(self.prediction_at(n - 1));
        }
        let (t0, t1) = (self.time[k - 1], self.time[k]);
        let w = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
        let state = self.state.column(k - 1) * (1.0 - w) + self.state.column(k) * w;
        let input = self.input.column(k - 1) * (1.0 - w) + self.input.column(k) * w;
        Ok(Prediction::new(state, input))
    }

    /// Pose of the first link at sample `k`
    pub fn pose_at(&self, k: usize) -> Pose2D {
        Pose2D::new(self.pose[(0, k)], self.pose[(1, k)], self.pose[(2, k)])
    }

    fn prediction_at(&self, k: usize) -> Prediction {
        Prediction::new(
            self.state.column(k).into_owned(),
            self.input.column(k).into_owned(),
        )
    }
}
