use serde::{Serialize, Deserialize};

use crate::activation::activation::ScalarFn;
use crate::error::Result;
use crate::math::matrix::Matrix;

/// Scalar cost applied element-wise to the deviation `d = expected - predicted`.
///
/// - `Squared`:  `d²`; pair with Identity or Sigmoid output.
/// - `Absolute`: `|d|`; subgradient 0 at `d = 0`.
/// - `Huber`:    `0.5·d²` within `delta`, linear beyond it.
/// - `Custom`:   caller-supplied cost and its derivative with respect to `d`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFunction {
    Squared,
    Absolute,
    Huber { delta: f64 },
    #[serde(skip)]
    Custom { cost: ScalarFn, derivative: ScalarFn },
}

impl Default for CostFunction {
    fn default() -> Self {
        CostFunction::Squared
    }
}

/// `Custom` costs never compare equal; function pointers have no reliable identity.
impl PartialEq for CostFunction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CostFunction::Squared, CostFunction::Squared) => true,
            (CostFunction::Absolute, CostFunction::Absolute) => true,
            (CostFunction::Huber { delta: a }, CostFunction::Huber { delta: b }) => a == b,
            _ => false,
        }
    }
}

impl CostFunction {
    pub fn cost(&self, d: f64) -> f64 {
        match self {
            CostFunction::Squared => d * d,
            CostFunction::Absolute => d.abs(),
            CostFunction::Huber { delta } => {
                if d.abs() <= *delta {
                    0.5 * d * d
                } else {
                    delta * (d.abs() - 0.5 * delta)
                }
            }
            CostFunction::Custom { cost, .. } => cost(d),
        }
    }

    /// `∂cost/∂d`.
    pub fn derivative(&self, d: f64) -> f64 {
        match self {
            CostFunction::Squared => 2.0 * d,
            CostFunction::Absolute => {
                if d > 0.0 { 1.0 } else if d < 0.0 { -1.0 } else { 0.0 }
            }
            CostFunction::Huber { delta } => {
                if d.abs() <= *delta { d } else { delta * d.signum() }
            }
            CostFunction::Custom { derivative, .. } => derivative(d),
        }
    }

    /// Mean cost over all cells of `expected - predicted`.
    pub fn loss(&self, predicted: &Matrix, expected: &Matrix) -> Result<f64> {
        let deviation = expected.zip_map(predicted, |e, p| self.cost(e - p))?;
        let cells = deviation.as_slice();
        Ok(cells.iter().sum::<f64>() / cells.len() as f64)
    }

    /// `∂cost/∂predicted` per cell, i.e. `-cost'(expected - predicted)`.
    pub fn gradient(&self, predicted: &Matrix, expected: &Matrix) -> Result<Matrix> {
        expected.zip_map(predicted, |e, p| -self.derivative(e - p))
    }
}
