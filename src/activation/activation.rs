use serde::{Serialize, Deserialize};
use std::f64::consts::{E, PI};

/// Scalar function used for custom activations and their derivatives.
pub type ScalarFn = fn(f64) -> f64;

/// Element-wise activation applied after a layer's affine transform.
///
/// Every named variant carries its own derivative. `Custom` takes plain
/// function pointers; its derivative is optional so forward-only layers can
/// skip it, but such a layer is rejected for training.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    Tanh,
    LeakyReLU { alpha: f64 },
    Elu { alpha: f64 },
    Gelu,
    Swish,
    #[serde(skip)]
    Custom {
        function: ScalarFn,
        derivative: Option<ScalarFn>,
    },
}

/// Named variants compare by value. Function pointers have no reliable
/// identity, so a `Custom` activation never equals anything.
impl PartialEq for ActivationFunction {
    fn eq(&self, other: &Self) -> bool {
        use ActivationFunction::*;
        match (self, other) {
            (Sigmoid, Sigmoid) | (ReLU, ReLU) | (Identity, Identity) | (Tanh, Tanh) => true,
            (Gelu, Gelu) | (Swish, Swish) => true,
            (LeakyReLU { alpha: a }, LeakyReLU { alpha: b }) => a == b,
            (Elu { alpha: a }, Elu { alpha: b }) => a == b,
            _ => false,
        }
    }
}

impl ActivationFunction {
    pub fn custom(function: ScalarFn, derivative: ScalarFn) -> ActivationFunction {
        ActivationFunction::Custom { function, derivative: Some(derivative) }
    }

    /// A custom activation with no derivative: usable for inference only.
    pub fn forward_only(function: ScalarFn) -> ActivationFunction {
        ActivationFunction::Custom { function, derivative: None }
    }

    pub fn has_derivative(&self) -> bool {
        !matches!(self, ActivationFunction::Custom { derivative: None, .. })
    }

    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Elu { alpha } => {
                if x > 0.0 { x } else { alpha * (E.powf(x) - 1.0) }
            }
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                0.5 * x * (1.0 + (c * (x + 0.044715 * x.powi(3))).tanh())
            }
            ActivationFunction::Swish => x / (1.0 + E.powf(-x)),
            ActivationFunction::Custom { function, .. } => function(x),
        }
    }

    /// Derivative evaluated at the pre-activation `x`.
    ///
    /// Returns `None` only for a `Custom` activation built without one.
    pub fn derivative(&self, x: f64) -> Option<f64> {
        let d = match self {
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            },
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Elu { alpha } => {
                if x > 0.0 { 1.0 } else { alpha * E.powf(x) }
            }
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                let inner = c * (x + 0.044715 * x.powi(3));
                let tanh_inner = inner.tanh();
                let sech2 = 1.0 - tanh_inner * tanh_inner;
                let d_inner = c * (1.0 + 3.0 * 0.044715 * x.powi(2));
                0.5 * tanh_inner + 0.5 * x * sech2 * d_inner + 0.5
            }
            ActivationFunction::Swish => {
                let sig = 1.0 / (1.0 + E.powf(-x));
                sig + x * sig * (1.0 - sig)
            }
            ActivationFunction::Custom { derivative, .. } => return derivative.map(|d| d(x)),
        };
        Some(d)
    }

    /// True for the ReLU family, which prefers He initialization.
    pub fn is_rectifier(&self) -> bool {
        matches!(
            self,
            ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. } | ActivationFunction::Elu { .. }
        )
    }
}
