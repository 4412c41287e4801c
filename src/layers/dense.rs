use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{
    activation::activation::ActivationFunction,
    error::{NetError, Result},
    math::matrix::Matrix,
};

/// Describes one layer to be built by `Network::configure_layers`.
///
/// The input size is not part of the config: it is chained from the
/// previous layer (or the network input).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub size: usize,
    pub activation: ActivationFunction,
}

impl LayerConfig {
    pub fn new(size: usize, activation: ActivationFunction) -> LayerConfig {
        LayerConfig { size, activation }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(NetError::InvalidLayer("size must be > 0".to_string()));
        }
        if !self.activation.has_derivative() {
            return Err(NetError::InvalidLayer(
                "derivative of activation function is missing".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fully connected layer computing `Y = f(W·X + b)`.
///
/// `X` is an `in_size x 1` column, `W` is `out_size x in_size` and `b` is
/// `out_size x 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    in_size: usize,
    out_size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
}

impl Layer {
    /// Builds a layer with all-zero weights and biases.
    pub fn new(in_size: usize, out_size: usize, activation: ActivationFunction) -> Result<Layer> {
        check_sizes(in_size, out_size)?;
        Ok(Layer {
            in_size,
            out_size,
            weights: Matrix::zeros(out_size, in_size)?,
            biases: Matrix::zeros(out_size, 1)?,
            activator: activation,
        })
    }

    pub fn in_size(&self) -> usize {
        self.in_size
    }

    pub fn out_size(&self) -> usize {
        self.out_size
    }

    /// Checks the layer definition: positive sizes and an activation with a derivative.
    pub fn validate(&self) -> Result<()> {
        check_sizes(self.in_size, self.out_size)?;
        if !self.activator.has_derivative() {
            return Err(NetError::InvalidLayer(
                "derivative of activation function is missing".to_string(),
            ));
        }
        Ok(())
    }

    /// `validate` plus a check that the live weights and biases still have
    /// the declared shapes.
    pub fn is_usable(&self) -> Result<()> {
        self.validate()?;
        self.check_shapes()
    }

    /// Live weight and bias shapes match the declared sizes.
    pub(crate) fn check_shapes(&self) -> Result<()> {
        let (r, c) = self.weights.dims();
        if (r, c) != (self.out_size, self.in_size) {
            return Err(NetError::InvalidLayer(format!(
                "weight matrix should be {}x{} not {r}x{c}",
                self.out_size, self.in_size
            )));
        }
        let (r, c) = self.biases.dims();
        if (r, c) != (self.out_size, 1) {
            return Err(NetError::InvalidLayer(format!(
                "bias vector should be {}x1 not {r}x{c}",
                self.out_size
            )));
        }
        Ok(())
    }

    /// One weight row plus one bias per output neuron.
    pub fn parameter_count(&self) -> usize {
        self.out_size * (self.in_size + 1)
    }

    /// Loads a flat parameter vector.
    ///
    /// Values come in groups of `in_size + 1` per output neuron: the
    /// neuron's weight row left to right, then its bias.
    pub fn load_parameters(&mut self, flat: &[f64]) -> Result<()> {
        let expected = self.parameter_count();
        if flat.len() != expected {
            return Err(NetError::SizeMismatch { expected, actual: flat.len() });
        }
        self.check_shapes()?;
        for (i, group) in flat.chunks(self.in_size + 1).enumerate() {
            for (j, &w) in group[..self.in_size].iter().enumerate() {
                self.weights.set(i, j, w);
            }
            self.biases.set(i, 0, group[self.in_size]);
        }
        Ok(())
    }

    /// Exports the parameters in the `load_parameters` layout.
    pub fn parameters(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.parameter_count());
        for i in 0..self.out_size {
            flat.extend((0..self.in_size).map(|j| self.weights.get(i, j)));
            flat.push(self.biases.get(i, 0));
        }
        flat
    }

    /// Random weights (He for rectifiers, Xavier otherwise) and zero biases.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.weights = if self.activator.is_rectifier() {
            Matrix::he(self.out_size, self.in_size, rng)?
        } else {
            Matrix::xavier(self.out_size, self.in_size, rng)?
        };
        self.biases = Matrix::zeros(self.out_size, 1)?;
        Ok(())
    }

    /// `W·input + b`, before the activation.
    pub fn pre_activation(&self, input: &Matrix) -> Result<Matrix> {
        let mut z = self.weights.dot(input).map_err(|e| e.at_stage("weights × input"))?;
        z.add(&self.biases).map_err(|e| e.at_stage("+ bias"))?;
        Ok(z)
    }

    pub fn activate(&self, z: &Matrix) -> Matrix {
        z.map(|x| self.activator.function(x))
    }

    /// `f(W·input + b)`.
    pub fn compute(&self, input: &Matrix) -> Result<Matrix> {
        let z = self.pre_activation(input)?;
        Ok(self.activate(&z))
    }

    /// `f'(z)` element-wise; fails for an activation without a derivative.
    pub fn activation_derivative(&self, z: &Matrix) -> Result<Matrix> {
        if !self.activator.has_derivative() {
            return Err(NetError::InvalidLayer(
                "derivative of activation function is missing".to_string(),
            ));
        }
        Ok(z.map(|x| self.activator.derivative(x).unwrap_or(0.0)))
    }

    /// Applies pre-computed gradients scaled by `lr`.
    pub fn apply_gradients(&mut self, weights_grad: &Matrix, biases_grad: &Matrix, lr: f64) -> Result<()> {
        // Both shapes are checked before either matrix is touched.
        for (param, grad) in [(&self.weights, weights_grad), (&self.biases, biases_grad)] {
            if param.dims() != grad.dims() {
                return Err(NetError::ShapeMismatch {
                    op: "apply_gradients",
                    left: param.dims(),
                    right: grad.dims(),
                });
            }
        }
        self.weights.subtract(&weights_grad.scale(lr))?;
        self.biases.subtract(&biases_grad.scale(lr))
    }
}

fn check_sizes(in_size: usize, out_size: usize) -> Result<()> {
    if in_size == 0 {
        return Err(NetError::InvalidLayer("input size must be > 0".to_string()));
    }
    if out_size == 0 {
        return Err(NetError::InvalidLayer("output size must be > 0".to_string()));
    }
    Ok(())
}
