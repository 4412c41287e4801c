use log::debug;
use rand::Rng;

use crate::{
    error::{NetError, Result},
    layers::dense::{Layer, LayerConfig},
    math::matrix::Matrix,
};

/// Per-layer values recorded by one forward pass, used by backpropagation.
#[derive(Debug, Clone)]
pub(crate) struct ForwardTrace {
    /// `z_l = W_l·a_{l-1} + b_l`, one per layer.
    pub pre_activations: Vec<Matrix>,
    /// `a_l` after activation (and dropout mask, when one is given), one per layer.
    pub activations: Vec<Matrix>,
}

/// Ordered stack of dense layers evaluated front to back.
///
/// With `retain_states` set, every forward pass records each layer's output,
/// retrievable through `state`.
#[derive(Debug, Clone)]
pub struct Network {
    input_size: usize,
    output_size: usize,
    layers: Vec<Layer>,
    retain_states: bool,
    states: Vec<Option<Matrix>>,
    fed: bool,
}

impl Network {
    /// Creates a network without layers; `configure_layers` must follow.
    pub fn new(input_size: usize, retain_states: bool) -> Result<Network> {
        if input_size < 1 {
            return Err(NetError::InvalidInputSize(input_size));
        }
        Ok(Network {
            input_size,
            output_size: input_size,
            layers: Vec::new(),
            retain_states,
            states: Vec::new(),
            fed: false,
        })
    }

    /// Replaces the layer stack. Each layer's input size is the previous
    /// layer's size, the first one takes the network input.
    pub fn configure_layers(&mut self, configs: &[LayerConfig]) -> Result<()> {
        if configs.is_empty() {
            return Err(NetError::EmptyConfiguration);
        }

        let mut prev_size = self.input_size;
        let mut layers = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let wrap = |source| NetError::Config { index, source: Box::new(source) };
            config.validate().map_err(wrap)?;
            layers.push(Layer::new(prev_size, config.size, config.activation).map_err(wrap)?);
            prev_size = config.size;
        }

        debug!("configured {} layer(s): {} -> {}", layers.len(), self.input_size, prev_size);

        let slots = if self.retain_states { layers.len() } else { 0 };
        self.layers = layers;
        self.output_size = prev_size;
        self.states = vec![None; slots];
        self.fed = false;
        Ok(())
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn retains_states(&self) -> bool {
        self.retain_states
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Evaluates the network on an `input_size x 1` column.
    pub fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let mut trace = self.propagate(input, &[])?;
        trace.activations.pop().ok_or(NetError::EmptyConfiguration)
    }

    /// Forward pass that keeps every layer's `z` and `a`.
    ///
    /// `masks[i]`, when present, is multiplied element-wise into layer `i`'s
    /// output before it feeds layer `i + 1`.
    pub(crate) fn propagate(&mut self, input: &Matrix, masks: &[Option<Matrix>]) -> Result<ForwardTrace> {
        if self.layers.is_empty() {
            return Err(NetError::EmptyConfiguration);
        }
        if self.retain_states {
            self.states = vec![None; self.layers.len()];
            self.fed = true;
        }

        let mut trace = ForwardTrace {
            pre_activations: Vec::with_capacity(self.layers.len()),
            activations: Vec::with_capacity(self.layers.len()),
        };

        for (i, layer) in self.layers.iter().enumerate() {
            let current = trace.activations.last().unwrap_or(input);
            let z = layer.pre_activation(current).map_err(|e| e.at_layer(i))?;
            let mut a = layer.activate(&z);
            if let Some(mask) = masks.get(i).and_then(Option::as_ref) {
                a = a.hadamard(mask).map_err(|e| e.at_stage("dropout mask").at_layer(i))?;
            }
            if self.retain_states {
                self.states[i] = Some(a.clone());
            }
            trace.pre_activations.push(z);
            trace.activations.push(a);
        }

        Ok(trace)
    }

    /// Output of layer `layer_index` from the most recent forward pass.
    pub fn state(&self, layer_index: usize) -> Result<&Matrix> {
        if !self.retain_states || !self.fed || self.states.is_empty() {
            return Err(NetError::NoStatesRetained);
        }
        self.states
            .get(layer_index)
            .ok_or(NetError::IndexOutOfRange { index: layer_index, len: self.states.len() })?
            .as_ref()
            .ok_or(NetError::EmptyState(layer_index))
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// All layer parameter vectors concatenated in layer order.
    pub fn parameters(&self) -> Vec<f64> {
        self.layers.iter().flat_map(Layer::parameters).collect()
    }

    /// Inverse of `parameters`; nothing is written unless the total length
    /// matches and every layer still has its declared shapes.
    pub fn load_parameters(&mut self, flat: &[f64]) -> Result<()> {
        let expected = self.parameter_count();
        if flat.len() != expected {
            return Err(NetError::SizeMismatch { expected, actual: flat.len() });
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.check_shapes().map_err(|e| e.at_layer(i))?;
        }
        let mut offset = 0;
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let n = layer.parameter_count();
            layer.load_parameters(&flat[offset..offset + n]).map_err(|e| e.at_layer(i))?;
            offset += n;
        }
        Ok(())
    }

    /// Re-initializes every layer's weights from `rng`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.randomize(rng).map_err(|e| e.at_layer(i))?;
        }
        Ok(())
    }
}
