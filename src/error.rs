//! Error type shared by every module of the crate.

use thiserror::Error;

/// Everything that can go wrong while building, evaluating or training a network.
///
/// The context variants (`Stage`, `Config`, `Layer`, `Datapoint`) wrap the
/// underlying failure; use [`NetError::root`] to get at it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    #[error("invalid dimension {rows}x{cols}: rows and cols must be >= 1")]
    InvalidDimension { rows: usize, cols: usize },

    #[error("invalid input size {0}: minimum input size is 1")]
    InvalidInputSize(usize),

    #[error("shape mismatch in {op}: {left:?} vs {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("expected {expected} values, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid layer: {0}")]
    InvalidLayer(String),

    #[error("must have at least one layer")]
    EmptyConfiguration,

    #[error("layer index {index} out of range: {len} state(s) retained")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("network does not retain states or has not been fed yet")]
    NoStatesRetained,

    #[error("state of layer {0} is empty")]
    EmptyState(usize),

    #[error("invalid trainer: {0}")]
    InvalidTrainer(String),

    #[error("dropout ratio {0} must be in (0, 0.9]")]
    InvalidDropoutRatio(f64),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<NetError>,
    },

    #[error("configs[{index}]: {source}")]
    Config {
        index: usize,
        #[source]
        source: Box<NetError>,
    },

    #[error("layer [{index}]: {source}")]
    Layer {
        index: usize,
        #[source]
        source: Box<NetError>,
    },

    #[error("{set} datapoint [{index}]: {source}")]
    Datapoint {
        set: &'static str,
        index: usize,
        #[source]
        source: Box<NetError>,
    },
}

impl NetError {
    /// Strips every context wrapper and returns the underlying failure.
    pub fn root(&self) -> &NetError {
        match self {
            NetError::Stage { source, .. }
            | NetError::Config { source, .. }
            | NetError::Layer { source, .. }
            | NetError::Datapoint { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn at_stage(self, stage: &'static str) -> NetError {
        NetError::Stage { stage, source: Box::new(self) }
    }

    pub(crate) fn at_layer(self, index: usize) -> NetError {
        NetError::Layer { index, source: Box::new(self) }
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
