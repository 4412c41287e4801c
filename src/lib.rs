//! A small feed-forward neural network toolkit.
//!
//! [`Matrix`] is the dense numeric primitive, [`Layer`] the affine transform
//! plus activation, [`Network`] an ordered stack of layers and [`Trainer`]
//! drives backpropagation with optional dropout over [`Dataset`]s.

pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;

// Convenience re-exports
pub use error::{NetError, Result};
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::{Layer, LayerConfig};
pub use network::network::Network;
pub use loss::cost::CostFunction;
pub use optim::sgd::Sgd;
pub use train::{
    select_dropouts, Datapoint, Dataset, IterationStats, LogSink, Logger, MemoryLogger, TrainConfig,
    Trainer, TrainingReport, VecDataset,
};
