pub mod dataset;
pub mod dropout;
pub mod iteration_stats;
pub mod logger;
pub mod train_config;
pub mod trainer;

pub use dataset::{Datapoint, Dataset, VecDataset};
pub use dropout::select_dropouts;
pub use iteration_stats::{IterationStats, TrainingReport};
pub use logger::{LogSink, Logger, MemoryLogger};
pub use train_config::TrainConfig;
pub use trainer::{Trainer, MIN_ITERATIONS};
