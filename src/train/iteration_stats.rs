use serde::{Serialize, Deserialize};

/// Statistics emitted after every completed training iteration.
///
/// When a progress sender is attached to the `Trainer`, one value is sent at
/// the end of every iteration; dropping the receiver stops training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Iteration cap for this run.
    pub max_iterations: usize,
    /// Running average loss over the training pass.
    pub training_loss: f64,
    /// Average validation loss, if a non-empty validation set was provided.
    pub validation_loss: Option<f64>,
    /// Wall-clock duration of this iteration in milliseconds.
    pub elapsed_ms: u64,
}

/// Outcome of `Trainer::train_with_backpropagation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Completed training iterations.
    pub iterations: usize,
    /// Training loss of the last completed iteration (0 if none ran).
    pub training_loss: f64,
    /// Validation loss of the last completed iteration.
    pub validation_loss: Option<f64>,
    /// Average loss over the test set after training.
    pub test_loss: f64,
    /// The monitored loss moved by less than the tolerance between two iterations.
    pub converged: bool,
    /// Stopped through the stop flag or a dropped progress receiver.
    pub cancelled: bool,
}
