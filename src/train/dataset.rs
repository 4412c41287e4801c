use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// One training example: an input column and the output expected for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    pub input: Matrix,
    pub expected: Matrix,
}

impl Datapoint {
    pub fn new(input: Matrix, expected: Matrix) -> Datapoint {
        Datapoint { input, expected }
    }
}

/// Anything able to hand out datapoints one at a time.
pub trait Dataset {
    /// Next datapoint, or `None` once the set is exhausted.
    fn next(&mut self) -> Option<Datapoint>;
    /// Total number of datapoints.
    fn size(&self) -> usize;
    /// Datapoints left before exhaustion.
    fn remaining(&self) -> usize;
    /// Rewinds to the first datapoint.
    fn reset(&mut self);
}

impl<D: Dataset + ?Sized> Dataset for &mut D {
    fn next(&mut self) -> Option<Datapoint> {
        (**self).next()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn remaining(&self) -> usize {
        (**self).remaining()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// In-memory dataset walked in insertion order.
#[derive(Debug, Clone, Default)]
pub struct VecDataset {
    points: Vec<Datapoint>,
    cursor: usize,
}

impl VecDataset {
    pub fn new(points: Vec<Datapoint>) -> VecDataset {
        VecDataset { points, cursor: 0 }
    }

    /// Builds column-vector datapoints from parallel slices of samples and targets.
    ///
    /// Both slices must hold the same number of samples.
    pub fn from_samples(inputs: &[Vec<f64>], expected: &[Vec<f64>]) -> Result<VecDataset> {
        if inputs.len() != expected.len() {
            return Err(NetError::SizeMismatch { expected: inputs.len(), actual: expected.len() });
        }
        let points = inputs
            .iter()
            .zip(expected)
            .map(|(input, target)| -> Result<Datapoint> {
                Ok(Datapoint::new(Matrix::column(input)?, Matrix::column(target)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(VecDataset::new(points))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Dataset for VecDataset {
    fn next(&mut self) -> Option<Datapoint> {
        let point = self.points.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(point)
    }

    fn size(&self) -> usize {
        self.points.len()
    }

    fn remaining(&self) -> usize {
        self.points.len().saturating_sub(self.cursor)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}
