use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::fmt;

use crate::error::{NetError, Result};

/// Dense, row-major matrix of `f64` values.
///
/// The shape is fixed at construction; `data.len() == rows * cols` always holds.
/// Operations that produce a different shape return a new `Matrix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Unchecked wire form of a `Matrix`, validated through `Matrix::new`.
#[derive(Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    #[serde(default)]
    data: Vec<f64>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = NetError;

    fn try_from(raw: RawMatrix) -> Result<Matrix> {
        Matrix::new(raw.rows, raw.cols, Some(raw.data))
    }
}

impl Matrix {
    /// Creates a `rows x cols` matrix.
    ///
    /// `data` is used verbatim when its length is exactly `rows * cols`;
    /// any other length (or `None`) gives a zero-filled matrix. Zero or
    /// overflowing dimensions are rejected.
    pub fn new(rows: usize, cols: usize, data: Option<Vec<f64>>) -> Result<Matrix> {
        let len = match rows.checked_mul(cols) {
            Some(len) if len > 0 => len,
            _ => return Err(NetError::InvalidDimension { rows, cols }),
        };
        let data = match data {
            Some(data) if data.len() == len => data,
            _ => vec![0.0; len],
        };
        Ok(Matrix { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Result<Matrix> {
        Matrix::new(rows, cols, None)
    }

    /// Builds a matrix from nested rows. Every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Matrix> {
        let cols = rows.first().map_or(0, |row| row.len());
        if let Some(bad) = rows.iter().find(|row| row.len() != cols) {
            return Err(NetError::SizeMismatch { expected: cols, actual: bad.len() });
        }
        let r = rows.len();
        Matrix::new(r, cols, Some(rows.into_iter().flatten().collect()))
    }

    /// Column vector (`n x 1`) holding `values`.
    pub fn column(values: &[f64]) -> Result<Matrix> {
        Matrix::new(values.len(), 1, Some(values.to_vec()))
    }

    /// Uniform samples in [-1, 1).
    pub fn random<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Result<Matrix> {
        let mut res = Matrix::zeros(rows, cols)?;
        res.map_in_place(|_| rng.gen::<f64>() * 2.0 - 1.0);
        Ok(res)
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
        // Both uniforms on (0, 1] to avoid log(0).
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = 1.0 - rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// He initialization: samples from N(0, sqrt(2 / cols)).
    ///
    /// Recommended before ReLU layers. `cols` is the fan-in, which matches the
    /// `(out, in)` weight layout used by `Layer`.
    pub fn he<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Result<Matrix> {
        Matrix::normal(rows, cols, (2.0 / cols as f64).sqrt(), rng)
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / cols)).
    ///
    /// Recommended before Sigmoid/Tanh/Identity layers.
    pub fn xavier<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Result<Matrix> {
        Matrix::normal(rows, cols, (1.0 / cols as f64).sqrt(), rng)
    }

    fn normal<R: Rng + ?Sized>(rows: usize, cols: usize, std_dev: f64, rng: &mut R) -> Result<Matrix> {
        let mut res = Matrix::zeros(rows, cols)?;
        res.map_in_place(|_| Matrix::sample_standard_normal(&mut *rng) * std_dev);
        Ok(res)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    fn index(&self, i: usize, j: usize) -> usize {
        assert!(
            i < self.rows && j < self.cols,
            "index ({i}, {j}) out of range for {}x{} matrix",
            self.rows,
            self.cols
        );
        self.cols * i + j
    }

    /// Value at row `i`, column `j`. Panics when out of range.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    /// Sets row `i`, column `j`. Panics when out of range.
    pub fn set(&mut self, i: usize, j: usize, val: f64) {
        let idx = self.index(i, j);
        self.data[idx] = val;
    }

    fn same_shape(&self, other: &Matrix, op: &'static str) -> Result<()> {
        if self.dims() != other.dims() {
            return Err(NetError::ShapeMismatch { op, left: self.dims(), right: other.dims() });
        }
        Ok(())
    }

    /// In-place elementwise `self += other`. `self` is untouched on error.
    pub fn add(&mut self, other: &Matrix) -> Result<()> {
        self.same_shape(other, "add")?;
        self.data.iter_mut().zip(&other.data).for_each(|(a, b)| *a += b);
        Ok(())
    }

    /// In-place elementwise `self -= other`. `self` is untouched on error.
    pub fn subtract(&mut self, other: &Matrix) -> Result<()> {
        self.same_shape(other, "subtract")?;
        self.data.iter_mut().zip(&other.data).for_each(|(a, b)| *a -= b);
        Ok(())
    }

    /// Matrix product `self · other`, shape `(self.rows, other.cols)`.
    pub fn dot(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(NetError::ShapeMismatch { op: "dot", left: self.dims(), right: other.dims() });
        }

        let mut res = Matrix { rows: self.rows, cols: other.cols, data: vec![0.0; self.rows * other.cols] };

        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut sum = 0.0;

                for k in 0..self.cols {
                    sum += self.data[i * self.cols + k] * other.data[k * other.cols + j];
                }

                res.data[i * res.cols + j] = sum;
            }
        }

        Ok(res)
    }

    /// Elementwise combination of two same-shaped matrices into a new one.
    pub fn zip_map<F>(&self, other: &Matrix, functor: F) -> Result<Matrix>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.same_shape(other, "zip_map")?;
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| functor(a, b)).collect(),
        })
    }

    /// Element-wise (Hadamard) product.
    pub fn hadamard(&self, other: &Matrix) -> Result<Matrix> {
        self.same_shape(other, "hadamard")?;
        self.zip_map(other, |a, b| a * b)
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix { rows: self.cols, cols: self.rows, data: vec![0.0; self.data.len()] };

        for i in 0..res.rows {
            for j in 0..res.cols {
                res.data[i * res.cols + j] = self.data[j * self.cols + i];
            }
        }

        res
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn map_in_place<F>(&mut self, mut functor: F)
    where
        F: FnMut(f64) -> f64,
    {
        self.data.iter_mut().for_each(|x| *x = functor(*x));
    }

    /// New matrix of the same shape whose cell `(i, j)` is `functor(i, j)`.
    pub fn map_indexed<F>(&self, functor: F) -> Matrix
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut res = Matrix { rows: self.rows, cols: self.cols, data: Vec::with_capacity(self.data.len()) };
        for i in 0..self.rows {
            for j in 0..self.cols {
                res.data.push(functor(i, j));
            }
        }
        res
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        self.map(|x| x * factor)
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.data.chunks(self.cols) {
            let cells: Vec<String> = row.iter().map(|x| format!("{x:.4}")).collect();
            writeln!(f, "[{}]", cells.join(", "))?;
        }
        Ok(())
    }
}
