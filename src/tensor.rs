//! Tensor Operations for Recurrent Networks
//!
//! This module provides a minimal dense tensor library sized for the
//! recurrent cells in this crate. Tensors store multi-dimensional arrays with
//! shape and stride information for row-major indexing.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<F>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, timesteps, dim]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//! - **Scalar**: The element type `F` is `f32` or `f64`, which is how the
//!   numeric precision of a network is chosen
//!
//! ## Shapes Used by the Recurrent Stack
//!
//! ```text
//! Batch tensor:   [N, T, D]   one minibatch of input sequences
//! Step slice:     [N, D]      one timestep of that batch
//! Weights:        [D, G]      G = H for RNN, 4H for LSTM
//! Bias:           [G]
//! ```
//!
//! ## Example
//!
//! ```rust
//! use char_rnn::Tensor;
//!
//! let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let c = a.matmul(&b);
//! assert_eq!(c.shape, vec![2, 2]);
//! assert_eq!(c.data, vec![4.0, 5.0, 10.0, 11.0]);
//! ```
//!
//! ## Performance
//!
//! Matrix multiplication switches to a parallel cache-blocked kernel (Rayon)
//! above a small work threshold. Each output element is still reduced over the
//! inner dimension in the same order, so results do not depend on the number
//! of threads.

use num_traits::Float;
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::fmt;
use std::iter::Sum;

/// Floating point element type of a [`Tensor`].
///
/// Implemented for `f32` and `f64`. Conversions go through `f64` so that
/// constants and random draws are written once.
pub trait Scalar: Float + Sum + fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn from_f64(value: f64) -> Self;
    fn as_f64(self) -> f64;
}

impl Scalar for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn as_f64(self) -> f64 {
        self
    }
}

/// A multi-dimensional array for neural network computations
///
/// # Memory Layout
///
/// For shape `[2, 3]`, data is stored as:
/// `[row0_col0, row0_col1, row0_col2, row1_col0, row1_col1, row1_col2]`
/// and strides are `[3, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<F> {
    /// Flat storage of all tensor elements
    pub data: Vec<F>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl<F: Scalar> Tensor<F> {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    pub fn new(data: Vec<F>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    ///
    /// ```rust
    /// # use char_rnn::Tensor;
    /// let tensor = Tensor::<f64>::zeros(vec![3, 4]);
    /// assert_eq!(tensor.data.len(), 12);
    /// assert!(tensor.data.iter().all(|&x| x == 0.0));
    /// ```
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::filled(shape, F::zero())
    }

    /// Create a tensor with every element set to `value`
    pub fn filled(shape: Vec<usize>, value: F) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![value; size], shape)
    }

    /// Create a tensor whose element at flat index `i` is `f(i)`
    pub fn from_fn(shape: Vec<usize>, f: impl FnMut(usize) -> F) -> Self {
        let size: usize = shape.iter().product();
        let data = (0..size).map(f).collect();
        Self::new(data, shape)
    }

    /// Draw every element from `N(0, 1)` and multiply by `scale`
    ///
    /// The generator is passed in explicitly so that initialization is
    /// reproducible from a seed and independent across threads.
    pub fn randn<R: Rng + ?Sized>(shape: Vec<usize>, scale: f64, rng: &mut R) -> Self {
        Self::from_fn(shape, |_| {
            let z: f64 = rng.sample(StandardNormal);
            F::from_f64(z * scale)
        })
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat offset of a multi-index
    pub fn offset(&self, index: &[usize]) -> usize {
        assert_eq!(
            index.len(),
            self.shape.len(),
            "Index {:?} has wrong rank for shape {:?}",
            index,
            self.shape
        );
        index
            .iter()
            .zip(&self.strides)
            .map(|(&i, &stride)| i * stride)
            .sum()
    }

    /// Read a single element by multi-index
    pub fn get(&self, index: &[usize]) -> F {
        self.data[self.offset(index)]
    }

    /// SIMD-friendly inner loop for matrix multiplication
    ///
    /// Computes: result[j] += a_val * b[j] for all j
    #[inline(always)]
    fn matmul_inner_simd(a_val: F, b: &[F], result: &mut [F]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r = *r + a_val * b_val;
        }
    }

    /// Matrix multiplication
    ///
    /// For `A @ B` where `A` is `[m, k]` and `B` is `[k, n]` the result is
    /// `[m, n]` with `C[i,j] = sum(A[i,l] * B[l,j])`.
    ///
    /// # Panics
    ///
    /// Panics if either operand is not 2-D or the inner dimensions differ
    pub fn matmul(&self, other: &Tensor<F>) -> Tensor<F> {
        assert!(
            self.shape.len() == 2 && other.shape.len() == 2,
            "Unsupported matmul shapes: {:?} @ {:?}",
            self.shape,
            other.shape
        );
        assert_eq!(
            self.shape[1], other.shape[0],
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            self.shape[0], self.shape[1], other.shape[0], other.shape[1]
        );

        let m = self.shape[0];
        let n = other.shape[1];
        let k = self.shape[1];

        // Parallel path only pays off once there is enough work per thread
        if m * n * k >= 32_768 {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![F::zero(); m * n];
        for i in 0..m {
            for l in 0..k {
                let a_val = self.data[i * k + l];
                Self::matmul_inner_simd(
                    a_val,
                    &other.data[l * n..(l + 1) * n],
                    &mut result[i * n..(i + 1) * n],
                );
            }
        }

        Tensor::new(result, vec![m, n])
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Output rows are split into blocks of `BLOCK_SIZE` and distributed over
    /// the Rayon pool. Within a row the inner dimension is walked in
    /// ascending order, identical to the sequential kernel.
    fn matmul_parallel_blocked(&self, other: &Tensor<F>, m: usize, n: usize, k: usize) -> Tensor<F> {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![F::zero(); m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for i in i_start..i_end {
                    let row_offset = (i - i_start) * n;
                    for k_idx in 0..k {
                        let a_val = self.data[i * k + k_idx];
                        Self::matmul_inner_simd(
                            a_val,
                            &other.data[k_idx * n..(k_idx + 1) * n],
                            &mut result_block[row_offset..row_offset + n],
                        );
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Transpose a 2-D matrix
    pub fn transpose(&self) -> Tensor<F> {
        assert_eq!(
            self.shape.len(),
            2,
            "transpose expects a 2-D tensor, got {:?}",
            self.shape
        );
        let rows = self.shape[0];
        let cols = self.shape[1];
        let mut result = vec![F::zero(); rows * cols];

        for i in 0..rows {
            for j in 0..cols {
                result[j * rows + i] = self.data[i * cols + j];
            }
        }

        Tensor::new(result, vec![cols, rows])
    }

    /// Element-wise addition with broadcasting support
    ///
    /// 1. **Exact match**: Same shape
    /// 2. **Broadcast last dim**: `[*, n] + [n]` (adding a bias)
    pub fn add(&self, other: &Tensor<F>) -> Tensor<F> {
        if self.shape == other.shape {
            return self.zip_map(other, |a, b| a + b);
        }

        if self.shape.len() > other.shape.len() {
            if let Some(&last_dim) = self.shape.last() {
                if other.data.len() == last_dim {
                    let result = self
                        .data
                        .par_iter()
                        .enumerate()
                        .map(|(i, &x)| x + other.data[i % last_dim])
                        .collect();
                    return Tensor::new(result, self.shape.clone());
                }
            }
        }

        panic!(
            "Unsupported broadcast for add: {:?} + {:?}",
            self.shape, other.shape
        );
    }

    /// In-place accumulation, used to sum gradients over timesteps
    pub fn add_assign(&mut self, other: &Tensor<F>) {
        assert_eq!(
            self.shape, other.shape,
            "Shapes must match for accumulation"
        );
        self.data
            .par_iter_mut()
            .zip(&other.data)
            .for_each(|(a, &b)| *a = *a + b);
    }

    /// Element-wise (Hadamard) product
    pub fn mul(&self, other: &Tensor<F>) -> Tensor<F> {
        assert_eq!(
            self.shape, other.shape,
            "Shapes must match for element-wise product"
        );
        self.zip_map(other, |a, b| a * b)
    }

    /// Multiply all elements by a scalar
    pub fn scale(&self, scalar: F) -> Tensor<F> {
        self.map(|x| x * scalar)
    }

    /// Apply `f` to every element
    pub fn map(&self, f: impl Fn(F) -> F + Sync + Send) -> Tensor<F> {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Combine two equally shaped tensors element by element
    pub fn zip_map(&self, other: &Tensor<F>, f: impl Fn(F, F) -> F + Sync + Send) -> Tensor<F> {
        assert_eq!(self.shape, other.shape, "Shapes must match for zip_map");
        let result = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Sum a 2-D tensor over its rows (axis 0), giving `[cols]`
    pub fn sum_rows(&self) -> Tensor<F> {
        assert_eq!(self.shape.len(), 2, "sum_rows expects a 2-D tensor");
        let rows = self.shape[0];
        let cols = self.shape[1];
        let mut result = vec![F::zero(); cols];
        for row in 0..rows {
            for (acc, &x) in result.iter_mut().zip(&self.data[row * cols..(row + 1) * cols]) {
                *acc = *acc + x;
            }
        }
        Tensor::new(result, vec![cols])
    }

    /// Sum of squared elements
    pub fn sum_squares(&self) -> F {
        self.data.iter().map(|&x| x * x).sum()
    }

    /// Reshape tensor to new shape
    ///
    /// Total number of elements must remain the same.
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor<F> {
        let new_size: usize = new_shape.iter().product();
        assert_eq!(
            self.data.len(),
            new_size,
            "Cannot reshape {:?} to {:?}: element count mismatch",
            self.shape,
            new_shape
        );
        Tensor::new(self.data.clone(), new_shape.to_vec())
    }

    /// Extract timestep `t` of a `[N, T, D]` batch as `[N, D]`
    pub fn time_step(&self, t: usize) -> Tensor<F> {
        assert_eq!(self.shape.len(), 3, "time_step expects [N, T, D]");
        let (n, steps, d) = (self.shape[0], self.shape[1], self.shape[2]);
        assert!(t < steps, "timestep {} out of range for {} steps", t, steps);

        let mut result = Vec::with_capacity(n * d);
        for row in 0..n {
            let start = (row * steps + t) * d;
            result.extend_from_slice(&self.data[start..start + d]);
        }
        Tensor::new(result, vec![n, d])
    }

    /// Write a `[N, D]` slice into timestep `t` of a `[N, T, D]` batch
    pub fn set_time_step(&mut self, t: usize, step: &Tensor<F>) {
        assert_eq!(self.shape.len(), 3, "set_time_step expects [N, T, D]");
        let (n, steps, d) = (self.shape[0], self.shape[1], self.shape[2]);
        assert!(t < steps, "timestep {} out of range for {} steps", t, steps);
        assert_eq!(
            step.shape,
            vec![n, d],
            "timestep slice has shape {:?}, expected [{}, {}]",
            step.shape,
            n,
            d
        );

        for row in 0..n {
            let start = (row * steps + t) * d;
            self.data[start..start + d].copy_from_slice(&step.data[row * d..(row + 1) * d]);
        }
    }

    /// Columns `start..end` of a 2-D tensor
    pub fn slice_cols(&self, start: usize, end: usize) -> Tensor<F> {
        assert_eq!(self.shape.len(), 2, "slice_cols expects a 2-D tensor");
        let rows = self.shape[0];
        let cols = self.shape[1];
        assert!(start <= end && end <= cols, "column range {}..{} out of bounds", start, end);

        let width = end - start;
        let mut result = Vec::with_capacity(rows * width);
        for row in 0..rows {
            result.extend_from_slice(&self.data[row * cols + start..row * cols + end]);
        }
        Tensor::new(result, vec![rows, width])
    }

    /// Concatenate 2-D tensors with equal row counts along the column axis
    pub fn concat_cols(parts: &[&Tensor<F>]) -> Tensor<F> {
        assert!(!parts.is_empty(), "concat_cols needs at least one tensor");
        let rows = parts[0].shape[0];
        for part in parts {
            assert!(
                part.shape.len() == 2 && part.shape[0] == rows,
                "concat_cols: shape {:?} does not have {} rows",
                part.shape,
                rows
            );
        }
        let total: usize = parts.iter().map(|p| p.shape[1]).sum();

        let mut result = Vec::with_capacity(rows * total);
        for row in 0..rows {
            for part in parts {
                let width = part.shape[1];
                result.extend_from_slice(&part.data[row * width..(row + 1) * width]);
            }
        }
        Tensor::new(result, vec![rows, total])
    }

    /// Softmax over the last axis of a 2-D tensor
    ///
    /// # Numerical Stability
    ///
    /// ```text
    /// softmax(x)[i] = exp(x[i] - max(x)) / sum(exp(x[j] - max(x)))
    /// ```
    ///
    /// Subtracting the row maximum keeps `exp()` from overflowing.
    pub fn softmax_rows(&self) -> Tensor<F> {
        assert_eq!(self.shape.len(), 2, "softmax_rows expects a 2-D tensor");
        let rows = self.shape[0];
        let cols = self.shape[1];

        let result: Vec<F> = (0..rows)
            .into_par_iter()
            .flat_map_iter(|i| {
                let row = &self.data[i * cols..(i + 1) * cols];
                let max = row.iter().fold(F::neg_infinity(), |a, &b| a.max(b));
                let exp_values: Vec<F> = row.iter().map(|&x| (x - max).exp()).collect();
                let sum: F = exp_values.iter().copied().sum();
                exp_values.into_iter().map(move |val| val / sum)
            })
            .collect();

        Tensor::new(result, self.shape.clone())
    }

    /// Index of the largest element in each row of a 2-D tensor
    ///
    /// Ties resolve to the lowest index.
    pub fn argmax_rows(&self) -> Vec<usize> {
        assert_eq!(self.shape.len(), 2, "argmax_rows expects a 2-D tensor");
        let cols = self.shape[1];
        self.data
            .chunks(cols)
            .map(|row| {
                let mut best = 0;
                for (j, &x) in row.iter().enumerate() {
                    if x > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }

    /// Stack `T` tensors of shape `[N, D]` into `[N, T, D]`
    pub fn stack_time(steps: &[Tensor<F>]) -> Tensor<F> {
        assert!(!steps.is_empty(), "stack_time needs at least one timestep");
        let n = steps[0].shape[0];
        let d = steps[0].shape[1];
        let mut out = Tensor::zeros(vec![n, steps.len(), d]);
        for (t, step) in steps.iter().enumerate() {
            out.set_time_step(t, step);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_matmul_small() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let b = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]);
        let c = a.matmul(&b);
        assert_eq!(c.data, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_parallel_matmul_matches_sequential() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Tensor::<f64>::randn(vec![40, 30], 1.0, &mut rng);
        let b = Tensor::<f64>::randn(vec![30, 50], 1.0, &mut rng);

        let fast = a.matmul(&b);

        let mut expected = vec![0.0; 40 * 50];
        for i in 0..40 {
            for l in 0..30 {
                for j in 0..50 {
                    expected[i * 50 + j] += a.data[i * 30 + l] * b.data[l * 50 + j];
                }
            }
        }
        assert_eq!(fast.data, expected);
    }

    #[test]
    fn test_transpose() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let t = a.transpose();
        assert_eq!(t.shape, vec![3, 2]);
        assert_eq!(t.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_add_bias_broadcast() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let b = Tensor::new(vec![10.0, 20.0], vec![2]);
        assert_eq!(a.add(&b).data, vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_time_step_roundtrip() {
        let x = Tensor::from_fn(vec![2, 3, 4], |i| i as f64);
        let step = x.time_step(1);
        assert_eq!(step.shape, vec![2, 4]);
        assert_eq!(step.data, vec![4.0, 5.0, 6.0, 7.0, 16.0, 17.0, 18.0, 19.0]);

        let mut y = Tensor::zeros(vec![2, 3, 4]);
        for t in 0..3 {
            y.set_time_step(t, &x.time_step(t));
        }
        assert_eq!(x, y);
    }

    #[test]
    fn test_slice_and_concat_cols() {
        let x = Tensor::from_fn(vec![2, 6], |i| i as f64);
        let left = x.slice_cols(0, 2);
        let right = x.slice_cols(2, 6);
        assert_eq!(left.data, vec![0.0, 1.0, 6.0, 7.0]);
        assert_eq!(Tensor::concat_cols(&[&left, &right]), x);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 1000.0, 1000.0, -1000.0], vec![2, 3]);
        let p = x.softmax_rows();
        for row in p.data.chunks(3) {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_argmax_rows() {
        let x = Tensor::new(vec![0.1, 0.7, 0.2, 0.5, 0.5, 0.0], vec![2, 3]);
        assert_eq!(x.argmax_rows(), vec![1, 0]);
    }

    #[test]
    fn test_sum_rows() {
        let x = Tensor::new(vec![1.0f32, 2.0, 3.0, 4.0], vec![2, 2]);
        assert_eq!(x.sum_rows().data, vec![4.0, 6.0]);
    }
}
