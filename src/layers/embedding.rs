//! Embedding Layer
//!
//! Maps vocabulary indices to learned dense vectors. Feeding layer 0 through
//! an embedding instead of one-hot vectors decouples the recurrent input
//! width from the vocabulary size.
//!
//! ## Forward Pass
//!
//! ```text
//! Indices: [N, T]          each in 0..V
//! Weight:  W_embed [V, D]
//! Output:  out[n, t, :] = W_embed[idx[n, t], :]     [N, T, D]
//! ```
//!
//! This is the same product as `one_hot(idx) @ W_embed`, without building the
//! one-hot tensor.
//!
//! ## Backward Pass
//!
//! Every position adds its upstream gradient into the row it read:
//!
//! ```text
//! grad_W[idx[n, t], :] += grad_out[n, t, :]
//! ```
//!
//! Rows of indices that never occur in the batch get zero gradient; indices
//! that occur several times accumulate.

use crate::tensor::{Scalar, Tensor};
use crate::{Result, RnnError};
use rand::Rng;

/// Learned lookup table `W_embed [vocab_size, dim]`
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding<F> {
    pub weight: Tensor<F>,
}

/// Indices read by a forward pass, flattened row-major
pub struct EmbeddingCache {
    indices: Vec<usize>,
}

impl<F: Scalar> Embedding<F> {
    /// Create a table of `N(0, 1)` draws times `scale` (default `1/√vocab_size`)
    pub fn new<R: Rng + ?Sized>(
        vocab_size: usize,
        dim: usize,
        scale: Option<f64>,
        rng: &mut R,
    ) -> Self {
        let scale = scale.unwrap_or_else(|| 1.0 / (vocab_size as f64).sqrt());
        Self {
            weight: Tensor::randn(vec![vocab_size, dim], scale, rng),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn dim(&self) -> usize {
        self.weight.shape[1]
    }

    /// Look up a `[N, T]` index batch, returning `[N, T, dim]`
    pub fn forward(&self, indices: &[Vec<usize>]) -> Result<(Tensor<F>, EmbeddingCache)> {
        let n = indices.len();
        let steps = indices.first().map_or(0, Vec::len);
        if let Some(row) = indices.iter().position(|seq| seq.len() != steps) {
            return Err(RnnError::ShapeMismatch(format!(
                "row {} has {} steps, expected {}",
                row,
                indices[row].len(),
                steps
            )));
        }

        let flat: Vec<usize> = indices.iter().flatten().copied().collect();
        let out = self.gather(&flat)?.reshape(&[n, steps, self.dim()]);
        Ok((out, EmbeddingCache { indices: flat }))
    }

    /// Look up one index per row, returning `[N, dim]`
    pub fn forward_step(&self, indices: &[usize]) -> Result<Tensor<F>> {
        self.gather(indices)
    }

    /// Scatter-add `grad_out [N, T, dim]` into a `[vocab_size, dim]` gradient
    pub fn backward(&self, grad_out: &Tensor<F>, cache: &EmbeddingCache) -> Tensor<F> {
        let dim = self.dim();
        assert_eq!(
            grad_out.len(),
            cache.indices.len() * dim,
            "embedding gradient {:?} does not match {} cached positions",
            grad_out.shape,
            cache.indices.len()
        );

        let mut grad = Tensor::zeros(self.weight.shape.clone());
        for (pos, &index) in cache.indices.iter().enumerate() {
            let upstream = &grad_out.data[pos * dim..(pos + 1) * dim];
            let row = &mut grad.data[index * dim..(index + 1) * dim];
            for (g, &u) in row.iter_mut().zip(upstream) {
                *g = *g + u;
            }
        }
        grad
    }

    fn gather(&self, indices: &[usize]) -> Result<Tensor<F>> {
        let (vocab_size, dim) = (self.vocab_size(), self.dim());
        let mut data = Vec::with_capacity(indices.len() * dim);
        for &index in indices {
            if index >= vocab_size {
                return Err(RnnError::InvalidIndex {
                    index,
                    bound: vocab_size,
                });
            }
            data.extend_from_slice(&self.weight.data[index * dim..(index + 1) * dim]);
        }
        Ok(Tensor::new(data, vec![indices.len(), dim]))
    }
}
