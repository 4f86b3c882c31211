//! Linear Layer (Output Projection)
//!
//! The linear layer performs an affine transformation: y = x @ W + b.
//! In the recurrent network it maps every top-layer hidden state to a score
//! per vocabulary entry.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [N, T, H]      (or [N, H] for a single step)
//! Weight: W [H, V]
//! Bias:   b [V]
//! Output: y = x @ W + b    [N, T, V]
//! ```
//!
//! Leading axes are flattened to `[N*T, H]` for the matrix product and
//! restored afterwards, which is the "temporal affine" layer.
//!
//! ## Backward Pass
//!
//! ```text
//! grad_W = x^T @ grad_y
//! grad_b = sum(grad_y, axis=0)
//! grad_x = grad_y @ W^T
//! ```

use crate::tensor::{Scalar, Tensor};
use rand::Rng;

/// Linear layer (fully connected)
///
/// Performs y = x @ W + b where:
/// - W: weight matrix [in_features, out_features]
/// - b: bias vector [out_features]
#[derive(Clone, Debug, PartialEq)]
pub struct Linear<F> {
    pub weight: Tensor<F>,
    pub bias: Tensor<F>,
}

impl<F: Scalar> Linear<F> {
    /// Create a new linear layer
    ///
    /// Weights are drawn from `N(0, 1)` times `scale`, which defaults to
    /// `1/√in_features`. The bias starts at zero.
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        scale: Option<f64>,
        rng: &mut R,
    ) -> Self {
        let scale = scale.unwrap_or_else(|| 1.0 / (in_features as f64).sqrt());
        Self {
            weight: Tensor::randn(vec![in_features, out_features], scale, rng),
            bias: Tensor::zeros(vec![out_features]),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape[1]
    }

    /// Forward pass
    ///
    /// Accepts any input whose last axis is `in_features` and returns an
    /// output with the same leading axes. The input is cached for backward.
    pub fn forward(&self, x: &Tensor<F>) -> (Tensor<F>, LinearCache<F>) {
        let in_features = self.in_features();
        assert_eq!(
            x.shape.last().copied(),
            Some(in_features),
            "Linear input {:?} does not end in {}",
            x.shape,
            in_features
        );
        let rows = x.len() / in_features;

        let flat = x.reshape(&[rows, in_features]);
        let y = flat.matmul(&self.weight).add(&self.bias);

        let mut out_shape = x.shape.clone();
        if let Some(last) = out_shape.last_mut() {
            *last = self.out_features();
        }

        let cache = LinearCache { x: x.clone() };
        (y.reshape(&out_shape), cache)
    }

    /// Backward pass
    ///
    /// `grad_out` has the shape returned by `forward`.
    pub fn backward(&self, grad_out: &Tensor<F>, cache: &LinearCache<F>) -> LinearGradients<F> {
        let in_features = self.in_features();
        let out_features = self.out_features();
        let rows = cache.x.len() / in_features;

        let x_flat = cache.x.reshape(&[rows, in_features]);
        let grad_flat = grad_out.reshape(&[rows, out_features]);

        // grad_W = x^T @ grad_out
        let weight = x_flat.transpose().matmul(&grad_flat);

        // grad_b = sum(grad_out) along all dims except last
        let bias = grad_flat.sum_rows();

        // grad_x = grad_out @ W^T
        let x = grad_flat
            .matmul(&self.weight.transpose())
            .reshape(&cache.x.shape);

        LinearGradients { weight, bias, x }
    }
}

/// Cache for linear layer backward pass
pub struct LinearCache<F> {
    pub x: Tensor<F>,
}

/// Gradients for linear layer
pub struct LinearGradients<F> {
    pub weight: Tensor<F>,
    pub bias: Tensor<F>,
    pub x: Tensor<F>, // Gradient to pass to previous layer
}
