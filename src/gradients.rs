//! Gradient Utilities
//!
//! Global-norm measurement and clipping for a gradient [`ParamSet`].
//!
//! Recurrent networks are prone to exploding gradients: backpropagating
//! through many timesteps multiplies by `Wh` once per step. Clipping rescales
//! the whole gradient set when its norm passes a threshold, keeping the
//! update direction while bounding its size.
//!
//! ## Algorithm
//!
//! ```text
//! norm = √(Σ g²)                    // over every tensor in the set
//! if norm > max_norm:
//!     gradients *= (max_norm / norm)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use char_rnn::gradients::{clip_gradients, compute_grad_norm};
//! use char_rnn::{CharRnn, NetworkConfig};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let model = CharRnn::<f64>::new(NetworkConfig::toy(), &mut rng)?;
//! let (_, mut grads) = model.loss_indices(&[vec![1, 2, 3]], &[vec![2, 3, 4]])?;
//!
//! clip_gradients(&mut grads, 0.1);
//! assert!(compute_grad_norm(&grads) <= 0.1 + 1e-9);
//! # Ok::<(), char_rnn::RnnError>(())
//! ```

use crate::params::ParamSet;
use crate::tensor::Scalar;
use rayon::prelude::*;

/// L2 norm over every gradient value in the set
pub fn compute_grad_norm<F: Scalar>(grads: &ParamSet<F>) -> f64 {
    let sum_sq: f64 = grads
        .tensors()
        .into_iter()
        .map(|(_, t)| t.data.par_iter().map(|&g| g.as_f64() * g.as_f64()).sum::<f64>())
        .sum();
    sum_sq.sqrt()
}

/// Scale all gradients so their global norm is at most `max_norm`
///
/// Returns the norm measured before clipping.
pub fn clip_gradients<F: Scalar>(grads: &mut ParamSet<F>, max_norm: f64) -> f64 {
    let norm = compute_grad_norm(grads);

    if norm > max_norm {
        let scale = F::from_f64(max_norm / norm);
        for (_, t) in grads.tensors_mut() {
            t.data.par_iter_mut().for_each(|g| *g = *g * scale);
        }
    }
    norm
}
