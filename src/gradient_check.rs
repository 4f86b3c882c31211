//! Numerical Gradient Checking
//!
//! Hand-derived backward passes are only trustworthy once they agree with a
//! gradient estimated directly from the forward pass. This module provides
//! that estimate and the comparison metrics.
//!
//! ## Central Differences
//!
//! ```text
//! ∂f/∂x_i ≈ (f(x + h·e_i) - f(x - h·e_i)) / 2h
//! ```
//!
//! Each element is perturbed in place and restored before the next one, so
//! `x` is unchanged when the estimate returns. The error of the estimate is
//! `O(h²)` from truncation plus roughly `ε·|f| / h` from cancellation; the
//! default `h = 1e-6` balances the two in double precision. Single precision
//! needs a much larger step (around `1e-2`).
//!
//! ## Relative Error
//!
//! ```text
//! rel(a, b) = max_i |a_i - b_i| / max(|a_i| + |b_i|, 1e-8)
//! ```
//!
//! The element-wise maximum is strict: a gradient entry that is nearly zero
//! in both versions can dominate it through rounding alone.
//! [`norm_relative_error`] compares whole tensors instead and is the better
//! pass/fail signal for large parameter matrices.

use crate::network::CharRnn;
use crate::params::{ParamId, ParamSet};
use crate::tensor::{Scalar, Tensor};
use crate::{Result, RnnError};

/// Default finite-difference step
pub const DEFAULT_STEP: f64 = 1e-6;

const EPS: f64 = 1e-8;

/// Central-difference estimate of `∂f/∂x` for every element of `x`
///
/// `x` is perturbed in place during the call and restored afterwards.
pub fn estimate_gradient<F: Scalar>(
    mut f: impl FnMut(&Tensor<F>) -> F,
    x: &mut Tensor<F>,
    h: f64,
) -> Tensor<F> {
    let step = F::from_f64(h);
    let mut grad = Tensor::zeros(x.shape.clone());

    for i in 0..x.len() {
        let original = x.data[i];

        x.data[i] = original + step;
        let plus = f(x);
        x.data[i] = original - step;
        let minus = f(x);
        x.data[i] = original;

        grad.data[i] = F::from_f64((plus.as_f64() - minus.as_f64()) / (2.0 * h));
    }

    grad
}

/// Numerical gradient of `loss_fn` with respect to one live parameter
///
/// The parameter is perturbed inside `net` and restored before returning.
pub fn estimate_param_gradient<F: Scalar>(
    net: &mut CharRnn<F>,
    id: ParamId,
    h: f64,
    mut loss_fn: impl FnMut(&CharRnn<F>) -> F,
) -> Result<Tensor<F>> {
    let mut grad = Tensor::zeros(param_mut(net, id)?.shape.clone());
    let step = F::from_f64(h);

    for i in 0..grad.len() {
        let original = param_mut(net, id)?.data[i];

        param_mut(net, id)?.data[i] = original + step;
        let plus = loss_fn(net);
        param_mut(net, id)?.data[i] = original - step;
        let minus = loss_fn(net);
        param_mut(net, id)?.data[i] = original;

        grad.data[i] = F::from_f64((plus.as_f64() - minus.as_f64()) / (2.0 * h));
    }

    Ok(grad)
}

fn param_mut<F: Scalar>(net: &mut CharRnn<F>, id: ParamId) -> Result<&mut Tensor<F>> {
    net.params
        .get_mut(id)
        .ok_or_else(|| RnnError::InvalidConfiguration(format!("network has no parameter {}", id)))
}

/// Largest element-wise relative error between two equally shaped tensors
pub fn relative_error<F: Scalar>(a: &Tensor<F>, b: &Tensor<F>) -> f64 {
    assert_eq!(a.shape, b.shape, "relative_error needs equal shapes");
    a.data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| {
            let (x, y) = (x.as_f64(), y.as_f64());
            (x - y).abs() / (x.abs() + y.abs()).max(EPS)
        })
        .fold(0.0, f64::max)
}

/// `‖a - b‖ / max(‖a‖ + ‖b‖, 1e-8)` over whole tensors
pub fn norm_relative_error<F: Scalar>(a: &Tensor<F>, b: &Tensor<F>) -> f64 {
    assert_eq!(a.shape, b.shape, "norm_relative_error needs equal shapes");
    let norm = |it: &mut dyn Iterator<Item = f64>| it.map(|v| v * v).sum::<f64>().sqrt();

    let diff = norm(&mut a.data.iter().zip(&b.data).map(|(&x, &y)| x.as_f64() - y.as_f64()));
    let na = norm(&mut a.data.iter().map(|x| x.as_f64()));
    let nb = norm(&mut b.data.iter().map(|x| x.as_f64()));
    diff / (na + nb).max(EPS)
}

/// Comparison of one parameter's analytic and numerical gradient
#[derive(Clone, Debug)]
pub struct GradientCheck {
    pub id: ParamId,
    /// Element-wise maximum relative error
    pub max_relative_error: f64,
    /// Whole-tensor relative error
    pub norm_relative_error: f64,
}

/// Check every parameter of `net` on one minibatch
///
/// The analytic gradient comes from [`CharRnn::loss`]; the numerical one
/// perturbs each parameter element with step `h`.
pub fn check_network_gradients<F: Scalar>(
    net: &mut CharRnn<F>,
    x: &Tensor<F>,
    y: &[Vec<usize>],
    h: f64,
) -> Result<Vec<GradientCheck>> {
    check_with(net, h, |n| n.loss(x, y))
}

/// [`check_network_gradients`] on an index batch
///
/// Goes through [`CharRnn::loss_indices`], so a network with an input
/// embedding has `W_embed` checked as well.
pub fn check_network_gradients_indices<F: Scalar>(
    net: &mut CharRnn<F>,
    inputs: &[Vec<usize>],
    targets: &[Vec<usize>],
    h: f64,
) -> Result<Vec<GradientCheck>> {
    check_with(net, h, |n| n.loss_indices(inputs, targets))
}

pub(crate) fn check_with<F: Scalar>(
    net: &mut CharRnn<F>,
    h: f64,
    loss: impl Fn(&CharRnn<F>) -> Result<(F, ParamSet<F>)>,
) -> Result<Vec<GradientCheck>> {
    let (_, grads) = loss(net)?;
    // Shapes and indices were validated by the call above
    let loss_fn = |n: &CharRnn<F>| loss(n).map(|(value, _)| value).unwrap_or_else(|_| F::nan());

    let mut results = Vec::new();
    for id in grads.ids() {
        let numeric = estimate_param_gradient(net, id, h, loss_fn)?;
        let analytic = grads
            .get(id)
            .ok_or_else(|| RnnError::InvalidConfiguration(format!("missing gradient {}", id)))?;
        results.push(GradientCheck {
            id,
            max_relative_error: relative_error(analytic, &numeric),
            norm_relative_error: norm_relative_error(analytic, &numeric),
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic() {
        // f(x) = Σ x_i³, ∂f/∂x_i = 3 x_i²
        let mut x = Tensor::new(vec![1.0f64, -2.0, 0.5, 3.0], vec![2, 2]);
        let before = x.clone();
        let grad = estimate_gradient(|x| x.data.iter().map(|v| v * v * v).sum(), &mut x, DEFAULT_STEP);

        assert_eq!(x, before);
        let exact = x.map(|v| 3.0 * v * v);
        assert!(relative_error(&grad, &exact) < 1e-6);
    }

    #[test]
    fn test_relative_error_definition() {
        let a = Tensor::new(vec![1.0f64, 0.0, 2.0], vec![3]);
        let b = Tensor::new(vec![1.1f64, 0.0, 2.0], vec![3]);
        assert!((relative_error(&a, &b) - 0.1 / 2.1).abs() < 1e-12);
        assert_eq!(relative_error(&a, &a), 0.0);

        let expected = 0.1 / (5.0f64.sqrt() + (1.21f64 + 4.0).sqrt());
        assert!((norm_relative_error(&a, &b) - expected).abs() < 1e-12);
    }
}
