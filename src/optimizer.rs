//! Parameter Update Rules
//!
//! The solver hands every gradient set returned by
//! [`CharRnn::loss`](crate::CharRnn::loss) to an [`Optimizer`], which updates
//! the live [`ParamSet`] in place.
//!
//! ## Algorithms
//!
//! ```text
//! # SGD
//! θ = θ - α * g
//!
//! # Adam
//! m = β₁ * m + (1 - β₁) * g        # First moment (momentum)
//! v = β₂ * v + (1 - β₂) * g²       # Second moment (variance)
//! m_hat = m / (1 - β₁^t)           # Bias correction
//! v_hat = v / (1 - β₂^t)           # Bias correction
//! θ = θ - α * m_hat / (√v_hat + ε) # Parameter update
//! ```
//!
//! L2 regularization is already part of the gradients the network returns,
//! so neither rule applies weight decay of its own.
//!
//! ## Optimizer State
//!
//! Adam keeps `m` and `v` as two [`ParamSet`]s with the same layout as the
//! parameters, so every [`ParamId`](crate::ParamId) has its own moments.
//! Tensors above 1000 elements are updated in parallel with Rayon.

use crate::params::ParamSet;
use crate::tensor::{Scalar, Tensor};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How gradients turn into parameter updates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum UpdateRule {
    Sgd,
    Adam { beta1: f64, beta2: f64, eps: f64 },
}

impl UpdateRule {
    /// Adam with β₁ = 0.9, β₂ = 0.999, ε = 1e-8
    pub fn adam() -> Self {
        UpdateRule::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Default for UpdateRule {
    fn default() -> Self {
        Self::adam()
    }
}

struct Moments<F> {
    m: ParamSet<F>,
    v: ParamSet<F>,
}

/// Update rule plus whatever state it carries between steps
pub struct Optimizer<F> {
    pub rule: UpdateRule,
    /// Number of updates applied so far
    pub step: usize,
    moments: Option<Moments<F>>,
}

impl<F: Scalar> Optimizer<F> {
    pub fn new(rule: UpdateRule) -> Self {
        Self {
            rule,
            step: 0,
            moments: None,
        }
    }

    /// Apply one update to `params` using `grads`
    ///
    /// # Panics
    ///
    /// Panics if `grads` does not have the layout of `params`.
    pub fn update(&mut self, params: &mut ParamSet<F>, grads: &ParamSet<F>, lr: f64) {
        assert_eq!(
            params.ids(),
            grads.ids(),
            "gradient set does not match parameter set"
        );
        self.step += 1;
        let lr = F::from_f64(lr);

        match self.rule {
            UpdateRule::Sgd => {
                for ((_, param), (_, grad)) in params.tensors_mut().into_iter().zip(grads.tensors()) {
                    sgd_update(param, grad, lr);
                }
            }
            UpdateRule::Adam { beta1, beta2, eps } => {
                let moments = self.moments.get_or_insert_with(|| Moments {
                    m: params.zeros_like(),
                    v: params.zeros_like(),
                });

                let t = self.step as i32;
                let hyper = AdamHyper {
                    lr,
                    beta1: F::from_f64(beta1),
                    beta2: F::from_f64(beta2),
                    eps: F::from_f64(eps),
                    bias_correction1: F::from_f64(1.0 - beta1.powi(t)),
                    bias_correction2: F::from_f64(1.0 - beta2.powi(t)),
                };

                let slots = params
                    .tensors_mut()
                    .into_iter()
                    .zip(grads.tensors())
                    .zip(moments.m.tensors_mut().into_iter().zip(moments.v.tensors_mut()));
                for (((id, param), (_, grad)), ((_, m), (_, v))) in slots {
                    assert_eq!(param.shape, grad.shape, "gradient shape mismatch for {}", id);
                    adam_update(param, grad, m, v, &hyper);
                }
            }
        }
    }
}

fn sgd_update<F: Scalar>(param: &mut Tensor<F>, grad: &Tensor<F>, lr: F) {
    if param.data.len() > 1000 {
        param
            .data
            .par_iter_mut()
            .zip(grad.data.par_iter())
            .for_each(|(p, &g)| *p = *p - lr * g);
    } else {
        for (p, &g) in param.data.iter_mut().zip(&grad.data) {
            *p = *p - lr * g;
        }
    }
}

struct AdamHyper<F> {
    lr: F,
    beta1: F,
    beta2: F,
    eps: F,
    bias_correction1: F,
    bias_correction2: F,
}

impl<F: Scalar> AdamHyper<F> {
    #[inline]
    fn apply(&self, p: &mut F, g: F, m: &mut F, v: &mut F) {
        let one = F::one();
        *m = self.beta1 * *m + (one - self.beta1) * g;
        *v = self.beta2 * *v + (one - self.beta2) * g * g;

        let m_hat = *m / self.bias_correction1;
        let v_hat = *v / self.bias_correction2;

        *p = *p - self.lr * m_hat / (v_hat.sqrt() + self.eps);
    }
}

fn adam_update<F: Scalar>(
    param: &mut Tensor<F>,
    grad: &Tensor<F>,
    m: &mut Tensor<F>,
    v: &mut Tensor<F>,
    hyper: &AdamHyper<F>,
) {
    // Parallelize for large tensors (>1000 elements)
    if param.data.len() > 1000 {
        param
            .data
            .par_iter_mut()
            .zip(grad.data.par_iter())
            .zip(m.data.par_iter_mut().zip(v.data.par_iter_mut()))
            .for_each(|((p, &g), (m, v))| hyper.apply(p, g, m, v));
    } else {
        for i in 0..param.data.len() {
            hyper.apply(&mut param.data[i], grad.data[i], &mut m.data[i], &mut v.data[i]);
        }
    }
}
