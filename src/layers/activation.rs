//! Activation Functions
//!
//! The two nonlinearities used by recurrent cells, with derivatives written in
//! terms of the *output* of the activation. That is the form the backward
//! passes need, because the cache already holds the activated values.
//!
//! ```text
//! sigmoid(x) = 1 / (1 + e^-x)      sigmoid'(x) = s * (1 - s)
//! tanh(x)                          tanh'(x)    = 1 - t²
//! ```
//!
//! `sigmoid` is evaluated in two branches so that `exp()` is only ever called
//! on a non-positive argument and cannot overflow.

use crate::tensor::{Scalar, Tensor};

/// Numerically stable logistic function on a scalar
pub fn sigmoid_scalar<F: Scalar>(x: F) -> F {
    if x >= F::zero() {
        F::one() / (F::one() + (-x).exp())
    } else {
        let z = x.exp();
        z / (F::one() + z)
    }
}

/// Element-wise sigmoid
pub fn sigmoid<F: Scalar>(x: &Tensor<F>) -> Tensor<F> {
    x.map(sigmoid_scalar)
}

/// Element-wise tanh
pub fn tanh<F: Scalar>(x: &Tensor<F>) -> Tensor<F> {
    x.map(|v| v.tanh())
}

/// Derivative of sigmoid given its output `s`: `s * (1 - s)`
pub fn sigmoid_grad_from_output<F: Scalar>(s: &Tensor<F>) -> Tensor<F> {
    s.map(|v| v * (F::one() - v))
}

/// Derivative of tanh given its output `t`: `1 - t²`
pub fn tanh_grad_from_output<F: Scalar>(t: &Tensor<F>) -> Tensor<F> {
    t.map(|v| F::one() - v * v)
}
