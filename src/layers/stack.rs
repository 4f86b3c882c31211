//! Layer Stack
//!
//! Composes unrolled layers so that the hidden sequence of layer `k` is the
//! input sequence of layer `k + 1`.
//!
//! ```text
//! x ──► layer 0 ──► h⁰ ──► layer 1 ──► h¹ ──► ... ──► h^(L-1)
//! ```
//!
//! Backward walks the stack from the top: the input gradient of layer `k`
//! becomes the hidden-sequence gradient of layer `k - 1`. Each layer's
//! parameter gradients are kept separate.

use super::cell::{CellKind, CellState, Gate, GATE_ORDER};
use super::recurrent::{RecurrentParams, SequenceCache};
use crate::tensor::{Scalar, Tensor};

/// Everything the stack retains between forward and backward
pub struct StackCache<F> {
    layers: Vec<SequenceCache<F>>,
}

impl<F> StackCache<F> {
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }
}

/// Forward output of the stack
pub struct StackOutput<F> {
    /// Hidden sequence of the top layer `[N, T, H]`
    pub h_seq: Tensor<F>,
    /// State of every layer after the last timestep
    pub final_states: Vec<CellState<F>>,
}

/// Backward output of the stack
pub struct StackGradients<F> {
    /// One entry per layer, bottom first
    pub layers: Vec<RecurrentParams<F>>,
    /// Gradient with respect to the stack input `[N, T, D]`
    pub x: Tensor<F>,
    /// Gradient with respect to each layer's initial state
    pub init: Vec<CellState<F>>,
}

/// Forward pass through every layer
///
/// `init`, when given, holds one initial state per layer.
pub fn stack_forward<F: Scalar>(
    kind: CellKind,
    layers: &[RecurrentParams<F>],
    x: &Tensor<F>,
    init: Option<&[CellState<F>]>,
) -> (StackOutput<F>, StackCache<F>) {
    if let Some(init) = init {
        assert_eq!(
            init.len(),
            layers.len(),
            "expected one initial state per layer"
        );
    }

    let mut input = x.clone();
    let mut caches = Vec::with_capacity(layers.len());
    let mut final_states = Vec::with_capacity(layers.len());

    for (k, params) in layers.iter().enumerate() {
        let layer_init = init.map(|states| &states[k]);
        let (out, cache) = kind.forward_sequence(&input, layer_init, params);
        caches.push(cache);
        final_states.push(out.final_state);
        input = out.h_seq;
    }

    let output = StackOutput {
        h_seq: input,
        final_states,
    };
    (output, StackCache { layers: caches })
}

/// Backward pass from the top layer's hidden-sequence gradient
pub fn stack_backward<F: Scalar>(
    layers: &[RecurrentParams<F>],
    dh_top: &Tensor<F>,
    cache: StackCache<F>,
) -> StackGradients<F> {
    stack_backward_with_gate_orders(layers, dh_top, cache, |_| GATE_ORDER)
}

/// [`stack_backward`] with layer `k`'s LSTM gate gradients concatenated in
/// `gate_order(k)`
pub(crate) fn stack_backward_with_gate_orders<F: Scalar>(
    layers: &[RecurrentParams<F>],
    dh_top: &Tensor<F>,
    cache: StackCache<F>,
    gate_order: impl Fn(usize) -> [Gate; 4],
) -> StackGradients<F> {
    assert_eq!(
        cache.layers.len(),
        layers.len(),
        "cache was produced by a stack of a different depth"
    );

    let mut grad = dh_top.clone();
    let mut param_grads = Vec::with_capacity(layers.len());
    let mut init_grads = Vec::with_capacity(layers.len());

    for (k, (layer_cache, params)) in cache.layers.into_iter().zip(layers).enumerate().rev() {
        let g = layer_cache.backward_with_gate_order(&grad, params, &gate_order(k));
        param_grads.push(g.params);
        init_grads.push(g.init);
        grad = g.x;
    }

    param_grads.reverse();
    init_grads.reverse();

    StackGradients {
        layers: param_grads,
        x: grad,
        init: init_grads,
    }
}
