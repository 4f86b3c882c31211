//! Temporal Unroll
//!
//! Applies one cell step per timestep across a `[N, T, D]` batch, carrying
//! the recurrent state forward, and runs backpropagation through time in
//! reverse.
//!
//! ## Forward Pass
//!
//! ```text
//! state_0 = init or zeros
//! for t in 0..T:
//!     state_{t+1}, cache_t = step(x[:, t, :], state_t)
//! h_seq[:, t, :] = h_{t+1}                     h_seq: [N, T, H]
//! ```
//!
//! ## Backward Pass
//!
//! ```text
//! carry = 0
//! for t in T-1..=0:
//!     dh_t = dh_seq[:, t, :] + carry.h
//!     grads_t = step_backward(dh_t, carry.c, cache_t)
//!     dWx += grads_t.Wx   dWh += grads_t.Wh   db += grads_t.b
//!     dx_seq[:, t, :] = grads_t.x
//!     carry = grads_t.prev
//! ```
//!
//! Parameter gradients are summed over timesteps. The reverse loop is
//! sequential because step `t` needs the carry from step `t + 1`.

use super::cell::{
    CellKind, CellState, CellStep, Gate, GateOrderedLstm, LstmCache, LstmCell, VanillaCache,
    VanillaCell, GATE_ORDER,
};
use crate::tensor::{Scalar, Tensor};
use rand::Rng;

/// Parameters of one recurrent layer
///
/// `G` below is `hidden_dim` for a vanilla cell and `4 * hidden_dim` for an
/// LSTM, with the gate blocks laid out in
/// [`GATE_ORDER`](super::cell::GATE_ORDER).
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentParams<F> {
    /// Input-to-hidden weight `[D, G]`
    pub wx: Tensor<F>,
    /// Hidden-to-hidden weight `[H, G]`
    pub wh: Tensor<F>,
    /// Bias `[G]`
    pub b: Tensor<F>,
}

impl<F: Scalar> RecurrentParams<F> {
    /// Initialize a layer
    ///
    /// Weights are `N(0, 1)` draws times `weight_scale`, defaulting to
    /// `1/√fan_in` per matrix. Biases are zero except that an LSTM gets
    /// `forget_bias` (if any) on its forget-gate slice; the candidate slice is
    /// always independent of it.
    pub fn new<R: Rng + ?Sized>(
        kind: CellKind,
        input_dim: usize,
        hidden_dim: usize,
        weight_scale: Option<f64>,
        forget_bias: Option<f64>,
        rng: &mut R,
    ) -> Self {
        let width = kind.gate_width(hidden_dim);
        let scale_x = weight_scale.unwrap_or_else(|| 1.0 / (input_dim as f64).sqrt());
        let scale_h = weight_scale.unwrap_or_else(|| 1.0 / (hidden_dim as f64).sqrt());

        let mut b = Tensor::zeros(vec![width]);
        if let (CellKind::Lstm, Some(bias)) = (kind, forget_bias) {
            let cols = Gate::Forget.columns(hidden_dim);
            for v in &mut b.data[cols] {
                *v = F::from_f64(bias);
            }
        }

        Self {
            wx: Tensor::randn(vec![input_dim, width], scale_x, rng),
            wh: Tensor::randn(vec![hidden_dim, width], scale_h, rng),
            b,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.wx.shape[0]
    }

    pub fn hidden_dim(&self) -> usize {
        self.wh.shape[0]
    }

    /// Zero tensors with the same shapes, used as gradient accumulators
    pub fn zeros_like(&self) -> Self {
        Self {
            wx: Tensor::zeros(self.wx.shape.clone()),
            wh: Tensor::zeros(self.wh.shape.clone()),
            b: Tensor::zeros(self.b.shape.clone()),
        }
    }

    fn accumulate(&mut self, other: &RecurrentParams<F>) {
        self.wx.add_assign(&other.wx);
        self.wh.add_assign(&other.wh);
        self.b.add_assign(&other.b);
    }
}

/// Per-timestep caches of one unrolled layer
///
/// Produced by [`CellKind::forward_sequence`] and consumed by
/// [`SequenceCache::backward`]. The variant records which cell produced it,
/// so a cache can only be replayed through the matching backward pass.
pub enum SequenceCache<F> {
    Vanilla(Vec<VanillaCache<F>>),
    Lstm(Vec<LstmCache<F>>),
}

/// Output of one unrolled layer
pub struct SequenceOutput<F> {
    /// Hidden states for every timestep `[N, T, H]`
    pub h_seq: Tensor<F>,
    /// State after the last timestep
    pub final_state: CellState<F>,
}

/// Gradients of one unrolled layer
pub struct SequenceGradients<F> {
    /// Gradient with respect to the input sequence `[N, T, D]`
    pub x: Tensor<F>,
    /// Parameter gradients summed over all timesteps
    pub params: RecurrentParams<F>,
    /// Gradient with respect to the initial state
    pub init: CellState<F>,
}

fn unroll_forward<F: Scalar, C: CellStep<F>>(
    cell: &C,
    kind: CellKind,
    x_seq: &Tensor<F>,
    init: Option<&CellState<F>>,
    params: &RecurrentParams<F>,
) -> (SequenceOutput<F>, Vec<C::Cache>) {
    let (n, steps) = (x_seq.shape[0], x_seq.shape[1]);
    let hidden_dim = params.hidden_dim();

    let mut state = match init {
        Some(state) => state.clone(),
        None => CellState::zeros(kind, n, hidden_dim),
    };
    let mut h_seq = Tensor::zeros(vec![n, steps, hidden_dim]);
    let mut caches = Vec::with_capacity(steps);

    for t in 0..steps {
        let (next, cache) = cell.forward(&x_seq.time_step(t), &state, params);
        h_seq.set_time_step(t, &next.h);
        caches.push(cache);
        state = next;
    }

    let output = SequenceOutput {
        h_seq,
        final_state: state,
    };
    (output, caches)
}

fn unroll_backward<F: Scalar, C: CellStep<F>>(
    cell: &C,
    kind: CellKind,
    dh_seq: &Tensor<F>,
    caches: &[C::Cache],
    params: &RecurrentParams<F>,
) -> SequenceGradients<F> {
    let (n, steps) = (dh_seq.shape[0], dh_seq.shape[1]);
    let input_dim = params.input_dim();

    let mut dx_seq = Tensor::zeros(vec![n, steps, input_dim]);
    let mut grads = params.zeros_like();
    let mut carry = CellState::zeros(kind, n, params.hidden_dim());

    for (t, cache) in caches.iter().enumerate().rev() {
        let mut dh = dh_seq.time_step(t);
        dh.add_assign(&carry.h);

        let step = cell.backward(&dh, carry.c.as_ref(), cache, params);
        grads.accumulate(&step.params);
        dx_seq.set_time_step(t, &step.x);
        carry = step.prev;
    }

    SequenceGradients {
        x: dx_seq,
        params: grads,
        init: carry,
    }
}

impl CellKind {
    /// Run one layer over a `[N, T, D]` sequence
    ///
    /// `init` is the state before the first timestep; zeros when `None`.
    pub fn forward_sequence<F: Scalar>(
        self,
        x_seq: &Tensor<F>,
        init: Option<&CellState<F>>,
        params: &RecurrentParams<F>,
    ) -> (SequenceOutput<F>, SequenceCache<F>) {
        assert_eq!(
            x_seq.shape.len(),
            3,
            "sequence input must be [N, T, D], got {:?}",
            x_seq.shape
        );
        match self {
            CellKind::Vanilla => {
                let (out, caches) = unroll_forward(&VanillaCell, self, x_seq, init, params);
                (out, SequenceCache::Vanilla(caches))
            }
            CellKind::Lstm => {
                let (out, caches) = unroll_forward(&LstmCell, self, x_seq, init, params);
                (out, SequenceCache::Lstm(caches))
            }
        }
    }

    /// Advance a single timestep, used by autoregressive sampling
    pub fn step<F: Scalar>(
        self,
        x: &Tensor<F>,
        prev: &CellState<F>,
        params: &RecurrentParams<F>,
    ) -> CellState<F> {
        match self {
            CellKind::Vanilla => VanillaCell.forward(x, prev, params).0,
            CellKind::Lstm => LstmCell.forward(x, prev, params).0,
        }
    }
}

impl<F: Scalar> SequenceCache<F> {
    pub fn kind(&self) -> CellKind {
        match self {
            SequenceCache::Vanilla(_) => CellKind::Vanilla,
            SequenceCache::Lstm(_) => CellKind::Lstm,
        }
    }

    /// Backpropagation through time
    ///
    /// `dh_seq` is the gradient of the loss with respect to every hidden
    /// output `[N, T, H]`. Consumes the cache.
    pub fn backward(self, dh_seq: &Tensor<F>, params: &RecurrentParams<F>) -> SequenceGradients<F> {
        self.backward_with_gate_order(dh_seq, params, &GATE_ORDER)
    }

    /// [`backward`](Self::backward) with the LSTM gate gradients
    /// concatenated in `order`; vanilla caches ignore it
    pub(crate) fn backward_with_gate_order(
        self,
        dh_seq: &Tensor<F>,
        params: &RecurrentParams<F>,
        order: &[Gate; 4],
    ) -> SequenceGradients<F> {
        let kind = self.kind();
        match self {
            SequenceCache::Vanilla(caches) => {
                unroll_backward(&VanillaCell, kind, dh_seq, &caches, params)
            }
            SequenceCache::Lstm(caches) => {
                unroll_backward(&GateOrderedLstm(order), kind, dh_seq, &caches, params)
            }
        }
    }
}
