//! Recurrent Cell Steps
//!
//! A cell step advances the recurrent state by one timestep for a whole
//! batch, and its backward pass turns the gradient on the new state into
//! gradients on the input, the previous state and the cell parameters.
//!
//! ## Vanilla RNN
//!
//! ```text
//! a = x @ Wx + h_prev @ Wh + b          a: [N, H]
//! h = tanh(a)
//! ```
//!
//! ## LSTM
//!
//! ```text
//! a = x @ Wx + h_prev @ Wh + b          a: [N, 4H]
//! a_i, a_f, a_o, a_g = split(a)         fixed gate order
//! i = σ(a_i)   f = σ(a_f)   o = σ(a_o)   g = tanh(a_g)
//! c = f * c_prev + i * g
//! h = o * tanh(c)
//! ```
//!
//! The gate order is fixed by [`GATE_ORDER`]. Forward splits the
//! pre-activation with it and backward concatenates the gate gradients with
//! it; if the two ever disagree the parameter gradients land on the wrong
//! columns of `Wx`, `Wh` and `b` without any shape error.

use super::activation::{sigmoid, sigmoid_grad_from_output, tanh, tanh_grad_from_output};
use super::recurrent::RecurrentParams;
use crate::tensor::{Scalar, Tensor};
use crate::RnnError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which recurrence a network uses
///
/// Chosen once when the network is built; every layer of the stack uses the
/// same kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    #[serde(rename = "rnn")]
    Vanilla,
    #[serde(rename = "lstm")]
    Lstm,
}

impl CellKind {
    /// Number of `hidden_dim`-wide blocks in the pre-activation
    pub fn gate_count(self) -> usize {
        match self {
            CellKind::Vanilla => 1,
            CellKind::Lstm => 4,
        }
    }

    /// Width of `Wx`, `Wh` and `b` for a given hidden size
    pub fn gate_width(self, hidden_dim: usize) -> usize {
        self.gate_count() * hidden_dim
    }
}

impl FromStr for CellKind {
    type Err = RnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rnn" | "vanilla" => Ok(CellKind::Vanilla),
            "lstm" => Ok(CellKind::Lstm),
            other => Err(RnnError::InvalidConfiguration(format!(
                "unsupported cell type '{}', expected 'rnn' or 'lstm'",
                other
            ))),
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Vanilla => write!(f, "rnn"),
            CellKind::Lstm => write!(f, "lstm"),
        }
    }
}

/// Recurrent state carried between timesteps
///
/// `c` is the LSTM cell state. It is `None` for vanilla cells, and an LSTM
/// treats a missing `c` as zeros.
#[derive(Clone, Debug, PartialEq)]
pub struct CellState<F> {
    pub h: Tensor<F>,
    pub c: Option<Tensor<F>>,
}

impl<F: Scalar> CellState<F> {
    /// All-zero state for `batch_size` rows
    pub fn zeros(kind: CellKind, batch_size: usize, hidden_dim: usize) -> Self {
        let c = match kind {
            CellKind::Vanilla => None,
            CellKind::Lstm => Some(Tensor::zeros(vec![batch_size, hidden_dim])),
        };
        Self {
            h: Tensor::zeros(vec![batch_size, hidden_dim]),
            c,
        }
    }
}

/// Gradients produced by one backward cell step
pub struct StepGradients<F> {
    /// Gradient with respect to the step input `x`
    pub x: Tensor<F>,
    /// Gradient with respect to the previous state (`dh_prev`, `dc_prev`)
    pub prev: CellState<F>,
    /// Parameter gradients for this step only
    pub params: RecurrentParams<F>,
}

/// One timestep of a recurrence: forward and backward
pub trait CellStep<F: Scalar> {
    /// Values retained by `forward` for the matching `backward`
    type Cache;

    fn forward(
        &self,
        x: &Tensor<F>,
        prev: &CellState<F>,
        params: &RecurrentParams<F>,
    ) -> (CellState<F>, Self::Cache);

    /// `dc_next` is the gradient flowing into this step's cell state from the
    /// following timestep. Vanilla cells ignore it.
    fn backward(
        &self,
        dh: &Tensor<F>,
        dc_next: Option<&Tensor<F>>,
        cache: &Self::Cache,
        params: &RecurrentParams<F>,
    ) -> StepGradients<F>;
}

/// Shared pre-activation `x @ Wx + h_prev @ Wh + b`
fn pre_activation<F: Scalar>(
    x: &Tensor<F>,
    h_prev: &Tensor<F>,
    params: &RecurrentParams<F>,
) -> Tensor<F> {
    x.matmul(&params.wx)
        .add(&h_prev.matmul(&params.wh))
        .add(&params.b)
}

/// Shared tail of both backward passes, from `da` to input/parameter grads
fn affine_backward<F: Scalar>(
    da: &Tensor<F>,
    x: &Tensor<F>,
    h_prev: &Tensor<F>,
    params: &RecurrentParams<F>,
) -> (Tensor<F>, Tensor<F>, RecurrentParams<F>) {
    let dx = da.matmul(&params.wx.transpose());
    let dh_prev = da.matmul(&params.wh.transpose());
    let grads = RecurrentParams {
        wx: x.transpose().matmul(da),
        wh: h_prev.transpose().matmul(da),
        b: da.sum_rows(),
    };
    (dx, dh_prev, grads)
}

//=============================================================================
// VANILLA RNN
//=============================================================================

/// Tanh recurrence `h = tanh(x @ Wx + h_prev @ Wh + b)`
#[derive(Clone, Copy, Debug, Default)]
pub struct VanillaCell;

pub struct VanillaCache<F> {
    x: Tensor<F>,
    h_prev: Tensor<F>,
    h: Tensor<F>,
}

impl<F: Scalar> CellStep<F> for VanillaCell {
    type Cache = VanillaCache<F>;

    fn forward(
        &self,
        x: &Tensor<F>,
        prev: &CellState<F>,
        params: &RecurrentParams<F>,
    ) -> (CellState<F>, Self::Cache) {
        let h = tanh(&pre_activation(x, &prev.h, params));
        let cache = VanillaCache {
            x: x.clone(),
            h_prev: prev.h.clone(),
            h: h.clone(),
        };
        (CellState { h, c: None }, cache)
    }

    fn backward(
        &self,
        dh: &Tensor<F>,
        _dc_next: Option<&Tensor<F>>,
        cache: &Self::Cache,
        params: &RecurrentParams<F>,
    ) -> StepGradients<F> {
        // da = dh * (1 - h²)
        let da = dh.mul(&tanh_grad_from_output(&cache.h));
        let (dx, dh_prev, grads) = affine_backward(&da, &cache.x, &cache.h_prev, params);

        StepGradients {
            x: dx,
            prev: CellState {
                h: dh_prev,
                c: None,
            },
            params: grads,
        }
    }
}

//=============================================================================
// LSTM
//=============================================================================

/// The four LSTM gates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Input,
    Forget,
    Output,
    Candidate,
}

/// Column order of the gate blocks in `Wx`, `Wh` and `b`
pub const GATE_ORDER: [Gate; 4] = [Gate::Input, Gate::Forget, Gate::Output, Gate::Candidate];

impl Gate {
    /// Block index of this gate in [`GATE_ORDER`]
    pub fn block(self) -> usize {
        match self {
            Gate::Input => 0,
            Gate::Forget => 1,
            Gate::Output => 2,
            Gate::Candidate => 3,
        }
    }

    /// Column range of this gate within a `4H`-wide tensor
    pub fn columns(self, hidden_dim: usize) -> std::ops::Range<usize> {
        let start = self.block() * hidden_dim;
        start..start + hidden_dim
    }
}

/// Long short-term memory cell
#[derive(Clone, Copy, Debug, Default)]
pub struct LstmCell;

pub struct LstmCache<F> {
    x: Tensor<F>,
    h_prev: Tensor<F>,
    c_prev: Tensor<F>,
    i: Tensor<F>,
    f: Tensor<F>,
    o: Tensor<F>,
    g: Tensor<F>,
    tanh_c: Tensor<F>,
}

impl LstmCell {
    /// Backward pass that concatenates the gate gradients in `order`
    ///
    /// [`CellStep::backward`] calls this with [`GATE_ORDER`]; any other order
    /// produces gradients for a differently laid out parameter matrix.
    pub(crate) fn backward_with_gate_order<F: Scalar>(
        &self,
        dh: &Tensor<F>,
        dc_next: Option<&Tensor<F>>,
        cache: &LstmCache<F>,
        params: &RecurrentParams<F>,
        order: &[Gate; 4],
    ) -> StepGradients<F> {
        // dc = dc_next + dh * o * (1 - tanh(c)²)
        let mut dc = dh.mul(&cache.o).mul(&tanh_grad_from_output(&cache.tanh_c));
        if let Some(dc_next) = dc_next {
            dc.add_assign(dc_next);
        }

        let d_o = dh.mul(&cache.tanh_c).mul(&sigmoid_grad_from_output(&cache.o));
        let d_f = dc.mul(&cache.c_prev).mul(&sigmoid_grad_from_output(&cache.f));
        let d_i = dc.mul(&cache.g).mul(&sigmoid_grad_from_output(&cache.i));
        let d_g = dc.mul(&cache.i).mul(&tanh_grad_from_output(&cache.g));

        let blocks: Vec<&Tensor<F>> = order
            .iter()
            .map(|gate| match gate {
                Gate::Input => &d_i,
                Gate::Forget => &d_f,
                Gate::Output => &d_o,
                Gate::Candidate => &d_g,
            })
            .collect();
        let da = Tensor::concat_cols(&blocks);

        let (dx, dh_prev, grads) = affine_backward(&da, &cache.x, &cache.h_prev, params);
        let dc_prev = dc.mul(&cache.f);

        StepGradients {
            x: dx,
            prev: CellState {
                h: dh_prev,
                c: Some(dc_prev),
            },
            params: grads,
        }
    }
}

impl<F: Scalar> CellStep<F> for LstmCell {
    type Cache = LstmCache<F>;

    fn forward(
        &self,
        x: &Tensor<F>,
        prev: &CellState<F>,
        params: &RecurrentParams<F>,
    ) -> (CellState<F>, Self::Cache) {
        let hidden_dim = params.hidden_dim();
        let a = pre_activation(x, &prev.h, params);
        let gate = |g: Gate| {
            let cols = g.columns(hidden_dim);
            a.slice_cols(cols.start, cols.end)
        };

        let i = sigmoid(&gate(Gate::Input));
        let f = sigmoid(&gate(Gate::Forget));
        let o = sigmoid(&gate(Gate::Output));
        let g = tanh(&gate(Gate::Candidate));

        let c_prev = prev
            .c
            .clone()
            .unwrap_or_else(|| Tensor::zeros(prev.h.shape.clone()));

        // c = f * c_prev + i * g
        let c = f.mul(&c_prev).add(&i.mul(&g));
        let tanh_c = tanh(&c);
        let h = o.mul(&tanh_c);

        let cache = LstmCache {
            x: x.clone(),
            h_prev: prev.h.clone(),
            c_prev,
            i,
            f,
            o,
            g,
            tanh_c,
        };
        (CellState { h, c: Some(c) }, cache)
    }

    fn backward(
        &self,
        dh: &Tensor<F>,
        dc_next: Option<&Tensor<F>>,
        cache: &Self::Cache,
        params: &RecurrentParams<F>,
    ) -> StepGradients<F> {
        self.backward_with_gate_order(dh, dc_next, cache, params, &GATE_ORDER)
    }
}

/// LSTM step whose backward concatenates the gate gradients in `order`
///
/// Forward is the plain [`LstmCell`] forward. With [`GATE_ORDER`] this is
/// the regular LSTM; any other order is a deliberately mismatched backward.
pub(crate) struct GateOrderedLstm<'a>(pub(crate) &'a [Gate; 4]);

impl<F: Scalar> CellStep<F> for GateOrderedLstm<'_> {
    type Cache = LstmCache<F>;

    fn forward(
        &self,
        x: &Tensor<F>,
        prev: &CellState<F>,
        params: &RecurrentParams<F>,
    ) -> (CellState<F>, Self::Cache) {
        LstmCell.forward(x, prev, params)
    }

    fn backward(
        &self,
        dh: &Tensor<F>,
        dc_next: Option<&Tensor<F>>,
        cache: &Self::Cache,
        params: &RecurrentParams<F>,
    ) -> StepGradients<F> {
        LstmCell.backward_with_gate_order(dh, dc_next, cache, params, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient_check::{estimate_gradient, norm_relative_error};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        x: Tensor<f64>,
        prev: CellState<f64>,
        params: RecurrentParams<f64>,
        dh: Tensor<f64>,
        dc: Tensor<f64>,
    }

    fn fixture(kind: CellKind, seed: u64) -> Fixture {
        let (n, d, h) = (3, 4, 5);
        let mut rng = StdRng::seed_from_u64(seed);
        let params = RecurrentParams {
            wx: Tensor::randn(vec![d, kind.gate_width(h)], 0.5, &mut rng),
            wh: Tensor::randn(vec![h, kind.gate_width(h)], 0.5, &mut rng),
            b: Tensor::randn(vec![kind.gate_width(h)], 0.5, &mut rng),
        };
        let c = match kind {
            CellKind::Vanilla => None,
            CellKind::Lstm => Some(Tensor::randn(vec![n, h], 1.0, &mut rng)),
        };
        Fixture {
            x: Tensor::randn(vec![n, d], 1.0, &mut rng),
            prev: CellState {
                h: Tensor::randn(vec![n, h], 1.0, &mut rng),
                c,
            },
            params,
            dh: Tensor::randn(vec![n, h], 1.0, &mut rng),
            dc: Tensor::randn(vec![n, h], 1.0, &mut rng),
        }
    }

    /// Scalar objective `sum(h * dh) + sum(c * dc)` whose gradient is the
    /// step backward pass with upstream `(dh, dc)`.
    fn objective<C: CellStep<f64>>(
        cell: &C,
        x: &Tensor<f64>,
        prev: &CellState<f64>,
        params: &RecurrentParams<f64>,
        fx: &Fixture,
    ) -> f64 {
        let (next, _) = cell.forward(x, prev, params);
        let mut total: f64 = next.h.mul(&fx.dh).data.iter().sum();
        if let Some(c) = &next.c {
            total += c.mul(&fx.dc).data.iter().sum::<f64>();
        }
        total
    }

    fn check_cell<C: CellStep<f64>>(cell: &C, kind: CellKind) {
        let fx = fixture(kind, 11);
        let (_, cache) = cell.forward(&fx.x, &fx.prev, &fx.params);
        let dc = matches!(kind, CellKind::Lstm).then_some(&fx.dc);
        let grads = cell.backward(&fx.dh, dc, &cache, &fx.params);

        let mut x = fx.x.clone();
        let num_dx = estimate_gradient(
            |x| objective(cell, x, &fx.prev, &fx.params, &fx),
            &mut x,
            1e-6,
        );
        assert!(norm_relative_error(&grads.x, &num_dx) < 1e-7);

        let mut h_prev = fx.prev.h.clone();
        let num_dh = estimate_gradient(
            |h| {
                let prev = CellState {
                    h: h.clone(),
                    c: fx.prev.c.clone(),
                };
                objective(cell, &fx.x, &prev, &fx.params, &fx)
            },
            &mut h_prev,
            1e-6,
        );
        assert!(norm_relative_error(&grads.prev.h, &num_dh) < 1e-7);

        let mut wx = fx.params.wx.clone();
        let num_dwx = estimate_gradient(
            |w| {
                let params = RecurrentParams {
                    wx: w.clone(),
                    ..fx.params.clone()
                };
                objective(cell, &fx.x, &fx.prev, &params, &fx)
            },
            &mut wx,
            1e-6,
        );
        assert!(norm_relative_error(&grads.params.wx, &num_dwx) < 1e-7);

        let mut b = fx.params.b.clone();
        let num_db = estimate_gradient(
            |b| {
                let params = RecurrentParams {
                    b: b.clone(),
                    ..fx.params.clone()
                };
                objective(cell, &fx.x, &fx.prev, &params, &fx)
            },
            &mut b,
            1e-6,
        );
        assert!(norm_relative_error(&grads.params.b, &num_db) < 1e-7);
    }

    #[test]
    fn test_vanilla_step_gradients() {
        check_cell(&VanillaCell, CellKind::Vanilla);
    }

    #[test]
    fn test_lstm_step_gradients() {
        check_cell(&LstmCell, CellKind::Lstm);
    }

    #[test]
    fn test_lstm_cell_state_gradient() {
        let fx = fixture(CellKind::Lstm, 12);
        let (_, cache) = LstmCell.forward(&fx.x, &fx.prev, &fx.params);
        let grads = LstmCell.backward(&fx.dh, Some(&fx.dc), &cache, &fx.params);

        let mut c_prev = fx.prev.c.clone().unwrap();
        let numeric = estimate_gradient(
            |c| {
                let prev = CellState {
                    h: fx.prev.h.clone(),
                    c: Some(c.clone()),
                };
                objective(&LstmCell, &fx.x, &prev, &fx.params, &fx)
            },
            &mut c_prev,
            1e-6,
        );
        assert!(norm_relative_error(grads.prev.c.as_ref().unwrap(), &numeric) < 1e-7);
    }

    #[test]
    fn test_swapped_gate_order_fails_gradient_check() {
        let fx = fixture(CellKind::Lstm, 13);
        let (_, cache) = LstmCell.forward(&fx.x, &fx.prev, &fx.params);

        let mut b = fx.params.b.clone();
        let numeric = estimate_gradient(
            |b| {
                let params = RecurrentParams {
                    b: b.clone(),
                    ..fx.params.clone()
                };
                objective(&LstmCell, &fx.x, &fx.prev, &params, &fx)
            },
            &mut b,
            1e-6,
        );

        let correct = LstmCell.backward(&fx.dh, Some(&fx.dc), &cache, &fx.params);
        assert!(norm_relative_error(&correct.params.b, &numeric) < 1e-7);

        let swaps = [
            [Gate::Forget, Gate::Input, Gate::Output, Gate::Candidate],
            [Gate::Input, Gate::Forget, Gate::Candidate, Gate::Output],
            [Gate::Output, Gate::Forget, Gate::Input, Gate::Candidate],
        ];
        for order in &swaps {
            let wrong =
                LstmCell.backward_with_gate_order(&fx.dh, Some(&fx.dc), &cache, &fx.params, order);
            assert!(
                norm_relative_error(&wrong.params.b, &numeric) > 1e-2,
                "gate order {:?} passed the gradient check",
                order
            );
        }
    }

    #[test]
    fn test_lstm_missing_cell_state_is_zero() {
        let fx = fixture(CellKind::Lstm, 14);
        let without = CellState {
            h: fx.prev.h.clone(),
            c: None,
        };
        let with_zeros = CellState {
            h: fx.prev.h.clone(),
            c: Some(Tensor::zeros(fx.prev.h.shape.clone())),
        };
        let (a, _) = LstmCell.forward(&fx.x, &without, &fx.params);
        let (b, _) = LstmCell.forward(&fx.x, &with_zeros, &fx.params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_cell_kind() {
        assert_eq!("rnn".parse::<CellKind>().unwrap(), CellKind::Vanilla);
        assert_eq!("LSTM".parse::<CellKind>().unwrap(), CellKind::Lstm);
        assert!(matches!(
            "gru".parse::<CellKind>(),
            Err(RnnError::InvalidConfiguration(_))
        ));
    }
}
