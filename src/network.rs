//! Recurrent Language Model
//!
//! [`CharRnn`] owns every parameter of the network and ties the pieces
//! together:
//!
//! ```text
//! idx [N, T] ──► W_embed (optional) ──┐
//!                                      ▼
//! X [N, T, D] ──► recurrent stack ──► h [N, T, H] ──► W_out, b_out ──► scores [N, T, V]
//!                                                                        │
//!                                                  softmax cross-entropy ◄┘ y [N, T]
//! ```
//!
//! ## Training
//!
//! [`CharRnn::loss`] runs the stack forward with teacher forcing (the true
//! input at every step), computes the loss and returns gradients for every
//! parameter in a [`ParamSet`] with the same layout as [`CharRnn::params`].
//! When the configuration sets `embed_dim`, inputs are index batches
//! ([`CharRnn::loss_indices`]) looked up in a learned embedding, and
//! `W_embed` gets a gradient like every other weight.
//! Gradients are summed over timesteps and scaled by `1 / (N * T)`, the same
//! factor as the loss.
//!
//! With `reg > 0` an L2 term is added for every weight matrix (never for
//! biases):
//!
//! ```text
//! loss += 0.5 * reg * Σ W²
//! dW   += reg * W
//! ```
//!
//! ## Sampling
//!
//! [`CharRnn::sample`] generates autoregressively. The start index is fed at
//! the first step; every following step is fed the model's own prediction
//! from the step before, one-hot encoded (or embedded) again. Recurrent state
//! is carried across steps exactly as in the unrolled forward pass. Because
//! predictions become inputs, sampling requires `output_dim == input_dim`.
//!
//! ## Example
//!
//! ```rust
//! use char_rnn::{CharRnn, NetworkConfig, OneHotEncoder};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let model = CharRnn::<f64>::new(NetworkConfig::toy(), &mut rng)?;
//!
//! let encoder = OneHotEncoder::new(20);
//! let x = encoder.encode(&[vec![1, 2, 3], vec![4, 5, 6]])?;
//! let (loss, grads) = model.loss(&x, &[vec![2, 3, 4], vec![5, 6, 7]])?;
//! assert!(loss > 0.0);
//! assert_eq!(grads.by_name("Wh_0").unwrap().shape, vec![6, 6]);
//!
//! let text = model.sample(&[1, 2], &encoder, 10)?;
//! assert_eq!(text[0].len(), 10);
//! # Ok::<(), char_rnn::RnnError>(())
//! ```

use crate::config::NetworkConfig;
use crate::layers::cell::{CellKind, CellState, Gate, GATE_ORDER};
use crate::layers::embedding::{Embedding, EmbeddingCache};
use crate::layers::linear::Linear;
use crate::layers::loss::{temporal_softmax_loss, SoftmaxLoss};
use crate::layers::recurrent::RecurrentParams;
use crate::layers::stack::{stack_backward_with_gate_orders, stack_forward};
use crate::params::ParamSet;
use crate::tensor::{Scalar, Tensor};
use crate::vocab::OneHotEncoder;
use crate::{Result, RnnError};
use rand::distr::weighted::WeightedIndex;
use rand::Rng;
use std::borrow::Cow;

/// How the next index is chosen from the output scores while sampling
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SamplingStrategy {
    /// Always take the highest score (deterministic)
    Greedy,
    /// Draw from `softmax(scores / t)`
    Temperature(f64),
}

/// Network input before layer 0
enum Input<'a, F> {
    /// `[N, T, input_dim]` feature vectors
    Dense(&'a Tensor<F>),
    /// `[N, T]` vocabulary indices
    Indices(&'a [Vec<usize>]),
}

#[derive(Clone, Debug)]
pub struct CharRnn<F> {
    /// Live parameters; optimizers update them in place
    pub params: ParamSet<F>,
    config: NetworkConfig,
}

impl<F: Scalar> CharRnn<F> {
    /// Build a network with freshly initialized parameters
    ///
    /// Weights are scaled normal draws; biases start at zero except for the
    /// optional LSTM forget-gate bias.
    pub fn new<R: Rng + ?Sized>(config: NetworkConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let embedding = config
            .embed_dim
            .map(|dim| Embedding::new(config.input_dim, dim, config.weight_scale, rng));
        let layers = (0..config.n_layers)
            .map(|k| {
                RecurrentParams::new(
                    config.cell_type,
                    config.layer_input_dim(k),
                    config.hidden_dim,
                    config.weight_scale,
                    config.forget_bias,
                    rng,
                )
            })
            .collect();
        let output = Linear::new(config.hidden_dim, config.output_dim, config.weight_scale, rng);

        Ok(Self {
            params: ParamSet {
                embedding,
                layers,
                output,
            },
            config,
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn cell(&self) -> CellKind {
        self.config.cell_type
    }

    /// One-hot encoder over this network's input vocabulary
    pub fn encoder(&self) -> OneHotEncoder {
        OneHotEncoder::new(self.config.input_dim)
    }

    pub fn num_parameters(&self) -> usize {
        self.params.num_elements()
    }

    /// Loss and gradients for one minibatch
    ///
    /// `x` is `[N, T, input_dim]`; `y[n][t]` is the target index at each
    /// position and must be below `output_dim`. Networks with an embedding
    /// take indices instead, through [`loss_indices`](Self::loss_indices).
    pub fn loss(&self, x: &Tensor<F>, y: &[Vec<usize>]) -> Result<(F, ParamSet<F>)> {
        self.loss_masked(x, y, None)
    }

    /// [`loss`](Self::loss) with positions excluded by `mask[n][t] == false`
    pub fn loss_masked(
        &self,
        x: &Tensor<F>,
        y: &[Vec<usize>],
        mask: Option<&[Vec<bool>]>,
    ) -> Result<(F, ParamSet<F>)> {
        self.loss_from(Input::Dense(x), y, mask)
    }

    /// Loss on index batches, embedded or one-hot encoded as configured
    pub fn loss_indices(
        &self,
        inputs: &[Vec<usize>],
        targets: &[Vec<usize>],
    ) -> Result<(F, ParamSet<F>)> {
        self.loss_from(Input::Indices(inputs), targets, None)
    }

    fn loss_from(
        &self,
        input: Input<'_, F>,
        y: &[Vec<usize>],
        mask: Option<&[Vec<bool>]>,
    ) -> Result<(F, ParamSet<F>)> {
        self.loss_with_gate_orders(input, y, mask, |_| GATE_ORDER)
    }

    /// Full loss where layer `k` concatenates LSTM gate gradients in
    /// `gate_order(k)`
    fn loss_with_gate_orders(
        &self,
        input: Input<'_, F>,
        y: &[Vec<usize>],
        mask: Option<&[Vec<bool>]>,
        gate_order: impl Fn(usize) -> [Gate; 4],
    ) -> Result<(F, ParamSet<F>)> {
        let (x, embed_cache) = self.layer_input(input)?;
        self.check_targets(&x, y)?;
        let kind = self.cell();

        // Forward
        let (stack_out, stack_cache) = stack_forward(kind, &self.params.layers, &*x, None);
        let (scores, out_cache) = self.params.output.forward(&stack_out.h_seq);
        let SoftmaxLoss { loss, grad, .. } = temporal_softmax_loss(&scores, y, mask)?;

        // Backward
        let out_grads = self.params.output.backward(&grad, &out_cache);
        let stack_grads = stack_backward_with_gate_orders(
            &self.params.layers,
            &out_grads.x,
            stack_cache,
            gate_order,
        );
        let embedding = match (&self.params.embedding, embed_cache) {
            (Some(table), Some(cache)) => Some(Embedding {
                weight: table.backward(&stack_grads.x, &cache),
            }),
            _ => None,
        };

        let mut grads = ParamSet {
            embedding,
            layers: stack_grads.layers,
            output: Linear {
                weight: out_grads.weight,
                bias: out_grads.bias,
            },
        };
        let penalty = self.add_regularization(&mut grads);

        Ok((loss + penalty, grads))
    }

    /// Loss without the backward pass, for validation
    pub fn evaluate(&self, x: &Tensor<F>, y: &[Vec<usize>]) -> Result<F> {
        self.evaluate_from(Input::Dense(x), y)
    }

    /// [`evaluate`](Self::evaluate) on index batches
    pub fn evaluate_indices(&self, inputs: &[Vec<usize>], targets: &[Vec<usize>]) -> Result<F> {
        self.evaluate_from(Input::Indices(inputs), targets)
    }

    fn evaluate_from(&self, input: Input<'_, F>, y: &[Vec<usize>]) -> Result<F> {
        let (x, _) = self.layer_input(input)?;
        self.check_targets(&x, y)?;
        let (scores, _) = self.scores(&x, None)?;
        let out = temporal_softmax_loss(&scores, y, None)?;
        Ok(out.loss + self.regularization_loss())
    }

    /// Scores `[N, T, V]` and the final state of every layer
    ///
    /// `init` optionally supplies one starting state per layer, so a long
    /// sequence can be processed in consecutive chunks.
    pub fn forward_scores(
        &self,
        x: &Tensor<F>,
        init: Option<&[CellState<F>]>,
    ) -> Result<(Tensor<F>, Vec<CellState<F>>)> {
        let (x, _) = self.layer_input(Input::Dense(x))?;
        self.scores(&x, init)
    }

    /// [`forward_scores`](Self::forward_scores) on an index batch
    pub fn forward_scores_indices(
        &self,
        inputs: &[Vec<usize>],
        init: Option<&[CellState<F>]>,
    ) -> Result<(Tensor<F>, Vec<CellState<F>>)> {
        let (x, _) = self.layer_input(Input::Indices(inputs))?;
        self.scores(&x, init)
    }

    fn scores(
        &self,
        x: &Tensor<F>,
        init: Option<&[CellState<F>]>,
    ) -> Result<(Tensor<F>, Vec<CellState<F>>)> {
        if let Some(states) = init {
            self.check_states(states, x.shape[0])?;
        }
        let (out, _) = stack_forward(self.cell(), &self.params.layers, x, init);
        let (scores, _) = self.params.output.forward(&out.h_seq);
        Ok((scores, out.final_states))
    }

    /// Layer-0 input `[N, T, D]`, plus the embedding cache when one was used
    fn layer_input<'a>(
        &self,
        input: Input<'a, F>,
    ) -> Result<(Cow<'a, Tensor<F>>, Option<EmbeddingCache>)> {
        let (x, cache) = match (input, &self.params.embedding) {
            (Input::Dense(_), Some(_)) => {
                return Err(RnnError::InvalidConfiguration(
                    "this network embeds its input; pass index batches".into(),
                ))
            }
            (Input::Dense(x), None) => (Cow::Borrowed(x), None),
            (Input::Indices(indices), None) => (Cow::Owned(self.encoder().encode(indices)?), None),
            (Input::Indices(indices), Some(table)) => {
                let (x, cache) = table.forward(indices)?;
                (Cow::Owned(x), Some(cache))
            }
        };
        self.check_input(&x)?;
        Ok((x, cache))
    }

    /// `0.5 * reg * Σ W²` over every weight matrix
    pub fn regularization_loss(&self) -> F {
        let reg = F::from_f64(self.config.reg);
        if reg == F::zero() {
            return F::zero();
        }
        let half = F::from_f64(0.5);
        self.params
            .tensors()
            .into_iter()
            .filter(|(id, _)| id.is_weight())
            .map(|(_, w)| half * reg * w.sum_squares())
            .sum()
    }

    fn add_regularization(&self, grads: &mut ParamSet<F>) -> F {
        let reg = F::from_f64(self.config.reg);
        if reg == F::zero() {
            return F::zero();
        }
        for ((id, w), (_, g)) in self.params.tensors().into_iter().zip(grads.tensors_mut()) {
            if id.is_weight() {
                *g = g.add(&w.scale(reg));
            }
        }
        self.regularization_loss()
    }

    /// Greedy autoregressive generation
    ///
    /// `start[n]` seeds row `n`. Returns `max_length` generated indices per
    /// row (an empty row when `max_length` is 0).
    pub fn sample(
        &self,
        start: &[usize],
        encoder: &OneHotEncoder,
        max_length: usize,
    ) -> Result<Vec<Vec<usize>>> {
        self.generate(start, encoder, max_length, |scores| Ok(scores.argmax_rows()))
    }

    /// Autoregressive generation with a choice of strategy
    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        start: &[usize],
        encoder: &OneHotEncoder,
        max_length: usize,
        strategy: SamplingStrategy,
        rng: &mut R,
    ) -> Result<Vec<Vec<usize>>> {
        match strategy {
            SamplingStrategy::Greedy => self.sample(start, encoder, max_length),
            SamplingStrategy::Temperature(t) => {
                if !t.is_finite() || t <= 0.0 {
                    return Err(RnnError::InvalidConfiguration(format!(
                        "sampling temperature must be positive, got {}",
                        t
                    )));
                }
                let inv_t = F::from_f64(1.0 / t);
                self.generate(start, encoder, max_length, |scores| {
                    let probs = scores.scale(inv_t).softmax_rows();
                    let vocab = probs.shape[1];
                    probs
                        .data
                        .chunks(vocab)
                        .map(|row| -> Result<usize> {
                            let dist = WeightedIndex::new(row.iter().map(|p| p.as_f64()))
                                .map_err(|e| {
                                    RnnError::InvalidConfiguration(format!(
                                        "cannot sample from scores: {}",
                                        e
                                    ))
                                })?;
                            Ok(rng.sample(&dist))
                        })
                        .collect()
                })
            }
        }
    }

    fn generate(
        &self,
        start: &[usize],
        encoder: &OneHotEncoder,
        max_length: usize,
        mut pick: impl FnMut(&Tensor<F>) -> Result<Vec<usize>>,
    ) -> Result<Vec<Vec<usize>>> {
        // Predictions are fed back as inputs
        if self.config.output_dim != self.config.input_dim {
            return Err(RnnError::ShapeMismatch(format!(
                "sampling needs output_dim ({}) equal to input_dim ({})",
                self.config.output_dim, self.config.input_dim
            )));
        }
        if encoder.dim() != self.config.input_dim {
            return Err(RnnError::ShapeMismatch(format!(
                "encoder width {} does not match input_dim {}",
                encoder.dim(),
                self.config.input_dim
            )));
        }

        let bound = self.config.input_dim;
        if let Some(&index) = start.iter().find(|&&i| i >= bound) {
            return Err(RnnError::InvalidIndex { index, bound });
        }

        let n = start.len();
        let kind = self.cell();
        let mut states: Vec<CellState<F>> = (0..self.params.layers.len())
            .map(|_| CellState::zeros(kind, n, self.config.hidden_dim))
            .collect();
        let mut current = start.to_vec();
        let mut generated = vec![Vec::with_capacity(max_length); n];

        for _ in 0..max_length {
            let mut input = match &self.params.embedding {
                Some(table) => table.forward_step(&current)?,
                None => encoder.encode_step(&current)?,
            };
            for (params, state) in self.params.layers.iter().zip(states.iter_mut()) {
                *state = kind.step(&input, state, params);
                input = state.h.clone();
            }
            let (scores, _) = self.params.output.forward(&input);

            current = pick(&scores)?;
            for (row, &index) in generated.iter_mut().zip(&current) {
                row.push(index);
            }
        }

        Ok(generated)
    }

    fn check_input(&self, x: &Tensor<F>) -> Result<()> {
        if x.shape.len() != 3 {
            return Err(RnnError::ShapeMismatch(format!(
                "input must be [N, T, D], got {:?}",
                x.shape
            )));
        }
        let width = self.config.layer_input_dim(0);
        if x.shape[2] != width {
            return Err(RnnError::ShapeMismatch(format!(
                "input feature width {} does not match layer 0 width {}",
                x.shape[2], width
            )));
        }
        if x.shape[0] == 0 || x.shape[1] == 0 {
            return Err(RnnError::ShapeMismatch(format!(
                "input batch {:?} is empty",
                x.shape
            )));
        }
        Ok(())
    }

    /// `y` must be an `[N, T]` grid of indices below `output_dim`
    fn check_targets(&self, x: &Tensor<F>, y: &[Vec<usize>]) -> Result<()> {
        let (n, steps) = (x.shape[0], x.shape[1]);
        if y.len() != n || y.iter().any(|row| row.len() != steps) {
            return Err(RnnError::ShapeMismatch(format!(
                "targets do not form a [{}, {}] grid",
                n, steps
            )));
        }
        let bound = self.config.output_dim;
        if let Some(&index) = y.iter().flatten().find(|&&i| i >= bound) {
            return Err(RnnError::InvalidIndex { index, bound });
        }
        Ok(())
    }

    fn check_states(&self, states: &[CellState<F>], n: usize) -> Result<()> {
        if states.len() != self.params.layers.len() {
            return Err(RnnError::ShapeMismatch(format!(
                "{} initial states for {} layers",
                states.len(),
                self.params.layers.len()
            )));
        }
        let expected = vec![n, self.config.hidden_dim];
        for state in states {
            let c_ok = state.c.as_ref().map_or(true, |c| c.shape == expected);
            if state.h.shape != expected || !c_ok {
                return Err(RnnError::ShapeMismatch(format!(
                    "initial state must be {:?}",
                    expected
                )));
            }
        }
        Ok(())
    }
}
