//! Neural Network Layers
//!
//! The building blocks of the recurrent language model. Each one provides a
//! forward pass and the matching hand-derived backward pass.
//!
//! ## Layers
//!
//! - **activation**: sigmoid and tanh with output-form derivatives
//! - **embedding**: learned lookup from vocabulary indices to input vectors
//! - **cell**: one timestep of a vanilla RNN or LSTM
//! - **recurrent**: a cell unrolled over a sequence (backprop through time)
//! - **stack**: several unrolled layers on top of each other
//! - **linear**: the output projection from hidden states to scores
//! - **loss**: temporal softmax cross-entropy
//!
//! ## Design Pattern
//!
//! Each trainable layer follows a consistent pattern:
//!
//! ```rust,ignore
//! impl Layer {
//!     pub fn forward(&self, x: &Tensor<F>) -> (Tensor<F>, Cache) { }
//!     pub fn backward(&self, grad: &Tensor<F>, cache: &Cache) -> Gradients { }
//! }
//! ```
//!
//! Caches are typed values returned by `forward` and handed back to
//! `backward`. Nothing is stored on the layer itself, so a network can be
//! shared between independent forward/backward pairs.

pub mod activation;
pub mod cell;
pub mod embedding;
pub mod linear;
pub mod loss;
pub mod recurrent;
pub mod stack;

pub use cell::{CellKind, CellState, CellStep, Gate, LstmCell, VanillaCell, GATE_ORDER};
pub use embedding::{Embedding, EmbeddingCache};
pub use linear::{Linear, LinearCache, LinearGradients};
pub use loss::{temporal_softmax_loss, SoftmaxLoss};
pub use recurrent::{RecurrentParams, SequenceCache, SequenceGradients, SequenceOutput};
pub use stack::{stack_backward, stack_forward, StackCache, StackGradients, StackOutput};
