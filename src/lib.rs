//! Char-RNN: Recurrent Language Models from Scratch
//!
//! Vanilla RNN and LSTM cells with hand-derived backpropagation through
//! time, stacked into a character-level language model with a temporal
//! softmax loss, greedy or temperature sampling, and a minibatch solver.
//! Every analytic gradient can be checked against central finite
//! differences.
//!
//! # Modules
//!
//! - [`tensor`] - Dense tensors generic over `f32`/`f64`
//! - [`layers`] - Embedding, cells, unrolled sequences, stacks, output
//!   projection, loss
//! - [`params`] - Named parameter sets shared by weights and gradients
//! - [`network`] - The character model: loss, gradients, sampling
//! - [`gradient_check`] - Numerical gradients and relative error
//! - [`vocab`] / [`data`] - Character vocabulary, one-hot encoding, batches
//! - [`optimizer`] / [`gradients`] / [`solver`] - Training
//!
//! # Example
//!
//! ```rust
//! use char_rnn::{CellKind, CharRnn, NetworkConfig};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let config = NetworkConfig::toy().with_cell(CellKind::Lstm);
//! let model = CharRnn::<f64>::new(config, &mut rng)?;
//!
//! let inputs = vec![vec![0, 1, 2], vec![3, 4, 5]];
//! let targets = vec![vec![1, 2, 3], vec![4, 5, 6]];
//! let (loss, grads) = model.loss_indices(&inputs, &targets)?;
//! assert!(loss > 0.0);
//! assert_eq!(grads.ids(), model.params.ids());
//!
//! let generated = model.sample(&[0, 3], &model.encoder(), 10)?;
//! assert!(generated.iter().all(|row| row.len() == 10));
//! # Ok::<(), char_rnn::RnnError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod gradient_check;
pub mod gradients;
pub mod layers;
pub mod network;
pub mod optimizer;
pub mod params;
pub mod solver;
pub mod tensor;
pub mod training_logger;
pub mod vocab;

// Re-export main types for convenience
pub use config::NetworkConfig;
pub use data::{Batch, BatchSource, CharDataset};
pub use error::{Result, RnnError};
pub use gradient_check::{
    check_network_gradients, check_network_gradients_indices, estimate_gradient,
    estimate_param_gradient, norm_relative_error, relative_error, GradientCheck,
};
pub use layers::{CellKind, CellState, Embedding};
pub use network::{CharRnn, SamplingStrategy};
pub use optimizer::{Optimizer, UpdateRule};
pub use params::{LayerRole, OutputRole, ParamId, ParamSet};
pub use solver::{Solver, SolverConfig};
pub use tensor::{Scalar, Tensor};
pub use training_logger::TrainingLogger;
pub use vocab::{CharVocab, OneHotEncoder};
