//! Training Loop
//!
//! The [`Solver`] owns a model, a training set and an optional validation
//! set, and repeatedly:
//!
//! 1. draws a random minibatch of windows from the training corpus
//! 2. calls [`CharRnn::loss_indices`] for the loss and gradients
//! 3. clips the gradient set to a maximum global norm (optional)
//! 4. hands the gradients to the [`Optimizer`]
//!
//! Training runs for `num_epochs` epochs of `iterations_per_epoch` steps. At
//! the end of each epoch the learning rate is multiplied by `lr_decay`, the
//! validation loss is measured, and a greedy sample is printed. The
//! parameters with the lowest validation loss are kept and restored when
//! training finishes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use char_rnn::{CharDataset, CharRnn, NetworkConfig, Solver, SolverConfig};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let (train, val) = CharDataset::from_file("shakespeare.txt")?.train_val_split(0.1)?;
//! let vocab = train.vocab().clone();
//!
//! let model = CharRnn::<f32>::new(NetworkConfig::char_model(vocab.len()), &mut rng)?;
//! let mut solver = Solver::new(model, train, Some(val), SolverConfig::tiny())
//!     .with_vocab(vocab);
//! solver.train(&mut rng)?;
//! # Ok::<(), char_rnn::RnnError>(())
//! ```

use crate::data::BatchSource;
use crate::gradients::clip_gradients;
use crate::network::CharRnn;
use crate::optimizer::{Optimizer, UpdateRule};
use crate::params::ParamSet;
use crate::tensor::Scalar;
use crate::training_logger::TrainingLogger;
use crate::vocab::CharVocab;
use crate::{Result, RnnError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Training hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub update_rule: UpdateRule,
    pub learning_rate: f64,
    /// Multiplier applied to the learning rate after every epoch
    pub lr_decay: f64,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub seq_len: usize,
    /// Steps per epoch; defaults to `corpus_len / (batch_size * seq_len)`
    pub iterations_per_epoch: Option<usize>,
    /// Maximum global gradient norm
    pub grad_clip: Option<f64>,
    /// Print the minibatch loss every N steps (0 disables)
    pub print_every: usize,
    /// Minibatches averaged for the validation loss
    pub val_batches: usize,
    /// Length of the greedy sample printed after each epoch (0 disables)
    pub sample_length: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            update_rule: UpdateRule::adam(),
            learning_rate: 2e-3,
            lr_decay: 0.95,
            num_epochs: 1,
            batch_size: 25,
            seq_len: 50,
            iterations_per_epoch: None,
            grad_clip: Some(5.0),
            print_every: 100,
            val_batches: 10,
            sample_length: 100,
        }
    }
}

impl SolverConfig {
    /// A few short epochs, enough to see the loss fall
    pub fn tiny() -> Self {
        Self {
            num_epochs: 3,
            batch_size: 16,
            seq_len: 32,
            iterations_per_epoch: Some(200),
            print_every: 50,
            val_batches: 5,
            sample_length: 80,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.seq_len == 0 {
            return Err(RnnError::InvalidConfiguration(
                "batch_size and seq_len must be positive".into(),
            ));
        }
        if !(self.learning_rate > 0.0) || !(self.lr_decay > 0.0) {
            return Err(RnnError::InvalidConfiguration(format!(
                "learning_rate ({}) and lr_decay ({}) must be positive",
                self.learning_rate, self.lr_decay
            )));
        }
        Ok(())
    }
}

pub struct Solver<F, D> {
    pub model: CharRnn<F>,
    pub config: SolverConfig,
    train_data: D,
    val_data: Option<D>,
    vocab: Option<CharVocab>,
    logger: Option<TrainingLogger>,
    optimizer: Optimizer<F>,
    learning_rate: f64,
    step: usize,
    loss_history: Vec<f64>,
    val_history: Vec<f64>,
    best_val_loss: f64,
    best_params: Option<ParamSet<F>>,
}

impl<F: Scalar, D: BatchSource> Solver<F, D> {
    pub fn new(model: CharRnn<F>, train_data: D, val_data: Option<D>, config: SolverConfig) -> Self {
        let optimizer = Optimizer::new(config.update_rule);
        let learning_rate = config.learning_rate;
        Self {
            model,
            config,
            train_data,
            val_data,
            vocab: None,
            logger: None,
            optimizer,
            learning_rate,
            step: 0,
            loss_history: Vec::new(),
            val_history: Vec::new(),
            best_val_loss: f64::INFINITY,
            best_params: None,
        }
    }

    /// Decode samples with `vocab` when printing progress
    pub fn with_vocab(mut self, vocab: CharVocab) -> Self {
        self.vocab = Some(vocab);
        self
    }

    /// Write a CSV row per epoch to `logger`
    pub fn with_logger(mut self, logger: TrainingLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Minibatch loss after every step
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Validation loss after every epoch
    pub fn val_history(&self) -> &[f64] {
        &self.val_history
    }

    pub fn best_val_loss(&self) -> Option<f64> {
        self.best_val_loss.is_finite().then_some(self.best_val_loss)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn iterations_per_epoch(&self) -> usize {
        self.config.iterations_per_epoch.unwrap_or_else(|| {
            let per_batch = self.config.batch_size * self.config.seq_len;
            (self.train_data.len() / per_batch).max(1)
        })
    }

    /// One optimizer update on a fresh minibatch; returns its loss
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64> {
        let (inputs, targets) =
            self.train_data
                .sample_batch(self.config.batch_size, self.config.seq_len, rng)?;
        let (loss, mut grads) = self.model.loss_indices(&inputs, &targets)?;

        if let Some(max_norm) = self.config.grad_clip {
            clip_gradients(&mut grads, max_norm);
        }
        self.optimizer
            .update(&mut self.model.params, &grads, self.learning_rate);

        self.step += 1;
        let loss = loss.as_f64();
        self.loss_history.push(loss);
        Ok(loss)
    }

    /// Mean loss over `val_batches` random validation minibatches
    pub fn validation_loss<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Option<f64>> {
        let Some(val) = &self.val_data else {
            return Ok(None);
        };
        if self.config.val_batches == 0 {
            return Ok(None);
        }
        let mut total = 0.0;
        for _ in 0..self.config.val_batches {
            let (inputs, targets) = val.sample_batch(self.config.batch_size, self.config.seq_len, rng)?;
            total += self.model.evaluate_indices(&inputs, &targets)?.as_f64();
        }
        Ok(Some(total / self.config.val_batches as f64))
    }

    /// Greedy sample seeded with a random training character
    fn sample_text<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Option<String>> {
        let Some(vocab) = &self.vocab else {
            return Ok(None);
        };
        if self.config.sample_length == 0 {
            return Ok(None);
        }
        let (seed, _) = self.train_data.sample_batch(1, 1, rng)?;
        let start = seed[0][0];
        let generated = self
            .model
            .sample(&[start], &self.model.encoder(), self.config.sample_length)?;

        let mut ids = vec![start];
        ids.extend_from_slice(&generated[0]);
        Ok(Some(vocab.decode(&ids)))
    }

    /// Run every epoch, then restore the best parameters seen
    pub fn train<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.config.validate()?;
        let iterations = self.iterations_per_epoch();
        println!(
            "Training {} parameters: {} epochs x {} iterations",
            self.model.num_parameters(),
            self.config.num_epochs,
            iterations
        );

        for epoch in 0..self.config.num_epochs {
            let mut epoch_loss = 0.0;
            for _ in 0..iterations {
                let loss = self.step(rng)?;
                epoch_loss += loss;

                if self.config.print_every > 0 && self.step % self.config.print_every == 0 {
                    println!("(Iteration {}) loss: {:.4}", self.step, loss);
                }
            }
            let train_loss = epoch_loss / iterations as f64;

            let val_loss = self.validation_loss(rng)?;
            if let Some(val) = val_loss {
                self.val_history.push(val);
                if val < self.best_val_loss {
                    self.best_val_loss = val;
                    self.best_params = Some(self.model.params.clone());
                }
            }

            let sample = self.sample_text(rng)?;
            match &mut self.logger {
                Some(logger) => {
                    logger.log(self.step, self.learning_rate, train_loss, val_loss, sample.as_deref())?
                }
                None => {
                    println!(
                        "(Epoch {} / {}) train loss: {:.4}{}",
                        epoch + 1,
                        self.config.num_epochs,
                        train_loss,
                        val_loss.map(|v| format!(", val loss: {:.4}", v)).unwrap_or_default()
                    );
                    if let Some(text) = &sample {
                        println!("  Sample: {:?}", text);
                    }
                }
            }

            self.learning_rate *= self.config.lr_decay;
        }

        if let Some(best) = self.best_params.take() {
            self.model.params = best;
        }
        Ok(())
    }
}
