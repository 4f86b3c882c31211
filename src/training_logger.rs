//! Training Logger
//!
//! Writes one CSV row per logged solver step and echoes a summary line to the
//! console.
//!
//! ## Example
//!
//! ```rust,no_run
//! use char_rnn::TrainingLogger;
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(100, 0.002, 1.9, Some(2.1), Some("First Citizen:"))?;
//! # Ok::<(), char_rnn::RnnError>(())
//! ```
//!
//! ## CSV Format
//!
//! - `step`: Solver iteration
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used for this step
//! - `train_loss`: Loss of the minibatch (including the L2 term)
//! - `val_loss`: Validation loss, empty when not evaluated
//! - `train_perplexity`: `exp(train_loss)`
//! - `val_perplexity`: `exp(val_loss)`, empty when not evaluated
//! - `sample`: Generated text, quoted
//!
//! A character model that guesses uniformly over `V` symbols has perplexity
//! `V`; a perfect one has perplexity 1.

use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

pub struct TrainingLogger {
    log_file: File,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self> {
        let mut log_file = File::create(log_path)?;

        writeln!(
            log_file,
            "step,elapsed_seconds,learning_rate,train_loss,val_loss,train_perplexity,val_perplexity,sample"
        )?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Append one row and print a progress line
    pub fn log(
        &mut self,
        step: usize,
        learning_rate: f64,
        train_loss: f64,
        val_loss: Option<f64>,
        sample: Option<&str>,
    ) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let train_perplexity = train_loss.exp();
        let val_perplexity = val_loss.map(f64::exp);

        let optional = |v: Option<f64>, precision: usize| {
            v.map(|v| format!("{:.*}", precision, v)).unwrap_or_default()
        };

        // CSV quotes are escaped by doubling
        let sample_escaped = sample.map(|s| s.replace('"', "\"\"")).unwrap_or_default();

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.4},{},{:.2},{},\"{}\"",
            step,
            elapsed,
            learning_rate,
            train_loss,
            optional(val_loss, 4),
            train_perplexity,
            optional(val_perplexity, 2),
            sample_escaped
        )?;
        // Rows survive an interrupted run
        self.log_file.flush()?;

        let step_time = self.last_log_time.elapsed().as_secs_f64();
        match val_loss {
            Some(val) => println!(
                "Step {:5} | Time: {:7.1}s (+{:.1}s) | LR: {:.6} | Train: {:.4} | Val: {:.4} | Perplexity: {:.2}",
                step,
                elapsed,
                step_time,
                learning_rate,
                train_loss,
                val,
                val.exp()
            ),
            None => println!(
                "Step {:5} | Time: {:7.1}s (+{:.1}s) | LR: {:.6} | Train: {:.4} | Perplexity: {:.2}",
                step, elapsed, step_time, learning_rate, train_loss, train_perplexity
            ),
        }
        if let Some(text) = sample {
            println!("  Sample: {:?}", text);
        }

        self.last_log_time = Instant::now();
        Ok(())
    }
}
