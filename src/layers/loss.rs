//! Temporal Softmax Cross-Entropy
//!
//! Scores `[N, T, V]` are turned into a probability distribution over the
//! vocabulary at every position, and the loss is the mean negative
//! log-probability of the target index.
//!
//! ## Forward Pass
//!
//! ```text
//! p[n,t,:] = softmax(scores[n,t,:])
//! loss     = -Σ mask[n,t] · log p[n,t,y[n,t]] / Σ mask[n,t]
//! ```
//!
//! Without a mask every position counts and the denominator is `N * T`.
//!
//! ## Backward Pass
//!
//! ```text
//! dscores[n,t,:] = mask[n,t] · (p[n,t,:] - one_hot(y[n,t])) / Σ mask
//! ```
//!
//! The log-probability is taken from the max-shifted scores directly
//! (`x - max - log Σ exp(x - max)`) so that a near-zero probability does not
//! turn into `-inf`.

use crate::tensor::{Scalar, Tensor};
use crate::{Result, RnnError};

/// Loss value, score gradient and the probabilities it was computed from
pub struct SoftmaxLoss<F> {
    pub loss: F,
    /// Gradient with respect to the scores `[N, T, V]`
    pub grad: Tensor<F>,
    /// Softmax probabilities `[N, T, V]`
    pub probs: Tensor<F>,
}

/// Softmax cross-entropy averaged over the unmasked `(n, t)` positions
///
/// `targets[n][t]` must lie in `0..V`. `mask`, when given, has the same
/// `N × T` layout; `false` positions contribute neither loss nor gradient. If
/// every position is masked the loss is zero.
pub fn temporal_softmax_loss<F: Scalar>(
    scores: &Tensor<F>,
    targets: &[Vec<usize>],
    mask: Option<&[Vec<bool>]>,
) -> Result<SoftmaxLoss<F>> {
    if scores.shape.len() != 3 {
        return Err(RnnError::ShapeMismatch(format!(
            "scores must be [N, T, V], got {:?}",
            scores.shape
        )));
    }
    let (n, steps, vocab) = (scores.shape[0], scores.shape[1], scores.shape[2]);

    check_grid("targets", targets.iter().map(Vec::len), targets.len(), n, steps)?;
    if let Some(mask) = mask {
        check_grid("mask", mask.iter().map(Vec::len), mask.len(), n, steps)?;
    }
    for &index in targets.iter().flatten() {
        if index >= vocab {
            return Err(RnnError::InvalidIndex {
                index,
                bound: vocab,
            });
        }
    }

    let is_counted = |row: usize, t: usize| mask.map_or(true, |m| m[row][t]);
    let counted = (0..n)
        .flat_map(|row| (0..steps).map(move |t| (row, t)))
        .filter(|&(row, t)| is_counted(row, t))
        .count();

    let flat = scores.reshape(&[n * steps, vocab]);
    let probs = flat.softmax_rows();

    let mut grad = Tensor::zeros(vec![n * steps, vocab]);
    let mut total = F::zero();

    if counted > 0 {
        let norm = F::from_f64(counted as f64);
        for row in 0..n {
            for t in 0..steps {
                if !is_counted(row, t) {
                    continue;
                }
                let pos = row * steps + t;
                let target = targets[row][t];
                let logits = &flat.data[pos * vocab..(pos + 1) * vocab];

                let max = logits.iter().fold(F::neg_infinity(), |a, &b| a.max(b));
                let log_sum = logits.iter().map(|&x| (x - max).exp()).sum::<F>().ln();
                total = total - (logits[target] - max - log_sum);

                let p = &probs.data[pos * vocab..(pos + 1) * vocab];
                let g = &mut grad.data[pos * vocab..(pos + 1) * vocab];
                for (gv, &pv) in g.iter_mut().zip(p) {
                    *gv = pv / norm;
                }
                g[target] = g[target] - F::one() / norm;
            }
        }
        total = total / norm;
    }

    Ok(SoftmaxLoss {
        loss: total,
        grad: grad.reshape(&scores.shape),
        probs: probs.reshape(&scores.shape),
    })
}

fn check_grid(
    what: &str,
    row_lens: impl Iterator<Item = usize>,
    rows: usize,
    n: usize,
    steps: usize,
) -> Result<()> {
    if rows != n {
        return Err(RnnError::ShapeMismatch(format!(
            "{} has {} rows but the batch has {}",
            what, rows, n
        )));
    }
    for (row, len) in row_lens.enumerate() {
        if len != steps {
            return Err(RnnError::ShapeMismatch(format!(
                "{} row {} has {} steps, expected {}",
                what, row, len, steps
            )));
        }
    }
    Ok(())
}
