//! Training Data
//!
//! An encoded character corpus and a sampler that draws random fixed-length
//! windows from it.
//!
//! ## How Sequences Are Generated
//!
//! Each batch row starts at a random offset into the corpus:
//!
//! ```text
//! Corpus:  [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
//! Seq length: 4, start = 5
//!
//!   Input:  [6, 7, 8, 9]   Target: [7, 8, 9, 10]
//! ```
//!
//! The target is always the input shifted by one position, teaching the model
//! to predict the next character.
//!
//! ## Example
//!
//! ```rust,no_run
//! use char_rnn::{BatchSource, CharDataset};
//! use rand::SeedableRng;
//!
//! let dataset = CharDataset::from_file("shakespeare.txt")?;
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let (inputs, targets) = dataset.sample_batch(32, 50, &mut rng)?;
//! assert_eq!(inputs.len(), 32);
//! assert_eq!(targets[0].len(), 50);
//! # Ok::<(), char_rnn::RnnError>(())
//! ```

use crate::vocab::CharVocab;
use crate::{Result, RnnError};
use rand::Rng;
use std::fs;
use std::path::Path;

/// A batch of input/target sequences, each `[batch_size][seq_len]`
pub type Batch = (Vec<Vec<usize>>, Vec<Vec<usize>>);

/// Anything the solver can draw training batches from
pub trait BatchSource {
    /// Draw `batch_size` windows of `seq_len` inputs and their shifted targets
    fn sample_batch<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        seq_len: usize,
        rng: &mut R,
    ) -> Result<Batch>;

    /// Number of elements in the underlying corpus
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Integer-encoded corpus
pub struct CharDataset {
    vocab: CharVocab,
    data: Vec<usize>,
}

impl CharDataset {
    /// Build the vocabulary from `text` and encode it
    pub fn new(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(RnnError::EmptyCorpus("no characters in text".into()));
        }
        let vocab = CharVocab::from_text(text);
        Self::with_vocab(text, vocab)
    }

    /// Encode `text` with an existing vocabulary
    pub fn with_vocab(text: &str, vocab: CharVocab) -> Result<Self> {
        let data = vocab.encode(text)?;
        Ok(Self { vocab, data })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let dataset = Self::new(&text)?;
        println!(
            "Loaded {} characters ({} distinct)",
            dataset.len(),
            dataset.vocab.len()
        );
        Ok(dataset)
    }

    pub fn vocab(&self) -> &CharVocab {
        &self.vocab
    }

    pub fn data(&self) -> &[usize] {
        &self.data
    }

    /// Split into a leading training part and a trailing validation part
    ///
    /// `val_fraction` of the corpus (rounded down) goes to validation; both
    /// parts share the full vocabulary.
    pub fn train_val_split(self, val_fraction: f64) -> Result<(CharDataset, CharDataset)> {
        if !(0.0..1.0).contains(&val_fraction) {
            return Err(RnnError::InvalidConfiguration(format!(
                "validation fraction must be in [0, 1), got {}",
                val_fraction
            )));
        }
        let val_len = (self.data.len() as f64 * val_fraction) as usize;
        let split = self.data.len() - val_len;

        let mut train = self.data;
        let val = train.split_off(split);
        Ok((
            CharDataset {
                vocab: self.vocab.clone(),
                data: train,
            },
            CharDataset {
                vocab: self.vocab,
                data: val,
            },
        ))
    }
}

impl BatchSource for CharDataset {
    fn sample_batch<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        seq_len: usize,
        rng: &mut R,
    ) -> Result<Batch> {
        // A window needs seq_len inputs plus one extra target
        if self.data.len() <= seq_len {
            return Err(RnnError::EmptyCorpus(format!(
                "{} characters cannot fill a window of {} + 1",
                self.data.len(),
                seq_len
            )));
        }
        let max_start = self.data.len() - seq_len - 1;

        let mut inputs = Vec::with_capacity(batch_size);
        let mut targets = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let start = rng.random_range(0..=max_start);
            inputs.push(self.data[start..start + seq_len].to_vec());
            targets.push(self.data[start + 1..start + seq_len + 1].to_vec());
        }
        Ok((inputs, targets))
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_targets_are_shifted_inputs() {
        let dataset = CharDataset::new("abcdefghijklmnopqrstuvwxyz").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let (inputs, targets) = dataset.sample_batch(5, 6, &mut rng).unwrap();

        assert_eq!(inputs.len(), 5);
        for (x, y) in inputs.iter().zip(&targets) {
            assert_eq!(x.len(), 6);
            assert_eq!(&x[1..], &y[..5]);
            assert_eq!(y[5], x[5] + 1);
        }
    }

    #[test]
    fn test_window_covers_whole_corpus() {
        let dataset = CharDataset::new("abcd").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let (inputs, targets) = dataset.sample_batch(3, 3, &mut rng).unwrap();
        assert!(inputs.iter().all(|x| x == &vec![0, 1, 2]));
        assert!(targets.iter().all(|y| y == &vec![1, 2, 3]));

        assert!(matches!(
            dataset.sample_batch(1, 4, &mut rng),
            Err(RnnError::EmptyCorpus(_))
        ));
    }

    #[test]
    fn test_oversized_window_is_rejected() {
        let dataset = CharDataset::new("abcd").unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        assert!(matches!(
            dataset.sample_batch(1, usize::MAX, &mut rng),
            Err(RnnError::EmptyCorpus(_))
        ));
    }

    #[test]
    fn test_train_val_split() {
        let dataset = CharDataset::new("0123456789").unwrap();
        let (train, val) = dataset.train_val_split(0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(val.vocab().len(), 10);
        assert_eq!(val.data(), &[8, 9]);
    }

    #[test]
    fn test_empty_text() {
        assert!(matches!(CharDataset::new(""), Err(RnnError::EmptyCorpus(_))));
    }
}
