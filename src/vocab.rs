//! Character Vocabulary and One-Hot Encoding
//!
//! The language model works on characters. [`CharVocab`] maps every distinct
//! character of a corpus to an index (characters sorted, so the mapping only
//! depends on the set of characters) and back. [`OneHotEncoder`] turns index
//! batches into the `[N, T, V]` tensors the recurrent stack consumes.
//!
//! ## Example
//!
//! ```rust
//! use char_rnn::CharVocab;
//!
//! let vocab = CharVocab::from_text("hello");
//! assert_eq!(vocab.len(), 4);                  // e, h, l, o
//! let ids = vocab.encode("hell").unwrap();
//! assert_eq!(ids, vec![1, 0, 2, 2]);
//! assert_eq!(vocab.decode(&ids), "hell");
//! ```

use crate::tensor::{Scalar, Tensor};
use crate::{Result, RnnError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Sorted set of the characters in a corpus
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharVocab {
    chars: Vec<char>,
}

impl CharVocab {
    pub fn from_text(text: &str) -> Self {
        let mut chars: Vec<char> = text.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        Self { chars }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn index_of(&self, c: char) -> Option<usize> {
        self.chars.binary_search(&c).ok()
    }

    pub fn char_at(&self, index: usize) -> Option<char> {
        self.chars.get(index).copied()
    }

    /// Encode text, failing on the first character outside the vocabulary
    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars()
            .map(|c| self.index_of(c).ok_or(RnnError::UnknownChar(c)))
            .collect()
    }

    /// Decode indices; out-of-range indices are skipped
    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter().filter_map(|&i| self.char_at(i)).collect()
    }

    /// One-hot encoder sized for this vocabulary
    pub fn encoder(&self) -> OneHotEncoder {
        OneHotEncoder::new(self.len())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let mut vocab: CharVocab = serde_json::from_str(&json)?;
        vocab.chars.sort_unstable();
        vocab.chars.dedup();
        Ok(vocab)
    }
}

/// Encodes class indices as one-hot vectors of width `dim`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OneHotEncoder {
    dim: usize,
}

impl OneHotEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// `[N, T]` indices to a `[N, T, dim]` tensor
    ///
    /// Rows must all have the same length.
    pub fn encode<F: Scalar>(&self, indices: &[Vec<usize>]) -> Result<Tensor<F>> {
        let n = indices.len();
        let steps = indices.first().map_or(0, Vec::len);

        let mut out = Tensor::zeros(vec![n, steps, self.dim]);
        for (row, seq) in indices.iter().enumerate() {
            if seq.len() != steps {
                return Err(RnnError::ShapeMismatch(format!(
                    "row {} has {} steps, expected {}",
                    row,
                    seq.len(),
                    steps
                )));
            }
            for (t, &index) in seq.iter().enumerate() {
                self.check(index)?;
                out.data[(row * steps + t) * self.dim + index] = F::one();
            }
        }
        Ok(out)
    }

    /// One index per row to a `[N, dim]` tensor
    pub fn encode_step<F: Scalar>(&self, indices: &[usize]) -> Result<Tensor<F>> {
        let mut out = Tensor::zeros(vec![indices.len(), self.dim]);
        for (row, &index) in indices.iter().enumerate() {
            self.check(index)?;
            out.data[row * self.dim + index] = F::one();
        }
        Ok(out)
    }

    fn check(&self, index: usize) -> Result<()> {
        if index >= self.dim {
            return Err(RnnError::InvalidIndex {
                index,
                bound: self.dim,
            });
        }
        Ok(())
    }
}
