//! Error type shared by every fallible operation in the crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RnnError {
    /// Input dimensions disagree with the configured network or with each other
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An index outside `0..bound`
    #[error("index {index} out of range (must be < {bound})")]
    InvalidIndex { index: usize, bound: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Character that is not part of the vocabulary
    #[error("character {0:?} is not in the vocabulary")]
    UnknownChar(char),

    #[error("corpus too small: {0}")]
    EmptyCorpus(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RnnError>;
