//! Error taxonomy shared by the result containers and the disentanglement core.

use thiserror::Error;

/// Errors raised while validating or transforming band-indexed data.
///
/// Every variant is fatal to the call that produced it: no partial result is
/// ever returned alongside an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResultsError {
    /// Wrong rank, mismatched leading dimensions, or a non-square matrix.
    #[error("shape error: {0}")]
    Shape(String),

    /// Unknown routine selector or an out-of-range numeric parameter.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A weight matrix handed to the optimal assignment contained NaN or inf.
    #[error("non-finite value: {0}")]
    NonFinite(String),
}

impl ResultsError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ResultsError>;
