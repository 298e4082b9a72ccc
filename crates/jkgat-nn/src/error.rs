//! Error types for jkgat-nn.

use thiserror::Error;

/// jkgat-nn error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Graph construction or validation error.
    #[error("graph error: {0}")]
    Graph(#[from] jkgat_graph::Error),

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// `model_name` does not resolve to a buildable architecture family.
    #[error("unknown model `{0}`")]
    UnknownModel(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),

    /// A dataset archive is missing an array or stores it with the wrong shape.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV export error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
