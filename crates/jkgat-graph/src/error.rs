use thiserror::Error;

/// Errors raised while building or loading a graph.
#[derive(Error, Debug)]
pub enum Error {
    /// The graph violates a structural invariant.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}

/// Result type alias for jkgat-graph.
pub type Result<T> = std::result::Result<T, Error>;
