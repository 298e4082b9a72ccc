//! Algorithms over the host-side graph.

/// GCN normalization and self-loop handling.
pub mod normalize;

/// Structural statistics (components, degrees).
pub mod components;
