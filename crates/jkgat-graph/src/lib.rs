// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]

//! Host-side graph structure for node classification.
//!
//! This crate holds everything about a citation graph that does not need a
//! tensor library:
//!
//! - [`Graph`] - node features, directed edges, labels and split masks
//! - [`Split`] - the train/validation/test partition of labelled nodes
//! - [`algo::normalize`] - GCN normalization (self-loops + symmetric weights)
//! - [`algo::components`] - structural statistics via petgraph
//! - [`synthetic`] - seeded planted-partition graphs for tests and demos
//!
//! # Example
//!
//! ```rust
//! use jkgat_graph::{Graph, SplitMasks};
//!
//! // Two nodes, one feature each, a single citation 0 -> 1.
//! let masks = SplitMasks {
//!     train: vec![true, false],
//!     val: vec![false, true],
//!     test: vec![false, false],
//! };
//! let graph = Graph::new(vec![1.0, 0.0], 1, vec![(0, 1)], vec![0, 1], masks)?;
//! let graph = graph.gcn_normalized();
//!
//! // Normalization adds one self-loop per node.
//! assert_eq!(graph.num_edges(), 3);
//! # Ok::<(), jkgat_graph::Error>(())
//! ```

pub mod algo;
mod error;
mod graph;
pub mod synthetic;

pub use algo::components::GraphStats;
pub use error::{Error, Result};
pub use graph::{Graph, Split, SplitMasks};

// Re-export petgraph for callers that want to run their own traversals
pub use petgraph;
