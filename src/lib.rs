//! `jkgat` trains and compares graph neural network variants for citation
//! graph node classification.
//!
//! The workspace is split the way the work is:
//!
//! - [`graph`] (`jkgat-graph`): the immutable host graph, split masks, GCN
//!   normalization and structural statistics
//! - [`nn`] (`jkgat-nn`): candle layers, the JKGAT model in its four
//!   architectures, training with early stopping, evaluation and t-SNE
//!   projection
//!
//! The `jkgat` binary in `crates/jkgat-cli` drives the experiments.
//!
//! # Example
//!
//! ```rust
//! use jkgat::prelude::*;
//!
//! let graph = planted_partition(&PlantedPartitionConfig::default())?;
//! let dataset = Dataset::from_graph(graph, &Device::Cpu)?;
//!
//! let trained = Trainer::new(TrainConfig::jk_attention().with_epochs(10))
//!     .with_device(Device::Cpu)
//!     .train(&dataset)?;
//! assert!(trained.report.stopped_epoch <= 10);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use jkgat_graph as graph;
pub use jkgat_nn as nn;

/// The types a typical run touches.
pub mod prelude {
    pub use jkgat_graph::synthetic::{planted_partition, PlantedPartitionConfig};
    pub use jkgat_graph::{Graph, GraphStats, Split, SplitMasks};
    pub use jkgat_nn::candle_core::Device;
    pub use jkgat_nn::{
        evaluate, project, Architecture, Dataset, EmbeddingTable, JKMode, TrainConfig,
        TrainReport, Trainer, Tsne, JKGAT,
    };
}
