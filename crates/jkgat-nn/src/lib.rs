#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::upper_case_acronyms)]

//! Graph neural networks for node classification.
//!
//! `jkgat-nn` builds, trains and inspects the JKGAT family of node
//! classifiers on top of candle. It sits between the host graph layer
//! (`jkgat-graph`) and the `jkgat` binary.
//!
//! # Modules
//!
//! - [`data`]: [`Dataset`], the device-side context shared by every stage
//! - [`conv`]: Message-passing layers (GraphConv, GAT)
//! - [`jk`]: Jumping Knowledge aggregation (LSTM attention, max, mean)
//! - [`model`]: [`JKGAT`] and its four [`Architecture`]s
//! - [`init`]: Seeded parameter re-initialization
//! - [`config`]: [`TrainConfig`], presets and validation
//! - [`training`]: [`Trainer`], early stopping and depth sweeps
//! - [`evaluation`]: Masked accuracy
//! - [`embedding`]: t-SNE projection of node representations
//!
//! # Example: one training run
//!
//! ```rust
//! use candle_core::Device;
//! use jkgat_graph::synthetic::{planted_partition, PlantedPartitionConfig};
//! use jkgat_graph::Split;
//! use jkgat_nn::{evaluate, Dataset, TrainConfig, Trainer};
//!
//! let graph = planted_partition(&PlantedPartitionConfig::default())?;
//! let dataset = Dataset::from_graph(graph, &Device::Cpu)?;
//!
//! let config = TrainConfig::attention().with_epochs(20);
//! let trained = Trainer::new(config).with_device(Device::Cpu).train(&dataset)?;
//!
//! let test_acc = evaluate(&trained.model, &dataset, Split::Test)?;
//! assert!((0.0..=1.0).contains(&test_acc));
//! # Ok::<(), jkgat_nn::Error>(())
//! ```

pub mod config;
pub mod conv;
pub mod data;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod init;
pub mod jk;
pub mod model;
pub mod training;

pub use config::TrainConfig;
pub use data::Dataset;
pub use embedding::{project, EmbeddingRow, EmbeddingTable, Tsne};
pub use error::{Error, Result};
pub use evaluation::{evaluate, evaluate_all, masked_accuracy, SplitAccuracy};
pub use jk::{JKMode, JumpingKnowledge};
pub use model::{Architecture, ModelConfig, ModelName, JKGAT};
pub use training::{sweep, EarlyStopping, EpochStats, SweepRow, TrainReport, TrainedModel, Trainer};

// Re-export candle so callers can name devices and tensors without a direct dependency
pub use candle_core;
