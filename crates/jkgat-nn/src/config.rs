//! Run configuration.
//!
//! A [`TrainConfig`] is the flat key set one training run is described by.
//! It can be assembled three ways:
//!
//! ```rust
//! use jkgat_nn::config::TrainConfig;
//! use serde_json::json;
//!
//! // A preset for one of the four architectures
//! let a = TrainConfig::attention().with_n_layers(3);
//!
//! // Builder methods on the defaults
//! let b = TrainConfig::default().with_attention(true).with_n_layers(3);
//! assert_eq!(a, b);
//!
//! // A flat key-value map; missing keys keep their defaults
//! let c = TrainConfig::from_map(
//!     json!({"attention": true, "n_layers": 3}).as_object().unwrap().clone(),
//! ).unwrap();
//! assert_eq!(a, c);
//! ```
//!
//! `input_dim` and `output_dim` are not part of the run configuration; they
//! are taken from the dataset by [`TrainConfig::to_model_config`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::jk::JKMode;
use crate::model::{Architecture, ModelConfig, ModelName};

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Per-head hidden width (default: 8).
    pub hidden_dim: usize,
    /// Number of graph convolutions, at least 2 (default: 2).
    pub n_layers: usize,
    /// Attention heads per hidden GAT layer (default: 8).
    pub n_heads: usize,
    /// Feature and attention dropout (default: 0.6).
    pub dropout: f32,
    pub attention: bool,
    pub jk: bool,
    /// Adam learning rate (default: 0.005).
    pub lr: f64,
    /// L2 penalty coefficient (default: 5e-4).
    pub weight_decay: f64,
    /// Epoch budget (default: 500).
    pub epochs: usize,
    /// Early stopping window (default: 10).
    pub max_patience: usize,
    /// Model family (default: "JKGAT").
    pub model_name: String,
    /// Seed for parameter initialization (default: 123). Also seeds dropout
    /// on accelerators; the CPU backend draws dropout masks from its own RNG.
    pub seed: u64,
    /// Jumping Knowledge aggregation (default: lstm).
    pub jk_mode: JKMode,
    /// Tie all hidden layers to one parameter set (default: false).
    pub share_hidden_weights: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 8,
            n_layers: 2,
            n_heads: 8,
            dropout: 0.6,
            attention: false,
            jk: false,
            lr: 0.005,
            weight_decay: 0.0005,
            epochs: 500,
            max_patience: 10,
            model_name: ModelName::Jkgat.to_string(),
            seed: 123,
            jk_mode: JKMode::Lstm,
            share_hidden_weights: false,
        }
    }
}

impl TrainConfig {
    /// GAT layers with a Jumping Knowledge head.
    pub fn jk_attention() -> Self {
        Self::for_architecture(Architecture::AttentionJk)
    }

    /// GAT layers, single-head output layer.
    pub fn attention() -> Self {
        Self::for_architecture(Architecture::Attention)
    }

    /// GraphConv layers with a Jumping Knowledge head.
    pub fn jk() -> Self {
        Self::for_architecture(Architecture::ConvJk)
    }

    /// Plain GraphConv layers.
    pub fn base() -> Self {
        Self::default()
    }

    pub fn for_architecture(arch: Architecture) -> Self {
        Self {
            attention: arch.uses_attention(),
            jk: arch.uses_jk(),
            ..Self::default()
        }
    }

    /// Build from a flat key-value map. Unknown keys are rejected.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::InvalidConfig(format!(
                "expected a map, serialized to {other}"
            ))),
        }
    }

    pub fn architecture(&self) -> Architecture {
        Architecture::from_flags(self.attention, self.jk)
    }

    pub fn with_hidden_dim(mut self, dim: usize) -> Self {
        self.hidden_dim = dim;
        self
    }

    pub fn with_n_layers(mut self, n: usize) -> Self {
        self.n_layers = n;
        self
    }

    pub fn with_n_heads(mut self, n: usize) -> Self {
        self.n_heads = n;
        self
    }

    pub fn with_dropout(mut self, p: f32) -> Self {
        self.dropout = p;
        self
    }

    pub fn with_attention(mut self, attention: bool) -> Self {
        self.attention = attention;
        self
    }

    pub fn with_jk(mut self, jk: bool) -> Self {
        self.jk = jk;
        self
    }

    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn with_weight_decay(mut self, wd: f64) -> Self {
        self.weight_decay = wd;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_max_patience(mut self, patience: usize) -> Self {
        self.max_patience = patience;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_jk_mode(mut self, mode: JKMode) -> Self {
        self.jk_mode = mode;
        self
    }

    pub fn with_shared_hidden_weights(mut self, share: bool) -> Self {
        self.share_hidden_weights = share;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidConfig(msg));
        if self.n_layers < 2 {
            return fail(format!("n_layers must be at least 2, got {}", self.n_layers));
        }
        if self.hidden_dim == 0 {
            return fail("hidden_dim must be positive".into());
        }
        if self.n_heads == 0 {
            return fail("n_heads must be positive".into());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return fail(format!("lr must be positive, got {}", self.lr));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return fail(format!(
                "weight_decay must be non-negative, got {}",
                self.weight_decay
            ));
        }
        if self.epochs == 0 {
            return fail("epochs must be positive".into());
        }
        if self.max_patience == 0 {
            return fail("max_patience must be positive".into());
        }
        Ok(())
    }

    /// Model dimensions for `dataset`. Fails on an unknown `model_name`.
    pub fn to_model_config(&self, dataset: &Dataset) -> Result<ModelConfig> {
        self.validate()?;
        let _family: ModelName = self.model_name.parse()?;
        Ok(ModelConfig {
            input_dim: dataset.num_features(),
            hidden_dim: self.hidden_dim,
            output_dim: dataset.num_classes(),
            n_layers: self.n_layers,
            n_heads: self.n_heads,
            dropout: self.dropout,
            attention: self.attention,
            jk: self.jk,
            jk_mode: self.jk_mode,
            share_hidden_weights: self.share_hidden_weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use jkgat_graph::synthetic::{planted_partition, PlantedPartitionConfig};
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_presets_cover_all_architectures() {
        assert_eq!(TrainConfig::jk_attention().architecture(), Architecture::AttentionJk);
        assert_eq!(TrainConfig::attention().architecture(), Architecture::Attention);
        assert_eq!(TrainConfig::jk().architecture(), Architecture::ConvJk);
        assert_eq!(TrainConfig::base().architecture(), Architecture::Conv);
        for arch in Architecture::ALL {
            let c = TrainConfig::for_architecture(arch);
            assert_eq!(c.lr, 0.005);
            assert_eq!(c.max_patience, 10);
            assert_eq!(c.model_name, "JKGAT");
        }
    }

    #[test]
    fn test_from_map_full_key_set() {
        let c = TrainConfig::from_map(map(json!({
            "hidden_dim": 8,
            "n_layers": 2,
            "n_heads": 8,
            "dropout": 0.6,
            "attention": true,
            "jk": true,
            "lr": 0.005,
            "weight_decay": 0.0005,
            "epochs": 500,
            "max_patience": 10,
            "model_name": "JKGAT"
        })))
        .unwrap();
        assert_eq!(c, TrainConfig::jk_attention());
    }

    #[test]
    fn test_from_map_rejects_unknown_key() {
        let err = TrainConfig::from_map(map(json!({"hiden_dim": 8}))).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_map_round_trip() {
        let c = TrainConfig::jk().with_jk_mode(JKMode::Max).with_seed(9);
        let back = TrainConfig::from_map(c.to_map().unwrap()).unwrap();
        assert_eq!(c, back);
        assert_eq!(c.to_map().unwrap()["jk_mode"], json!("max"));
    }

    #[test]
    fn test_validate() {
        assert!(TrainConfig::default().validate().is_ok());
        assert!(TrainConfig::default().with_n_layers(1).validate().is_err());
        assert!(TrainConfig::default().with_n_heads(0).validate().is_err());
        assert!(TrainConfig::default().with_hidden_dim(0).validate().is_err());
        assert!(TrainConfig::default().with_dropout(1.0).validate().is_err());
        assert!(TrainConfig::default().with_dropout(-0.1).validate().is_err());
        assert!(TrainConfig::default().with_max_patience(0).validate().is_err());
    }

    #[test]
    fn test_to_model_config_takes_dims_from_dataset() {
        let g = planted_partition(&PlantedPartitionConfig::default()).unwrap();
        let ds = Dataset::from_graph(g, &Device::Cpu).unwrap();

        let mc = TrainConfig::attention().to_model_config(&ds).unwrap();
        assert_eq!(mc.input_dim, 48);
        assert_eq!(mc.output_dim, 3);
        assert!(mc.attention && !mc.jk);

        let mut bad = TrainConfig::attention();
        bad.model_name = "SkipJKGAT".into();
        assert!(matches!(
            bad.to_model_config(&ds),
            Err(Error::UnknownModel(_))
        ));
    }
}
