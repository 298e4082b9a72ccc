//! The JKGAT node classifier.
//!
//! A stack of `n_layers` graph convolutions followed, optionally, by a
//! Jumping Knowledge head. Two flags pick one of four [`Architecture`]s:
//!
//! | Architecture | Layers | Per-layer width | Output |
//! |--------------|--------|-----------------|--------|
//! | `AttentionJk` | GAT, `n_heads` concatenated heads | `hidden * heads` | JK + linear |
//! | `Attention` | GAT; output layer has 1 head | `hidden * heads` | last layer |
//! | `ConvJk` | GraphConv | `hidden` | JK + linear |
//! | `Conv` | GraphConv | `hidden` | last layer |
//!
//! ```text
//! x -> [conv -> ELU -> dropout] x (L-1) -> conv -> dropout -> logits
//!            |                                       |
//!            +---------------> JK <------------------+ -> linear -> logits
//! ```

use std::fmt;
use std::str::FromStr;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::conv::{AttentionWeights, GATConv, GraphConv};
use crate::error::{Error, Result};
use crate::init;
use crate::jk::{JKMode, JumpingKnowledge};

/// The four layer-composition strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    AttentionJk,
    Attention,
    ConvJk,
    Conv,
}

impl Architecture {
    pub const ALL: [Architecture; 4] = [
        Architecture::AttentionJk,
        Architecture::ConvJk,
        Architecture::Attention,
        Architecture::Conv,
    ];

    pub fn from_flags(attention: bool, jk: bool) -> Self {
        match (attention, jk) {
            (true, true) => Architecture::AttentionJk,
            (true, false) => Architecture::Attention,
            (false, true) => Architecture::ConvJk,
            (false, false) => Architecture::Conv,
        }
    }

    pub fn uses_attention(self) -> bool {
        matches!(self, Architecture::AttentionJk | Architecture::Attention)
    }

    pub fn uses_jk(self) -> bool {
        matches!(self, Architecture::AttentionJk | Architecture::ConvJk)
    }

    /// Short label used in run tables.
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::AttentionJk => "jk_a",
            Architecture::Attention => "a",
            Architecture::ConvJk => "jk",
            Architecture::Conv => "base",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model family selected by the `model_name` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelName {
    #[default]
    #[serde(rename = "JKGAT")]
    Jkgat,
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelName::Jkgat => f.write_str("JKGAT"),
        }
    }
}

impl FromStr for ModelName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "JKGAT" => Ok(ModelName::Jkgat),
            "SkipJKGAT" => Err(Error::UnknownModel(
                "SkipJKGAT has no implementation".to_string(),
            )),
            other => Err(Error::UnknownModel(other.to_string())),
        }
    }
}

/// Dimensions and flags a [`JKGAT`] is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub output_dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub dropout: f32,
    pub attention: bool,
    pub jk: bool,
    pub jk_mode: JKMode,
    /// Reuse one parameter set for every hidden layer.
    pub share_hidden_weights: bool,
}

impl ModelConfig {
    pub fn architecture(&self) -> Architecture {
        Architecture::from_flags(self.attention, self.jk)
    }

    /// Width of every non-final layer output.
    pub fn layer_width(&self) -> usize {
        if self.attention {
            self.hidden_dim * self.n_heads
        } else {
            self.hidden_dim
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_layers < 2 {
            return Err(Error::InvalidConfig(format!(
                "n_layers must be at least 2, got {}",
                self.n_layers
            )));
        }
        if self.input_dim == 0 || self.output_dim == 0 || self.hidden_dim == 0 {
            return Err(Error::InvalidConfig(
                "input_dim, hidden_dim and output_dim must be positive".to_string(),
            ));
        }
        if self.attention && self.n_heads == 0 {
            return Err(Error::InvalidConfig("n_heads must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Attention(GATConv),
    Conv(GraphConv),
}

impl Layer {
    fn forward_t(&self, x: &Tensor, edge_index: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        match self {
            Layer::Attention(gat) => gat.forward_t(x, edge_index, train),
            Layer::Conv(conv) => conv.forward(x, edge_index),
        }
    }

    fn forward_with_attention(
        &self,
        x: &Tensor,
        edge_index: &Tensor,
        train: bool,
    ) -> candle_core::Result<(Tensor, Option<AttentionWeights>)> {
        match self {
            Layer::Attention(gat) => {
                let (out, att) = gat.forward_with_attention(x, edge_index, train)?;
                Ok((out, Some(att)))
            }
            Layer::Conv(conv) => Ok((conv.forward(x, edge_index)?, None)),
        }
    }

    fn out_features(&self) -> usize {
        match self {
            Layer::Attention(gat) => gat.out_features(),
            Layer::Conv(conv) => conv.out_features(),
        }
    }
}

#[derive(Debug, Clone)]
struct JkHead {
    jk: JumpingKnowledge,
    lin: Linear,
}

/// Graph attention / graph convolution network with optional Jumping
/// Knowledge.
///
/// Owns its parameters in a [`VarMap`]; the trainer optimizes
/// [`JKGAT::parameters`] in place.
pub struct JKGAT {
    config: ModelConfig,
    layers: Vec<Layer>,
    output: Layer,
    head: Option<JkHead>,
    varmap: VarMap,
    device: Device,
}

impl fmt::Debug for JKGAT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JKGAT")
            .field("architecture", &self.architecture())
            .field("layer_widths", &self.layer_widths())
            .field("num_parameters", &self.num_parameters())
            .finish()
    }
}

impl JKGAT {
    /// Build the network on `device`.
    pub fn new(config: ModelConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let arch = config.architecture();
        let width = config.layer_width();

        let build = |in_dim: usize, vb: VarBuilder| -> candle_core::Result<Layer> {
            Ok(if arch.uses_attention() {
                Layer::Attention(GATConv::new(
                    in_dim,
                    config.hidden_dim,
                    config.n_heads,
                    true,
                    config.dropout,
                    vb,
                )?)
            } else {
                Layer::Conv(GraphConv::new(in_dim, config.hidden_dim, vb)?)
            })
        };

        let mut layers = Vec::with_capacity(config.n_layers - 1);
        layers.push(build(config.input_dim, vb.pp("layers.0"))?);
        let n_hidden = config.n_layers - 2;
        if config.share_hidden_weights && n_hidden > 0 {
            let shared = build(width, vb.pp("hidden"))?;
            layers.extend(std::iter::repeat(shared).take(n_hidden));
        } else {
            for i in 1..=n_hidden {
                layers.push(build(width, vb.pp(format!("layers.{i}")))?);
            }
        }

        let out_vb = vb.pp("output");
        let output = match arch {
            Architecture::AttentionJk => build(width, out_vb)?,
            Architecture::Attention => Layer::Attention(GATConv::new(
                width,
                config.output_dim,
                1,
                true,
                config.dropout,
                out_vb,
            )?),
            Architecture::ConvJk => build(width, out_vb)?,
            Architecture::Conv => Layer::Conv(GraphConv::new(width, config.output_dim, out_vb)?),
        };

        let head = if arch.uses_jk() {
            Some(JkHead {
                jk: JumpingKnowledge::new(config.jk_mode, width, config.n_layers, vb.pp("jk"))?,
                lin: linear(width, config.output_dim, vb.pp("lin"))?,
            })
        } else {
            None
        };

        Ok(Self {
            config,
            layers,
            output,
            head,
            varmap,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn architecture(&self) -> Architecture {
        self.config.architecture()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Trainable variables, one entry per distinct parameter tensor.
    pub fn parameters(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|v| v.elem_count()).sum()
    }

    /// Output width of each convolution, input to output.
    pub fn layer_widths(&self) -> Vec<usize> {
        self.layers
            .iter()
            .chain(std::iter::once(&self.output))
            .map(Layer::out_features)
            .collect()
    }

    /// Re-draw every parameter from its initialization distribution.
    pub fn param_init(&self, seed: u64) -> Result<()> {
        init::param_init(&self.varmap, seed)
    }

    /// Per-node class logits `(N, output_dim)`.
    ///
    /// `train` enables feature and attention dropout.
    pub fn forward_t(&self, x: &Tensor, edge_index: &Tensor, train: bool) -> Result<Tensor> {
        Ok(self.forward_with_attention(x, edge_index, train)?.0)
    }

    /// Like [`JKGAT::forward_t`], also returning the output layer's attention
    /// coefficients when the architecture uses attention.
    pub fn forward_with_attention(
        &self,
        x: &Tensor,
        edge_index: &Tensor,
        train: bool,
    ) -> Result<(Tensor, Option<AttentionWeights>)> {
        let (n, f) = x.dims2()?;
        if f != self.config.input_dim {
            return Err(Error::DimensionMismatch {
                expected: self.config.input_dim,
                got: f,
            });
        }

        let collect = self.head.is_some();
        let mut xs = Vec::with_capacity(if collect { self.config.n_layers } else { 0 });

        let mut h = x.clone();
        for layer in &self.layers {
            h = layer.forward_t(&h, edge_index, train)?.elu(1.0)?;
            h = self.dropout(&h, train)?;
            if collect {
                xs.push(h.clone());
            }
        }

        let (h, attention) = self.output.forward_with_attention(&h, edge_index, train)?;
        let h = self.dropout(&h, train)?;

        // The one place the JK capability changes the computation.
        let logits = match &self.head {
            Some(head) => {
                xs.push(h);
                head.lin.forward(&head.jk.forward(&xs)?)?
            }
            None => h,
        };
        debug_assert_eq!(logits.dims(), &[n, self.config.output_dim]);
        Ok((logits, attention))
    }

    fn dropout(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        if train && self.config.dropout > 0.0 {
            Ok(candle_nn::ops::dropout(x, self.config.dropout)?)
        } else {
            Ok(x.clone())
        }
    }
}
