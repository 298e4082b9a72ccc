//! Jumping Knowledge aggregation (Xu et al., 2018).
//!
//! JK-Net lets each node pick its own receptive field by combining the
//! representations of every layer into one vector:
//!
//! ```text
//! Layer 1 ---+
//!            |
//! Layer 2 ---+---> AGGREGATE ---> h_final
//!            |
//! Layer K ---+
//! ```
//!
//! # Aggregation Strategies
//!
//! Given layer representations h^{(1)}, ..., h^{(K)} of equal width C:
//!
//! ## LSTM Attention (JK-LSTM)
//!
//! ```text
//! s^{(k)} = w^T [LSTM_fwd(h)^{(k)} || LSTM_bwd(h)^{(k)}]
//! a^{(k)} = softmax_k(s^{(k)})
//! h_final = sum_k a^{(k)} h^{(k)}
//! ```
//!
//! A bidirectional LSTM with hidden size `(K * C) / 2` reads the layer stack
//! as a sequence; a linear scorer turns each step into an attention logit.
//!
//! ## Max Pooling (JK-Max)
//!
//! ```text
//! h_final[i] = max(h^{(1)}[i], h^{(2)}[i], ..., h^{(K)}[i])
//! ```
//!
//! ## Mean (JK-Mean)
//!
//! Element-wise average over layers.
//!
//! All modes keep the per-layer width C.
//!
//! # Reference
//!
//! Xu et al., "Representation Learning on Graphs with Jumping Knowledge
//! Networks", ICML 2018.

use std::fmt;
use std::str::FromStr;

use candle_core::{Result, Tensor, D};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM, RNN};
use candle_nn::{linear, Linear, Module, VarBuilder};
use serde::{Deserialize, Serialize};

/// Aggregation mode for Jumping Knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JKMode {
    /// Bidirectional LSTM scoring with softmax attention over layers
    #[default]
    Lstm,
    /// Element-wise maximum: output dim = input_dim
    Max,
    /// Mean of all layers: output dim = input_dim
    Mean,
}

impl JKMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JKMode::Lstm => "lstm",
            JKMode::Max => "max",
            JKMode::Mean => "mean",
        }
    }
}

impl fmt::Display for JKMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JKMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lstm" => Ok(JKMode::Lstm),
            "max" => Ok(JKMode::Max),
            "mean" => Ok(JKMode::Mean),
            other => Err(format!("unknown jumping knowledge mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
struct LstmAttention {
    fwd: LSTM,
    bwd: LSTM,
    att: Linear,
}

impl LstmAttention {
    fn new(channels: usize, num_layers: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = ((num_layers * channels) / 2).max(1);
        let fwd = lstm(channels, hidden, LSTMConfig::default(), vb.pp("fwd"))?;
        let bwd = lstm(channels, hidden, LSTMConfig::default(), vb.pp("bwd"))?;
        let att = linear(2 * hidden, 1, vb.pp("att"))?;
        Ok(Self { fwd, bwd, att })
    }

    /// Attention over layers, `(N, K)`; `stack` is `(N, K, C)`.
    fn scores(&self, stack: &Tensor) -> Result<Tensor> {
        let k = stack.dim(1)?;
        let reverse = Tensor::from_vec((0..k as u32).rev().collect::<Vec<_>>(), k, stack.device())?;

        let fwd = self.fwd.states_to_tensor(&self.fwd.seq(stack)?)?;
        let bwd_in = stack.index_select(&reverse, 1)?;
        let bwd = self.bwd.states_to_tensor(&self.bwd.seq(&bwd_in)?)?;
        let bwd = bwd.index_select(&reverse, 1)?;

        let logits = self
            .att
            .forward(&Tensor::cat(&[&fwd, &bwd], D::Minus1)?)?
            .squeeze(D::Minus1)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }
}

/// Jumping Knowledge aggregator over per-layer node representations.
#[derive(Debug, Clone)]
pub struct JumpingKnowledge {
    mode: JKMode,
    lstm: Option<LstmAttention>,
}

impl JumpingKnowledge {
    /// Create a new JumpingKnowledge aggregator.
    ///
    /// `channels` and `num_layers` size the LSTM and are ignored by the
    /// parameter-free modes.
    pub fn new(mode: JKMode, channels: usize, num_layers: usize, vb: VarBuilder) -> Result<Self> {
        let lstm = match mode {
            JKMode::Lstm => Some(LstmAttention::new(channels, num_layers, vb)?),
            JKMode::Max | JKMode::Mean => None,
        };
        Ok(Self { mode, lstm })
    }

    /// Aggregate representations from multiple GNN layers.
    ///
    /// # Arguments
    ///
    /// - `layer_outputs`: One tensor per GNN layer, each (N x C).
    ///
    /// # Returns
    ///
    /// Aggregated representation (N x C).
    pub fn forward(&self, layer_outputs: &[Tensor]) -> Result<Tensor> {
        if layer_outputs.is_empty() {
            return Err(candle_core::Error::Msg(
                "No layer outputs provided".to_string(),
            ));
        }

        match (&self.lstm, self.mode) {
            (Some(lstm), _) => {
                let stack = Tensor::stack(layer_outputs, 1)?;
                let alpha = lstm.scores(&stack)?;
                stack
                    .broadcast_mul(&alpha.unsqueeze(D::Minus1)?)?
                    .sum(1)
            }
            (None, JKMode::Mean) => {
                let mut result = layer_outputs[0].clone();
                for layer in layer_outputs.iter().skip(1) {
                    result = (&result + layer)?;
                }
                result / layer_outputs.len() as f64
            }
            (None, _) => {
                let mut result = layer_outputs[0].clone();
                for layer in layer_outputs.iter().skip(1) {
                    result = result.maximum(layer)?;
                }
                Ok(result)
            }
        }
    }

    /// Per-node weight of each layer, `(N, K)`, for the LSTM mode.
    pub fn layer_attention(&self, layer_outputs: &[Tensor]) -> Result<Option<Tensor>> {
        match &self.lstm {
            Some(lstm) => Ok(Some(lstm.scores(&Tensor::stack(layer_outputs, 1)?)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn vb_for(varmap: &VarMap) -> VarBuilder<'_> {
        VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu)
    }

    #[test]
    fn test_jumping_knowledge_lstm_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let jk = JumpingKnowledge::new(JKMode::Lstm, 8, 3, vb_for(&varmap)).unwrap();

        let xs: Vec<Tensor> = (0..3)
            .map(|_| Tensor::randn(0f32, 1f32, (5, 8), &device).unwrap())
            .collect();
        let out = jk.forward(&xs).unwrap();
        assert_eq!(out.dims(), &[5, 8]);

        let names: Vec<String> = varmap.data().lock().unwrap().keys().cloned().collect();
        // hidden = (3 * 8) / 2 = 12, four gates
        let w = varmap.data().lock().unwrap()["fwd.weight_ih_l0"].as_tensor().dims().to_vec();
        assert_eq!(w, vec![48, 8]);
        assert!(names.iter().any(|n| n == "att.weight"));
    }

    #[test]
    fn test_jumping_knowledge_lstm_attention_is_distribution() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let jk = JumpingKnowledge::new(JKMode::Lstm, 4, 2, vb_for(&varmap)).unwrap();

        let xs: Vec<Tensor> = (0..2)
            .map(|_| Tensor::randn(0f32, 1f32, (6, 4), &device).unwrap())
            .collect();
        let alpha = jk.layer_attention(&xs).unwrap().unwrap();
        assert_eq!(alpha.dims(), &[6, 2]);
        for row in alpha.to_vec2::<f32>().unwrap() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_jumping_knowledge_max() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let jk = JumpingKnowledge::new(JKMode::Max, 8, 2, vb_for(&varmap)).unwrap();

        let layer1 = Tensor::ones((5, 8), DType::F32, &device).unwrap();
        let layer2 = (Tensor::ones((5, 8), DType::F32, &device).unwrap() * 2.0).unwrap();

        let out = jk.forward(&[layer1, layer2]).unwrap();
        assert_eq!(out.dims(), &[5, 8]);
        for row in out.to_vec2::<f32>().unwrap() {
            for v in row {
                assert!((v - 2.0).abs() < 1e-6);
            }
        }
        assert!(varmap.all_vars().is_empty());
    }

    #[test]
    fn test_jumping_knowledge_mean() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let jk = JumpingKnowledge::new(JKMode::Mean, 4, 2, vb_for(&varmap)).unwrap();

        let layer1 = Tensor::ones((3, 4), DType::F32, &device).unwrap();
        let layer2 = (Tensor::ones((3, 4), DType::F32, &device).unwrap() * 3.0).unwrap();

        let out = jk.forward(&[layer1, layer2]).unwrap();
        for row in out.to_vec2::<f32>().unwrap() {
            for v in row {
                assert!((v - 2.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_jumping_knowledge_empty_input() {
        let varmap = VarMap::new();
        let jk = JumpingKnowledge::new(JKMode::Mean, 4, 2, vb_for(&varmap)).unwrap();
        assert!(jk.forward(&[]).is_err());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("LSTM".parse::<JKMode>().unwrap(), JKMode::Lstm);
        assert_eq!("max".parse::<JKMode>().unwrap(), JKMode::Max);
        assert!("cat".parse::<JKMode>().is_err());
    }
}
