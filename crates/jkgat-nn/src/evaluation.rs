//! Masked classification accuracy.
//!
//! Accuracy is measured on one [`Split`] at a time: the model runs over the
//! whole graph in inference mode (no dropout), and only the rows of the
//! split's nodes are scored.

use candle_core::{DType, Tensor, D};
use jkgat_graph::Split;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::error::Result;
use crate::model::JKGAT;

/// Fraction of rows in `index` whose arg-max logit equals the label.
///
/// `logits` is `(N, C)`, `labels` is `(N,)` u32, `index` holds node ids. An
/// empty index scores 0.
pub fn masked_accuracy(logits: &Tensor, labels: &Tensor, index: &Tensor) -> Result<f64> {
    let n = index.elem_count();
    if n == 0 {
        return Ok(0.0);
    }
    let pred = logits.index_select(index, 0)?.argmax(D::Minus1)?;
    let truth = labels.index_select(index, 0)?.to_dtype(pred.dtype())?;
    let correct = pred
        .eq(&truth)?
        .to_dtype(DType::F32)?
        .sum_all()?
        .to_scalar::<f32>()?;
    Ok(correct as f64 / n as f64)
}

/// Accuracy of `model` on one split of `dataset`.
pub fn evaluate(model: &JKGAT, dataset: &Dataset, split: Split) -> Result<f64> {
    let logits = model.forward_t(dataset.x(), dataset.edge_index(), false)?;
    masked_accuracy(&logits, dataset.y(), dataset.split_index(split))
}

/// Accuracy on all three splits from a single forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitAccuracy {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl SplitAccuracy {
    pub fn get(&self, split: Split) -> f64 {
        match split {
            Split::Train => self.train,
            Split::Val => self.val,
            Split::Test => self.test,
        }
    }
}

pub fn evaluate_all(model: &JKGAT, dataset: &Dataset) -> Result<SplitAccuracy> {
    let logits = model.forward_t(dataset.x(), dataset.edge_index(), false)?;
    let acc = |split| masked_accuracy(&logits, dataset.y(), dataset.split_index(split));
    Ok(SplitAccuracy {
        train: acc(Split::Train)?,
        val: acc(Split::Val)?,
        test: acc(Split::Test)?,
    })
}
