//! Training loop for node classification.
//!
//! Full-batch training: every epoch runs the model over the whole graph,
//! since graph convolution needs every neighbour, and scores the loss on the
//! training rows only.
//!
//! The training loop:
//! 1. Resolve the device (first CUDA device if available, else CPU)
//! 2. Build the model and move the dataset to the device
//! 3. Re-initialize every parameter from the configured seed
//! 4. Each epoch: forward, cross-entropy on training rows plus the L2 penalty,
//!    backward, Adam step, validation accuracy
//! 5. Stop early once the validation accuracy has not risen for
//!    `max_patience` epochs
//!
//! # Example
//!
//! ```rust,no_run
//! use jkgat_nn::{Dataset, TrainConfig, Trainer};
//! # fn main() -> jkgat_nn::Result<()> {
//! let dataset = Dataset::from_npz("cora.npz", &candle_core::Device::Cpu)?;
//! let trained = Trainer::new(TrainConfig::attention()).train(&dataset)?;
//! println!("Early stopped at epoch {}", trained.report.stopped_epoch);
//! println!("Best validation accuracy: {}", trained.report.best_val_acc);
//! # Ok(())
//! # }
//! ```

use std::ops::RangeInclusive;

use candle_core::{DType, Device, Tensor};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW};
use jkgat_graph::Split;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainConfig;
use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::evaluation::evaluate;
use crate::model::{Architecture, JKGAT};

/// Patience-based stopping rule over a validation accuracy history.
///
/// At 0-based epoch `e` (the history holds `e + 1` values) training stops
/// when `e >= patience` and the last `patience` accuracies never increase
/// from one epoch to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyStopping {
    patience: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience }
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn should_stop(&self, history: &[f64]) -> bool {
        let Some(epoch) = history.len().checked_sub(1) else {
            return false;
        };
        if epoch < self.patience {
            return false;
        }
        history[history.len() - self.patience..]
            .windows(2)
            .all(|w| w[0] >= w[1])
    }

    /// 1-based epoch at which a run with this history halts, if it does.
    pub fn halting_epoch(&self, history: &[f64]) -> Option<usize> {
        (1..=history.len()).find(|&len| self.should_stop(&history[..len]))
    }
}

/// Per-epoch progress passed to [`Trainer::train_with_callback`].
#[derive(Debug, Clone, Copy)]
pub struct EpochStats {
    /// 1-based epoch.
    pub epoch: usize,
    pub loss: f64,
    pub val_acc: f64,
}

/// Outcome of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub architecture: Architecture,
    pub n_layers: usize,
    /// 1-based epoch the loop ended on.
    pub stopped_epoch: usize,
    /// False when the epoch budget ran out first.
    pub early_stopped: bool,
    /// Highest validation accuracy seen, not necessarily the last.
    pub best_val_acc: f64,
    /// 1-based epoch of the first occurrence of `best_val_acc`.
    pub best_epoch: usize,
    pub val_history: Vec<f64>,
    pub loss_history: Vec<f64>,
}

/// A trained model with its report.
#[derive(Debug)]
pub struct TrainedModel {
    pub model: JKGAT,
    pub report: TrainReport,
}

/// Runs one configuration to completion.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainConfig,
    device: Option<Device>,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            device: None,
        }
    }

    /// Pin the run to `device` instead of auto-detecting one.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn resolve_device(&self) -> Result<Device> {
        match &self.device {
            Some(device) => Ok(device.clone()),
            None => Ok(Device::cuda_if_available(0)?),
        }
    }

    pub fn train(&self, dataset: &Dataset) -> Result<TrainedModel> {
        self.train_with_callback(dataset, |_| {})
    }

    /// Train, calling `on_epoch` after every validation pass.
    pub fn train_with_callback<F>(&self, dataset: &Dataset, mut on_epoch: F) -> Result<TrainedModel>
    where
        F: FnMut(&EpochStats),
    {
        let config = &self.config;
        let device = self.resolve_device()?;
        let dataset = dataset.to_device(&device)?;
        let model_config = config.to_model_config(&dataset)?;

        let train_idx = dataset.split_index(Split::Train);
        if train_idx.elem_count() == 0 {
            return Err(Error::Training("training split is empty".to_string()));
        }
        let train_y = dataset.y().index_select(train_idx, 0)?;

        let model = JKGAT::new(model_config, &device)?;
        model.param_init(config.seed)?;
        if !device.is_cpu() {
            device.set_seed(config.seed)?;
        }

        let params = model.parameters();
        let mut optimizer = AdamW::new(
            params.clone(),
            ParamsAdamW {
                lr: config.lr,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        info!(
            architecture = %model.architecture(),
            n_layers = config.n_layers,
            params = model.num_parameters(),
            device = ?device,
            "starting training run"
        );

        let stopper = EarlyStopping::new(config.max_patience);
        let mut val_history = Vec::with_capacity(config.epochs);
        let mut loss_history = Vec::with_capacity(config.epochs);
        let mut early_stopped = false;

        for epoch in 0..config.epochs {
            let logits = model.forward_t(dataset.x(), dataset.edge_index(), true)?;
            let ce = loss::cross_entropy(&logits.index_select(train_idx, 0)?, &train_y)?;
            let loss = if config.weight_decay > 0.0 {
                (ce + (l2_norm_sq(&params, &device)? * (config.weight_decay / 2.0))?)?
            } else {
                ce
            };
            optimizer.backward_step(&loss)?;

            let loss_value = loss.to_scalar::<f32>()? as f64;
            if !loss_value.is_finite() {
                warn!(epoch = epoch + 1, loss = loss_value, "non-finite training loss");
            }

            let val_acc = evaluate(&model, &dataset, Split::Val)?;
            val_history.push(val_acc);
            loss_history.push(loss_value);
            debug!(epoch = epoch + 1, loss = loss_value, val_acc, "epoch");
            on_epoch(&EpochStats {
                epoch: epoch + 1,
                loss: loss_value,
                val_acc,
            });

            if stopper.should_stop(&val_history) {
                early_stopped = true;
                break;
            }
        }

        let (best_epoch, best_val_acc) = best_of(&val_history);
        let stopped_epoch = val_history.len();
        info!("Early stopped at epoch {stopped_epoch}");
        info!("Best validation accuracy: {best_val_acc:.4}");

        Ok(TrainedModel {
            report: TrainReport {
                architecture: model.architecture(),
                n_layers: config.n_layers,
                stopped_epoch,
                early_stopped,
                best_val_acc,
                best_epoch,
                val_history,
                loss_history,
            },
            model,
        })
    }
}

/// Sum of squared entries over every parameter.
fn l2_norm_sq(params: &[candle_core::Var], device: &Device) -> Result<Tensor> {
    let mut total = Tensor::zeros((), DType::F32, device)?;
    for p in params {
        total = (total + p.as_tensor().sqr()?.sum_all()?)?;
    }
    Ok(total)
}

/// (1-based epoch, value) of the first maximum.
fn best_of(history: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, &v) in history.iter().enumerate() {
        if v > best.1 {
            best = (i + 1, v);
        }
    }
    if best.0 == 0 {
        (history.len().min(1), history.first().copied().unwrap_or(0.0))
    } else {
        best
    }
}

/// One cell of a depth sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRow {
    pub report: TrainReport,
    pub test_acc: f64,
}

/// Train every architecture at every depth in `depths`.
///
/// Runs are ordered by depth, then `jk_a`, `jk`, `a`, `base`. All other keys
/// come from `base`.
pub fn sweep<F>(
    dataset: &Dataset,
    base: &TrainConfig,
    depths: RangeInclusive<usize>,
    device: Option<&Device>,
    mut on_run: F,
) -> Result<Vec<SweepRow>>
where
    F: FnMut(&SweepRow),
{
    let mut rows = Vec::new();
    for n_layers in depths {
        for arch in Architecture::ALL {
            let config = TrainConfig {
                attention: arch.uses_attention(),
                jk: arch.uses_jk(),
                n_layers,
                ..base.clone()
            };
            let mut trainer = Trainer::new(config);
            if let Some(device) = device {
                trainer = trainer.with_device(device.clone());
            }
            let trained = trainer.train(dataset)?;
            let test_acc = evaluate(&trained.model, &dataset.to_device(trained.model.device())?, Split::Test)?;
            let row = SweepRow {
                report: trained.report,
                test_acc,
            };
            on_run(&row);
            rows.push(row);
        }
    }
    Ok(rows)
}
