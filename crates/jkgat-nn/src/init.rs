//! Seeded parameter re-initialization.
//!
//! Construction draws weights through candle's own RNG, which cannot be seeded
//! on every backend. [`param_init`] overwrites every variable of a [`VarMap`]
//! from a single seeded generator instead, so two models built from the same
//! configuration and seed start from identical weights on any device.
//!
//! The distribution is chosen from the variable name:
//!
//! | Variable | Distribution |
//! |----------|--------------|
//! | `att_src`, `att_dst`, GAT `lin.weight` | Glorot: U(-a, a), a = sqrt(6 / (fan_in + fan_out)) |
//! | LSTM `weight_ih*`, `weight_hh*`, `bias_ih*`, `bias_hh*` | U(-1/sqrt(H), 1/sqrt(H)) |
//! | other `*.weight` | U(-1/sqrt(fan_in), 1/sqrt(fan_in)) |
//! | `*.bias` next to a `*.weight` | U(-1/sqrt(fan_in), 1/sqrt(fan_in)) of that weight |
//! | any other `bias` | zeros |
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.
//! - He, K., et al. (2015). Delving deep into rectifiers. ICCV.

use std::collections::BTreeMap;

use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::error::Result;

/// Distribution a single variable is drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitScheme {
    Zeros,
    /// U(-bound, bound)
    Uniform(f64),
}

impl InitScheme {
    /// Xavier uniform bound for the given fans.
    pub fn glorot(fan_in: usize, fan_out: usize) -> Self {
        InitScheme::Uniform((6.0 / (fan_in + fan_out).max(1) as f64).sqrt())
    }

    /// `torch.nn.Linear` default: kaiming uniform with a = sqrt(5), which
    /// reduces to a bound of 1/sqrt(fan_in).
    pub fn fan_in(fan_in: usize) -> Self {
        InitScheme::Uniform(1.0 / (fan_in.max(1) as f64).sqrt())
    }

    fn sample(self, numel: usize, rng: &mut XorShiftRng) -> Vec<f32> {
        match self {
            InitScheme::Uniform(bound) if bound > 0.0 => (0..numel)
                .map(|_| rng.gen_range(-bound..bound) as f32)
                .collect(),
            _ => vec![0.0; numel],
        }
    }
}

fn is_lstm_param(leaf: &str) -> bool {
    ["weight_ih", "weight_hh", "bias_ih", "bias_hh"]
        .iter()
        .any(|p| leaf.starts_with(p))
}

/// Pick the scheme for `name`, given the shapes of every variable in the map.
pub fn scheme_for(name: &str, dims: &[usize], shapes: &BTreeMap<String, Vec<usize>>) -> InitScheme {
    let (prefix, leaf) = match name.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, name),
    };

    if leaf == "att_src" || leaf == "att_dst" {
        let n = dims.len();
        return match n {
            0 | 1 => InitScheme::glorot(1, dims.first().copied().unwrap_or(1)),
            _ => InitScheme::glorot(dims[n - 2], dims[n - 1]),
        };
    }
    if is_lstm_param(leaf) {
        return InitScheme::fan_in(dims.first().copied().unwrap_or(4) / 4);
    }
    if leaf == "weight" {
        let fan_in = dims.get(1).copied().unwrap_or(1);
        let fan_out = dims.first().copied().unwrap_or(1);
        // A `lin` whose parent also owns `att_src` is a GAT projection.
        let gat_projection = prefix
            .and_then(|p| p.strip_suffix("lin"))
            .is_some_and(|parent| shapes.contains_key(&format!("{parent}att_src")));
        return if gat_projection {
            InitScheme::glorot(fan_in, fan_out)
        } else {
            InitScheme::fan_in(fan_in)
        };
    }
    if leaf == "bias" {
        if let Some(p) = prefix {
            if let Some(w) = shapes.get(&format!("{p}.weight")) {
                return InitScheme::fan_in(w.get(1).copied().unwrap_or(1));
            }
        }
        return InitScheme::Zeros;
    }
    InitScheme::fan_in(dims.last().copied().unwrap_or(1))
}

/// Overwrite every variable in `varmap` from a generator seeded with `seed`.
///
/// Variables are visited in name order so the draw sequence does not depend
/// on hash-map iteration.
pub fn param_init(varmap: &VarMap, seed: u64) -> Result<()> {
    let data = varmap.data().lock().unwrap_or_else(|e| e.into_inner());
    let vars: BTreeMap<&String, &Var> = data.iter().collect();
    let shapes: BTreeMap<String, Vec<usize>> = vars
        .iter()
        .map(|(name, var)| ((*name).clone(), var.dims().to_vec()))
        .collect();

    let mut rng = XorShiftRng::seed_from_u64(seed);
    for (name, var) in vars {
        let dims = var.dims();
        let scheme = scheme_for(name, dims, &shapes);
        let values = scheme.sample(var.elem_count(), &mut rng);
        let fresh = Tensor::from_vec(values, dims, var.device())?.to_dtype(var.dtype())?;
        var.set(&fresh)?;
    }
    Ok(())
}
