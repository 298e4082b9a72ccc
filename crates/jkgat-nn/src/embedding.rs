//! 2-D projection of node representations for inspection.
//!
//! [`project`] takes a trained model's output rows for one split and maps
//! them to the plane with exact t-SNE (van der Maaten & Hinton, 2008). The
//! result is an [`EmbeddingTable`] with `dimension 1`, `dimension 2` and
//! `labels` columns that can be written as CSV or drawn as a terminal
//! scatter plot.
//!
//! # Algorithm
//!
//! 1. Squared Euclidean distances between all pairs of input rows
//! 2. Per-row Gaussian bandwidth found by bisection so that the conditional
//!    distribution P(j|i) has the requested perplexity
//! 3. Symmetrize: P_ij = (P(j|i) + P(i|j)) / 2N
//! 4. Student-t similarities Q_ij in the embedding
//! 5. Gradient descent on KL(P || Q) with momentum and per-coordinate gains,
//!    P multiplied by the early exaggeration factor for the first iterations
//!
//! The O(N^2) gradient is computed row-parallel with rayon; a validation or
//! test split of a citation graph (hundreds to a thousand nodes) runs in
//! seconds.

use std::io::Write;
use std::path::Path;

use candle_core::Tensor;
use jkgat_graph::Split;
use ndarray::{Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::model::JKGAT;

const MIN_PROB: f64 = 1e-12;
const MIN_GAIN: f64 = 0.01;

/// Exact t-SNE into two dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tsne {
    /// Effective number of neighbours (default: 30). Clamped to (N - 1) / 3.
    pub perplexity: f64,
    /// Step size. `None` picks max(N / early_exaggeration / 4, 50).
    pub learning_rate: Option<f64>,
    /// Gradient descent iterations (default: 1000).
    pub n_iter: usize,
    /// Factor applied to P early on (default: 12).
    pub early_exaggeration: f64,
    /// Iterations with exaggeration and momentum 0.5 (default: 250).
    pub exaggeration_iters: usize,
    pub seed: u64,
}

impl Default for Tsne {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            learning_rate: None,
            n_iter: 1000,
            early_exaggeration: 12.0,
            exaggeration_iters: 250,
            seed: 123,
        }
    }
}

impl Tsne {
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = Some(lr);
        self
    }

    pub fn with_perplexity(mut self, perplexity: f64) -> Self {
        self.perplexity = perplexity;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Embed the rows of `x` into an `(N, 2)` array.
    pub fn fit_transform(&self, x: ArrayView2<f32>) -> Result<Array2<f64>> {
        let n = x.nrows();
        let learning_rate = self
            .learning_rate
            .unwrap_or_else(|| (n as f64 / self.early_exaggeration / 4.0).max(50.0));
        if !(self.perplexity > 0.0 && learning_rate > 0.0) {
            return Err(Error::InvalidConfig(
                "t-SNE perplexity and learning rate must be positive".to_string(),
            ));
        }
        if n < 2 {
            return Ok(Array2::zeros((n, 2)));
        }

        let distances = pairwise_sq_distances(x)?;
        let perplexity = self.perplexity.min(((n - 1) as f64 / 3.0).max(1.0));
        let p = joint_probabilities(&distances, perplexity);

        let init = Normal::new(0.0, 1e-4).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let mut y = Array2::from_shape_fn((n, 2), |_| init.sample(&mut rng));
        let mut update = Array2::<f64>::zeros((n, 2));
        let mut gains = Array2::<f64>::ones((n, 2));

        for iter in 0..self.n_iter {
            let (exaggeration, momentum) = if iter < self.exaggeration_iters {
                (self.early_exaggeration, 0.5)
            } else {
                (1.0, 0.8)
            };
            let grad = kl_gradient(&p, &y, exaggeration);

            for ((g, u), (gain, v)) in grad
                .iter()
                .zip(update.iter_mut())
                .zip(gains.iter_mut().zip(y.iter_mut()))
            {
                *gain = if g * *u < 0.0 {
                    *gain + 0.2
                } else {
                    (*gain * 0.8).max(MIN_GAIN)
                };
                *u = momentum * *u - learning_rate * *gain * g;
                *v += *u;
            }

            if let Some(mean) = y.mean_axis(Axis(0)) {
                y -= &mean;
            }
        }
        Ok(y)
    }
}

fn pairwise_sq_distances(x: ArrayView2<f32>) -> Result<Array2<f64>> {
    let n = x.nrows();
    let rows: Vec<f64> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let xi = x.row(i);
            (0..n).map(move |j| {
                xi.iter()
                    .zip(x.row(j).iter())
                    .map(|(&a, &b)| {
                        let d = f64::from(a) - f64::from(b);
                        d * d
                    })
                    .sum::<f64>()
            })
        })
        .collect();
    let got = rows.len();
    Array2::from_shape_vec((n, n), rows).map_err(|_| Error::DimensionMismatch {
        expected: n * n,
        got,
    })
}

/// P(j|i) for one row, with beta = 1 / (2 sigma^2) chosen by bisection on
/// the entropy.
fn conditional_row(dist: &[f64], i: usize, perplexity: f64) -> Vec<f64> {
    let target = perplexity.ln();
    let mut beta = 1.0;
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    let mut row = vec![0.0; dist.len()];

    // Shift by the nearest neighbour so exp() cannot underflow to all zeros.
    let nearest = dist
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, &d)| d)
        .fold(f64::INFINITY, f64::min);

    for _ in 0..100 {
        let mut sum = 0.0;
        for (j, (&d, p)) in dist.iter().zip(row.iter_mut()).enumerate() {
            *p = if j == i { 0.0 } else { (-beta * (d - nearest)).exp() };
            sum += *p;
        }
        let sum = sum.max(MIN_PROB);
        let mut entropy = 0.0;
        for p in row.iter_mut() {
            *p /= sum;
            if *p > MIN_PROB {
                entropy -= *p * p.ln();
            }
        }

        let diff = entropy - target;
        if diff.abs() < 1e-5 {
            break;
        }
        if diff > 0.0 {
            lo = beta;
            beta = if hi.is_infinite() { beta * 2.0 } else { (beta + hi) / 2.0 };
        } else {
            hi = beta;
            beta = if lo.is_infinite() { beta / 2.0 } else { (beta + lo) / 2.0 };
        }
    }
    row
}

fn joint_probabilities(distances: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let n = distances.nrows();
    let cond: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let d: Vec<f64> = distances.row(i).to_vec();
            conditional_row(&d, i, perplexity)
        })
        .collect();

    let norm = 2.0 * n as f64;
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0.0
        } else {
            ((cond[i][j] + cond[j][i]) / norm).max(MIN_PROB)
        }
    })
}

/// dC/dy_i = 4 sum_j (e P_ij - Q_ij) (1 + |y_i - y_j|^2)^-1 (y_i - y_j)
fn kl_gradient(p: &Array2<f64>, y: &Array2<f64>, exaggeration: f64) -> Array2<f64> {
    let n = y.nrows();
    let num: Vec<f64> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            (0..n).map(move |j| {
                if i == j {
                    0.0
                } else {
                    let dx = y[[i, 0]] - y[[j, 0]];
                    let dy = y[[i, 1]] - y[[j, 1]];
                    1.0 / (1.0 + dx * dx + dy * dy)
                }
            })
        })
        .collect();
    // Sequential so the result does not depend on thread scheduling.
    let sum_q: f64 = num.iter().sum::<f64>().max(MIN_PROB);

    let grad: Vec<[f64; 2]> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut g = [0.0; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let w = num[i * n + j];
                let q = (w / sum_q).max(MIN_PROB);
                let f = 4.0 * (exaggeration * p[[i, j]] - q) * w;
                g[0] += f * (y[[i, 0]] - y[[j, 0]]);
                g[1] += f * (y[[i, 1]] - y[[j, 1]]);
            }
            g
        })
        .collect();

    Array2::from_shape_fn((n, 2), |(i, k)| grad[i][k])
}

/// One projected node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRow {
    #[serde(rename = "dimension 1")]
    pub dim1: f64,
    #[serde(rename = "dimension 2")]
    pub dim2: f64,
    #[serde(rename = "labels")]
    pub label: u32,
}

/// Projected coordinates with the true label of each node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingTable {
    pub rows: Vec<EmbeddingRow>,
}

const GLYPHS: &[u8] = b"ox+*#@%&=~";

impl EmbeddingTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        for row in &self.rows {
            w.serialize(row)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.to_csv(std::io::BufWriter::new(file))
    }

    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut r = csv::Reader::from_path(path)?;
        let rows = r.deserialize().collect::<std::result::Result<Vec<EmbeddingRow>, _>>()?;
        Ok(Self { rows })
    }

    /// Draw the table as a `width` x `height` character grid.
    ///
    /// Both axes share one range so distances are not distorted. Each class
    /// gets its own glyph; the legend follows the grid.
    pub fn render_scatter(&self, width: usize, height: usize) -> String {
        let width = width.max(2);
        let height = height.max(2);
        let mut out = String::new();
        if self.rows.is_empty() {
            out.push_str("(no points)\n");
            return out;
        }

        let (lo, hi) = self.rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(r.dim1).min(r.dim2), hi.max(r.dim1).max(r.dim2))
        });
        let span = (hi - lo).max(f64::EPSILON);

        let mut grid = vec![vec![b' '; width]; height];
        for r in &self.rows {
            let cx = (((r.dim1 - lo) / span) * (width - 1) as f64).round() as usize;
            let cy = (((r.dim2 - lo) / span) * (height - 1) as f64).round() as usize;
            let glyph = GLYPHS[r.label as usize % GLYPHS.len()];
            grid[height - 1 - cy.min(height - 1)][cx.min(width - 1)] = glyph;
        }

        let border = format!("+{}+\n", "-".repeat(width));
        out.push_str(&border);
        for line in grid {
            out.push('|');
            out.push_str(&String::from_utf8_lossy(&line));
            out.push_str("|\n");
        }
        out.push_str(&border);

        let mut labels: Vec<u32> = self.rows.iter().map(|r| r.label).collect();
        labels.sort_unstable();
        labels.dedup();
        let legend: Vec<String> = labels
            .iter()
            .map(|&l| format!("{}={}", GLYPHS[l as usize % GLYPHS.len()] as char, l))
            .collect();
        out.push_str(&format!("labels: {}\n", legend.join(" ")));
        out.push_str(&format!("range: [{lo:.1}, {hi:.1}] on both axes\n"));
        out
    }
}

/// Project the final representations of `split`'s nodes.
///
/// Runs the model in inference mode over the whole graph, keeps the rows of
/// the split, and embeds them with `tsne`.
pub fn project(model: &JKGAT, dataset: &Dataset, split: Split, tsne: &Tsne) -> Result<EmbeddingTable> {
    let index = dataset.split_index(split);
    let out = model.forward_t(dataset.x(), dataset.edge_index(), false)?;
    let rows = out.index_select(index, 0)?;
    let labels = dataset.y().index_select(index, 0)?.to_vec1::<u32>()?;
    let coords = tsne.fit_transform(to_array(&rows)?.view())?;

    Ok(EmbeddingTable {
        rows: coords
            .outer_iter()
            .zip(labels)
            .map(|(c, label)| EmbeddingRow {
                dim1: c[0],
                dim2: c[1],
                label,
            })
            .collect(),
    })
}

fn to_array(t: &Tensor) -> Result<Array2<f32>> {
    let (n, d) = t.dims2()?;
    let data = t.to_dtype(candle_core::DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    let got = data.len();
    Array2::from_shape_vec((n, d), data).map_err(|_| Error::DimensionMismatch {
        expected: n * d,
        got,
    })
}
