//! Seeded planted-partition graphs.
//!
//! A stochastic block model with class-correlated bag-of-words features. It
//! has the shape of a citation benchmark (sparse binary features, homophilous
//! edges, a small labelled training set per class) and is cheap enough to
//! train on inside a unit test.

use crate::{Graph, Result, SplitMasks};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

/// Parameters of a planted-partition graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantedPartitionConfig {
    pub num_nodes: usize,
    pub num_classes: usize,
    pub num_features: usize,
    /// Probability of an edge between two nodes of the same class.
    pub p_in: f64,
    /// Probability of an edge between two nodes of different classes.
    pub p_out: f64,
    /// Probability that a feature from the node's own class block is set.
    pub feature_signal: f64,
    /// Probability that any other feature is set.
    pub feature_noise: f64,
    /// Labelled training nodes per class (Planetoid uses 20).
    pub train_per_class: usize,
    pub num_val: usize,
    pub num_test: usize,
    pub seed: u64,
}

impl Default for PlantedPartitionConfig {
    fn default() -> Self {
        Self {
            num_nodes: 300,
            num_classes: 3,
            num_features: 48,
            p_in: 0.05,
            p_out: 0.005,
            feature_signal: 0.3,
            feature_noise: 0.05,
            train_per_class: 10,
            num_val: 60,
            num_test: 120,
            seed: 123,
        }
    }
}

/// Generate a planted-partition graph.
///
/// Nodes are assigned to classes round-robin, so every class has
/// `num_nodes / num_classes` members (give or take one). Edges are emitted in
/// both directions. The split takes the first `train_per_class` nodes of each
/// class (in shuffled order) for training, then `num_val` and `num_test`
/// nodes from the remainder.
pub fn planted_partition(config: &PlantedPartitionConfig) -> Result<Graph> {
    let n = config.num_nodes;
    let k = config.num_classes.max(1);
    let f = config.num_features;
    let mut rng = XorShiftRng::seed_from_u64(config.seed);

    let labels: Vec<u32> = (0..n).map(|i| (i % k) as u32).collect();

    let block = (f / k).max(1);
    let mut features = vec![0.0f32; n * f];
    for (i, &label) in labels.iter().enumerate() {
        let lo = label as usize * block;
        let hi = (lo + block).min(f);
        for j in 0..f {
            let p = if (lo..hi).contains(&j) {
                config.feature_signal
            } else {
                config.feature_noise
            };
            if rng.gen_bool(p) {
                features[i * f + j] = 1.0;
            }
        }
    }

    let mut edges = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let p = if labels[i] == labels[j] {
                config.p_in
            } else {
                config.p_out
            };
            if rng.gen_bool(p) {
                edges.push((i, j));
                edges.push((j, i));
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);

    let mut masks = SplitMasks {
        train: vec![false; n],
        val: vec![false; n],
        test: vec![false; n],
    };
    let mut per_class = vec![0usize; k];
    let mut rest = Vec::with_capacity(n);
    for &node in &order {
        let c = labels[node] as usize;
        if per_class[c] < config.train_per_class {
            per_class[c] += 1;
            masks.train[node] = true;
        } else {
            rest.push(node);
        }
    }
    for &node in rest.iter().take(config.num_val) {
        masks.val[node] = true;
    }
    for &node in rest.iter().skip(config.num_val).take(config.num_test) {
        masks.test[node] = true;
    }

    Graph::new(features, f, edges, labels, masks)
}
