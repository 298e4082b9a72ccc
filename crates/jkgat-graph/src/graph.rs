use crate::algo::normalize::gcn_norm;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three node subsets a benchmark split defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    /// Nodes whose labels drive the loss.
    Train,
    /// Nodes monitored for early stopping.
    Val,
    /// Held-out nodes for the final report.
    Test,
}

impl Split {
    /// All splits in canonical order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" | "valid" | "validation" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(Error::InvalidGraph(format!("unknown split `{other}`"))),
        }
    }
}

/// Boolean membership masks for the three splits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMasks {
    pub train: Vec<bool>,
    pub val: Vec<bool>,
    pub test: Vec<bool>,
}

impl SplitMasks {
    pub fn get(&self, split: Split) -> &[bool] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }
}

/// A node-classification graph.
///
/// Features are stored row-major (`num_nodes x num_features`). Edges are
/// directed `(source, target)` pairs; messages flow from source to target.
/// Every edge carries a weight, which is `1.0` until [`Graph::gcn_normalized`]
/// rewrites it.
///
/// Once built, a graph is never mutated: transforms consume `self` and return
/// a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    features: Vec<f32>,
    num_features: usize,
    edges: Vec<(usize, usize)>,
    edge_weight: Vec<f32>,
    labels: Vec<u32>,
    masks: SplitMasks,
}

impl Graph {
    /// Build a graph, checking its invariants.
    ///
    /// Fails if the feature buffer is not `labels.len() * num_features` long,
    /// if an edge references a node outside `0..num_nodes`, if a mask has the
    /// wrong length, or if two masks share a node.
    pub fn new(
        features: Vec<f32>,
        num_features: usize,
        edges: Vec<(usize, usize)>,
        labels: Vec<u32>,
        masks: SplitMasks,
    ) -> Result<Self> {
        let n = labels.len();
        if features.len() != n * num_features {
            return Err(Error::InvalidGraph(format!(
                "feature buffer has {} values, expected {} nodes x {} features",
                features.len(),
                n,
                num_features
            )));
        }
        if let Some(&(s, t)) = edges.iter().find(|&&(s, t)| s >= n || t >= n) {
            return Err(Error::InvalidGraph(format!(
                "edge ({s}, {t}) references a node outside 0..{n}"
            )));
        }
        for split in Split::ALL {
            let len = masks.get(split).len();
            if len != n {
                return Err(Error::InvalidGraph(format!(
                    "{split} mask has length {len}, expected {n}"
                )));
            }
        }
        for i in 0..n {
            let hits = Split::ALL.iter().filter(|&&s| masks.get(s)[i]).count();
            if hits > 1 {
                return Err(Error::InvalidGraph(format!(
                    "node {i} belongs to more than one split"
                )));
            }
        }

        let edge_weight = vec![1.0; edges.len()];
        Ok(Self {
            features,
            num_features,
            edges,
            edge_weight,
            labels,
            masks,
        })
    }

    /// Apply GCN normalization: add the missing self-loops and rescale every
    /// edge weight by `deg(source)^-1/2 * deg(target)^-1/2`.
    pub fn gcn_normalized(self) -> Self {
        let (edges, edge_weight) = gcn_norm(&self.edges, &self.edge_weight, self.num_nodes());
        Self {
            edges,
            edge_weight,
            ..self
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.labels.len()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of classes, taken as `max(label) + 1`.
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m as usize + 1)
    }

    /// Row-major feature buffer.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    /// Feature row of one node.
    pub fn node_features(&self, node: usize) -> &[f32] {
        let start = node * self.num_features;
        &self.features[start..start + self.num_features]
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn edge_weight(&self) -> &[f32] {
        &self.edge_weight
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn mask(&self, split: Split) -> &[bool] {
        self.masks.get(split)
    }

    /// Node ids inside a split, ascending.
    pub fn split_indices(&self, split: Split) -> Vec<u32> {
        self.mask(split)
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn split_size(&self, split: Split) -> usize {
        self.mask(split).iter().filter(|&&m| m).count()
    }

    /// Edge list split into source and target rows, as `u32`.
    pub fn edge_index_rows(&self) -> (Vec<u32>, Vec<u32>) {
        self.edges
            .iter()
            .map(|&(s, t)| (s as u32, t as u32))
            .unzip()
    }

    /// Size of the largest class among the labelled nodes of a split,
    /// divided by the split size. The accuracy a constant predictor reaches.
    pub fn majority_baseline(&self, split: Split) -> f64 {
        let mut counts = vec![0usize; self.num_classes()];
        let mut total = 0usize;
        for (i, &m) in self.mask(split).iter().enumerate() {
            if m {
                counts[self.labels[i] as usize] += 1;
                total += 1;
            }
        }
        if total == 0 {
            return 0.0;
        }
        counts.into_iter().max().unwrap_or(0) as f64 / total as f64
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data(x=[{}, {}], edge_index=[2, {}], edge_weight=[{}], y=[{}], train_mask=[{}], val_mask=[{}], test_mask=[{}])",
            self.num_nodes(),
            self.num_features,
            self.num_edges(),
            self.edge_weight.len(),
            self.num_nodes(),
            self.split_size(Split::Train),
            self.split_size(Split::Val),
            self.split_size(Split::Test),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masks(n: usize, train: &[usize], val: &[usize], test: &[usize]) -> SplitMasks {
        let mk = |ids: &[usize]| {
            let mut m = vec![false; n];
            for &i in ids {
                m[i] = true;
            }
            m
        };
        SplitMasks {
            train: mk(train),
            val: mk(val),
            test: mk(test),
        }
    }

    fn path_graph() -> Graph {
        Graph::new(
            vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            2,
            vec![(0, 1), (1, 0), (1, 2), (2, 1)],
            vec![0, 1, 1],
            masks(3, &[0], &[1], &[2]),
        )
        .unwrap()
    }

    #[test]
    fn test_new_accepts_valid_graph() {
        let g = path_graph();
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.num_features(), 2);
        assert_eq!(g.num_edges(), 4);
        assert_eq!(g.num_classes(), 2);
        assert_eq!(g.node_features(2), &[1.0, 1.0]);
        assert!(g.edge_weight().iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_new_rejects_out_of_range_edge() {
        let err = Graph::new(vec![0.0; 2], 1, vec![(0, 2)], vec![0, 0], masks(2, &[], &[], &[]))
            .unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_new_rejects_overlapping_masks() {
        let err = Graph::new(vec![0.0; 2], 1, vec![], vec![0, 0], masks(2, &[0], &[0], &[]))
            .unwrap_err();
        assert!(err.to_string().contains("more than one split"));
    }

    #[test]
    fn test_new_rejects_short_mask() {
        let mut m = masks(2, &[0], &[], &[]);
        m.test.pop();
        let err = Graph::new(vec![0.0; 2], 1, vec![], vec![0, 0], m).unwrap_err();
        assert!(err.to_string().contains("test mask"));
    }

    #[test]
    fn test_new_rejects_feature_length_mismatch() {
        let err = Graph::new(vec![0.0; 3], 2, vec![], vec![0, 0], masks(2, &[], &[], &[]))
            .unwrap_err();
        assert!(err.to_string().contains("feature buffer"));
    }

    #[test]
    fn test_construction_errors_are_structural() {
        let err = Graph::new(vec![0.0; 2], 1, vec![(5, 0)], vec![0, 0], masks(2, &[], &[], &[]))
            .unwrap_err();
        // Validation is the only failure mode of this crate.
        let Error::InvalidGraph(msg) = err;
        assert!(msg.starts_with("edge (5, 0)"));
        assert!("bogus".parse::<Split>().is_err());
    }

    #[test]
    fn test_split_indices_and_baseline() {
        let g = Graph::new(
            vec![0.0; 4],
            1,
            vec![],
            vec![0, 1, 1, 1],
            masks(4, &[0, 1, 2], &[3], &[]),
        )
        .unwrap();
        assert_eq!(g.split_indices(Split::Train), vec![0, 1, 2]);
        assert!((g.majority_baseline(Split::Train) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(g.majority_baseline(Split::Test), 0.0);
    }

    #[test]
    fn test_display_matches_pyg_summary() {
        let g = path_graph().gcn_normalized();
        let s = g.to_string();
        assert!(s.starts_with("Data(x=[3, 2], edge_index=[2, 7]"));
        assert!(s.contains("train_mask=[1]"));
    }

    #[test]
    fn test_split_from_str() {
        assert_eq!("VAL".parse::<Split>().unwrap(), Split::Val);
        assert!("dev".parse::<Split>().is_err());
    }
}
