//! Structural statistics.
//!
//! Reported next to the dataset summary so a reader can sanity-check what was
//! loaded (Cora: 2708 nodes, 78 weakly connected components).

use crate::Graph;
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

/// Degree and connectivity summary of a [`Graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub num_self_loops: usize,
    /// Nodes without any non-loop edge in either direction.
    pub num_isolated: usize,
    /// Weakly connected components (edges treated as undirected).
    pub num_components: usize,
    /// Mean number of incoming non-loop edges.
    pub avg_in_degree: f64,
    pub max_in_degree: usize,
}

impl GraphStats {
    pub fn compute(graph: &Graph) -> Self {
        let n = graph.num_nodes();
        let mut in_degree = vec![0usize; n];
        let mut touched = vec![false; n];
        let mut num_self_loops = 0;

        let mut ug: UnGraph<(), ()> = UnGraph::with_capacity(n, graph.num_edges());
        for _ in 0..n {
            ug.add_node(());
        }
        for &(s, t) in graph.edges() {
            if s == t {
                num_self_loops += 1;
                continue;
            }
            in_degree[t] += 1;
            touched[s] = true;
            touched[t] = true;
            ug.add_edge(NodeIndex::new(s), NodeIndex::new(t), ());
        }

        let non_loop = graph.num_edges() - num_self_loops;
        Self {
            num_nodes: n,
            num_edges: graph.num_edges(),
            num_self_loops,
            num_isolated: touched.iter().filter(|&&t| !t).count(),
            num_components: connected_components(&ug),
            avg_in_degree: if n == 0 { 0.0 } else { non_loop as f64 / n as f64 },
            max_in_degree: in_degree.into_iter().max().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SplitMasks;

    #[test]
    fn test_stats_two_components() {
        let n = 5;
        let masks = SplitMasks {
            train: vec![false; n],
            val: vec![false; n],
            test: vec![false; n],
        };
        // 0 <-> 1, 2 -> 3, node 4 isolated
        let g = Graph::new(vec![0.0; n], 1, vec![(0, 1), (1, 0), (2, 3)], vec![0; n], masks)
            .unwrap()
            .gcn_normalized();
        let stats = GraphStats::compute(&g);
        assert_eq!(stats.num_nodes, 5);
        assert_eq!(stats.num_self_loops, 5);
        assert_eq!(stats.num_isolated, 1);
        assert_eq!(stats.num_components, 3);
        assert_eq!(stats.max_in_degree, 1);
        assert!((stats.avg_in_degree - 0.6).abs() < 1e-12);
    }
}
