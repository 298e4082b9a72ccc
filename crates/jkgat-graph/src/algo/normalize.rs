//! GCN normalization.
//!
//! The symmetric normalization from Kipf & Welling (2017):
//!
//! ```text
//! A_hat = D^{-1/2} (A + I) D^{-1/2}
//! ```
//!
//! Applied to an edge list rather than a dense matrix: every node gets a
//! self-loop (unless it already has one), node degree is the sum of incoming
//! edge weights, and each edge `(i, j)` is rescaled by
//! `deg(i)^{-1/2} * deg(j)^{-1/2}`.

/// Drop every `(i, i)` edge, keeping the rest in order.
pub fn remove_self_loops(edges: &[(usize, usize)]) -> Vec<(usize, usize)> {
    edges.iter().copied().filter(|&(s, t)| s != t).collect()
}

/// Replace all self-loops by exactly one loop per node, appended after the
/// non-loop edges in node order.
pub fn add_self_loops(edges: &[(usize, usize)], num_nodes: usize) -> Vec<(usize, usize)> {
    let mut out = remove_self_loops(edges);
    out.extend((0..num_nodes).map(|i| (i, i)));
    out
}

/// Like [`add_self_loops`], but a node that already had a loop keeps that
/// loop's weight. New loops get weight `fill`.
pub fn add_remaining_self_loops(
    edges: &[(usize, usize)],
    weights: &[f32],
    num_nodes: usize,
    fill: f32,
) -> (Vec<(usize, usize)>, Vec<f32>) {
    let mut loop_weight = vec![fill; num_nodes];
    let mut out_edges = Vec::with_capacity(edges.len() + num_nodes);
    let mut out_weights = Vec::with_capacity(edges.len() + num_nodes);

    for (&(s, t), &w) in edges.iter().zip(weights) {
        if s == t {
            loop_weight[s] = w;
        } else {
            out_edges.push((s, t));
            out_weights.push(w);
        }
    }
    for (i, w) in loop_weight.into_iter().enumerate() {
        out_edges.push((i, i));
        out_weights.push(w);
    }
    (out_edges, out_weights)
}

/// Symmetric GCN normalization over an edge list.
///
/// Returns the self-loop-augmented edges and their normalized weights.
/// Degrees are summed over targets, matching the `source -> target` message
/// direction. A node with zero degree contributes a factor of zero instead of
/// infinity.
pub fn gcn_norm(
    edges: &[(usize, usize)],
    weights: &[f32],
    num_nodes: usize,
) -> (Vec<(usize, usize)>, Vec<f32>) {
    let (edges, weights) = add_remaining_self_loops(edges, weights, num_nodes, 1.0);

    let mut deg = vec![0.0f32; num_nodes];
    for (&(_, t), &w) in edges.iter().zip(&weights) {
        deg[t] += w;
    }
    let deg_inv_sqrt: Vec<f32> = deg
        .into_iter()
        .map(|d| if d > 0.0 { d.powf(-0.5) } else { 0.0 })
        .collect();

    let weights = edges
        .iter()
        .zip(&weights)
        .map(|(&(s, t), &w)| deg_inv_sqrt[s] * w * deg_inv_sqrt[t])
        .collect();
    (edges, weights)
}
