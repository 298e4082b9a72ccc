//! Message-passing convolutional layers.
//!
//! Both layers take node features `(N, in)` and an edge list `(2, E)` of
//! `u32` `[source; target]` rows; messages flow from source to target and are
//! summed at the target.
//!
//! - [`GraphConv`]: Weisfeiler-Leman style convolution (Morris et al., 2019)
//! - [`GATConv`]: Graph Attention Network (Velickovic et al., 2018)
//!
//! ```text
//! h_i^{(l+1)} = UPDATE(h_i^{(l)}, AGGREGATE({MESSAGE(h_j^{(l)}) : j in N(i)}))
//! ```
//!
//! Aggregation is a scatter-add (`index_add`) over the target row, so the
//! cost is O(E) per layer with no dense adjacency.

use candle_core::{Device, Result, Tensor, D};
use candle_nn::{linear_no_bias, Init, Linear, Module, VarBuilder};
use jkgat_graph::algo::normalize::add_self_loops;

/// Sum the rows of `src` into `num_nodes` buckets chosen by `index`.
///
/// `src` has shape `(E, ...)`, `index` is `(E,)` u32; the result has shape
/// `(num_nodes, ...)`.
pub fn scatter_add(src: &Tensor, index: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let mut shape = src.dims().to_vec();
    shape[0] = num_nodes;
    Tensor::zeros(shape, src.dtype(), src.device())?.index_add(index, src, 0)
}

/// Softmax over the entries of `scores` that share a bucket in `index`.
///
/// `scores` is `(E, H)`. Each column is normalized independently within each
/// bucket. The per-bucket maximum is subtracted first; it is read back as a
/// constant, which leaves the gradient unchanged since softmax is
/// shift-invariant.
pub fn segment_softmax(scores: &Tensor, index: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let (_, heads) = scores.dims2()?;
    let host = scores.to_vec2::<f32>()?;
    let idx = index.to_vec1::<u32>()?;

    let mut max = vec![f32::NEG_INFINITY; num_nodes * heads];
    for (row, &node) in host.iter().zip(&idx) {
        for (h, &v) in row.iter().enumerate() {
            let slot = &mut max[node as usize * heads + h];
            if v > *slot {
                *slot = v;
            }
        }
    }
    for m in &mut max {
        if !m.is_finite() {
            *m = 0.0;
        }
    }
    let max = Tensor::from_vec(max, (num_nodes, heads), scores.device())?;

    let exp = scores.sub(&max.index_select(index, 0)?)?.exp()?;
    let denom = scatter_add(&exp, index, num_nodes)?;
    let denom = (denom.index_select(index, 0)? + 1e-16)?;
    exp.div(&denom)
}

/// Rebuild an edge list with exactly one self-loop per node.
pub fn with_self_loops(edge_index: &Tensor, num_nodes: usize) -> Result<Tensor> {
    let rows = edge_index.to_vec2::<u32>()?;
    let edges: Vec<(usize, usize)> = rows[0]
        .iter()
        .zip(&rows[1])
        .map(|(&s, &t)| (s as usize, t as usize))
        .collect();
    edge_index_tensor(&add_self_loops(&edges, num_nodes), edge_index.device())
}

/// Pack `(source, target)` pairs into a `(2, E)` u32 tensor.
pub fn edge_index_tensor(edges: &[(usize, usize)], device: &Device) -> Result<Tensor> {
    let e = edges.len();
    let mut flat: Vec<u32> = edges.iter().map(|&(s, _)| s as u32).collect();
    flat.extend(edges.iter().map(|&(_, t)| t as u32));
    Tensor::from_vec(flat, (2, e), device)
}

/// Graph convolution with separate root and neighbour weights.
///
/// Implements: h_i' = W_root h_i + W_rel * sum_{j -> i} h_j + b
///
/// Neighbours are summed without edge weights. The projection by `W_rel` is
/// applied before aggregation, which gives the same result because the sum
/// and the linear map commute, and moves `E x in` work to `E x out`.
///
/// # Reference
///
/// Morris et al., "Weisfeiler and Leman Go Neural: Higher-order Graph Neural
/// Networks", AAAI 2019.
#[derive(Debug, Clone)]
pub struct GraphConv {
    lin_rel: Linear,
    lin_root: Linear,
    bias: Tensor,
}

impl GraphConv {
    /// Create a new GraphConv layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension
    /// - `vb`: Variable builder
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let lin_rel = linear_no_bias(in_features, out_features, vb.pp("lin_rel"))?;
        let lin_root = linear_no_bias(in_features, out_features, vb.pp("lin_root"))?;
        let bias = vb
            .pp("lin_rel")
            .get_with_hints(out_features, "bias", Init::Const(0.0))?;
        Ok(Self {
            lin_rel,
            lin_root,
            bias,
        })
    }

    pub fn out_features(&self) -> usize {
        self.bias.elem_count()
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `edge_index`: Edge list (2 x E), u32
    ///
    /// # Returns
    /// - Node embeddings (N x out_features)
    pub fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;
        let src = edge_index.get(0)?.contiguous()?;
        let dst = edge_index.get(1)?.contiguous()?;

        let h_rel = self.lin_rel.forward(x)?;
        let agg = scatter_add(&h_rel.index_select(&src, 0)?, &dst, n)?;
        let h_root = self.lin_root.forward(x)?;

        (agg + h_root)?.broadcast_add(&self.bias)
    }
}

/// Attention coefficients of one GAT forward pass.
#[derive(Debug, Clone)]
pub struct AttentionWeights {
    /// Edges the coefficients belong to (2 x E'), self-loops included.
    pub edge_index: Tensor,
    /// Softmax-normalized coefficient per edge and head (E' x heads), as
    /// used for aggregation: attention dropout is already applied in training.
    pub alpha: Tensor,
}

/// Graph Attention Network layer.
///
/// Implements attention-weighted aggregation:
/// h_i' = ||_k sum_{j in N(i) + i} alpha_{ij}^k W^k h_j
///
/// Where alpha_{ij} = softmax_j(LeakyReLU(a_src^T W h_j + a_dst^T W h_i))
///
/// Heads are concatenated (`concat = true`) or averaged. Self-loops are
/// replaced by exactly one loop per node before attention is computed.
///
/// # Reference
///
/// Velickovic et al., "Graph Attention Networks", ICLR 2018.
#[derive(Debug, Clone)]
pub struct GATConv {
    linear: Linear,
    att_src: Tensor, // Attention vector for source nodes
    att_dst: Tensor, // Attention vector for destination nodes
    bias: Tensor,
    num_heads: usize,
    out_per_head: usize,
    concat: bool,
    negative_slope: f64,
    dropout: f32,
}

impl GATConv {
    /// Create a new GAT layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension per head
    /// - `num_heads`: Number of attention heads
    /// - `concat`: Concatenate heads (true) or average them (false)
    /// - `dropout`: Dropout probability on attention coefficients
    /// - `vb`: Variable builder
    pub fn new(
        in_features: usize,
        out_features: usize,
        num_heads: usize,
        concat: bool,
        dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = linear_no_bias(in_features, out_features * num_heads, vb.pp("lin"))?;

        let att_src = vb.get_with_hints(
            (1, num_heads, out_features),
            "att_src",
            candle_nn::init::DEFAULT_KAIMING_UNIFORM,
        )?;
        let att_dst = vb.get_with_hints(
            (1, num_heads, out_features),
            "att_dst",
            candle_nn::init::DEFAULT_KAIMING_UNIFORM,
        )?;

        let bias_dim = if concat {
            out_features * num_heads
        } else {
            out_features
        };
        let bias = vb.get_with_hints(bias_dim, "bias", Init::Const(0.0))?;

        Ok(Self {
            linear,
            att_src,
            att_dst,
            bias,
            num_heads,
            out_per_head: out_features,
            concat,
            negative_slope: 0.2,
            dropout,
        })
    }

    /// Width of the layer output: `heads * out` when concatenating, else `out`.
    pub fn out_features(&self) -> usize {
        self.bias.elem_count()
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Forward pass.
    pub fn forward_t(&self, x: &Tensor, edge_index: &Tensor, train: bool) -> Result<Tensor> {
        Ok(self.forward_with_attention(x, edge_index, train)?.0)
    }

    /// Forward pass that also returns the attention coefficients.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `edge_index`: Edge list (2 x E), u32
    /// - `train`: Enables dropout on the attention coefficients
    ///
    /// # Returns
    /// - Node embeddings (N x out_features())
    /// - The coefficients and the self-loop-augmented edges they index
    pub fn forward_with_attention(
        &self,
        x: &Tensor,
        edge_index: &Tensor,
        train: bool,
    ) -> Result<(Tensor, AttentionWeights)> {
        let n = x.dim(0)?;
        let edge_index = with_self_loops(edge_index, n)?;
        let src = edge_index.get(0)?.contiguous()?;
        let dst = edge_index.get(1)?.contiguous()?;

        // Linear projection: (N, in) -> (N, heads, out)
        let h = self
            .linear
            .forward(x)?
            .reshape((n, self.num_heads, self.out_per_head))?;

        // alpha_src = (h * att_src).sum(-1)  -> (N, heads)
        let alpha_src = h.broadcast_mul(&self.att_src)?.sum(D::Minus1)?;
        let alpha_dst = h.broadcast_mul(&self.att_dst)?.sum(D::Minus1)?;

        // e_ij = LeakyReLU(alpha_src[j] + alpha_dst[i]) for each edge j -> i
        let e = (alpha_src.index_select(&src, 0)? + alpha_dst.index_select(&dst, 0)?)?;
        let e = e.maximum(&e.affine(self.negative_slope, 0.0)?)?;

        let alpha = segment_softmax(&e, &dst, n)?;
        let alpha = if train && self.dropout > 0.0 {
            candle_nn::ops::dropout(&alpha, self.dropout)?
        } else {
            alpha
        };

        // (E, heads, out) messages weighted per head
        let messages = h
            .index_select(&src, 0)?
            .broadcast_mul(&alpha.unsqueeze(D::Minus1)?)?;
        let out = scatter_add(&messages, &dst, n)?;

        let out = if self.concat {
            out.reshape((n, self.num_heads * self.out_per_head))?
        } else {
            out.mean(1)?
        };
        let out = out.broadcast_add(&self.bias)?;

        Ok((out, AttentionWeights { edge_index, alpha }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn star_edges(device: &Device) -> Tensor {
        // 1 -> 0, 2 -> 0, 3 -> 0, 0 -> 1
        edge_index_tensor(&[(1, 0), (2, 0), (3, 0), (0, 1)], device).unwrap()
    }

    #[test]
    fn test_graph_conv_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let conv = GraphConv::new(16, 8, vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (4, 16), &device).unwrap();
        let out = conv.forward(&x, &star_edges(&device)).unwrap();
        assert_eq!(out.dims(), &[4, 8]);
        assert_eq!(conv.out_features(), 8);
    }

    #[test]
    fn test_graph_conv_matches_dense_formula() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let conv = GraphConv::new(3, 2, vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (4, 3), &device).unwrap();
        let out = conv.forward(&x, &star_edges(&device)).unwrap();

        // Dense adjacency A[target, source]
        let adj = Tensor::new(
            &[
                [0f32, 1., 1., 1.],
                [1., 0., 0., 0.],
                [0., 0., 0., 0.],
                [0., 0., 0., 0.],
            ],
            &device,
        )
        .unwrap();
        let expected = (conv.lin_rel.forward(&adj.matmul(&x).unwrap()).unwrap()
            + conv.lin_root.forward(&x).unwrap())
        .unwrap()
        .broadcast_add(&conv.bias)
        .unwrap();

        let diff = (out - expected)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(diff < 1e-5, "max diff {diff}");
    }

    #[test]
    fn test_gat_forward_shape_concat() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gat = GATConv::new(16, 8, 4, true, 0.0, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (4, 16), &device).unwrap();

        let out = gat.forward_t(&x, &star_edges(&device), false).unwrap();
        assert_eq!(out.dims(), &[4, 32]);
    }

    #[test]
    fn test_gat_forward_shape_mean() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gat = GATConv::new(16, 8, 4, false, 0.0, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (4, 16), &device).unwrap();

        let out = gat.forward_t(&x, &star_edges(&device), false).unwrap();
        assert_eq!(out.dims(), &[4, 8]);
    }

    #[test]
    fn test_gat_attention_sums_to_one_per_target() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gat = GATConv::new(5, 3, 2, true, 0.6, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (4, 5), &device).unwrap();

        let (_, att) = gat
            .forward_with_attention(&x, &star_edges(&device), false)
            .unwrap();
        // 4 edges + 4 self-loops
        assert_eq!(att.edge_index.dims(), &[2, 8]);
        assert_eq!(att.alpha.dims(), &[8, 2]);

        let dst = att.edge_index.get(1).unwrap();
        let per_node = scatter_add(&att.alpha, &dst, 4).unwrap().to_vec2::<f32>().unwrap();
        for row in per_node {
            for v in row {
                assert!((v - 1.0).abs() < 1e-5, "attention mass {v}");
            }
        }
    }

    #[test]
    fn test_gat_training_attention_is_post_dropout() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gat = GATConv::new(5, 3, 2, true, 0.5, vb).unwrap();
        let n = 40;
        let ring: Vec<(usize, usize)> = (0..n).flat_map(|i| [(i, (i + 1) % n), ((i + 1) % n, i)]).collect();
        let ei = edge_index_tensor(&ring, &device).unwrap();
        let x = Tensor::randn(0f32, 1f32, (n, 5), &device).unwrap();

        let (_, eval) = gat.forward_with_attention(&x, &ei, false).unwrap();
        let (_, train) = gat.forward_with_attention(&x, &ei, true).unwrap();
        let eval = eval.alpha.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let train = train.alpha.flatten_all().unwrap().to_vec1::<f32>().unwrap();

        // 240 coefficients at p = 0.5: some dropped, survivors rescaled by 2
        assert!(train.iter().any(|&a| a == 0.0));
        for (t, e) in train.iter().zip(&eval) {
            assert!(*t == 0.0 || (t - 2.0 * e).abs() < 1e-5, "{t} vs {e}");
        }
    }

    #[test]
    fn test_segment_softmax_single_bucket() {
        let device = Device::Cpu;
        let scores = Tensor::new(&[[0f32], [0.], [100.]], &device).unwrap();
        let index = Tensor::new(&[0u32, 0, 1], &device).unwrap();
        let out = segment_softmax(&scores, &index, 2).unwrap().to_vec2::<f32>().unwrap();
        assert!((out[0][0] - 0.5).abs() < 1e-6);
        assert!((out[1][0] - 0.5).abs() < 1e-6);
        assert!((out[2][0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_with_self_loops_deduplicates() {
        let device = Device::Cpu;
        let ei = edge_index_tensor(&[(0, 0), (0, 1)], &device).unwrap();
        let out = with_self_loops(&ei, 2).unwrap().to_vec2::<u32>().unwrap();
        assert_eq!(out, vec![vec![0, 0, 1], vec![1, 0, 1]]);
    }
}
