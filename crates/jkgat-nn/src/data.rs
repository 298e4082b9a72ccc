//! Dataset loading and the device-side graph context.
//!
//! A [`Dataset`] is the context object every stage of a run shares: the
//! immutable host [`Graph`] plus the same data materialized as tensors on one
//! device. It is built once, with GCN normalization applied at load time, and
//! passed by reference to the trainer, the evaluator and the embedding
//! projection.
//!
//! # Archive format
//!
//! [`Dataset::from_npz`] reads a Planetoid split exported to `.npz`:
//!
//! | Array | dtype | Shape |
//! |-------|-------|-------|
//! | `x` | float32 | N x F |
//! | `edge_index` | int64 | 2 x E |
//! | `y` | int64 | N |
//! | `train_mask`, `val_mask`, `test_mask` | bool or uint8 | N |
//!
//! Exporting Cora from PyTorch Geometric:
//!
//! ```python,ignore
//! from torch_geometric.datasets import Planetoid
//! import numpy as np
//!
//! d = Planetoid(root=".", name="Cora", split="public")[0]
//! np.savez("cora.npz", x=d.x.numpy(), edge_index=d.edge_index.numpy(),
//!          y=d.y.numpy(), train_mask=d.train_mask.numpy().astype("uint8"),
//!          val_mask=d.val_mask.numpy().astype("uint8"),
//!          test_mask=d.test_mask.numpy().astype("uint8"))
//! ```

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use jkgat_graph::{Graph, GraphStats, Split, SplitMasks};

use crate::error::{Error, Result};

/// A normalized graph together with its tensors on one device.
#[derive(Debug, Clone)]
pub struct Dataset {
    graph: Graph,
    device: Device,
    x: Tensor,
    edge_index: Tensor,
    edge_weight: Tensor,
    y: Tensor,
    train_idx: Tensor,
    val_idx: Tensor,
    test_idx: Tensor,
}

impl Dataset {
    /// Normalize a raw graph and upload it to `device`.
    pub fn from_graph(raw: Graph, device: &Device) -> Result<Self> {
        Self::upload(raw.gcn_normalized(), device)
    }

    /// Load a Planetoid `.npz` export (see the module docs for the layout).
    pub fn from_npz(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let arrays: HashMap<String, Tensor> = Tensor::read_npz(path.as_ref())?.into_iter().collect();
        let get = |name: &str| {
            arrays
                .get(name)
                .ok_or_else(|| Error::Dataset(format!("archive has no `{name}` array")))
        };

        let x = get("x")?.to_dtype(DType::F32)?;
        let (n, f) = x.dims2()?;
        let features = x.flatten_all()?.to_vec1::<f32>()?;

        let edge_index = get("edge_index")?.to_dtype(DType::I64)?;
        let (rows, _) = edge_index.dims2()?;
        if rows != 2 {
            return Err(Error::Dataset(format!(
                "edge_index must have 2 rows, found {rows}"
            )));
        }
        let ei = edge_index.to_vec2::<i64>()?;
        let edges = ei[0]
            .iter()
            .zip(&ei[1])
            .map(|(&s, &t)| Ok((to_index(s, "edge_index")?, to_index(t, "edge_index")?)))
            .collect::<Result<Vec<_>>>()?;

        let labels = get("y")?
            .to_dtype(DType::I64)?
            .to_vec1::<i64>()?
            .into_iter()
            .map(|l| to_index(l, "y").map(|v| v as u32))
            .collect::<Result<Vec<_>>>()?;
        if labels.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                got: labels.len(),
            });
        }

        let mask = |name: &str| -> Result<Vec<bool>> {
            Ok(get(name)?
                .to_dtype(DType::U8)?
                .to_vec1::<u8>()?
                .into_iter()
                .map(|v| v != 0)
                .collect())
        };
        let masks = SplitMasks {
            train: mask("train_mask")?,
            val: mask("val_mask")?,
            test: mask("test_mask")?,
        };

        let raw = Graph::new(features, f, edges, labels, masks)?;
        Self::from_graph(raw, device)
    }

    fn upload(graph: Graph, device: &Device) -> Result<Self> {
        let n = graph.num_nodes();
        let x = Tensor::from_slice(graph.features(), (n, graph.num_features()), device)?;

        let (src, dst) = graph.edge_index_rows();
        let e = src.len();
        let mut flat = src;
        flat.extend(dst);
        let edge_index = Tensor::from_vec(flat, (2, e), device)?;
        let edge_weight = Tensor::from_slice(graph.edge_weight(), e, device)?;

        let y = Tensor::from_slice(graph.labels(), n, device)?;
        let index = |split: Split| {
            let ids = graph.split_indices(split);
            let len = ids.len();
            Tensor::from_vec(ids, len, device)
        };

        Ok(Self {
            train_idx: index(Split::Train)?,
            val_idx: index(Split::Val)?,
            test_idx: index(Split::Test)?,
            x,
            edge_index,
            edge_weight,
            y,
            device: device.clone(),
            graph,
        })
    }

    /// The same dataset with every tensor on `device`.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        if self.device.same_device(device) {
            return Ok(self.clone());
        }
        Ok(Self {
            graph: self.graph.clone(),
            device: device.clone(),
            x: self.x.to_device(device)?,
            edge_index: self.edge_index.to_device(device)?,
            edge_weight: self.edge_weight.to_device(device)?,
            y: self.y.to_device(device)?,
            train_idx: self.train_idx.to_device(device)?,
            val_idx: self.val_idx.to_device(device)?,
            test_idx: self.test_idx.to_device(device)?,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Node features, `(N, F)` f32.
    pub fn x(&self) -> &Tensor {
        &self.x
    }

    /// `[source; target]` rows, `(2, E)` u32, self-loops included.
    pub fn edge_index(&self) -> &Tensor {
        &self.edge_index
    }

    /// GCN-normalized weight per edge, `(E,)` f32.
    pub fn edge_weight(&self) -> &Tensor {
        &self.edge_weight
    }

    /// Labels, `(N,)` u32.
    pub fn y(&self) -> &Tensor {
        &self.y
    }

    /// Node ids of a split as a `u32` index tensor.
    pub fn split_index(&self, split: Split) -> &Tensor {
        match split {
            Split::Train => &self.train_idx,
            Split::Val => &self.val_idx,
            Split::Test => &self.test_idx,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }

    pub fn num_features(&self) -> usize {
        self.graph.num_features()
    }

    pub fn num_classes(&self) -> usize {
        self.graph.num_classes()
    }

    /// One-line description in the PyG `Data(...)` style.
    pub fn summary(&self) -> String {
        self.graph.to_string()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats::compute(&self.graph)
    }
}

fn to_index(v: i64, array: &str) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::Dataset(format!("negative value {v} in `{array}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jkgat_graph::synthetic::{planted_partition, PlantedPartitionConfig};

    fn tiny_graph() -> Graph {
        let masks = SplitMasks {
            train: vec![true, false, false],
            val: vec![false, true, false],
            test: vec![false, false, true],
        };
        Graph::new(
            vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            2,
            vec![(0, 1), (1, 2)],
            vec![0, 1, 1],
            masks,
        )
        .unwrap()
    }

    #[test]
    fn test_from_graph_normalizes_and_uploads() {
        let ds = Dataset::from_graph(tiny_graph(), &Device::Cpu).unwrap();
        assert_eq!(ds.x().dims(), &[3, 2]);
        // 2 edges + 3 self-loops
        assert_eq!(ds.edge_index().dims(), &[2, 5]);
        assert_eq!(ds.edge_index().dtype(), DType::U32);
        assert_eq!(ds.edge_weight().dims(), &[5]);
        assert_eq!(ds.y().to_vec1::<u32>().unwrap(), vec![0, 1, 1]);
        assert_eq!(ds.split_index(Split::Val).to_vec1::<u32>().unwrap(), vec![1]);
        assert_eq!(ds.num_classes(), 2);
    }

    #[test]
    fn test_npz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.npz");
        let dev = Device::Cpu;

        let x = Tensor::new(&[[1f32, 0.], [0., 1.], [1., 1.]], &dev).unwrap();
        let ei = Tensor::new(&[[0i64, 1], [1, 2]], &dev).unwrap();
        let y = Tensor::new(&[0i64, 1, 1], &dev).unwrap();
        let train = Tensor::new(&[1u8, 0, 0], &dev).unwrap();
        let val = Tensor::new(&[0u8, 1, 0], &dev).unwrap();
        let test = Tensor::new(&[0u8, 0, 1], &dev).unwrap();
        Tensor::write_npz(
            &[
                ("x", &x),
                ("edge_index", &ei),
                ("y", &y),
                ("train_mask", &train),
                ("val_mask", &val),
                ("test_mask", &test),
            ],
            &path,
        )
        .unwrap();

        let loaded = Dataset::from_npz(&path, &dev).unwrap();
        let direct = Dataset::from_graph(tiny_graph(), &dev).unwrap();
        assert_eq!(loaded.graph(), direct.graph());
    }

    #[test]
    fn test_npz_missing_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.npz");
        let x = Tensor::new(&[[1f32]], &Device::Cpu).unwrap();
        Tensor::write_npz(&[("x", &x)], &path).unwrap();

        let err = Dataset::from_npz(&path, &Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("edge_index"));
    }

    #[test]
    fn test_summary_and_stats() {
        let g = planted_partition(&PlantedPartitionConfig::default()).unwrap();
        let ds = Dataset::from_graph(g, &Device::Cpu).unwrap();
        assert!(ds.summary().starts_with("Data(x=[300, 48]"));
        assert_eq!(ds.stats().num_self_loops, 300);
    }
}
