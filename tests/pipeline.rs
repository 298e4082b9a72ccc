//! Whole-pipeline checks through the facade: load, train, evaluate, project.

use jkgat::nn::{evaluate_all, EmbeddingTable};
use jkgat::prelude::*;

#[test]
fn npz_export_trains_like_in_memory_graph() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("planted.npz");

    let graph = planted_partition(&PlantedPartitionConfig::default()).unwrap();
    write_planetoid_npz(&graph, &path);

    let from_file = Dataset::from_npz(&path, &Device::Cpu).unwrap();
    let in_memory = Dataset::from_graph(graph, &Device::Cpu).unwrap();
    assert_eq!(from_file.graph(), in_memory.graph());

    let config = TrainConfig::jk().with_epochs(15).with_dropout(0.0);
    let a = Trainer::new(config.clone())
        .with_device(Device::Cpu)
        .train(&from_file)
        .unwrap();
    let b = Trainer::new(config)
        .with_device(Device::Cpu)
        .train(&in_memory)
        .unwrap();
    assert_eq!(a.report.loss_history, b.report.loss_history);
}

#[test]
fn train_evaluate_project() {
    let graph = planted_partition(&PlantedPartitionConfig::default()).unwrap();
    let dataset = Dataset::from_graph(graph, &Device::Cpu).unwrap();

    let trained = Trainer::new(TrainConfig::jk_attention().with_n_layers(3).with_epochs(40))
        .with_device(Device::Cpu)
        .train(&dataset)
        .unwrap();
    assert_eq!(trained.report.architecture, Architecture::AttentionJk);

    let acc = evaluate_all(&trained.model, &dataset).unwrap();
    // The returned model is the last-epoch model, not the best one.
    let last = *trained.report.val_history.last().unwrap();
    assert!((acc.val - last).abs() < 1e-12);
    assert!(trained.report.best_val_acc >= last);

    let table = project(&trained.model, &dataset, Split::Test, &Tsne::default().with_n_iter(100)).unwrap();
    assert_eq!(table.len(), 120);

    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("test.csv");
    table.write_csv(&csv).unwrap();
    let back = EmbeddingTable::read_csv(&csv).unwrap();
    assert_eq!(back.len(), table.len());
    assert_eq!(
        back.rows.iter().map(|r| r.label).collect::<Vec<_>>(),
        table.rows.iter().map(|r| r.label).collect::<Vec<_>>()
    );
}

fn write_planetoid_npz(graph: &Graph, path: &std::path::Path) {
    use jkgat::nn::candle_core::Tensor;

    let dev = Device::Cpu;
    let n = graph.num_nodes();
    let x = Tensor::from_slice(graph.features(), (n, graph.num_features()), &dev).unwrap();
    let (src, dst) = graph.edge_index_rows();
    let e = src.len();
    let flat: Vec<i64> = src.into_iter().chain(dst).map(i64::from).collect();
    let edge_index = Tensor::from_vec(flat, (2, e), &dev).unwrap();
    let y: Vec<i64> = graph.labels().iter().map(|&l| i64::from(l)).collect();
    let y = Tensor::from_vec(y, n, &dev).unwrap();
    let mask = |split| {
        let m: Vec<u8> = graph.mask(split).iter().map(|&b| u8::from(b)).collect();
        Tensor::from_vec(m, n, &dev).unwrap()
    };

    Tensor::write_npz(
        &[
            ("x", &x),
            ("edge_index", &edge_index),
            ("y", &y),
            ("train_mask", &mask(Split::Train)),
            ("val_mask", &mask(Split::Val)),
            ("test_mask", &mask(Split::Test)),
        ],
        path,
    )
    .unwrap();
}
