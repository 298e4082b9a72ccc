//! End-to-end training on small graphs.

use candle_core::Device;
use jkgat_graph::synthetic::{planted_partition, PlantedPartitionConfig};
use jkgat_graph::Split;
use jkgat_nn::{evaluate, project, Architecture, Dataset, TrainConfig, Trainer, Tsne};

fn synthetic() -> Dataset {
    let graph = planted_partition(&PlantedPartitionConfig::default()).unwrap();
    Dataset::from_graph(graph, &Device::Cpu).unwrap()
}

#[test]
fn every_architecture_beats_majority_baseline() {
    let ds = synthetic();
    let baseline = ds.graph().majority_baseline(Split::Val);

    for arch in Architecture::ALL {
        let config = TrainConfig::for_architecture(arch)
            .with_epochs(100)
            .with_max_patience(100)
            .with_lr(0.01);
        let trained = Trainer::new(config)
            .with_device(Device::Cpu)
            .train(&ds)
            .unwrap();

        let report = &trained.report;
        assert!(
            report.best_val_acc > baseline + 0.2,
            "{arch}: best {} vs baseline {baseline}",
            report.best_val_acc
        );
        let test_acc = evaluate(&trained.model, &ds, Split::Test).unwrap();
        assert!(test_acc > baseline, "{arch}: test {test_acc}");
    }
}

#[test]
fn deeper_models_train() {
    let ds = synthetic();
    for n_layers in [3, 5] {
        let config = TrainConfig::jk_attention()
            .with_n_layers(n_layers)
            .with_epochs(30);
        let trained = Trainer::new(config)
            .with_device(Device::Cpu)
            .train(&ds)
            .unwrap();
        assert_eq!(trained.report.n_layers, n_layers);
        assert_eq!(trained.model.layer_widths().len(), n_layers);
        assert!(trained.report.stopped_epoch <= 30);
    }
}

#[test]
fn projection_covers_split() {
    let ds = synthetic();
    let trained = Trainer::new(TrainConfig::attention().with_epochs(20))
        .with_device(Device::Cpu)
        .train(&ds)
        .unwrap();

    let table = project(&trained.model, &ds, Split::Val, &Tsne::default().with_n_iter(100)).unwrap();
    assert_eq!(table.len(), ds.graph().split_size(Split::Val));
    assert!(table.rows.iter().all(|r| r.dim1.is_finite() && r.dim2.is_finite()));
}

/// The two-layer GAT run on Cora. Needs a Planetoid export:
/// `JKGAT_CORA_NPZ=cora.npz cargo test -- --ignored`
#[test]
#[ignore]
fn cora_attention_beats_majority_class() {
    let path = std::env::var("JKGAT_CORA_NPZ").expect("set JKGAT_CORA_NPZ to a cora.npz export");
    let ds = Dataset::from_npz(&path, &Device::Cpu).unwrap();
    assert_eq!(ds.num_nodes(), 2708);
    assert_eq!(ds.num_classes(), 7);

    let config = TrainConfig::attention();
    assert_eq!(config.hidden_dim, 8);
    assert_eq!(config.n_heads, 8);
    assert_eq!(config.epochs, 500);
    assert_eq!(config.max_patience, 10);

    let trained = Trainer::new(config).train(&ds).unwrap();
    assert!(
        trained.report.best_val_acc > 0.3,
        "best validation accuracy {}",
        trained.report.best_val_acc
    );
}
