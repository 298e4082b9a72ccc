//! JKGAT CLI - node classification experiments from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Describe a Planetoid export
//! jkgat summary cora.npz
//!
//! # Train one model (two-layer GAT)
//! jkgat train cora.npz --attention --layers 2
//!
//! # All four variants at depths 2 to 5
//! jkgat sweep cora.npz --min-layers 2 --max-layers 5
//!
//! # Train, project the validation nodes with t-SNE, save the table
//! jkgat embed cora.npz --attention --jk --layers 3 --split val -o jk_a.csv
//!
//! # Any subcommand runs offline on a planted-partition graph
//! jkgat train --synthetic --attention --epochs 50
//!
//! # Flat key-value overrides, applied last
//! jkgat train cora.npz --set n_layers=4 --set jk_mode=\"max\"
//! ```
//!
//! Set `RUST_LOG=debug` for per-epoch loss and validation accuracy.

use anyhow::{bail, Context, Result};
use candle_core::Device;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use jkgat_graph::synthetic::{planted_partition, PlantedPartitionConfig};
use jkgat_graph::Split;
use jkgat_nn::{
    evaluate_all, project, sweep, Dataset, JKMode, TrainConfig, TrainedModel, Trainer, Tsne,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jkgat")]
#[command(about = "Attention and jumping-knowledge GNNs for node classification", long_about = None)]
struct Cli {
    /// Run on the CPU even when a CUDA device is available
    #[arg(long, global = true)]
    cpu: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the dataset summary and graph statistics
    Summary {
        #[command(flatten)]
        source: DataSource,
    },

    /// Train one model and report validation and test accuracy
    Train {
        #[command(flatten)]
        source: DataSource,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Train all four architectures at every depth in a range
    Sweep {
        #[command(flatten)]
        source: DataSource,

        #[command(flatten)]
        run: RunArgs,

        /// Smallest depth
        #[arg(long, default_value = "2")]
        min_layers: usize,

        /// Largest depth
        #[arg(long, default_value = "5")]
        max_layers: usize,
    },

    /// Train one model and project a split's outputs to 2-D with t-SNE
    Embed {
        #[command(flatten)]
        source: DataSource,

        #[command(flatten)]
        run: RunArgs,

        /// Nodes to project (train, val or test)
        #[arg(long, default_value = "val")]
        split: Split,

        /// Write the `dimension 1,dimension 2,labels` table here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// t-SNE perplexity
        #[arg(long, default_value = "30")]
        perplexity: f64,

        /// t-SNE iterations
        #[arg(long, default_value = "1000")]
        tsne_iter: usize,

        /// Scatter plot width in characters
        #[arg(long, default_value = "72")]
        width: usize,

        /// Scatter plot height in characters
        #[arg(long, default_value = "28")]
        height: usize,
    },
}

#[derive(Args)]
struct DataSource {
    /// Planetoid `.npz` export (x, edge_index, y, train/val/test masks)
    #[arg(required_unless_present = "synthetic")]
    input: Option<PathBuf>,

    /// Use a seeded planted-partition graph instead of a file
    #[arg(long, conflicts_with = "input")]
    synthetic: bool,

    /// Seed for the planted-partition graph
    #[arg(long, default_value = "123", requires = "synthetic")]
    graph_seed: u64,
}

#[derive(Args)]
struct RunArgs {
    /// Use GAT layers instead of GraphConv
    #[arg(long)]
    attention: bool,

    /// Add a Jumping Knowledge head
    #[arg(long)]
    jk: bool,

    /// Number of graph convolutions
    #[arg(long, default_value = "2")]
    layers: usize,

    /// Hidden width per head
    #[arg(long, default_value = "8")]
    hidden_dim: usize,

    /// Attention heads
    #[arg(long, default_value = "8")]
    heads: usize,

    /// Dropout probability
    #[arg(long, default_value = "0.6")]
    dropout: f32,

    /// Learning rate
    #[arg(long, default_value = "0.005")]
    lr: f64,

    /// L2 penalty
    #[arg(long, default_value = "0.0005")]
    weight_decay: f64,

    /// Epoch budget
    #[arg(long, default_value = "500")]
    epochs: usize,

    /// Early stopping window
    #[arg(long, default_value = "10")]
    patience: usize,

    /// Jumping Knowledge mode (lstm, max, mean)
    #[arg(long, default_value = "lstm")]
    jk_mode: JKMode,

    /// Tie all hidden layers to one parameter set
    #[arg(long)]
    share_hidden_weights: bool,

    /// Model family
    #[arg(long, default_value = "JKGAT")]
    model_name: String,

    /// Seed for parameter initialization
    #[arg(long, default_value = "123")]
    seed: u64,

    /// Override any configuration key, as key=value with a JSON value
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

impl RunArgs {
    fn to_config(&self) -> Result<TrainConfig> {
        let mut config = TrainConfig {
            hidden_dim: self.hidden_dim,
            n_layers: self.layers,
            n_heads: self.heads,
            dropout: self.dropout,
            attention: self.attention,
            jk: self.jk,
            lr: self.lr,
            weight_decay: self.weight_decay,
            epochs: self.epochs,
            max_patience: self.patience,
            model_name: self.model_name.clone(),
            seed: self.seed,
            jk_mode: self.jk_mode,
            share_hidden_weights: self.share_hidden_weights,
        };

        if !self.overrides.is_empty() {
            let mut map = config.to_map()?;
            for entry in &self.overrides {
                let (key, raw) = entry
                    .split_once('=')
                    .with_context(|| format!("Override `{entry}` is not KEY=VALUE"))?;
                // Bare words are taken as strings
                let value = serde_json::from_str(raw)
                    .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
                map.insert(key.trim().to_string(), value);
            }
            config = TrainConfig::from_map(map).context("Invalid --set override")?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let device = if cli.cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available(0)?
    };

    match cli.command {
        Commands::Summary { source } => cmd_summary(&source),
        Commands::Train { source, run } => cmd_train(&source, &run, &device),
        Commands::Sweep {
            source,
            run,
            min_layers,
            max_layers,
        } => cmd_sweep(&source, &run, min_layers, max_layers, &device),
        Commands::Embed {
            source,
            run,
            split,
            output,
            perplexity,
            tsne_iter,
            width,
            height,
        } => {
            let tsne = Tsne::default()
                .with_perplexity(perplexity)
                .with_n_iter(tsne_iter);
            cmd_embed(
                &source,
                &run,
                &device,
                split,
                output.as_ref(),
                &tsne,
                (width, height),
            )
        }
    }
}

fn load_dataset(source: &DataSource) -> Result<Dataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();

    let dataset = match (&source.input, source.synthetic) {
        (_, true) => {
            pb.set_message("Generating planted-partition graph...");
            let config = PlantedPartitionConfig {
                seed: source.graph_seed,
                ..Default::default()
            };
            let graph = planted_partition(&config)?;
            Dataset::from_graph(graph, &Device::Cpu)?
        }
        (Some(path), false) => {
            pb.set_message(format!("Loading {}...", path.display()));
            Dataset::from_npz(path, &Device::Cpu)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        (None, false) => bail!("Pass a dataset file or --synthetic"),
    };

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    println!("{}", dataset.summary());
    Ok(dataset)
}

fn train_one(dataset: &Dataset, config: TrainConfig, device: &Device) -> Result<TrainedModel> {
    info!(architecture = %config.architecture(), n_layers = config.n_layers, "training");
    let pb = ProgressBar::new(config.epochs as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} epochs {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let trained = Trainer::new(config)
        .with_device(device.clone())
        .train_with_callback(dataset, |stats| {
            pb.set_position(stats.epoch as u64);
            pb.set_message(format!("loss {:.4} val {:.4}", stats.loss, stats.val_acc));
        })?;

    pb.finish_and_clear();
    Ok(trained)
}

fn cmd_summary(source: &DataSource) -> Result<()> {
    let dataset = load_dataset(source)?;
    let graph = dataset.graph();
    let stats = dataset.stats();

    println!();
    println!("Graph Statistics");
    println!("================");
    println!("Nodes:          {}", stats.num_nodes);
    println!("Edges:          {}", stats.num_edges);
    println!("Self loops:     {}", stats.num_self_loops);
    println!("Isolated nodes: {}", stats.num_isolated);
    println!("Components:     {}", stats.num_components);
    println!("Avg in-degree:  {:.2}", stats.avg_in_degree);
    println!("Max in-degree:  {}", stats.max_in_degree);
    println!("Features:       {}", dataset.num_features());
    println!("Classes:        {}", dataset.num_classes());
    for split in Split::ALL {
        println!(
            "{:<15} {} nodes (majority baseline {:.3})",
            format!("{}:", split),
            graph.split_size(split),
            graph.majority_baseline(split)
        );
    }
    Ok(())
}

fn cmd_train(source: &DataSource, run: &RunArgs, device: &Device) -> Result<()> {
    let dataset = load_dataset(source)?;
    let config = run.to_config()?;
    let trained = train_one(&dataset, config, device)?;

    let acc = evaluate_all(&trained.model, &dataset.to_device(trained.model.device())?)?;
    println!("Early stopped at epoch {}", trained.report.stopped_epoch);
    println!("Best validation accuracy: {:.4}", trained.report.best_val_acc);
    println!("Test accuracy: {:.4}", acc.test);
    Ok(())
}

fn cmd_sweep(
    source: &DataSource,
    run: &RunArgs,
    min_layers: usize,
    max_layers: usize,
    device: &Device,
) -> Result<()> {
    if min_layers < 2 || max_layers < min_layers {
        bail!("Depth range must satisfy 2 <= min-layers <= max-layers");
    }
    let dataset = load_dataset(source)?;
    let base = run.to_config()?;

    let total = (max_layers - min_layers + 1) * 4;
    let pb = ProgressBar::new(total as u64);
    let start = Instant::now();
    let rows = sweep(&dataset, &base, min_layers..=max_layers, Some(device), |row| {
        pb.inc(1);
        pb.set_message(format!(
            "{} x{} val {:.4}",
            row.report.architecture, row.report.n_layers, row.report.best_val_acc
        ));
    })?;
    pb.finish_and_clear();

    println!();
    println!(
        "{:<8} {:<6} {:>8} {:>10} {:>10}",
        "layers", "model", "epochs", "best val", "test"
    );
    for row in &rows {
        println!(
            "{:<8} {:<6} {:>8} {:>10.4} {:>10.4}",
            row.report.n_layers,
            row.report.architecture.to_string(),
            row.report.stopped_epoch,
            row.report.best_val_acc,
            row.test_acc
        );
    }
    println!("{} runs in {:.2?}", rows.len(), start.elapsed());
    Ok(())
}

fn cmd_embed(
    source: &DataSource,
    run: &RunArgs,
    device: &Device,
    split: Split,
    output: Option<&PathBuf>,
    tsne: &Tsne,
    (width, height): (usize, usize),
) -> Result<()> {
    let dataset = load_dataset(source)?;
    let config = run.to_config()?;
    let label = config.architecture();
    let trained = train_one(&dataset, config, device)?;
    println!("Early stopped at epoch {}", trained.report.stopped_epoch);
    println!("Best validation accuracy: {:.4}", trained.report.best_val_acc);

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Running t-SNE on {} {} nodes...", dataset.graph().split_size(split), split));
    let on_device = dataset.to_device(trained.model.device())?;
    let table = project(&trained.model, &on_device, split, tsne)?;
    pb.finish_and_clear();

    if let Some(path) = output {
        table
            .write_csv(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {} rows to {}", table.len(), path.display());
    }

    println!("{label} ({split})");
    print!("{}", table.render_scatter(width, height));
    Ok(())
}
