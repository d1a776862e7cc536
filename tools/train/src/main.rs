//! Training CLI Tool
//!
//! Trains one participant's partition of a federated dataset, reports the
//! resulting losses and accuracies and exports the model parameters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use clap::Parser;
use fedvision_core::{load_client_config, resolve_device, setup_cli_logging, ClientConfig, DeviceKind};
use fedvision_dataset::{load_partition, DataLoader, FederatedDataset, PartitionOptions};
use fedvision_training::{
    backend_name, get_model_params, load_efficientnet, placement_for, train, ModelHub, ParameterExport,
    Placement, TrainingBackend,
};
use tracing::info;

/// Federated client training tool
#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train an image classifier on one federated partition",
    long_about = "Load one IID partition of the configured dataset, fine-tune a pretrained \
                  EfficientNet on its 80% train split and evaluate on both splits."
)]
struct Args {
    /// Path to client configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Partition to train on
    #[arg(short, long, value_name = "ID")]
    partition_id: usize,

    /// Override number of local epochs
    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    /// Only use a handful of samples per split
    #[arg(long)]
    toy: bool,

    /// Override device (cpu, gpu, auto)
    #[arg(short, long, value_name = "KIND")]
    device: Option<DeviceKind>,

    /// Write the trained parameters as JSON
    #[arg(long, value_name = "FILE")]
    params_out: Option<PathBuf>,

    /// Write the training results as JSON
    #[arg(long, value_name = "FILE")]
    results_out: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    info!("Federated client - training partition {}", args.partition_id);

    let config = load_client_config(&args.config, |config| apply_overrides(config, &args))
        .context("Failed to load configuration file")?;

    let device = resolve_device(config.device.kind, config.device.index);
    let placement = placement_for(device);
    let placement = Placement::<TrainingBackend>::new(placement.device, placement.host);
    info!("Backend: {}", backend_name());

    let fds = FederatedDataset::from_config(&config).context("Failed to set up federated dataset")?;
    let (trainset, valset) = load_partition(&fds, args.partition_id, args.toy, &PartitionOptions::from(&config))
        .with_context(|| format!("Failed to load partition {}", args.partition_id))?;

    let train_loader = DataLoader::new(Arc::new(trainset), config.dataset.batch_size)?.with_shuffle(config.seed);
    let val_loader = DataLoader::new(Arc::new(valset), config.dataset.eval_batch_size)?;

    let hub = ModelHub::new(&config.model.hub_dir);
    let mut model = load_efficientnet::<TrainingBackend>(
        &hub,
        config.model.entrypoint,
        config.model.num_classes,
        config.model.pretrained,
        &placement.host,
    )
    .with_context(|| format!("Failed to load model {}", config.model.entrypoint))?;

    let results = train(
        &mut model,
        &train_loader,
        &val_loader,
        config.training.epochs,
        &config.training.optimizer,
        &placement,
    )
    .context("Training failed")?;

    println!("{}", results);

    if let Some(path) = &args.results_out {
        write_json(path, &results).context("Failed to write results")?;
        info!("Results written to {}", path.display());
    }

    if let Some(path) = &args.params_out {
        let params = get_model_params(&model.valid())?;
        ParameterExport::new(config.model.entrypoint, model.num_classes(), params)
            .save_json(path)
            .context("Failed to export parameters")?;
    }

    Ok(())
}

fn apply_overrides(config: &mut ClientConfig, args: &Args) {
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(kind) = args.device {
        config.device.kind = kind;
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
