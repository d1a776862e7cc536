//! Evaluation CLI Tool
//!
//! Evaluates a model on the centralized test split, optionally with
//! parameters exported by the `train` tool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fedvision_core::{load_client_config, resolve_device, setup_cli_logging, DeviceKind};
use fedvision_dataset::{load_centralized_data, DataLoader, FederatedDataset};
use fedvision_training::{
    backend_name, load_efficientnet, placement_for, set_model_params, test, DefaultBackend, ModelHub,
    ParameterExport,
};
use tracing::{info, warn};

/// Centralized evaluation tool
#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate an image classifier on the centralized test set",
    long_about = "Evaluate a pretrained or federated model on the full test split of the \
                  configured dataset and report summed loss and top-1 accuracy."
)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Stop after the batch with this index
    #[arg(short, long, value_name = "K")]
    steps: Option<usize>,

    /// Parameters exported by the train tool
    #[arg(short, long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Override device (cpu, gpu, auto)
    #[arg(short, long, value_name = "KIND")]
    device: Option<DeviceKind>,

    /// Write the evaluation as JSON
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    info!("Federated server - centralized evaluation");

    let config = load_client_config(&args.config, |config| {
        if let Some(kind) = args.device {
            config.device.kind = kind;
        }
    })
    .context("Failed to load configuration file")?;

    let placement = placement_for(resolve_device(config.device.kind, config.device.index));
    info!("Backend: {}", backend_name());

    let hub = ModelHub::new(&config.model.hub_dir);
    let mut model = load_efficientnet::<DefaultBackend>(
        &hub,
        config.model.entrypoint,
        config.model.num_classes,
        config.model.pretrained && args.params.is_none(),
        &placement.host,
    )
    .with_context(|| format!("Failed to load model {}", config.model.entrypoint))?;

    if let Some(path) = &args.params {
        let export = ParameterExport::load_json(path)
            .with_context(|| format!("Failed to read parameters from {}", path.display()))?;
        if export.entrypoint != config.model.entrypoint {
            warn!(
                "Parameters were exported from {}, configured model is {}",
                export.entrypoint, config.model.entrypoint
            );
        }
        model = set_model_params(model, &export.parameters).context("Parameters do not fit the model")?;
        info!("Loaded {} parameter tensors from {}", export.parameters.len(), path.display());
    }

    let fds = FederatedDataset::from_config(&config).context("Failed to set up federated dataset")?;
    let testset = load_centralized_data(&fds, &config.transform).context("Failed to load test set")?;
    let loader = DataLoader::new(Arc::new(testset), config.dataset.eval_batch_size)?;

    let evaluation = test(&mut model, &loader, args.steps, &placement).context("Evaluation failed")?;

    println!(
        "loss={:.4}, accuracy={:.4} ({} batches)",
        evaluation.loss, evaluation.accuracy, evaluation.batches
    );

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&evaluation)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}
