//! Local training loop.

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use fedvision_core::{EpochSummary, OptimizerConfig, Result, TrainResults};
use fedvision_dataset::DataLoader;
use tracing::{debug, info};

use crate::device::{DeviceResidency, Placement};
use crate::evaluator::test;
use crate::model::ImageClassifier;

/// Builds the SGD optimizer settings (momentum without dampening, L2 weight decay)
pub fn sgd_config(config: &OptimizerConfig) -> SgdConfig {
    SgdConfig::new()
        .with_momentum(momentum_config(config))
        .with_weight_decay(weight_decay_config(config))
}

fn momentum_config(config: &OptimizerConfig) -> Option<MomentumConfig> {
    (config.momentum > 0.0).then(|| {
        MomentumConfig::new()
            .with_momentum(config.momentum)
            .with_dampening(0.0)
    })
}

fn weight_decay_config(config: &OptimizerConfig) -> Option<WeightDecayConfig> {
    (config.weight_decay > 0.0).then(|| WeightDecayConfig::new(config.weight_decay))
}

/// Trains `model` for `epochs` passes over `train_loader`, then evaluates it.
///
/// Training runs on `placement.device`; the model is back on `placement.host`
/// afterwards, also when a batch fails. The returned results come from the
/// evaluation loop on the train and validation loaders.
pub fn train<B, M>(
    model: &mut M,
    train_loader: &DataLoader,
    val_loader: &DataLoader,
    epochs: usize,
    config: &OptimizerConfig,
    placement: &Placement<B>,
) -> Result<TrainResults>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    info!(
        "Training for {} epoch(s) on {} samples ({} batches/epoch)",
        epochs,
        train_loader.dataset_len(),
        train_loader.num_batches()
    );

    {
        let mut residency = DeviceResidency::new(model, placement);
        let mut optimizer = sgd_config(config).init::<B, M>();
        let loss_fn = CrossEntropyLossConfig::new().init(&placement.device);

        for epoch in 0..epochs {
            let mut epoch_loss = 0.0f64;
            let mut batches = 0usize;

            for (batch_idx, batch) in train_loader.iter::<B>(&placement.device).enumerate() {
                let batch = batch?;

                let logits = residency.forward(batch.images);
                let loss = loss_fn.forward(logits, batch.labels);
                let loss_value: f64 = loss.clone().into_scalar().elem();

                let grads = GradientsParams::from_grads(loss.backward(), &*residency);
                *residency = optimizer.step(config.learning_rate, (*residency).clone(), grads);

                epoch_loss += loss_value;
                batches += 1;
                debug!("Epoch {} batch {}: loss = {:.4}", epoch + 1, batch_idx, loss_value);
            }

            let summary = EpochSummary {
                epoch: epoch + 1,
                mean_loss: epoch_loss / batches.max(1) as f64,
                batches,
            };
            info!("{}", summary);
        }
    }

    let mut inference_model = model.valid();
    let inner = placement.inner();
    let train_eval = test(&mut inference_model, train_loader, None, &inner)?;
    let val_eval = test(&mut inference_model, val_loader, None, &inner)?;

    let results = TrainResults::from_evaluations(train_eval, val_eval);
    info!("Training finished: {}", results);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{items_of, loader_of, TinyClassifier};
    use burn::backend::Autodiff;
    use burn::data::dataset::InMemDataset;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use fedvision_dataset::ImageItem;
    use std::sync::Arc;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn placement() -> Placement<TestBackend> {
        Placement::host_only(NdArrayDevice::Cpu)
    }

    #[test]
    fn test_sgd_defaults() {
        let config = OptimizerConfig::default();
        let momentum = momentum_config(&config).unwrap();
        assert_eq!(momentum.momentum, 0.9);
        assert_eq!(momentum.dampening, 0.0);
        assert!(!momentum.nesterov);
        assert_eq!(weight_decay_config(&config).unwrap().penalty, 1e-4);
    }

    #[test]
    fn test_zero_momentum_and_decay_disabled() {
        let config = OptimizerConfig {
            momentum: 0.0,
            weight_decay: 0.0,
            ..OptimizerConfig::default()
        };
        assert!(momentum_config(&config).is_none());
        assert!(weight_decay_config(&config).is_none());
    }

    #[test]
    fn test_training_reduces_loss() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);
        let train_loader = loader_of(32, 8).with_shuffle(1);
        let val_loader = loader_of(8, 8);

        let before = test(&mut model.valid(), &train_loader, None, &placement.inner()).unwrap();
        let results = train(
            &mut model,
            &train_loader,
            &val_loader,
            5,
            &OptimizerConfig::default(),
            &placement,
        )
        .unwrap();

        assert!(results.train_loss < before.loss);
        assert!((0.0..=1.0).contains(&results.train_accuracy));
        assert!((0.0..=1.0).contains(&results.val_accuracy));
        assert!(results.val_loss >= 0.0);
        assert_eq!(results.val_accuracy, 1.0);
    }

    #[test]
    fn test_zero_epochs_only_evaluates() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);
        let weights = model.fc.weight.val().into_data();
        let loader = loader_of(6, 3);

        let results = train(&mut model, &loader, &loader, 0, &OptimizerConfig::default(), &placement).unwrap();

        assert_eq!(model.fc.weight.val().into_data(), weights);
        assert_eq!(results.train_loss, results.val_loss);
    }

    #[test]
    fn test_failing_batch_restores_host() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);

        let mut items = items_of(3);
        items.push(ImageItem {
            pixels: vec![0.0; 3],
            shape: [3, 1, 1],
            label: 0,
        });
        let broken = DataLoader::new(Arc::new(InMemDataset::new(items)), 4).unwrap();
        let val_loader = loader_of(2, 2);

        let result = train(&mut model, &broken, &val_loader, 1, &OptimizerConfig::default(), &placement);
        assert!(result.is_err());
        assert_eq!(model.fc.weight.device(), placement.host);
    }
}
