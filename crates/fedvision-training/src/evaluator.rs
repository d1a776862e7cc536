//! Evaluation loop: summed cross-entropy and top-1 accuracy.

use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use fedvision_core::{Evaluation, Result};
use fedvision_dataset::DataLoader;
use tracing::{debug, info};

use crate::device::{DeviceResidency, Placement};
use crate::model::ImageClassifier;

/// Evaluates `model` on `loader` without tracking gradients.
///
/// Call it with the inference form of a model (`AutodiffModule::valid`) so
/// dropout is off and batch norm uses its running statistics.
///
/// `loss` is the sum of the per-batch mean losses. `accuracy` divides the
/// correct predictions by the full dataset length. With `steps = Some(k)` the
/// loop stops after the batch with index `k`, so `k + 1` batches are seen.
/// The model is back on `placement.host` when this returns.
pub fn test<B, M>(
    model: &mut M,
    loader: &DataLoader,
    steps: Option<usize>,
    placement: &Placement<B>,
) -> Result<Evaluation>
where
    B: Backend,
    M: Module<B> + ImageClassifier<B>,
{
    let residency = DeviceResidency::new(model, placement);
    let loss_fn = CrossEntropyLossConfig::new().init(&placement.device);

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut batches = 0usize;

    for (batch_idx, batch) in loader.iter::<B>(&placement.device).enumerate() {
        let batch = batch?;
        let samples = batch.len();
        let logits = residency.forward(batch.images);

        let loss = loss_fn.forward(logits.clone(), batch.labels.clone());
        let batch_loss: f64 = loss.into_scalar().elem();
        loss_sum += batch_loss;

        let predictions = logits.argmax(1).squeeze::<1>(1);
        let batch_correct: i64 = predictions
            .equal(batch.labels)
            .int()
            .sum()
            .into_scalar()
            .elem();
        correct += batch_correct as usize;
        batches += 1;

        debug!(
            "Eval batch {} ({} samples): loss = {:.4}, correct = {}",
            batch_idx, samples, batch_loss, batch_correct
        );

        if steps == Some(batch_idx) {
            break;
        }
    }
    drop(residency);

    let evaluation = Evaluation::from_counts(loss_sum, correct, loader.dataset_len(), batches);
    info!(
        "Evaluated {} batches: loss = {:.4}, accuracy = {:.4}",
        evaluation.batches, evaluation.loss, evaluation.accuracy
    );
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{loader_of, TinyClassifier};
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn placement() -> Placement<TestBackend> {
        Placement::host_only(NdArrayDevice::Cpu)
    }

    #[test]
    fn test_metrics_in_range() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);
        let loader = loader_of(10, 4);

        let eval = test(&mut model, &loader, None, &placement).unwrap();
        assert_eq!(eval.batches, 3);
        assert!(eval.loss >= 0.0);
        assert!((0.0..=1.0).contains(&eval.accuracy));
    }

    #[test]
    fn test_steps_processes_one_extra_batch() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);
        let loader = loader_of(40, 4);

        let eval = test(&mut model, &loader, Some(2), &placement).unwrap();
        assert_eq!(eval.batches, 3);

        let eval = test(&mut model, &loader, Some(0), &placement).unwrap();
        assert_eq!(eval.batches, 1);
    }

    #[test]
    fn test_steps_beyond_loader_runs_everything() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);
        let loader = loader_of(8, 4);

        let eval = test(&mut model, &loader, Some(10), &placement).unwrap();
        assert_eq!(eval.batches, 2);
    }

    #[test]
    fn test_bounded_accuracy_uses_full_length() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::perfect(&placement.host);
        let loader = loader_of(20, 5);

        let eval = test(&mut model, &loader, Some(0), &placement).unwrap();
        assert_eq!(eval.batches, 1);
        assert!((eval.accuracy - 5.0 / 20.0).abs() < 1e-9);

        let eval = test(&mut model, &loader, None, &placement).unwrap();
        assert!((eval.accuracy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_loader() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);
        let loader = loader_of(0, 4);

        let eval = test(&mut model, &loader, None, &placement).unwrap();
        assert_eq!(eval.batches, 0);
        assert_eq!(eval.loss, 0.0);
        assert_eq!(eval.accuracy, 0.0);
    }

    #[test]
    fn test_model_back_on_host() {
        let placement = placement();
        let mut model = TinyClassifier::<TestBackend>::new(&placement.host);
        let loader = loader_of(4, 2);

        test(&mut model, &loader, None, &placement).unwrap();
        assert_eq!(model.fc.weight.device(), placement.host);
    }
}
