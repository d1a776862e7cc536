//! Metric records produced by training and evaluation.

use serde::{Deserialize, Serialize};

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    /// Sum of per-batch mean cross-entropy losses
    pub loss: f64,
    /// Correct top-1 predictions divided by the dataset size
    pub accuracy: f64,
    /// Number of batches that were processed
    pub batches: usize,
}

impl Evaluation {
    /// Builds an evaluation record; an empty dataset yields accuracy 0
    pub fn from_counts(loss: f64, correct: usize, dataset_len: usize, batches: usize) -> Self {
        let accuracy = if dataset_len == 0 {
            0.0
        } else {
            correct as f64 / dataset_len as f64
        };

        Self {
            loss,
            accuracy,
            batches,
        }
    }
}

/// Results of one local training invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrainResults {
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

impl TrainResults {
    /// Combines the evaluation on the training and validation loaders
    pub fn from_evaluations(train: Evaluation, val: Evaluation) -> Self {
        Self {
            train_loss: train.loss,
            train_accuracy: train.accuracy,
            val_loss: val.loss,
            val_accuracy: val.accuracy,
        }
    }
}

impl std::fmt::Display for TrainResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "train_loss={:.4}, train_acc={:.4}, val_loss={:.4}, val_acc={:.4}",
            self.train_loss, self.train_accuracy, self.val_loss, self.val_accuracy
        )
    }
}

/// Loss summary for a finished epoch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub mean_loss: f64,
    pub batches: usize,
}

impl std::fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Epoch {}: mean loss {:.4} over {} batches",
            self.epoch, self.mean_loss, self.batches
        )
    }
}
