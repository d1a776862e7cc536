//! Configuration structures for federated clients and the evaluation server.

use crate::backend::DeviceKind;
use crate::error::{Error, Result};
use crate::types::{Entrypoint, ImageDimensions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration of a client (or server-side evaluation) run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Dataset and partitioning
    pub dataset: DatasetConfig,
    /// Image transform
    pub transform: TransformConfig,
    /// Model selection
    pub model: ModelConfig,
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Device selection
    pub device: DeviceConfig,
    /// Random seed for the train/test split
    pub seed: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            transform: TransformConfig::default(),
            model: ModelConfig::default(),
            training: TrainingParams::default(),
            device: DeviceConfig::default(),
            seed: 42,
        }
    }
}

impl ClientConfig {
    /// Checks value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.dataset.validate()?;
        self.transform.validate()?;
        self.training.validate()?;
        if let Some(0) = self.model.num_classes {
            return Err(Error::Config("model.num_classes must be positive".to_string()));
        }
        Ok(())
    }
}

/// Dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset name ("cifar10" or an image-folder directory name)
    pub name: String,
    /// Root directory that holds the dataset files
    pub data_dir: PathBuf,
    /// Number of partitions the train split is divided into
    pub num_partitions: usize,
    /// Fraction of each partition held out as its local test set
    pub test_fraction: f64,
    /// Batch size for training loaders
    pub batch_size: usize,
    /// Batch size for evaluation loaders
    pub eval_batch_size: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "cifar10".to_string(),
            data_dir: PathBuf::from("data"),
            num_partitions: 10,
            test_fraction: 0.2,
            batch_size: 32,
            eval_batch_size: 32,
        }
    }
}

impl DatasetConfig {
    /// Validates partition count, split fraction and batch sizes
    pub fn validate(&self) -> Result<()> {
        if self.num_partitions == 0 {
            return Err(Error::Config("dataset.num_partitions must be positive".to_string()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(Error::Config(format!(
                "dataset.test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.batch_size == 0 || self.eval_batch_size == 0 {
            return Err(Error::Config("batch sizes must be positive".to_string()));
        }
        Ok(())
    }
}

/// Image transform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Target length of the shorter image side after resizing
    pub resize: u32,
    /// Side length of the square center crop
    pub crop: u32,
    /// Per-channel normalization means [R, G, B]
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviations [R, G, B]
    pub std: [f32; 3],
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            resize: 256,
            crop: 224,
            // ImageNet statistics
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl TransformConfig {
    /// Output dimensions of the transform
    pub fn output_dimensions(&self) -> ImageDimensions {
        ImageDimensions::new(self.crop, self.crop, 3)
    }

    /// Validates sizes and standard deviations
    pub fn validate(&self) -> Result<()> {
        if self.resize == 0 || self.crop == 0 {
            return Err(Error::Config("transform sizes must be positive".to_string()));
        }
        if self.std.iter().any(|s| *s <= 0.0) {
            return Err(Error::Config("transform.std values must be positive".to_string()));
        }
        Ok(())
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hub entrypoint to load
    pub entrypoint: Entrypoint,
    /// Replace the classifier head with this many classes (None keeps it)
    pub num_classes: Option<usize>,
    /// Directory with pretrained weight records
    pub hub_dir: PathBuf,
    /// Whether to load pretrained weights
    pub pretrained: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            entrypoint: Entrypoint::EfficientNetB0,
            num_classes: Some(10),
            hub_dir: PathBuf::from("hub"),
            pretrained: true,
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Number of local epochs
    pub epochs: usize,
    /// Optimizer settings
    pub optimizer: OptimizerConfig,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 1,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl TrainingParams {
    /// Validates optimizer values
    pub fn validate(&self) -> Result<()> {
        let opt = &self.optimizer;
        if opt.learning_rate <= 0.0 {
            return Err(Error::Config("optimizer.learning_rate must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&opt.momentum) {
            return Err(Error::Config("optimizer.momentum must be in [0, 1)".to_string()));
        }
        if opt.weight_decay < 0.0 {
            return Err(Error::Config("optimizer.weight_decay must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// SGD optimizer settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Momentum factor
    pub momentum: f64,
    /// Weight decay (L2 penalty)
    pub weight_decay: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            momentum: 0.9,
            weight_decay: 1e-4,
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device kind
    pub kind: DeviceKind,
    /// Accelerator index (if applicable)
    pub index: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Auto,
            index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.dataset.name, "cifar10");
        assert_eq!(config.dataset.num_partitions, 10);
        assert_eq!(config.dataset.test_fraction, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.model.entrypoint, Entrypoint::EfficientNetB0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_optimizer() {
        let opt = OptimizerConfig::default();
        assert_eq!(opt.learning_rate, 0.1);
        assert_eq!(opt.momentum, 0.9);
        assert_eq!(opt.weight_decay, 1e-4);
    }

    #[test]
    fn test_transform_output_dimensions() {
        let config = TransformConfig::default();
        assert_eq!(config.output_dimensions(), ImageDimensions::new(224, 224, 3));
    }

    #[test]
    fn test_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            seed = 7

            [dataset]
            num_partitions = 4

            [model]
            entrypoint = "nvidia_efficientnet_widese_b0"
            pretrained = false

            [training.optimizer]
            learning_rate = 0.01
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.dataset.num_partitions, 4);
        assert_eq!(config.dataset.name, "cifar10");
        assert_eq!(config.model.entrypoint, Entrypoint::EfficientNetWideSeB0);
        assert!(!config.model.pretrained);
        assert_eq!(config.training.optimizer.learning_rate, 0.01);
        assert_eq!(config.training.optimizer.momentum, 0.9);
    }

    #[test]
    fn test_invalid_test_fraction() {
        let mut config = ClientConfig::default();
        config.dataset.test_fraction = 1.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_classes_rejected() {
        let mut config = ClientConfig::default();
        config.model.num_classes = Some(0);
        assert!(config.validate().is_err());
    }
}
