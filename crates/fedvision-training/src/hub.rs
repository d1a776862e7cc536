//! Model hub: named entrypoints backed by a directory of weight records.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use fedvision_core::{Entrypoint, Error, Result};
use tracing::info;

use crate::model::{replace_classifying_layer, EfficientNet, EfficientNetConfig, IMAGENET_CLASSES};

/// Extension of the weight records written by burn's `CompactRecorder`
pub const RECORD_EXTENSION: &str = "mpk";

/// Directory of pretrained EfficientNet records, one `<entrypoint>.mpk` each
#[derive(Debug, Clone)]
pub struct ModelHub {
    repo_dir: PathBuf,
}

impl ModelHub {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Path of the record for `entrypoint`, without extension
    pub fn record_path(&self, entrypoint: Entrypoint) -> PathBuf {
        self.repo_dir.join(entrypoint.name())
    }

    /// Builds the ImageNet model of `entrypoint`, loading weights when `pretrained`
    pub fn load<B: Backend>(
        &self,
        entrypoint: Entrypoint,
        pretrained: bool,
        device: &B::Device,
    ) -> Result<EfficientNet<B>> {
        let config = EfficientNetConfig::for_entrypoint(entrypoint).with_num_classes(IMAGENET_CLASSES);
        let model = config.init::<B>(device);

        if !pretrained {
            info!("Initialized {} with random weights", entrypoint);
            return Ok(model);
        }

        let path = self.record_path(entrypoint);
        let file = path.with_extension(RECORD_EXTENSION);
        if !file.exists() {
            return Err(Error::NotFound(format!(
                "Pretrained weights for {} not found at {}",
                entrypoint,
                file.display()
            )));
        }

        let model = model
            .load_file(&path, &CompactRecorder::new(), device)
            .map_err(|e| Error::Record(format!("Failed to load {}: {:?}", file.display(), e)))?;
        info!("Loaded pretrained {} from {}", entrypoint, file.display());
        Ok(model)
    }

    /// Writes `model` as the record for `entrypoint`
    pub fn save<B: Backend>(&self, entrypoint: Entrypoint, model: &EfficientNet<B>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.repo_dir)?;
        let path = self.record_path(entrypoint);
        model
            .clone()
            .save_file(&path, &CompactRecorder::new())
            .map_err(|e| Error::Record(format!("Failed to save {}: {:?}", path.display(), e)))?;
        Ok(path.with_extension(RECORD_EXTENSION))
    }
}

/// Loads `entrypoint` from the hub and, with `classes`, replaces its classifier head
pub fn load_efficientnet<B: Backend>(
    hub: &ModelHub,
    entrypoint: Entrypoint,
    classes: Option<usize>,
    pretrained: bool,
    device: &B::Device,
) -> Result<EfficientNet<B>> {
    let model = hub.load::<B>(entrypoint, pretrained, device)?;
    match classes {
        Some(0) => Err(Error::InvalidArgument("number of classes must be positive".to_string())),
        Some(classes) => Ok(replace_classifying_layer(model, classes)),
        None => Ok(model),
    }
}
