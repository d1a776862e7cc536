//! Model, training and evaluation for federated image-classification clients.
//!
//! This crate provides:
//! - The EfficientNet family, the model hub and classifier-head replacement
//! - The local training loop (SGD, cross-entropy)
//! - The evaluation loop (summed loss, top-1 accuracy, optional step bound)
//! - Parameter extraction and loading as plain host arrays
//! - Device placement and the residency scope used by both loops

pub mod backend;
pub mod device;
pub mod evaluator;
pub mod hub;
pub mod model;
pub mod params;
pub mod trainer;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{backend_name, placement_for, BackendDevice, DefaultBackend, TrainingBackend};
pub use device::{DeviceResidency, Placement};
pub use evaluator::test;
pub use hub::{load_efficientnet, ModelHub};
pub use model::{replace_classifying_layer, EfficientNet, EfficientNetConfig, ImageClassifier};
pub use params::{get_model_params, set_model_params, ParameterArray, ParameterExport, ParameterList};
pub use trainer::{sgd_config, train};
