//! Federated dataset handling for image classification clients.
//!
//! This crate provides:
//! - Dataset sources (CIFAR-10 binary files, image folders, in-memory images)
//! - IID partitioning and the seeded per-partition train/test split
//! - The resize, center-crop and normalize transform
//! - Burn `Dataset`/`Batcher` integration and a lazy batch loader

pub mod batch;
pub mod cifar;
pub mod federated;
pub mod folder;
pub mod partition;
pub mod source;
pub mod transform;

pub use batch::{
    BatchIter, DataLoader, ImageBatch, ImageBatcher, ImageItem, ItemDataset, TransformedDataset,
};
pub use cifar::Cifar10Source;
pub use federated::{
    load_centralized_data, load_partition, FederatedDataset, PartitionOptions, CIFAR10, TOY_SAMPLES,
};
pub use folder::ImageFolderSource;
pub use partition::{IidPartitioner, Partition};
pub use source::{DatasetSource, InMemorySource, RawItem};
pub use transform::ImageTransform;
