//! Federated dataset provider and the per-participant loaders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fedvision_core::{ClientConfig, DataSplit, Error, Result, TransformConfig};
use tracing::info;

use crate::cifar::Cifar10Source;
use crate::folder::ImageFolderSource;
use crate::partition::{IidPartitioner, Partition};
use crate::source::DatasetSource;
use crate::transform::ImageTransform;
use crate::TransformedDataset;

/// Dataset name served by the CIFAR-10 binary reader
pub const CIFAR10: &str = "cifar10";

/// Samples kept per split in toy mode
pub const TOY_SAMPLES: usize = 10;

/// Serves IID partitions of a named dataset's train split
#[derive(Debug)]
pub struct FederatedDataset {
    name: String,
    data_dir: PathBuf,
    partitioner: IidPartitioner,
    sources: Mutex<HashMap<DataSplit, Arc<dyn DatasetSource>>>,
}

impl FederatedDataset {
    pub fn new(name: impl Into<String>, data_dir: impl AsRef<Path>, num_partitions: usize) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            data_dir: data_dir.as_ref().to_path_buf(),
            partitioner: IidPartitioner::new(num_partitions)?,
            sources: Mutex::new(HashMap::new()),
        })
    }

    /// Builds the provider described by the `[dataset]` config section
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let dataset = &config.dataset;
        Self::new(&dataset.name, &dataset.data_dir, dataset.num_partitions)
    }

    /// Provider over already loaded sources, keyed by split
    pub fn with_sources(
        name: impl Into<String>,
        num_partitions: usize,
        sources: impl IntoIterator<Item = (DataSplit, Arc<dyn DatasetSource>)>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            data_dir: PathBuf::new(),
            partitioner: IidPartitioner::new(num_partitions)?,
            sources: Mutex::new(sources.into_iter().collect()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_partitions(&self) -> usize {
        self.partitioner.num_partitions()
    }

    fn source(&self, split: DataSplit) -> Result<Arc<dyn DatasetSource>> {
        let mut sources = self
            .sources
            .lock()
            .map_err(|_| Error::Dataset("dataset source cache is poisoned".to_string()))?;

        if let Some(source) = sources.get(&split) {
            return Ok(source.clone());
        }

        let source: Arc<dyn DatasetSource> = if self.name == CIFAR10 {
            Arc::new(Cifar10Source::load(&self.data_dir, split)?)
        } else {
            Arc::new(ImageFolderSource::load(&self.data_dir.join(&self.name), split)?)
        };
        sources.insert(split, source.clone());
        Ok(source)
    }

    /// Shard `id` of the train split
    pub fn load_partition(&self, id: usize) -> Result<Partition> {
        let source = self.source(DataSplit::Train)?;
        let range = self.partitioner.shard_range(source.len(), id)?;
        info!(
            "Partition {}/{} of {}: samples {}..{}",
            id,
            self.num_partitions(),
            self.name,
            range.start,
            range.end
        );
        Ok(Partition::new(source, range.collect()))
    }

    /// The complete split, unpartitioned
    pub fn load_full(&self, split: DataSplit) -> Result<Partition> {
        Ok(Partition::full(self.source(split)?))
    }
}

/// Settings for turning a partition into local train/test sets
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub test_fraction: f64,
    pub seed: u64,
    pub transform: TransformConfig,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            transform: TransformConfig::default(),
        }
    }
}

impl From<&ClientConfig> for PartitionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            test_fraction: config.dataset.test_fraction,
            seed: config.seed,
            transform: config.transform.clone(),
        }
    }
}

/// Loads partition `partition_id`, splits it and attaches the transform.
///
/// Returns `(trainset, testset)`. With `toy` both are cut to [`TOY_SAMPLES`].
pub fn load_partition(
    fds: &FederatedDataset,
    partition_id: usize,
    toy: bool,
    options: &PartitionOptions,
) -> Result<(TransformedDataset, TransformedDataset)> {
    let partition = fds.load_partition(partition_id)?;
    let (train, test) = partition.train_test_split(options.test_fraction, options.seed)?;

    let transform = Arc::new(ImageTransform::new(options.transform.clone())?);
    let mut trainset = train.with_transform(transform.clone());
    let mut testset = test.with_transform(transform);

    if toy {
        trainset = trainset.take(TOY_SAMPLES);
        testset = testset.take(TOY_SAMPLES);
    }

    info!(
        "Partition {} ready: {} train / {} test samples{}",
        partition_id,
        trainset.partition().len(),
        testset.partition().len(),
        if toy { " (toy)" } else { "" }
    );
    Ok((trainset, testset))
}

/// The full test split with the transform attached
pub fn load_centralized_data(fds: &FederatedDataset, transform: &TransformConfig) -> Result<TransformedDataset> {
    let test = fds.load_full(DataSplit::Test)?;
    let transform = Arc::new(ImageTransform::new(transform.clone())?);
    info!("Centralized test set: {} samples", test.len());
    Ok(test.with_transform(transform))
}
