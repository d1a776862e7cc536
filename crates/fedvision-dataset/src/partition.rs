//! IID partitioning and per-partition train/test splitting.

use std::ops::Range;
use std::sync::Arc;

use burn::data::dataset::Dataset;
use fedvision_core::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::source::{DatasetSource, RawItem};
use crate::transform::ImageTransform;
use crate::TransformedDataset;

/// Splits a dataset into `num_partitions` contiguous, near-equal shards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IidPartitioner {
    num_partitions: usize,
}

impl IidPartitioner {
    pub fn new(num_partitions: usize) -> Result<Self> {
        if num_partitions == 0 {
            return Err(Error::InvalidArgument(
                "number of partitions must be positive".to_string(),
            ));
        }
        Ok(Self { num_partitions })
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Index range of partition `id` over a dataset of `len` samples.
    ///
    /// The first `len % n` shards hold one extra sample.
    pub fn shard_range(&self, len: usize, id: usize) -> Result<Range<usize>> {
        if id >= self.num_partitions {
            return Err(Error::PartitionOutOfRange {
                id,
                num_partitions: self.num_partitions,
            });
        }

        let base = len / self.num_partitions;
        let remainder = len % self.num_partitions;
        let start = base * id + id.min(remainder);
        let size = base + usize::from(id < remainder);
        Ok(start..start + size)
    }
}

/// An ordered view of samples from a shared source
#[derive(Debug, Clone)]
pub struct Partition {
    source: Arc<dyn DatasetSource>,
    indices: Vec<usize>,
}

impl Partition {
    /// Partition covering the whole source
    pub fn full(source: Arc<dyn DatasetSource>) -> Self {
        let indices = (0..source.len()).collect();
        Self { source, indices }
    }

    pub fn new(source: Arc<dyn DatasetSource>, indices: Vec<usize>) -> Self {
        Self { source, indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Source indices in partition order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Decodes the sample at `index` of this partition
    pub fn try_get(&self, index: usize) -> Result<RawItem> {
        let source_index = *self.indices.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "index {index} out of bounds for partition of {} samples",
                self.indices.len()
            ))
        })?;
        self.source.item(source_index)
    }

    /// Keeps only the first `n` samples
    pub fn take(mut self, n: usize) -> Self {
        self.indices.truncate(n);
        self
    }

    /// Shuffles with `seed` and splits off `ceil(test_fraction * len)` test samples.
    ///
    /// Returns `(train, test)`.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<(Partition, Partition)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(Error::InvalidArgument(format!(
                "test fraction must be in (0, 1), got {test_fraction}"
            )));
        }

        let n = self.len();
        let n_test = (test_fraction * n as f64).ceil() as usize;
        let n_train = n - n_test.min(n);
        if n_test == 0 || n_train == 0 {
            return Err(Error::Dataset(format!(
                "cannot split {n} samples with test fraction {test_fraction}: \
                 one side would be empty"
            )));
        }

        let mut permutation = self.indices.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        permutation.shuffle(&mut rng);

        let train_indices = permutation.split_off(n_test);
        debug!("Split {} samples into {} train / {} test", n, n_train, n_test);

        Ok((
            Partition::new(self.source.clone(), train_indices),
            Partition::new(self.source.clone(), permutation),
        ))
    }

    /// Attaches a transform that is applied on every access
    pub fn with_transform(self, transform: Arc<ImageTransform>) -> TransformedDataset {
        TransformedDataset::new(self, transform)
    }
}

impl Dataset<RawItem> for Partition {
    fn get(&self, index: usize) -> Option<RawItem> {
        if index >= self.indices.len() {
            return None;
        }
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Failed to load sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use image::{Rgb, RgbImage};

    fn source_of(n: usize) -> Arc<dyn DatasetSource> {
        Arc::new(InMemorySource::from_pairs(
            (0..n).map(|i| (RgbImage::from_pixel(2, 2, Rgb([i as u8, 0, 0])), i % 10)),
        ))
    }

    #[test]
    fn test_shard_sizes_cover_dataset() {
        let partitioner = IidPartitioner::new(10).unwrap();
        let len = 50_003;

        let mut expected_start = 0;
        for id in 0..10 {
            let range = partitioner.shard_range(len, id).unwrap();
            assert_eq!(range.start, expected_start);
            assert_eq!(range.len(), if id < 3 { 5001 } else { 5000 });
            expected_start = range.end;
        }
        assert_eq!(expected_start, len);
    }

    #[test]
    fn test_even_shards() {
        let partitioner = IidPartitioner::new(10).unwrap();
        assert_eq!(partitioner.shard_range(50_000, 3).unwrap(), 15_000..20_000);
    }

    #[test]
    fn test_partition_out_of_range() {
        let partitioner = IidPartitioner::new(10).unwrap();
        let err = partitioner.shard_range(100, 10).unwrap_err();
        assert!(matches!(
            err,
            Error::PartitionOutOfRange {
                id: 10,
                num_partitions: 10
            }
        ));
    }

    #[test]
    fn test_zero_partitions_rejected() {
        assert!(IidPartitioner::new(0).is_err());
    }

    #[test]
    fn test_split_sizes() {
        for n in [5, 10, 11, 37, 500] {
            let partition = Partition::full(source_of(n));
            let (train, test) = partition.train_test_split(0.2, 42).unwrap();

            assert_eq!(train.len() + test.len(), n);
            assert_eq!(test.len(), (0.2 * n as f64).ceil() as usize);
        }
    }

    #[test]
    fn test_split_is_disjoint_and_seeded() {
        let partition = Partition::full(source_of(40));
        let (train_a, test_a) = partition.train_test_split(0.2, 7).unwrap();
        let (train_b, test_b) = partition.train_test_split(0.2, 7).unwrap();

        assert_eq!(train_a.indices(), train_b.indices());
        assert_eq!(test_a.indices(), test_b.indices());

        let mut all: Vec<usize> = train_a
            .indices()
            .iter()
            .chain(test_a.indices())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_too_small() {
        let partition = Partition::full(source_of(1));
        assert!(partition.train_test_split(0.2, 0).is_err());
    }

    #[test]
    fn test_dataset_get_maps_indices() {
        let source = source_of(20);
        let partition = Partition::new(source, vec![13, 4]);

        assert_eq!(Dataset::len(&partition), 2);
        assert_eq!(partition.get(0).unwrap().label, 3);
        assert_eq!(partition.get(1).unwrap().image.get_pixel(0, 0), &Rgb([4, 0, 0]));
        assert!(partition.get(2).is_none());
    }

    #[test]
    fn test_take() {
        let partition = Partition::full(source_of(30)).take(10);
        assert_eq!(partition.len(), 10);
        assert_eq!(partition.indices(), &(0..10).collect::<Vec<_>>()[..]);
    }
}
