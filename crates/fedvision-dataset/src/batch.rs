//! Transformed items, burn batching and a minimal batch loader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::{Dataset, InMemDataset};
use burn::prelude::*;
use fedvision_core::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::partition::Partition;
use crate::transform::ImageTransform;

/// A transformed sample ready for batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageItem {
    /// Image data as flattened CHW float array
    pub pixels: Vec<f32>,
    /// `[channels, height, width]`
    pub shape: [usize; 3],
    pub label: usize,
}

impl ImageItem {
    pub fn new(pixels: Vec<f32>, shape: [usize; 3], label: usize) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if pixels.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "pixel buffer of {} values does not match shape {:?}",
                pixels.len(),
                shape
            )));
        }
        Ok(Self {
            pixels,
            shape,
            label,
        })
    }
}

/// A partition whose images are transformed on access
#[derive(Debug, Clone)]
pub struct TransformedDataset {
    partition: Partition,
    transform: Arc<ImageTransform>,
}

impl TransformedDataset {
    pub fn new(partition: Partition, transform: Arc<ImageTransform>) -> Self {
        Self {
            partition,
            transform,
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn transform(&self) -> &ImageTransform {
        &self.transform
    }

    pub fn len(&self) -> usize {
        self.partition.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partition.is_empty()
    }

    /// Keeps only the first `n` samples
    pub fn take(self, n: usize) -> Self {
        Self {
            partition: self.partition.take(n),
            transform: self.transform,
        }
    }

    /// Decodes and transforms the sample at `index`
    pub fn try_get(&self, index: usize) -> Result<ImageItem> {
        let raw = self.partition.try_get(index)?;
        let pixels = self.transform.apply(&raw.image)?;
        Ok(ImageItem {
            pixels,
            shape: self.transform.output_shape(),
            label: raw.label,
        })
    }
}

/// Random access to transformed items that keeps the error of a failed sample
pub trait ItemDataset: Send + Sync {
    fn len(&self) -> usize;

    fn try_get(&self, index: usize) -> Result<ImageItem>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemDataset for TransformedDataset {
    fn len(&self) -> usize {
        self.partition.len()
    }

    fn try_get(&self, index: usize) -> Result<ImageItem> {
        TransformedDataset::try_get(self, index)
    }
}

impl ItemDataset for InMemDataset<ImageItem> {
    fn len(&self) -> usize {
        Dataset::len(self)
    }

    fn try_get(&self, index: usize) -> Result<ImageItem> {
        self.get(index).ok_or_else(|| {
            Error::Dataset(format!(
                "sample {index} out of range for {} items",
                Dataset::len(self)
            ))
        })
    }
}

impl Dataset<ImageItem> for TransformedDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        if index >= self.partition.len() {
            return None;
        }
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Failed to transform sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.partition.len()
    }
}

/// A batch of images and their class labels
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }
}

/// Stacks uniformly shaped items into an [`ImageBatch`]
#[derive(Clone, Debug, Default)]
pub struct ImageBatcher;

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = items.first().map(|item| item.shape).unwrap_or([0; 3]);

        let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let pixels: Vec<f32> = items.into_iter().flat_map(|item| item.pixels).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [batch_size, channels, height, width]),
            device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [batch_size]), device);

        ImageBatch { images, labels }
    }
}

/// Splits a dataset into consecutive batches, optionally reshuffled every pass
#[derive(Clone)]
pub struct DataLoader {
    dataset: Arc<dyn ItemDataset>,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    passes: Arc<AtomicU64>,
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("len", &self.dataset.len())
            .field("batch_size", &self.batch_size)
            .field("shuffle_seed", &self.shuffle_seed)
            .finish()
    }
}

impl DataLoader {
    pub fn new(dataset: Arc<dyn ItemDataset>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be positive".to_string()));
        }
        Ok(Self {
            dataset,
            batch_size,
            shuffle_seed: None,
            passes: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Reshuffles the sample order on every call to [`DataLoader::iter`]
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Number of samples in the underlying dataset
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per pass; the last one may be partial
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Starts a new pass over the dataset, producing batches on `device`
    pub fn iter<B: Backend>(&self, device: &B::Device) -> BatchIter<'_, B> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let pass = self.passes.fetch_add(1, Ordering::Relaxed);
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(pass));
            order.shuffle(&mut rng);
        }

        BatchIter {
            loader: self,
            order,
            position: 0,
            device: device.clone(),
        }
    }

    fn collect_items(&self, indices: &[usize]) -> Result<Vec<ImageItem>> {
        let mut items = Vec::with_capacity(indices.len());
        for &index in indices {
            let item = self.dataset.try_get(index)?;

            if let Some(first) = items.first().map(|first: &ImageItem| first.shape) {
                if item.shape != first {
                    return Err(Error::Dataset(format!(
                        "sample {index} has shape {:?}, expected {:?}",
                        item.shape, first
                    )));
                }
            }
            items.push(item);
        }
        Ok(items)
    }
}

/// Iterator over the batches of one pass
pub struct BatchIter<'a, B: Backend> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    position: usize,
    device: B::Device,
}

impl<B: Backend> Iterator for BatchIter<'_, B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }

        let end = (self.position + self.loader.batch_size).min(self.order.len());
        let indices = &self.order[self.position..end];
        self.position = end;

        Some(
            self.loader
                .collect_items(indices)
                .map(|items| ImageBatcher.batch(items, &self.device)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position).div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::folder::ImageFolderSource;
    use burn_ndarray::NdArray;
    use fedvision_core::TransformConfig;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn items(n: usize) -> Vec<ImageItem> {
        (0..n)
            .map(|i| ImageItem::new(vec![i as f32; 12], [3, 2, 2], i % 3).unwrap())
            .collect()
    }

    fn loader(n: usize, batch_size: usize) -> DataLoader {
        DataLoader::new(Arc::new(InMemDataset::new(items(n))), batch_size).unwrap()
    }

    #[test]
    fn test_item_shape_checked() {
        assert!(ImageItem::new(vec![0.0; 11], [3, 2, 2], 0).is_err());
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let batch: ImageBatch<TestBackend> = ImageBatcher.batch(items(4), &device);

        assert_eq!(batch.images.dims(), [4, 3, 2, 2]);
        assert_eq!(batch.labels.dims(), [4]);
        assert_eq!(
            batch.labels.to_data().convert::<i64>().to_vec::<i64>().unwrap(),
            vec![0, 1, 2, 0]
        );
    }

    #[test]
    fn test_loader_partial_last_batch() {
        let loader = loader(10, 4);
        assert_eq!(loader.num_batches(), 3);

        let device = Default::default();
        let sizes: Vec<usize> = loader
            .iter::<TestBackend>(&device)
            .map(|batch| batch.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_loader_keeps_order_without_shuffle() {
        let loader = loader(5, 5);
        let device = Default::default();
        let batch = loader.iter::<TestBackend>(&device).next().unwrap().unwrap();

        let firsts: Vec<f32> = batch
            .images
            .to_data()
            .to_vec::<f32>()
            .unwrap()
            .chunks(12)
            .map(|chunk| chunk[0])
            .collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_shuffle_changes_between_passes() {
        let loader = loader(32, 32).with_shuffle(3);
        let device = Default::default();

        let order = |batch: ImageBatch<TestBackend>| -> Vec<i64> {
            batch.labels.to_data().convert::<i64>().to_vec::<i64>().unwrap()
        };
        let first = order(loader.iter::<TestBackend>(&device).next().unwrap().unwrap());
        let second = order(loader.iter::<TestBackend>(&device).next().unwrap().unwrap());

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }

    #[test]
    fn test_mixed_shapes_rejected() {
        let mut data = items(2);
        data.push(ImageItem::new(vec![0.0; 3], [3, 1, 1], 0).unwrap());
        let loader = DataLoader::new(Arc::new(InMemDataset::new(data)), 3).unwrap();

        let device = Default::default();
        let result = loader.iter::<TestBackend>(&device).next().unwrap();
        assert!(matches!(result, Err(Error::Dataset(_))));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(DataLoader::new(Arc::new(InMemDataset::new(items(1))), 0).is_err());
    }

    #[test]
    fn test_transformed_dataset() {
        let source = Arc::new(InMemorySource::from_pairs(vec![
            (RgbImage::from_pixel(16, 12, Rgb([255, 255, 255])), 4),
            (RgbImage::from_pixel(9, 9, Rgb([0, 0, 0])), 1),
        ]));
        let transform = ImageTransform::new(TransformConfig {
            resize: 8,
            crop: 8,
            ..TransformConfig::default()
        })
        .unwrap();
        let dataset = Partition::full(source).with_transform(Arc::new(transform));

        assert_eq!(Dataset::len(&dataset), 2);
        let item = dataset.get(0).unwrap();
        assert_eq!(item.shape, [3, 8, 8]);
        assert_eq!(item.pixels.len(), 3 * 8 * 8);
        assert_eq!(item.label, 4);
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_corrupt_image_error_reaches_caller() {
        let temp = TempDir::new().unwrap();
        let class_dir = temp.path().join("cat");
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join("broken.png"), b"not a png").unwrap();

        let source = Arc::new(ImageFolderSource::scan(temp.path()).unwrap());
        let dataset = Partition::full(source).with_transform(Arc::new(ImageTransform::default()));
        let loader = DataLoader::new(Arc::new(dataset), 1).unwrap();

        let device = Default::default();
        let result = loader.iter::<TestBackend>(&device).next().unwrap();
        assert!(matches!(result, Err(Error::Image(_))));
    }

    #[test]
    fn test_in_memory_out_of_range() {
        let dataset = InMemDataset::new(items(2));
        assert!(ItemDataset::try_get(&dataset, 1).is_ok());
        assert!(matches!(
            ItemDataset::try_get(&dataset, 2),
            Err(Error::Dataset(_))
        ));
    }
}
