//! Small models and loaders for the loop tests.

use std::sync::Arc;

use burn::data::dataset::InMemDataset;
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use fedvision_dataset::{DataLoader, ImageItem};

use crate::model::ImageClassifier;

pub(crate) const SHAPE: [usize; 3] = [3, 2, 2];
const VALUES: usize = 12;

/// Linear layer over flattened 3x2x2 images
#[derive(Module, Debug)]
pub(crate) struct TinyClassifier<B: Backend> {
    pub fc: Linear<B>,
}

impl<B: Backend> TinyClassifier<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            fc: LinearConfig::new(VALUES, 2).init(device),
        }
    }

    /// Weights that separate the two synthetic classes exactly
    pub fn perfect(device: &B::Device) -> Self {
        let mut weights = Vec::with_capacity(VALUES * 2);
        for _ in 0..VALUES {
            weights.extend([-1.0f32, 1.0]);
        }
        let mut fc: Linear<B> = LinearConfig::new(VALUES, 2).with_bias(false).init(device);
        fc.weight = Param::from_tensor(Tensor::from_data(TensorData::new(weights, [VALUES, 2]), device));
        Self { fc }
    }
}

impl<B: Backend> ImageClassifier<B> for TinyClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, _, _, _] = images.dims();
        self.fc.forward(images.reshape([batch, VALUES]))
    }
}

/// `n` items alternating between class 0 (all -1) and class 1 (all +1)
pub(crate) fn items_of(n: usize) -> Vec<ImageItem> {
    (0..n)
        .map(|i| {
            let label = i % 2;
            let value = if label == 1 { 1.0 } else { -1.0 };
            ImageItem {
                pixels: vec![value; VALUES],
                shape: SHAPE,
                label,
            }
        })
        .collect()
}

pub(crate) fn loader_of(n: usize, batch_size: usize) -> DataLoader {
    DataLoader::new(Arc::new(InMemDataset::new(items_of(n))), batch_size).unwrap()
}
