//! Raw dataset sources.
//!
//! A source is an indexable, read-only collection of (image, label) pairs for
//! one named split. Sources decode on access; nothing is cached beyond what
//! the concrete source keeps in memory to begin with.

use fedvision_core::{Error, Result};
use image::RgbImage;

/// A decoded sample straight from a source
#[derive(Debug, Clone)]
pub struct RawItem {
    pub image: RgbImage,
    pub label: usize,
}

/// Indexable collection of labelled images
pub trait DatasetSource: Send + Sync + std::fmt::Debug {
    /// Number of samples
    fn len(&self) -> usize;

    /// Label of the sample at `index`
    fn label(&self, index: usize) -> Result<usize>;

    /// Decoded RGB image of the sample at `index`
    fn image(&self, index: usize) -> Result<RgbImage>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the full sample at `index`
    fn item(&self, index: usize) -> Result<RawItem> {
        Ok(RawItem {
            image: self.image(index)?,
            label: self.label(index)?,
        })
    }
}

pub(crate) fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(Error::InvalidArgument(format!(
            "index {index} out of bounds for source of {len} samples"
        )));
    }
    Ok(())
}

/// Source backed by already decoded images
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    items: Vec<RawItem>,
}

impl InMemorySource {
    pub fn new(items: Vec<RawItem>) -> Self {
        Self { items }
    }

    /// Builds a source from (image, label) pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (RgbImage, usize)>) -> Self {
        Self {
            items: pairs
                .into_iter()
                .map(|(image, label)| RawItem { image, label })
                .collect(),
        }
    }
}

impl DatasetSource for InMemorySource {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn label(&self, index: usize) -> Result<usize> {
        check_index(index, self.items.len())?;
        Ok(self.items[index].label)
    }

    fn image(&self, index: usize) -> Result<RgbImage> {
        check_index(index, self.items.len())?;
        Ok(self.items[index].image.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_in_memory_source() {
        let source = InMemorySource::from_pairs(vec![
            (RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])), 0),
            (RgbImage::from_pixel(2, 6, Rgb([4, 5, 6])), 7),
        ]);

        assert_eq!(source.len(), 2);
        assert_eq!(source.label(1).unwrap(), 7);
        assert_eq!(source.image(1).unwrap().dimensions(), (2, 6));

        let item = source.item(0).unwrap();
        assert_eq!(item.label, 0);
        assert_eq!(item.image.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_in_memory_out_of_bounds() {
        let source = InMemorySource::default();
        assert!(source.is_empty());
        assert!(matches!(source.label(0), Err(Error::InvalidArgument(_))));
    }
}
