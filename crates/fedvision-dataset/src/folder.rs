//! Image-folder dataset source.
//!
//! The split directory should be structured as:
//! ```text
//! root/<split>/
//! ├── airplane/
//! │   ├── 0001.png
//! │   └── 0002.png
//! ├── automobile/
//! │   └── ...
//! └── ...
//! ```
//! Class ids follow the sorted order of the class directory names.

use std::path::{Path, PathBuf};

use fedvision_core::{DataSplit, Error, Result};
use image::RgbImage;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::source::{check_index, DatasetSource};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// One split of an image-folder dataset, decoded lazily from disk
#[derive(Debug, Clone)]
pub struct ImageFolderSource {
    samples: Vec<(PathBuf, usize)>,
    classes: Vec<String>,
}

impl ImageFolderSource {
    /// Scans `root/<split>` for class directories
    pub fn load(root: &Path, split: DataSplit) -> Result<Self> {
        Self::scan(&root.join(split.to_string()))
    }

    /// Scans a directory whose children are class directories
    pub fn scan(split_dir: &Path) -> Result<Self> {
        if !split_dir.is_dir() {
            return Err(Error::NotFound(format!(
                "Dataset directory does not exist: {}",
                split_dir.display()
            )));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(split_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let mut files: Vec<PathBuf> = WalkDir::new(split_dir.join(class_name))
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|path| is_image(path))
                .collect();
            files.sort();

            debug!("Class {} ({}): {} images", label, class_name, files.len());
            samples.extend(files.into_iter().map(|path| (path, label)));
        }

        info!(
            "Found {} images in {} classes under {}",
            samples.len(),
            classes.len(),
            split_dir.display()
        );

        Ok(Self { samples, classes })
    }

    /// Class names indexed by label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

impl DatasetSource for ImageFolderSource {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn label(&self, index: usize) -> Result<usize> {
        check_index(index, self.samples.len())?;
        Ok(self.samples[index].1)
    }

    fn image(&self, index: usize) -> Result<RgbImage> {
        check_index(index, self.samples.len())?;
        let path = &self.samples[index].0;
        let image = image::open(path)
            .map_err(|e| Error::Image(format!("Failed to load image {}: {}", path.display(), e)))?;
        Ok(image.to_rgb8())
    }
}
