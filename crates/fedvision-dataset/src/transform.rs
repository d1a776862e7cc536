//! Evaluation-style image transform.
//!
//! Resize so the shorter side matches `resize`, center-crop a `crop` square,
//! scale to [0, 1] and normalize per channel. Output is CHW `f32`.

use fedvision_core::{Error, Result, TransformConfig};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Deterministic resize, center-crop and normalize transform
#[derive(Debug, Clone)]
pub struct ImageTransform {
    config: TransformConfig,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            config: TransformConfig::default(),
        }
    }
}

impl ImageTransform {
    pub fn new(config: TransformConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Output shape as `[channels, height, width]`
    pub fn output_shape(&self) -> [usize; 3] {
        let dims = self.config.output_dimensions();
        [dims.channels as usize, dims.height as usize, dims.width as usize]
    }

    /// Transforms one image into a normalized CHW buffer
    pub fn apply(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::Image(format!(
                "cannot transform an empty {width}x{height} image"
            )));
        }

        let resized = resize_shorter_side(image, self.config.resize);
        let cropped = center_crop(&resized, self.config.crop);
        Ok(self.normalize(&cropped))
    }

    /// Transforms a batch of images, failing on the first bad one
    pub fn apply_batch(&self, images: &[RgbImage]) -> Result<Vec<Vec<f32>>> {
        images.iter().map(|image| self.apply(image)).collect()
    }

    fn normalize(&self, image: &RgbImage) -> Vec<f32> {
        let mut output = Vec::with_capacity(self.config.output_dimensions().num_values());

        for channel in 0..3 {
            let mean = self.config.mean[channel];
            let std = self.config.std[channel];
            for pixel in image.pixels() {
                let value = pixel[channel] as f32 / 255.0;
                output.push((value - mean) / std);
            }
        }

        output
    }
}

/// Output size when the shorter side is scaled to `size`.
///
/// The longer side is truncated, matching integer resize semantics.
pub fn resized_dimensions(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width <= height {
        let long = (size as u64 * height as u64 / width as u64) as u32;
        (size, long)
    } else {
        let long = (size as u64 * width as u64 / height as u64) as u32;
        (long, size)
    }
}

/// Scales the image so its shorter side equals `size`, keeping the aspect ratio
pub fn resize_shorter_side(image: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = resized_dimensions(width, height, size);
    if (new_width, new_height) == (width, height) {
        return image.clone();
    }
    imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

/// Offset of a centered window of `crop` inside `len`, rounding halves to even
fn crop_offset(len: u32, crop: u32) -> u32 {
    ((len - crop) as f64 / 2.0).round_ties_even() as u32
}

/// Takes the centered `size`x`size` square, zero-padding when the image is smaller
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width >= size && height >= size {
        let left = crop_offset(width, size);
        let top = crop_offset(height, size);
        return imageops::crop_imm(image, left, top, size, size).to_image();
    }

    let padded_width = width.max(size);
    let padded_height = height.max(size);
    let mut padded = RgbImage::from_pixel(padded_width, padded_height, Rgb([0, 0, 0]));
    let pad_left = (padded_width - width) / 2;
    let pad_top = (padded_height - height) / 2;
    imageops::replace(&mut padded, image, pad_left as i64, pad_top as i64);

    let left = crop_offset(padded_width, size);
    let top = crop_offset(padded_height, size);
    imageops::crop_imm(&padded, left, top, size, size).to_image()
}
