//! Deterministic image preprocessing for the visual encoder.
//!
//! Every image goes through the same stages:
//! pad (square or target-ratio) → resize shorter side to `dim` (bicubic)
//! → center-crop `dim × dim` → RGB → scale to \[0, 1\] → per-channel normalize.
//!
//! The output is a CHW tensor of shape `(3, dim, dim)` regardless of the
//! input aspect ratio.

mod pad;

pub use pad::PadPolicy;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::Array3;

use crate::config::PreprocessConfig;
use crate::error::ConfigError;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Configured preprocessing transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pad: PadPolicy,
    dim: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Transform {
    /// Create a transform with explicit normalization constants.
    pub fn new(pad: PadPolicy, dim: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            pad,
            dim,
            mean,
            std,
        }
    }

    /// Build a transform from configuration for an encoder with input size `dim`.
    pub fn from_config(config: &PreprocessConfig, dim: u32) -> Result<Self, ConfigError> {
        let pad = match config.transform.as_str() {
            "targetpad" => PadPolicy::TargetRatio(config.target_ratio),
            "squarepad" => PadPolicy::Square,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "preprocess.transform must be \"targetpad\" or \"squarepad\", got {other:?}"
                )))
            }
        };
        Ok(Self::new(pad, dim, config.mean, config.std))
    }

    /// Output side length.
    pub fn dim(&self) -> u32 {
        self.dim
    }

    /// Padding policy in use.
    pub fn pad_policy(&self) -> PadPolicy {
        self.pad
    }

    /// Transform a decoded image into a normalized `(3, dim, dim)` tensor.
    pub fn apply(&self, image: &DynamicImage) -> Array3<f32> {
        let padded = self.pad.apply(image);
        let resized = resize_shorter_side(&padded, self.dim);
        let cropped = center_crop(&resized, self.dim);
        let rgb = cropped.to_rgb8();

        let size = self.dim as usize;
        let mut tensor = Array3::<f32>::zeros((CHANNELS, size, size));

        // Fill the contiguous CHW buffer directly from the packed RGB bytes.
        let raw = rgb.as_raw();
        if let Some(tensor_data) = tensor.as_slice_mut() {
            for (i, pixel) in raw.chunks_exact(CHANNELS).enumerate() {
                for (c, &val) in pixel.iter().enumerate() {
                    tensor_data[c * size * size + i] =
                        (val as f32 / 255.0 - self.mean[c]) / self.std[c];
                }
            }
        }

        tensor
    }
}

/// Resize so the shorter side equals `dim`, keeping aspect ratio.
fn resize_shorter_side(image: &DynamicImage, dim: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = if width <= height {
        (dim, ((dim as u64 * height as u64) / width.max(1) as u64) as u32)
    } else {
        (((dim as u64 * width as u64) / height.max(1) as u64) as u32, dim)
    };
    let (new_w, new_h) = (new_w.max(dim), new_h.max(dim));
    if (new_w, new_h) == (width, height) {
        return image.clone();
    }
    image.resize_exact(new_w, new_h, FilterType::CatmullRom)
}

/// Crop the central `dim × dim` region.
fn center_crop(image: &DynamicImage, dim: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let left = ((width.saturating_sub(dim)) as f32 / 2.0).round() as u32;
    let top = ((height.saturating_sub(dim)) as f32 / 2.0).round() as u32;
    image.crop_imm(left, top, dim, dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CLIP_MEAN, CLIP_STD};
    use image::{Rgb, RgbImage};

    fn transform(pad: PadPolicy, dim: u32) -> Transform {
        Transform::new(pad, dim, CLIP_MEAN, CLIP_STD)
    }

    #[test]
    fn test_output_shape_for_any_aspect_ratio() {
        let sizes = [(640, 480), (480, 640), (1000, 10), (10, 1000), (1, 1), (288, 288)];
        for pad in [PadPolicy::Square, PadPolicy::TargetRatio(1.25)] {
            let t = transform(pad, 32);
            for (w, h) in sizes {
                let img = DynamicImage::ImageRgb8(RgbImage::new(w, h));
                let tensor = t.apply(&img);
                assert_eq!(tensor.shape(), &[3, 32, 32], "{pad:?} {w}x{h}");
            }
        }
    }

    #[test]
    fn test_normalization_constants() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 255])));
        let tensor = transform(PadPolicy::Square, 8).apply(&img);

        let red = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        let green = (0.0 - CLIP_MEAN[1]) / CLIP_STD[1];
        assert!((tensor[[0, 4, 4]] - red).abs() < 1e-5);
        assert!((tensor[[1, 4, 4]] - green).abs() < 1e-5);
    }

    #[test]
    fn test_square_pad_borders_are_zero_pixels() {
        // A wide white strip: padding rows must normalize to the value of black.
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 16, Rgb([255, 255, 255])));
        let tensor = transform(PadPolicy::Square, 16).apply(&img);
        let black_red = (0.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        assert!((tensor[[0, 0, 8]] - black_red).abs() < 1e-5);
        assert!(tensor[[0, 8, 8]] > 1.0);
    }

    #[test]
    fn test_deterministic() {
        let mut img = RgbImage::new(50, 30);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 5) as u8, (y * 7) as u8, ((x + y) * 3) as u8]);
        }
        let img = DynamicImage::ImageRgb8(img);
        let t = transform(PadPolicy::TargetRatio(1.25), 24);
        assert_eq!(t.apply(&img), t.apply(&img));
    }

    #[test]
    fn test_from_config_rejects_unknown_transform() {
        let config = PreprocessConfig {
            transform: "clip".to_string(),
            ..PreprocessConfig::default()
        };
        let err = Transform::from_config(&config, 224).unwrap_err();
        assert!(err.to_string().contains("preprocess.transform"));
    }

    #[test]
    fn test_from_config_target_ratio() {
        let t = Transform::from_config(&PreprocessConfig::default(), 288).unwrap();
        assert_eq!(t.pad_policy(), PadPolicy::TargetRatio(1.25));
        assert_eq!(t.dim(), 288);
    }
}
