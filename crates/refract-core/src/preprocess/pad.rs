//! Zero-padding policies applied before resize and crop.

use image::{DynamicImage, RgbImage};

/// How an image is padded before the fixed-size resize/crop stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadPolicy {
    /// Pad the shorter side until the image is square.
    Square,
    /// Pad only when `max/min >= ratio`, and only up to `ratio`.
    TargetRatio(f32),
}

impl PadPolicy {
    /// Horizontal and vertical padding (per side) for a `width × height` image.
    pub fn padding(&self, width: u32, height: u32) -> (u32, u32) {
        let max_wh = width.max(height);
        let min_wh = width.min(height);
        match *self {
            PadPolicy::Square => ((max_wh - width) / 2, (max_wh - height) / 2),
            PadPolicy::TargetRatio(target_ratio) => {
                if min_wh == 0 {
                    return (0, 0);
                }
                let actual_ratio = max_wh as f32 / min_wh as f32;
                if actual_ratio < target_ratio {
                    return (0, 0);
                }
                let scaled_max_wh = max_wh as f32 / target_ratio;
                let hp = ((scaled_max_wh - width as f32) / 2.0) as i64;
                let vp = ((scaled_max_wh - height as f32) / 2.0) as i64;
                (hp.max(0) as u32, vp.max(0) as u32)
            }
        }
    }

    /// Apply the policy, returning an RGB image with zero-valued borders.
    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let (hp, vp) = self.padding(width, height);
        if hp == 0 && vp == 0 {
            return DynamicImage::ImageRgb8(rgb);
        }

        let mut canvas = RgbImage::new(width + 2 * hp, height + 2 * vp);
        image::imageops::replace(&mut canvas, &rgb, hp as i64, vp as i64);
        DynamicImage::ImageRgb8(canvas)
    }
}
