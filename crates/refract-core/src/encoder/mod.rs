//! Image and text encoders into a shared embedding space.
//!
//! The core only depends on the [`Encoder`] contract. [`ClipEncoder`] is the
//! shipped implementation: a CLIP visual tower, text tower and tokenizer
//! exported to ONNX and run locally via ONNX Runtime.
//!
//! # Usage
//!
//! ```rust,ignore
//! use refract_core::encoder::{ClipEncoder, Encoder};
//! use refract_core::Config;
//!
//! let config = Config::default();
//! let encoder = ClipEncoder::load(&config.encoder, &config.model_dir())?;
//! let texts = encoder.encode_texts(&["is red and has sleeves".to_string()])?;
//! ```

mod clip;
pub(crate) mod onnx;

pub use clip::ClipEncoder;

use ndarray::Array3;

use crate::error::Result;
use crate::types::Embedding;

/// Maps preprocessed images and captions into one embedding space.
///
/// Outputs are raw features; normalization is left to the combiner and ranker.
/// Implementations must be deterministic for identical inputs and keep row order.
pub trait Encoder: Send + Sync {
    /// Length of every returned embedding.
    fn embedding_dim(&self) -> usize;

    /// Square input resolution expected by [`encode_images`](Self::encode_images).
    fn image_size(&self) -> u32;

    /// Encode `(3, size, size)` tensors, one embedding per tensor.
    fn encode_images(&self, images: &[Array3<f32>]) -> Result<Vec<Embedding>>;

    /// Encode captions, one embedding per caption.
    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Encode a single image tensor.
    fn encode_image(&self, image: &Array3<f32>) -> Result<Embedding> {
        let mut rows = self.encode_images(std::slice::from_ref(image))?;
        rows.pop().ok_or_else(|| empty_output("image"))
    }

    /// Encode a single caption.
    fn encode_text(&self, text: &str) -> Result<Embedding> {
        let mut rows = self.encode_texts(&[text.to_string()])?;
        rows.pop().ok_or_else(|| empty_output("text"))
    }
}

fn empty_output(kind: &str) -> crate::error::RefractError {
    crate::error::ModelError::Inference {
        message: format!("{kind} encoder returned no embedding"),
    }
    .into()
}
