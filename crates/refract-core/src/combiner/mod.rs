//! Fusion of an image embedding and a text embedding into one query embedding.
//!
//! Two strategies are available:
//! - [`ElementWiseSum`]: normalize both inputs, add, optionally renormalize
//! - [`LearnedCombiner`]: a trained fusion network exported to ONNX
//!
//! Both accept batches and return one query per input row, in input order.

mod learned;
mod sum;

pub use learned::LearnedCombiner;
pub use sum::ElementWiseSum;

use std::path::Path;

use crate::config::CombinerConfig;
use crate::error::{ConfigError, ModelError, Result, RetrievalError};
use crate::types::Embedding;

/// Fuses `(image, text)` embedding pairs into query embeddings.
pub trait Combiner: Send + Sync {
    /// Combine `N` image and `N` text embeddings into `N` queries, row by row.
    fn combine_batch(&self, images: &[Embedding], texts: &[Embedding]) -> Result<Vec<Embedding>>;

    /// Combine a single pair.
    fn combine(&self, image: &[f32], text: &[f32]) -> Result<Embedding> {
        let mut rows = self.combine_batch(&[image.to_vec()], &[text.to_vec()])?;
        rows.pop().ok_or_else(|| {
            ModelError::Inference {
                message: "combiner returned no query".to_string(),
            }
            .into()
        })
    }

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Build the configured combiner.
///
/// `path` is the resolved snapshot location for the learned strategy.
pub fn load_combiner(config: &CombinerConfig, path: Option<&Path>) -> Result<Box<dyn Combiner>> {
    match config.strategy.as_str() {
        "sum" => Ok(Box::new(ElementWiseSum::new(config.renormalize))),
        "combiner" => {
            let path = path.ok_or_else(|| {
                ConfigError::ValidationError(
                    "combiner.path is required for the learned combiner".to_string(),
                )
            })?;
            Ok(Box::new(LearnedCombiner::load(path)?))
        }
        other => Err(ConfigError::ValidationError(format!(
            "combiner.strategy must be sum or combiner; got {other:?}"
        ))
        .into()),
    }
}

/// Check that a batch is aligned and every row shares one dimension.
///
/// Returns that dimension (0 for an empty batch).
pub(crate) fn check_batch(images: &[Embedding], texts: &[Embedding]) -> Result<usize> {
    if images.len() != texts.len() {
        return Err(RetrievalError::BatchMismatch {
            images: images.len(),
            texts: texts.len(),
        }
        .into());
    }
    let Some(dim) = images.first().map(Vec::len) else {
        return Ok(0);
    };
    if let Some(row) = images.iter().chain(texts).find(|row| row.len() != dim) {
        return Err(RetrievalError::DimensionMismatch {
            expected: dim,
            actual: row.len(),
        }
        .into());
    }
    Ok(dim)
}
