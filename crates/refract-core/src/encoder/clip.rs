//! CLIP visual and text towers exported to ONNX.

use std::path::{Path, PathBuf};

use ndarray::Array3;
use ort::value::Value;

use crate::config::EncoderConfig;
use crate::error::{ModelError, Result, RetrievalError};
use crate::types::Embedding;

use super::onnx::{output_rows, OnnxModel};
use super::Encoder;

const VISUAL_MODEL_FILENAME: &str = "visual.onnx";
const TEXT_MODEL_FILENAME: &str = "text.onnx";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// CLIP encoder: `visual.onnx`, `text.onnx` and `tokenizer.json` under one
/// model directory.
pub struct ClipEncoder {
    visual: OnnxModel,
    text: OnnxModel,
    tokenizer: tokenizers::Tokenizer,
    image_size: u32,
    embedding_dim: usize,
    context_length: usize,
    image_output: String,
    text_output: String,
}

impl ClipEncoder {
    /// Load the encoder from `{model_dir}/{config.model}/`.
    pub fn load(config: &EncoderConfig, model_dir: &Path) -> std::result::Result<Self, ModelError> {
        let dir = Self::model_path(config, model_dir);
        tracing::info!("Loading CLIP {} from {:?}", config.model, dir);

        let visual = OnnxModel::load(&dir.join(VISUAL_MODEL_FILENAME))?;
        let text = OnnxModel::load(&dir.join(TEXT_MODEL_FILENAME))?;

        let tokenizer_path = dir.join(TOKENIZER_FILENAME);
        if !tokenizer_path.exists() {
            return Err(ModelError::NotFound {
                path: tokenizer_path,
            });
        }
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            ModelError::Load {
                path: tokenizer_path.clone(),
                message: format!("Failed to load tokenizer: {e}"),
            }
        })?;

        tracing::info!("CLIP {} loaded", config.model);
        Ok(Self {
            visual,
            text,
            tokenizer,
            image_size: config.image_size,
            embedding_dim: config.embedding_dim,
            context_length: config.context_length,
            image_output: config.image_output.clone(),
            text_output: config.text_output.clone(),
        })
    }

    /// Directory holding the model files.
    pub fn model_path(config: &EncoderConfig, model_dir: &Path) -> PathBuf {
        model_dir.join(&config.model)
    }

    /// Check whether every model file exists on disk.
    pub fn model_exists(config: &EncoderConfig, model_dir: &Path) -> bool {
        let dir = Self::model_path(config, model_dir);
        [VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME]
            .iter()
            .all(|f| dir.join(f).exists())
    }

    fn check_dims(&self, rows: Vec<Vec<f32>>) -> Result<Vec<Embedding>> {
        if let Some(row) = rows.iter().find(|r| r.len() != self.embedding_dim) {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: row.len(),
            }
            .into());
        }
        Ok(rows)
    }
}

impl Encoder for ClipEncoder {
    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn encode_images(&self, images: &[Array3<f32>]) -> Result<Vec<Embedding>> {
        let batch_size = images.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let size = self.image_size as usize;
        let expected = [3, size, size];
        if let Some(bad) = images.iter().find(|t| t.shape() != expected) {
            return Err(ModelError::Inference {
                message: format!(
                    "Image tensor shape {:?} does not match {:?}",
                    bad.shape(),
                    expected
                ),
            }
            .into());
        }

        // Stack into one [N, 3, H, W] tensor for a single ONNX call.
        let mut flat = Vec::with_capacity(batch_size * 3 * size * size);
        for tensor in images {
            flat.extend(tensor.iter().copied());
        }
        let shape = vec![batch_size as i64, 3, size as i64, size as i64];
        let input = Value::from_array((shape, flat)).map_err(|e| ModelError::Inference {
            message: format!("Failed to create image tensor: {e}"),
        })?;

        let input_name = self.visual.input_name(0, "pixel_values");
        let mut session = self.visual.lock()?;
        let outputs = session
            .run(ort::inputs![input_name.as_str() => input])
            .map_err(|e| ModelError::Inference {
                message: format!("Visual encoder inference failed: {e}"),
            })?;
        let rows = output_rows(&outputs, &self.image_output, batch_size)?;

        tracing::trace!("Encoded {} images", batch_size);
        self.check_dims(rows)
    }

    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let batch_size = texts.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::Inference {
                message: format!("Tokenization failed: {e}"),
            })?;

        let input_ids = pack_token_ids(
            encodings.iter().map(|e| e.get_ids()),
            batch_size,
            self.context_length,
        );
        let shape = vec![batch_size as i64, self.context_length as i64];
        let input = Value::from_array((shape, input_ids)).map_err(|e| ModelError::Inference {
            message: format!("Failed to create token tensor: {e}"),
        })?;

        let input_name = self.text.input_name(0, "input_ids");
        let mut session = self.text.lock()?;
        let outputs = session
            .run(ort::inputs![input_name.as_str() => input])
            .map_err(|e| ModelError::Inference {
                message: format!("Text encoder inference failed: {e}"),
            })?;
        let rows = output_rows(&outputs, &self.text_output, batch_size)?;

        tracing::trace!("Encoded {} captions", batch_size);
        self.check_dims(rows)
    }
}

/// Pack token ids into a zero-padded `[batch, context_length]` buffer.
///
/// Over-long sequences are truncated with their final (end-of-text) token kept.
fn pack_token_ids<'a>(
    sequences: impl Iterator<Item = &'a [u32]>,
    batch_size: usize,
    context_length: usize,
) -> Vec<i64> {
    let mut packed = vec![0i64; batch_size * context_length];
    for (i, ids) in sequences.enumerate().take(batch_size) {
        let row = &mut packed[i * context_length..(i + 1) * context_length];
        for (slot, &id) in row.iter_mut().zip(ids) {
            *slot = id as i64;
        }
        if ids.len() > context_length && context_length > 0 {
            if let Some(&last) = ids.last() {
                row[context_length - 1] = last as i64;
            }
        }
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_pads_with_zeros() {
        let a: &[u32] = &[49406, 320, 49407];
        let b: &[u32] = &[49406, 49407];
        let packed = pack_token_ids([a, b].into_iter(), 2, 5);
        assert_eq!(packed, vec![49406, 320, 49407, 0, 0, 49406, 49407, 0, 0, 0]);
    }

    #[test]
    fn test_pack_truncation_keeps_end_token() {
        let long: &[u32] = &[49406, 1, 2, 3, 4, 49407];
        let packed = pack_token_ids([long].into_iter(), 1, 4);
        assert_eq!(packed, vec![49406, 1, 2, 49407]);
    }

    #[test]
    fn test_missing_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncoderConfig::default();
        assert!(!ClipEncoder::model_exists(&config, dir.path()));
        match ClipEncoder::load(&config, dir.path()) {
            Err(ModelError::NotFound { path }) => {
                assert!(path.ends_with(format!("{}/visual.onnx", config.model)));
            }
            Err(other) => panic!("expected NotFound, got {other}"),
            Ok(_) => panic!("expected NotFound"),
        }
    }
}
