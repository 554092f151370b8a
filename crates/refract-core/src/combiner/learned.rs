use std::path::Path;

use ort::value::Value;

use crate::encoder::onnx::{output_rows, OnnxModel};
use crate::error::{ModelError, Result};
use crate::types::Embedding;

use super::{check_batch, Combiner};

/// Trained fusion network loaded from an ONNX snapshot.
///
/// The model takes two `[N, D]` inputs (image features first, text features
/// second) and produces one `[N, D]` output of query features.
pub struct LearnedCombiner {
    model: OnnxModel,
}

impl LearnedCombiner {
    pub fn load(path: &Path) -> std::result::Result<Self, ModelError> {
        tracing::info!("Loading combiner from {:?}", path);
        let model = OnnxModel::load(path)?;
        Ok(Self { model })
    }
}

impl Combiner for LearnedCombiner {
    fn combine_batch(&self, images: &[Embedding], texts: &[Embedding]) -> Result<Vec<Embedding>> {
        let dim = check_batch(images, texts)?;
        let batch_size = images.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let shape = vec![batch_size as i64, dim as i64];
        let to_tensor = |rows: &[Embedding], what: &str| {
            let flat: Vec<f32> = rows.iter().flatten().copied().collect();
            Value::from_array((shape.clone(), flat)).map_err(|e| ModelError::Inference {
                message: format!("Failed to create {what} tensor: {e}"),
            })
        };
        let image_input = to_tensor(images, "image feature")?;
        let text_input = to_tensor(texts, "text feature")?;

        let image_name = self.model.input_name(0, "image_features");
        let text_name = self.model.input_name(1, "text_features");
        let output_name = self.model.output_name(0, "query_features");

        let mut session = self.model.lock()?;
        let outputs = session
            .run(ort::inputs![
                image_name.as_str() => image_input,
                text_name.as_str() => text_input
            ])
            .map_err(|e| ModelError::Inference {
                message: format!("Combiner inference failed: {e}"),
            })?;

        Ok(output_rows(&outputs, &output_name, batch_size)?)
    }

    fn name(&self) -> &'static str {
        "combiner"
    }
}
