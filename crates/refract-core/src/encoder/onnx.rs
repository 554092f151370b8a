//! ONNX Runtime session helpers shared by the encoder towers and the learned combiner.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use ort::session::{Session, SessionOutputs};

use crate::error::ModelError;

/// An ONNX session behind a `Mutex`, since `Session::run` requires `&mut self`.
pub(crate) struct OnnxModel {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxModel {
    /// Load a model file; a missing file is [`ModelError::NotFound`].
    pub(crate) fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let session = Session::builder()
            .map_err(|e| ModelError::Load {
                path: path.to_path_buf(),
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(path)
            .map_err(|e| ModelError::Load {
                path: path.to_path_buf(),
                message: format!("Failed to load ONNX model: {e}"),
            })?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::debug!(
            "Loaded ONNX model {:?} (inputs: {:?}, outputs: {:?})",
            path,
            input_names,
            output_names
        );

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            output_names,
        })
    }

    /// Name of the `i`-th model input, or `fallback` when the model does not declare it.
    pub(crate) fn input_name(&self, i: usize, fallback: &str) -> String {
        self.input_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Name of the `i`-th model output, or `fallback` when the model does not declare it.
    pub(crate) fn output_name(&self, i: usize, fallback: &str) -> String {
        self.output_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Session>, ModelError> {
        self.session.lock().map_err(|e| ModelError::Inference {
            message: format!("Session lock poisoned: {e}"),
        })
    }
}

/// Split a named `[N, D]` output into `N` row vectors.
pub(crate) fn output_rows(
    outputs: &SessionOutputs<'_>,
    name: &str,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, ModelError> {
    let output = outputs
        .iter()
        .find(|(output_name, _)| *output_name == name)
        .ok_or_else(|| ModelError::Inference {
            message: format!(
                "Model did not produce {name:?} (outputs: {:?})",
                outputs.iter().map(|(n, _)| n).collect::<Vec<_>>()
            ),
        })?;

    let (shape, data) = output
        .1
        .try_extract_tensor::<f32>()
        .map_err(|e| ModelError::Inference {
            message: format!("Failed to extract {name:?} tensor: {e}"),
        })?;

    let dim = match shape.len() {
        1 if batch_size > 0 => data.len() / batch_size,
        2 if shape[0] as usize == batch_size => shape[1] as usize,
        _ => {
            return Err(ModelError::Inference {
                message: format!(
                    "Unexpected {name:?} shape {:?} for a batch of {batch_size}",
                    shape
                ),
            })
        }
    };
    if dim == 0 {
        return Err(ModelError::Inference {
            message: format!("{name:?} is empty"),
        });
    }

    Ok(data.chunks(dim).take(batch_size).map(<[f32]>::to_vec).collect())
}
