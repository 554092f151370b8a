//! On-disk JSON manifest schemas and loading.
//!
//! Each dataset ships caption manifests (query triplets) and image-split
//! manifests (gallery contents). They are parsed into these raw shapes and
//! then adapted into [`Triplet`](crate::types::Triplet)s and
//! [`ImageRef`](crate::types::ImageRef)s by the adapter.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{DatasetError, DatasetResult};

/// FashionIQ caption triplet (`cap.{category}.{split}.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct FiqTriplet {
    pub candidate: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub captions: Vec<String>,
    /// Present in LLM-extended manifests only
    #[serde(default)]
    pub llm_caption: Option<String>,
}

/// CIRR caption triplet (`cap.rc2.{split}.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct CirrTriplet {
    pub pairid: serde_json::Value,
    pub reference: String,
    #[serde(default)]
    pub target_hard: Option<String>,
    pub caption: CirrCaption,
    pub img_set: CirrImageSet,
    /// Present in LLM-extended manifests only
    #[serde(default)]
    pub llm_caption: Option<String>,
}

/// CIRR captions are a single string in the base release and a list in extended ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CirrCaption {
    One(String),
    Many(Vec<String>),
}

impl CirrCaption {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            CirrCaption::One(caption) => vec![caption],
            CirrCaption::Many(captions) => captions,
        }
    }
}

/// CIRR candidate group of a triplet.
#[derive(Debug, Clone, Deserialize)]
pub struct CirrImageSet {
    #[serde(default)]
    pub members: Vec<String>,
}

/// WikiArt gallery record (`landscape.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct WikiartRecord {
    pub image_path: String,
}

/// Read and parse a JSON manifest.
///
/// A missing file is a [`DatasetError::ManifestNotFound`], never a default.
pub fn load_manifest<T: DeserializeOwned>(path: &Path) -> DatasetResult<T> {
    if !path.is_file() {
        return Err(DatasetError::ManifestNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| DatasetError::ManifestParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| DatasetError::ManifestParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Render a CIRR `pairid` (an integer in the release files) as a string id.
pub fn pair_id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
