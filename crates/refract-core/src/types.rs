//! Core data types shared across datasets, indexing and ranking.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A fixed-length embedding produced by an encoder or combiner.
///
/// Embeddings are only comparable to embeddings from the same encoder
/// configuration.
pub type Embedding = Vec<f32>;

/// An image within a dataset split: its identifier and resolved file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Unique name of the image within the split
    pub identifier: String,

    /// Absolute (data-root resolved) image path
    pub path: PathBuf,
}

impl ImageRef {
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
        }
    }
}

/// A composed query unit: reference image, optional target, and captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    /// Image the modification text applies to
    pub reference: ImageRef,

    /// Ground-truth target (absent for test splits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ImageRef>,

    /// Modification captions in annotator order
    pub captions: Vec<String>,

    /// Query identifier assigned by the dataset (CIRR `pairid`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<String>,

    /// Restricted candidate set for constrained ranking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_members: Option<Vec<String>>,
}

/// A single ranked gallery item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    /// Gallery identifier
    pub identifier: String,

    /// Cosine distance (`1 - cosine similarity`) to the query
    pub distance: f32,
}

/// Output of a single composed query, suitable for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Reference image the query started from
    pub reference: String,

    /// Modification text as sent to the encoder
    pub query: String,

    /// Ranked results, closest first
    pub results: Vec<RankedItem>,
}

impl QueryResult {
    /// Identifiers only, in rank order.
    pub fn identifiers(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.identifier.as_str()).collect()
    }
}
