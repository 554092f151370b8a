//! Query-time path: reference image + modification text → ranked gallery identifiers.

use std::path::Path;
use std::sync::Arc;

use crate::combiner::Combiner;
use crate::dataset::ImageLoader;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::index::GalleryIndex;
use crate::preprocess::Transform;
use crate::rank::{rank, RankOptions};
use crate::types::QueryResult;

/// Default result count for interactive queries.
pub const DEFAULT_TOP_K: usize = 5;

/// Clean a free-text query: drop every character that is not an ASCII letter,
/// ASCII digit or whitespace, lowercase, trim.
pub fn normalize_query(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Run one composed query.
///
/// The reference image is decoded, preprocessed and encoded, the normalized
/// text is encoded, both are fused by `combiner` and the result is ranked
/// against `gallery`.
pub fn inference(
    combiner: &dyn Combiner,
    encoder: &dyn Encoder,
    transform: &Transform,
    gallery: &GalleryIndex,
    image_path: &Path,
    text_query: &str,
    options: &RankOptions,
) -> Result<QueryResult> {
    let image = ImageLoader::load(image_path)?;
    let image_features = encoder.encode_image(&transform.apply(&image))?;

    let query = normalize_query(text_query);
    let text_features = encoder.encode_text(&query)?;

    let prediction = combiner.combine(&image_features, &text_features)?;
    let results = rank(&prediction, gallery, options)?;

    let reference = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| image_path.display().to_string());
    tracing::debug!("{} + {:?}: {} results", reference, query, results.len());

    Ok(QueryResult {
        reference,
        query,
        results,
    })
}

/// A ready-to-query bundle of models and a built gallery.
///
/// Everything is read-only after construction, so one retriever can serve
/// concurrent callers.
pub struct Retriever {
    encoder: Arc<dyn Encoder>,
    combiner: Arc<dyn Combiner>,
    transform: Transform,
    gallery: Arc<GalleryIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        combiner: Arc<dyn Combiner>,
        transform: Transform,
        gallery: Arc<GalleryIndex>,
    ) -> Self {
        Self {
            encoder,
            combiner,
            transform,
            gallery,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn gallery(&self) -> &GalleryIndex {
        &self.gallery
    }

    /// Top-K gallery identifiers for `image_path` modified by `text_query`.
    pub fn search(&self, image_path: &Path, text_query: &str) -> Result<QueryResult> {
        inference(
            self.combiner.as_ref(),
            self.encoder.as_ref(),
            &self.transform,
            &self.gallery,
            image_path,
            text_query,
            &RankOptions::top_k(self.top_k),
        )
    }
}
