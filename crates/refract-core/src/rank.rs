//! Cosine-distance ranking of query embeddings against a gallery index.

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1};

use crate::error::{Result, RetrievalError};
use crate::index::GalleryIndex;
use crate::math::{l2_normalize, l2_normalize_rows};
use crate::types::RankedItem;

/// Ranking knobs for one call.
#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    /// Number of results to return; `None` returns the whole candidate pool
    pub top_k: Option<usize>,
    /// Restrict candidates to these identifiers
    pub group_members: Option<Vec<String>>,
    /// Identifiers removed from the returned ranking
    pub exclude: Vec<String>,
}

impl RankOptions {
    pub fn top_k(k: usize) -> Self {
        Self {
            top_k: Some(k),
            ..Self::default()
        }
    }

    pub fn with_group(mut self, members: Vec<String>) -> Self {
        self.group_members = Some(members);
        self
    }

    pub fn excluding(mut self, identifier: impl Into<String>) -> Self {
        self.exclude.push(identifier.into());
        self
    }
}

/// Rank one query. Results are ordered by ascending `1 - cos` distance, ties
/// broken by gallery order.
pub fn rank(
    query: &[f32],
    gallery: &GalleryIndex,
    options: &RankOptions,
) -> Result<Vec<RankedItem>> {
    check(gallery, query.len())?;
    let query = l2_normalize(query);
    Ok(rank_normalized(ArrayView1::from(query.as_slice()), gallery, options))
}

/// Rank several queries, one ranking per query row.
///
/// Distances for every pair are computed with a single matrix product.
pub fn rank_batch(
    queries: &[Vec<f32>],
    gallery: &GalleryIndex,
    options: &RankOptions,
) -> Result<Vec<Vec<RankedItem>>> {
    if queries.is_empty() {
        return Ok(vec![]);
    }
    let dim = gallery.dim();
    check(gallery, dim)?;
    if let Some(row) = queries.iter().find(|q| q.len() != dim) {
        return Err(RetrievalError::DimensionMismatch {
            expected: dim,
            actual: row.len(),
        }
        .into());
    }

    let mut matrix = Array2::<f32>::zeros((queries.len(), dim));
    for (mut row, query) in matrix.rows_mut().into_iter().zip(queries) {
        row.assign(&ArrayView1::from(query.as_slice()));
    }
    l2_normalize_rows(&mut matrix);
    let similarities = matrix.dot(&gallery.normalized().t());

    Ok(similarities
        .rows()
        .into_iter()
        .map(|sims| order(sims, gallery, options))
        .collect())
}

/// Cosine distances from a query to every gallery row, in gallery order.
pub fn distances(query: &[f32], gallery: &GalleryIndex) -> Result<Vec<f32>> {
    check(gallery, query.len())?;
    let query = l2_normalize(query);
    Ok(gallery
        .normalized()
        .dot(&ArrayView1::from(query.as_slice()))
        .iter()
        .map(|s| 1.0 - s)
        .collect())
}

fn check(gallery: &GalleryIndex, query_dim: usize) -> Result<()> {
    if gallery.is_empty() {
        return Err(RetrievalError::EmptyGallery.into());
    }
    if query_dim != gallery.dim() {
        return Err(RetrievalError::DimensionMismatch {
            expected: gallery.dim(),
            actual: query_dim,
        }
        .into());
    }
    Ok(())
}

fn rank_normalized(
    query: ArrayView1<'_, f32>,
    gallery: &GalleryIndex,
    options: &RankOptions,
) -> Vec<RankedItem> {
    let similarities = gallery.normalized().dot(&query);
    order(similarities.view(), gallery, options)
}

fn order(
    similarities: ArrayView1<'_, f32>,
    gallery: &GalleryIndex,
    options: &RankOptions,
) -> Vec<RankedItem> {
    let identifiers = gallery.identifiers();
    let candidates: Vec<usize> = match &options.group_members {
        Some(members) => {
            let members: HashSet<&str> = members.iter().map(String::as_str).collect();
            (0..identifiers.len())
                .filter(|&i| members.contains(identifiers[i].as_str()))
                .collect()
        }
        None => (0..identifiers.len()).collect(),
    };

    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .map(|i| (i, 1.0 - similarities[i]))
        .collect();
    // Stable: equal distances keep gallery order.
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));

    let exclude: HashSet<&str> = options.exclude.iter().map(String::as_str).collect();
    let ranked = scored
        .into_iter()
        .filter(|(i, _)| !exclude.contains(identifiers[*i].as_str()))
        .map(|(i, distance)| RankedItem {
            identifier: identifiers[i].clone(),
            distance,
        });

    match options.top_k {
        Some(k) => ranked.take(k).collect(),
        None => ranked.collect(),
    }
}
