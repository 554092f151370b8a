//! The in-memory gallery index.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1};

use crate::error::{Result, RetrievalError};
use crate::math::l2_normalize_rows;
use crate::types::Embedding;

/// Gallery identifiers and their embeddings, row `i` belonging to identifier `i`.
///
/// Read-only once built, so it can be shared across concurrent rank calls.
/// Raw embeddings are kept as produced by the encoder; a unit-norm copy is
/// cached for ranking.
#[derive(Debug, Clone)]
pub struct GalleryIndex {
    identifiers: Vec<String>,
    embeddings: Array2<f32>,
    normalized: Array2<f32>,
    positions: HashMap<String, usize>,
}

impl GalleryIndex {
    /// Build from identifier and embedding rows of equal length.
    ///
    /// `dim` fixes the embedding width even when the gallery is empty.
    pub fn new(identifiers: Vec<String>, embeddings: Vec<Embedding>, dim: usize) -> Result<Self> {
        if identifiers.len() != embeddings.len() {
            return Err(RetrievalError::BatchMismatch {
                images: identifiers.len(),
                texts: embeddings.len(),
            }
            .into());
        }
        if let Some(row) = embeddings.iter().find(|row| row.len() != dim) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dim,
                actual: row.len(),
            }
            .into());
        }

        let rows = embeddings.len();
        let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
        let len = flat.len();
        let matrix = Array2::from_shape_vec((rows, dim), flat).map_err(|_| {
            RetrievalError::DimensionMismatch {
                expected: rows * dim,
                actual: len,
            }
        })?;
        Self::from_matrix(identifiers, matrix)
    }

    /// Build from an `[N, D]` matrix.
    pub fn from_matrix(identifiers: Vec<String>, embeddings: Array2<f32>) -> Result<Self> {
        if identifiers.len() != embeddings.nrows() {
            return Err(RetrievalError::BatchMismatch {
                images: identifiers.len(),
                texts: embeddings.nrows(),
            }
            .into());
        }

        let mut positions = HashMap::with_capacity(identifiers.len());
        for (i, identifier) in identifiers.iter().enumerate() {
            if positions.insert(identifier.clone(), i).is_some() {
                return Err(RetrievalError::DuplicateIdentifier(identifier.clone()).into());
            }
        }

        let mut normalized = embeddings.clone();
        l2_normalize_rows(&mut normalized);

        Ok(Self {
            identifiers,
            embeddings,
            normalized,
            positions,
        })
    }

    /// An index with no rows.
    pub fn empty(dim: usize) -> Self {
        Self {
            identifiers: Vec::new(),
            embeddings: Array2::zeros((0, dim)),
            normalized: Array2::zeros((0, dim)),
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Embedding width.
    pub fn dim(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Identifiers in index order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Raw `[N, D]` embedding matrix.
    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    /// Unit-norm copy of the embedding matrix.
    pub fn normalized(&self) -> &Array2<f32> {
        &self.normalized
    }

    /// Row of an identifier.
    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.positions.get(identifier).copied()
    }

    /// Raw embedding of an identifier.
    pub fn embedding(&self, identifier: &str) -> Option<ArrayView1<'_, f32>> {
        self.position(identifier).map(|i| self.embeddings.row(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefractError;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rows_align_with_identifiers() {
        let index = GalleryIndex::new(
            ids(&["a", "b"]),
            vec![vec![3.0, 4.0], vec![0.0, 2.0]],
            2,
        )
        .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dim(), 2);
        assert_eq!(index.position("b"), Some(1));
        assert_eq!(index.embedding("a").unwrap().to_vec(), vec![3.0, 4.0]);
        assert_eq!(index.normalized().row(0).to_vec(), vec![0.6, 0.8]);
        assert_eq!(index.normalized().row(1).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = GalleryIndex::new(ids(&["a", "a"]), vec![vec![1.0], vec![2.0]], 1).unwrap_err();
        assert!(matches!(
            err,
            RefractError::Retrieval(RetrievalError::DuplicateIdentifier(ref id)) if id == "a"
        ));
    }

    #[test]
    fn test_dimension_checked() {
        let err = GalleryIndex::new(ids(&["a"]), vec![vec![1.0, 2.0, 3.0]], 2).unwrap_err();
        assert!(matches!(
            err,
            RefractError::Retrieval(RetrievalError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_empty_index_keeps_dim() {
        let index = GalleryIndex::empty(640);
        assert!(index.is_empty());
        assert_eq!(index.dim(), 640);
        let built = GalleryIndex::new(vec![], vec![], 8).unwrap();
        assert_eq!(built.dim(), 8);
    }
}
