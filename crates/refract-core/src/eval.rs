//! Validation recall metrics over a relative-mode split.
//!
//! Reference features come from the gallery index (the reference images are
//! gallery members), captions are encoded in batches, each pair is fused by
//! the combiner and ranked against the gallery.
//!
//! - FashionIQ: R@10, R@50
//! - CIRR: R@1, R@5, R@10, R@50 with the reference removed from the ranking,
//!   plus group recall R_s@1, R_s@2, R_s@3 over each query's group members

use std::fmt;

use serde::Serialize;

use crate::combiner::Combiner;
use crate::dataset::{DatasetName, QueryDataset, RelativeItem, SplitKind, ValQuery};
use crate::encoder::Encoder;
use crate::error::{DatasetError, Result};
use crate::index::GalleryIndex;
use crate::rank::{rank, RankOptions};

/// Which cutoffs and exclusions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalProtocol {
    FashionIq,
    Cirr,
}

impl EvalProtocol {
    pub fn for_dataset(name: &DatasetName) -> Option<Self> {
        match name {
            DatasetName::FashionIq(_) => Some(Self::FashionIq),
            DatasetName::Cirr => Some(Self::Cirr),
            DatasetName::Wikiart | DatasetName::Folder => None,
        }
    }

    fn cutoffs(&self) -> &'static [usize] {
        match self {
            Self::FashionIq => &[10, 50],
            Self::Cirr => &[1, 5, 10, 50],
        }
    }

    fn group_cutoffs(&self) -> &'static [usize] {
        match self {
            Self::FashionIq => &[],
            Self::Cirr => &[1, 2, 3],
        }
    }

    fn excludes_reference(&self) -> bool {
        matches!(self, Self::Cirr)
    }
}

/// Recall at one cutoff, as a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recall {
    pub k: usize,
    pub value: f32,
}

/// Metrics for one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallReport {
    pub queries: usize,
    pub recall: Vec<Recall>,
    pub group_recall: Vec<Recall>,
}

impl RecallReport {
    /// Recall at `k`, if that cutoff was measured.
    pub fn at(&self, k: usize) -> Option<f32> {
        self.recall.iter().find(|r| r.k == k).map(|r| r.value)
    }

    /// Group recall at `k`, if that cutoff was measured.
    pub fn group_at(&self, k: usize) -> Option<f32> {
        self.group_recall.iter().find(|r| r.k == k).map(|r| r.value)
    }

    /// Mean of the plain recall values.
    pub fn mean(&self) -> f32 {
        if self.recall.is_empty() {
            return 0.0;
        }
        self.recall.iter().map(|r| r.value).sum::<f32>() / self.recall.len() as f32
    }
}

impl fmt::Display for RecallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .recall
            .iter()
            .map(|r| format!("R@{} = {:.2}", r.k, r.value))
            .chain(
                self.group_recall
                    .iter()
                    .map(|r| format!("R_s@{} = {:.2}", r.k, r.value)),
            )
            .collect();
        write!(f, "{} ({} queries)", parts.join(", "), self.queries)
    }
}

/// Evaluation settings.
#[derive(Debug, Clone)]
pub struct Evaluator {
    protocol: EvalProtocol,
    batch_size: usize,
    /// Ranking depth; `None` ranks the whole gallery
    depth: Option<usize>,
}

impl Evaluator {
    pub fn new(protocol: EvalProtocol) -> Self {
        Self {
            protocol,
            batch_size: 32,
            depth: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_depth(mut self, depth: Option<usize>) -> Self {
        self.depth = depth;
        self
    }

    /// Run the protocol over a validation split.
    pub fn evaluate(
        &self,
        queries: &QueryDataset,
        gallery: &GalleryIndex,
        encoder: &dyn Encoder,
        combiner: &dyn Combiner,
    ) -> Result<RecallReport> {
        if queries.split() != SplitKind::Val {
            return Err(DatasetError::Configuration(format!(
                "recall needs the val split; got {}",
                queries.split()
            ))
            .into());
        }

        let items = queries
            .iter()
            .map(|item| -> Result<ValQuery> {
                match item? {
                    RelativeItem::Val(query) => Ok(query),
                    _ => Err(
                        DatasetError::Configuration("expected validation items".into()).into(),
                    ),
                }
            })
            .collect::<Result<Vec<ValQuery>>>()?;

        let mut hits = vec![0usize; self.protocol.cutoffs().len()];
        let mut group_hits = vec![0usize; self.protocol.group_cutoffs().len()];

        for (batch_index, batch) in items.chunks(self.batch_size).enumerate() {
            let references = batch
                .iter()
                .map(|q| -> Result<Vec<f32>> {
                    gallery
                        .embedding(&q.reference)
                        .map(|row| row.to_vec())
                        .ok_or_else(|| {
                            DatasetError::UnknownIdentifier {
                                identifier: q.reference.clone(),
                                manifest: Default::default(),
                            }
                            .into()
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let captions: Vec<String> = batch.iter().map(|q| q.caption.clone()).collect();
            let texts = encoder.encode_texts(&captions)?;
            let predictions = combiner.combine_batch(&references, &texts)?;

            for (query, prediction) in batch.iter().zip(&predictions) {
                let mut options = RankOptions {
                    top_k: self.depth,
                    ..RankOptions::default()
                };
                if self.protocol.excludes_reference() {
                    options.exclude.push(query.reference.clone());
                }
                let ranked = rank(prediction, gallery, &options)?;
                let position = ranked.iter().position(|r| r.identifier == query.target);
                count_hits(&mut hits, self.protocol.cutoffs(), position);

                if let (Some(members), false) =
                    (&query.group_members, self.protocol.group_cutoffs().is_empty())
                {
                    let group_options = options.clone().with_group(members.clone());
                    let group = rank(prediction, gallery, &group_options)?;
                    let position = group.iter().position(|r| r.identifier == query.target);
                    count_hits(&mut group_hits, self.protocol.group_cutoffs(), position);
                }
            }
            tracing::debug!("Evaluated batch {} ({} queries)", batch_index, batch.len());
        }

        let total = items.len();
        let to_recall = |cutoffs: &[usize], hits: &[usize]| -> Vec<Recall> {
            cutoffs
                .iter()
                .zip(hits)
                .map(|(&k, &h)| Recall {
                    k,
                    value: if total == 0 {
                        0.0
                    } else {
                        h as f32 / total as f32 * 100.0
                    },
                })
                .collect()
        };
        let report = RecallReport {
            queries: total,
            recall: to_recall(self.protocol.cutoffs(), &hits),
            group_recall: to_recall(self.protocol.group_cutoffs(), &group_hits),
        };
        tracing::info!("{} {}: {}", queries.name(), queries.split(), report);
        Ok(report)
    }
}

fn count_hits(hits: &mut [usize], cutoffs: &[usize], position: Option<usize>) {
    if let Some(position) = position {
        for (hit, &k) in hits.iter_mut().zip(cutoffs) {
            if position < k {
                *hit += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::ElementWiseSum;
    use crate::dataset::{DatasetOptions, FiqCategory, NoSnapshot};
    use crate::types::{Embedding, ImageRef, Triplet};
    use ndarray::Array3;

    /// Text "toward:<i>" encodes as a one-hot on axis `i`.
    struct AxisText;

    impl Encoder for AxisText {
        fn embedding_dim(&self) -> usize {
            4
        }

        fn image_size(&self) -> u32 {
            1
        }

        fn encode_images(&self, images: &[Array3<f32>]) -> Result<Vec<Embedding>> {
            Ok(images.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn encode_texts(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let axis: usize = t.trim_start_matches("toward:").parse().unwrap_or(0);
                    let mut v = vec![0.0; 4];
                    v[axis] = 1.0;
                    v
                })
                .collect())
        }
    }

    fn gallery() -> GalleryIndex {
        GalleryIndex::new(
            vec!["g0".into(), "g1".into(), "g2".into(), "g3".into()],
            vec![
                vec![1.0, 0.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0, 0.0],
                vec![0.0, 0.0, 1.0, 0.0],
                vec![0.0, 0.0, 0.0, 1.0],
            ],
            4,
        )
        .unwrap()
    }

    fn triplet(reference: &str, target: &str, caption: &str, group: Option<&[&str]>) -> Triplet {
        Triplet {
            reference: ImageRef::new(reference, format!("/g/{reference}.png")),
            target: Some(ImageRef::new(target, format!("/g/{target}.png"))),
            captions: vec![caption.to_string()],
            pair_id: None,
            group_members: group.map(|g| g.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn test_cirr_recall_excludes_reference() {
        // The caption pulls the query onto the target axis, so the target
        // ranks first once the reference is excluded.
        let triplets = vec![
            triplet("g0", "g1", "toward:1", Some(&["g0", "g1", "g2"])),
            triplet("g2", "g3", "toward:3", Some(&["g2", "g3"])),
        ];
        let queries = QueryDataset::from_triplets(
            DatasetName::Cirr,
            SplitKind::Val,
            triplets,
            &DatasetOptions::default(),
            &NoSnapshot,
        )
        .unwrap();

        let report = Evaluator::new(EvalProtocol::Cirr)
            .evaluate(&queries, &gallery(), &AxisText, &ElementWiseSum::default())
            .unwrap();
        assert_eq!(report.queries, 2);
        assert_eq!(report.at(1), Some(100.0));
        assert_eq!(report.at(50), Some(100.0));
        assert_eq!(report.group_at(1), Some(100.0));
    }

    #[test]
    fn test_fiq_recall_counts_misses() {
        // Second caption points away from its target.
        let triplets = vec![
            triplet("g0", "g1", "toward:1", None),
            triplet("g0", "g3", "toward:2", None),
        ];
        let queries = QueryDataset::from_triplets(
            DatasetName::FashionIq(vec![FiqCategory::Dress]),
            SplitKind::Val,
            triplets,
            &DatasetOptions::default(),
            &NoSnapshot,
        )
        .unwrap();

        let report = Evaluator::new(EvalProtocol::FashionIq)
            .with_depth(Some(2))
            .evaluate(&queries, &gallery(), &AxisText, &ElementWiseSum::default())
            .unwrap();
        assert_eq!(report.at(10), Some(50.0));
        assert!(report.group_recall.is_empty());
        assert_eq!(report.mean(), 50.0);
    }

    #[test]
    fn test_unknown_reference_is_an_error() {
        let queries = QueryDataset::from_triplets(
            DatasetName::Cirr,
            SplitKind::Val,
            vec![triplet("missing", "g1", "toward:1", None)],
            &DatasetOptions::default(),
            &NoSnapshot,
        )
        .unwrap();
        assert!(Evaluator::new(EvalProtocol::Cirr)
            .evaluate(&queries, &gallery(), &AxisText, &ElementWiseSum::default())
            .is_err());
    }
}
