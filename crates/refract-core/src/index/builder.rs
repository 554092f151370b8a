//! Gallery index construction.
//!
//! Two drivers share the same contract: iterate a classic-mode gallery once,
//! preprocess and encode in batches, and append rows in iteration order.
//! Images that fail to decode are skipped and reported; the identifier list
//! and the embedding matrix always stay aligned.
//!
//! - [`IndexBuilder::build`]: synchronous batched loop
//! - [`IndexBuilder::build_prefetched`]: decode and preprocessing run on the
//!   blocking pool, up to `prefetch` items ahead of the encoder, through a
//!   bounded channel

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array3;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::IndexConfig;
use crate::dataset::{GalleryDataset, ImageLoader};
use crate::encoder::Encoder;
use crate::error::{DatasetResult, Result, RetrievalError};
use crate::preprocess::Transform;
use crate::types::Embedding;

use super::GalleryIndex;

/// A gallery item left out of the index.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    /// Position in the gallery listing
    pub position: usize,
    pub identifier: String,
    pub reason: String,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Rows in the index
    pub indexed: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Progress after each encoded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProgress {
    /// Gallery items consumed so far (indexed or skipped)
    pub processed: usize,
    pub total: usize,
}

type ProgressFn = Box<dyn Fn(BuildProgress) + Send + Sync>;

/// Builds a [`GalleryIndex`] from a classic-mode gallery.
pub struct IndexBuilder {
    encoder: Arc<dyn Encoder>,
    transform: Arc<Transform>,
    batch_size: usize,
    prefetch: usize,
    interrupt: Arc<AtomicBool>,
    on_progress: Option<ProgressFn>,
}

impl IndexBuilder {
    pub fn new(encoder: Arc<dyn Encoder>, transform: Transform) -> Self {
        let defaults = IndexConfig::default();
        Self {
            encoder,
            transform: Arc::new(transform),
            batch_size: defaults.batch_size,
            prefetch: defaults.prefetch,
            interrupt: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    /// Apply batch size and prefetch depth from the config.
    pub fn with_config(mut self, config: &IndexConfig) -> Self {
        self.batch_size = config.batch_size.max(1);
        self.prefetch = config.prefetch.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Called after every encoded batch.
    pub fn with_progress(mut self, f: impl Fn(BuildProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Flag checked between batches; once set the build stops with
    /// [`RetrievalError::Interrupted`] and the partial index is dropped.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Build synchronously in batches of `batch_size`.
    pub fn build(&self, gallery: &GalleryDataset) -> Result<(GalleryIndex, BuildReport)> {
        let total = gallery.len();
        let mut acc = Accumulator::new(self.encoder.embedding_dim(), total);
        let mut batch_ids = Vec::with_capacity(self.batch_size);
        let mut batch_tensors = Vec::with_capacity(self.batch_size);

        tracing::info!("Indexing {} gallery images", total);
        for (position, slot) in gallery.iter().enumerate() {
            match slot {
                Ok(item) => {
                    batch_ids.push(item.identifier);
                    batch_tensors.push(self.transform.apply(&item.image));
                }
                Err(e) => acc.skip(position, &gallery.images()[position].identifier, &e),
            }
            acc.processed = position + 1;

            if batch_tensors.len() == self.batch_size {
                self.check_interrupt(&acc)?;
                let rows = self.encoder.encode_images(&batch_tensors)?;
                acc.push(std::mem::take(&mut batch_ids), rows);
                batch_tensors.clear();
                self.report(&acc, total);
            }
        }

        if !batch_tensors.is_empty() {
            self.check_interrupt(&acc)?;
            let rows = self.encoder.encode_images(&batch_tensors)?;
            acc.push(batch_ids, rows);
        }
        self.check_interrupt(&acc)?;
        self.report(&acc, total);
        acc.finish()
    }

    /// Build with bounded prefetching.
    ///
    /// Each image is decoded and preprocessed in its own blocking task; the
    /// task handles travel through a channel of capacity `prefetch`, so at
    /// most that many items are in flight while the current batch encodes.
    /// Rows are appended in gallery order regardless of completion order.
    pub async fn build_prefetched(
        &self,
        gallery: &GalleryDataset,
    ) -> Result<(GalleryIndex, BuildReport)> {
        let total = gallery.len();
        let images = gallery.images().to_vec();
        let (tx, mut rx) = mpsc::channel::<(usize, String, JoinHandle<DatasetResult<Array3<f32>>>)>(
            self.prefetch,
        );

        let transform = Arc::clone(&self.transform);
        let interrupt = Arc::clone(&self.interrupt);
        let producer = tokio::spawn(async move {
            for (position, image_ref) in images.into_iter().enumerate() {
                if interrupt.load(Ordering::Relaxed) {
                    break;
                }
                let transform = Arc::clone(&transform);
                let path = image_ref.path;
                let handle = tokio::task::spawn_blocking(move || {
                    ImageLoader::load(&path).map(|image| transform.apply(&image))
                });
                if tx.send((position, image_ref.identifier, handle)).await.is_err() {
                    // Consumer stopped
                    break;
                }
            }
        });

        tracing::info!(
            "Indexing {} gallery images (batch {}, prefetch {})",
            total,
            self.batch_size,
            self.prefetch
        );
        let mut acc = Accumulator::new(self.encoder.embedding_dim(), total);
        let mut batch_ids = Vec::with_capacity(self.batch_size);
        let mut batch_tensors = Vec::with_capacity(self.batch_size);

        while let Some((position, identifier, handle)) = rx.recv().await {
            let slot = handle.await.map_err(std::io::Error::other)?;
            match slot {
                Ok(tensor) => {
                    batch_ids.push(identifier);
                    batch_tensors.push(tensor);
                }
                Err(e) => acc.skip(position, &identifier, &e),
            }
            acc.processed = position + 1;

            if batch_tensors.len() == self.batch_size {
                self.check_interrupt(&acc)?;
                let rows = self.encode_blocking(std::mem::take(&mut batch_tensors)).await?;
                acc.push(std::mem::take(&mut batch_ids), rows);
                self.report(&acc, total);
            }
        }
        producer.await.map_err(std::io::Error::other)?;

        if !batch_tensors.is_empty() {
            self.check_interrupt(&acc)?;
            let rows = self.encode_blocking(batch_tensors).await?;
            acc.push(batch_ids, rows);
        }
        self.check_interrupt(&acc)?;
        self.report(&acc, total);
        acc.finish()
    }

    async fn encode_blocking(&self, tensors: Vec<Array3<f32>>) -> Result<Vec<Embedding>> {
        let encoder = Arc::clone(&self.encoder);
        tokio::task::spawn_blocking(move || encoder.encode_images(&tensors))
            .await
            .map_err(std::io::Error::other)?
    }

    fn check_interrupt(&self, acc: &Accumulator) -> Result<()> {
        if self.interrupt.load(Ordering::Relaxed) {
            tracing::warn!(
                "Index build interrupted after {} images; discarding partial index",
                acc.identifiers.len()
            );
            return Err(RetrievalError::Interrupted {
                completed: acc.identifiers.len(),
            }
            .into());
        }
        Ok(())
    }

    fn report(&self, acc: &Accumulator, total: usize) {
        tracing::debug!("Indexed {}/{} gallery images", acc.processed, total);
        if let Some(f) = &self.on_progress {
            f(BuildProgress {
                processed: acc.processed,
                total,
            });
        }
    }
}

/// Rows collected so far.
struct Accumulator {
    dim: usize,
    identifiers: Vec<String>,
    rows: Vec<Embedding>,
    skipped: Vec<SkippedItem>,
    processed: usize,
}

impl Accumulator {
    fn new(dim: usize, capacity: usize) -> Self {
        Self {
            dim,
            identifiers: Vec::with_capacity(capacity),
            rows: Vec::with_capacity(capacity),
            skipped: Vec::new(),
            processed: 0,
        }
    }

    fn skip(&mut self, position: usize, identifier: &str, error: &dyn std::fmt::Display) {
        tracing::warn!("Skipping gallery image {}: {}", identifier, error);
        self.skipped.push(SkippedItem {
            position,
            identifier: identifier.to_string(),
            reason: error.to_string(),
        });
    }

    fn push(&mut self, identifiers: Vec<String>, rows: Vec<Embedding>) {
        self.identifiers.extend(identifiers);
        self.rows.extend(rows);
    }

    fn finish(self) -> Result<(GalleryIndex, BuildReport)> {
        let index = GalleryIndex::new(self.identifiers, self.rows, self.dim)?;
        tracing::info!(
            "Gallery index built: {} images, {} skipped",
            index.len(),
            self.skipped.len()
        );
        let report = BuildReport {
            indexed: index.len(),
            skipped: self.skipped,
        };
        Ok((index, report))
    }
}
