//! Shared command setup: config overrides, model loading, gallery indexing.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Args;
use refract_core::combiner::load_combiner;
use refract_core::dataset::{DatasetMode, SplitKind};
use refract_core::{
    ClipEncoder, Combiner, Config, DatasetAdapter, DatasetSpec, Encoder, GalleryDataset,
    GalleryIndex, IndexBuilder, QueryDataset, Transform,
};

/// Dataset and model overrides shared by every command that touches data.
#[derive(Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// Dataset: fiq, cirr, wikiart or folder
    #[arg(long)]
    pub dataset: Option<String>,

    /// FashionIQ category (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Root every manifest and image path resolves against
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Preprocessing: targetpad or squarepad
    #[arg(long)]
    pub transform: Option<String>,

    /// Target-ratio pad threshold
    #[arg(long)]
    pub target_ratio: Option<f32>,

    /// Encoder model directory name under the model dir
    #[arg(long)]
    pub model: Option<String>,

    /// Combiner strategy: sum or combiner
    #[arg(long)]
    pub combiner: Option<String>,

    /// Learned combiner snapshot (.onnx)
    #[arg(long)]
    pub combiner_path: Option<PathBuf>,

    /// Images per encoder batch
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl DatasetArgs {
    /// Apply overrides and re-validate.
    pub fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(dataset) = &self.dataset {
            config.dataset.name = dataset.clone();
        }
        if !self.categories.is_empty() {
            config.dataset.categories = self.categories.clone();
        }
        if let Some(root) = &self.data_root {
            config.general.data_root = crate::expand_path(root);
        }
        if let Some(transform) = &self.transform {
            config.preprocess.transform = transform.clone();
        }
        if let Some(ratio) = self.target_ratio {
            config.preprocess.target_ratio = ratio;
        }
        if let Some(model) = &self.model {
            config.encoder.model = model.clone();
        }
        if let Some(strategy) = &self.combiner {
            config.combiner.strategy = strategy.clone();
        }
        if let Some(path) = &self.combiner_path {
            config.combiner.path = Some(crate::expand_path(path));
            if self.combiner.is_none() {
                config.combiner.strategy = "combiner".to_string();
            }
        }
        if let Some(batch_size) = self.batch_size {
            config.index.batch_size = batch_size;
        }
        config.validate()?;
        Ok(())
    }
}

/// Loaded encoder, combiner and preprocessing.
pub struct Models {
    pub encoder: Arc<dyn Encoder>,
    pub combiner: Arc<dyn Combiner>,
    pub transform: Transform,
}

/// Load the encoder and combiner named by the config.
pub fn load_models(config: &Config) -> anyhow::Result<Models> {
    if !ClipEncoder::model_exists(&config.encoder, &config.model_dir()) {
        anyhow::bail!(
            "Encoder model not found in {:?}\n\n  \
             Hint: Export the CLIP visual tower, text tower and tokenizer as \
             visual.onnx, text.onnx and tokenizer.json into that directory.",
            ClipEncoder::model_path(&config.encoder, &config.model_dir())
        );
    }
    let encoder: Arc<dyn Encoder> =
        Arc::new(ClipEncoder::load(&config.encoder, &config.model_dir())?);
    let combiner: Arc<dyn Combiner> =
        load_combiner(&config.combiner, config.combiner_path().as_deref())?.into();
    let transform = Transform::from_config(&config.preprocess, encoder.image_size())?;
    tracing::info!(
        "Using {} combiner with {} preprocessing",
        combiner.name(),
        config.preprocess.transform
    );
    Ok(Models {
        encoder,
        combiner,
        transform,
    })
}

/// Open the classic-mode gallery for `split`.
pub fn open_gallery(config: &Config, split: SplitKind) -> anyhow::Result<GalleryDataset> {
    let spec = DatasetSpec {
        split,
        ..DatasetSpec::from_config(&config.dataset)?
    }
    .with_mode(DatasetMode::Classic);
    match DatasetAdapter::from_spec(config, &spec)? {
        DatasetAdapter::Classic(gallery) => Ok(gallery),
        DatasetAdapter::Relative(_) => anyhow::bail!("expected a classic-mode gallery"),
    }
}

/// Open the relative-mode queries for `split`.
pub fn open_queries(config: &Config, split: SplitKind) -> anyhow::Result<QueryDataset> {
    let spec = DatasetSpec {
        split,
        ..DatasetSpec::from_config(&config.dataset)?
    }
    .with_mode(DatasetMode::Relative);
    match DatasetAdapter::from_spec(config, &spec)? {
        DatasetAdapter::Relative(queries) => Ok(queries),
        DatasetAdapter::Classic(_) => anyhow::bail!("expected relative-mode queries"),
    }
}

/// Encode a gallery with a progress bar; Ctrl-C stops between batches.
pub async fn build_index(
    config: &Config,
    models: &Models,
    gallery: &GalleryDataset,
) -> anyhow::Result<GalleryIndex> {
    if gallery.is_empty() {
        anyhow::bail!(
            "The {} {} gallery is empty.\n\n  Hint: Check data_root ({}).",
            gallery.name(),
            gallery.split(),
            config.data_root().display()
        );
    }

    let pb = create_progress_bar(gallery.len() as u64);
    let bar = pb.clone();
    let builder = IndexBuilder::new(Arc::clone(&models.encoder), models.transform.clone())
        .with_config(&config.index)
        .with_progress(move |p| bar.set_position(p.processed as u64));

    let interrupt = builder.interrupt_flag();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.store(true, Ordering::Relaxed);
        }
    });

    let built = builder.build_prefetched(gallery).await;
    watcher.abort();

    match built {
        Ok((index, report)) => {
            pb.finish_with_message(format!(
                "{} indexed, {} skipped",
                report.indexed,
                report.skipped.len()
            ));
            for skipped in &report.skipped {
                tracing::debug!("Skipped {}: {}", skipped.identifier, skipped.reason);
            }
            Ok(index)
        }
        Err(e) => {
            pb.abandon_with_message("interrupted");
            Err(e.into())
        }
    }
}

fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("indexing gallery...");
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        let args = DatasetArgs {
            dataset: Some("cirr".to_string()),
            combiner_path: Some(PathBuf::from("/models/combiner.onnx")),
            batch_size: Some(8),
            ..DatasetArgs::default()
        };
        args.apply(&mut config).unwrap();
        assert_eq!(config.dataset.name, "cirr");
        assert_eq!(config.combiner.strategy, "combiner");
        assert_eq!(config.index.batch_size, 8);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = Config::default();
        let args = DatasetArgs {
            batch_size: Some(0),
            ..DatasetArgs::default()
        };
        assert!(args.apply(&mut config).is_err());
    }

    #[test]
    fn test_missing_manifest_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.data_root = dir.path().to_path_buf();
        let err = open_gallery(&config, SplitKind::Val).unwrap_err();
        assert!(err.to_string().contains("Manifest not found"));
    }
}
