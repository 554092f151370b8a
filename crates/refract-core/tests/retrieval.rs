//! End-to-end retrieval over on-disk fixtures with a deterministic encoder.

use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{Array3, Axis};
use refract_core::preprocess::PadPolicy;
use refract_core::{
    inference, Config, DatasetAdapter, DatasetError, ElementWiseSum, Embedding, Encoder,
    GalleryIndex, IndexBuilder, RankOptions, RefractError, Result, Retriever, Transform,
};
use serde_json::json;

/// Images encode to their per-channel mean; captions naming a colour encode
/// to that colour's axis.
struct ColourEncoder;

impl Encoder for ColourEncoder {
    fn embedding_dim(&self) -> usize {
        3
    }

    fn image_size(&self) -> u32 {
        16
    }

    fn encode_images(&self, images: &[Array3<f32>]) -> Result<Vec<Embedding>> {
        Ok(images
            .iter()
            .map(|t| {
                (0..3)
                    .map(|c| t.index_axis(Axis(0), c).mean().unwrap_or(0.0))
                    .collect()
            })
            .collect())
    }

    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts
            .iter()
            .map(|t| match t.as_str() {
                s if s.contains("red") => vec![1.0, 0.0, 0.0],
                s if s.contains("green") => vec![0.0, 1.0, 0.0],
                s if s.contains("blue") => vec![0.0, 0.0, 1.0],
                _ => vec![0.0, 0.0, 0.0],
            })
            .collect())
    }
}

/// Always returns the same image embedding and a zero text embedding.
struct FixedEncoder(Vec<f32>);

impl Encoder for FixedEncoder {
    fn embedding_dim(&self) -> usize {
        self.0.len()
    }

    fn image_size(&self) -> u32 {
        4
    }

    fn encode_images(&self, images: &[Array3<f32>]) -> Result<Vec<Embedding>> {
        Ok(images.iter().map(|_| self.0.clone()).collect())
    }

    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|_| vec![0.0; self.0.len()]).collect())
    }
}

fn transform(dim: u32) -> Transform {
    Transform::new(PadPolicy::TargetRatio(1.25), dim, [0.0; 3], [1.0; 3])
}

fn write_png(path: &Path, width: u32, height: u32, colour: [u8; 3]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(width, height, Rgb(colour))
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

fn write_json(path: &Path, value: serde_json::Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

/// FashionIQ "dress" val split with a red, a green and a blue dress.
fn fiq_fixture() -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_png(&root.join("images/red.png"), 30, 40, [255, 0, 0]);
    write_png(&root.join("images/green.png"), 40, 40, [0, 255, 0]);
    write_png(&root.join("images/blue.png"), 60, 20, [0, 0, 255]);
    write_json(
        &root.join("image_splits/split.dress.val.json"),
        json!(["red", "green", "blue"]),
    );
    write_json(
        &root.join("captions/cap.dress.val.json"),
        json!([{"candidate": "blue", "target": "red", "captions": ["is red", "is brighter"]}]),
    );

    let mut config = Config::default();
    config.general.data_root = root.to_path_buf();
    config.dataset.categories = vec!["dress".to_string()];
    (dir, config)
}

fn classic_gallery(config: &Config) -> refract_core::GalleryDataset {
    match DatasetAdapter::from_config(config).unwrap() {
        DatasetAdapter::Classic(gallery) => gallery,
        DatasetAdapter::Relative(_) => panic!("expected classic mode"),
    }
}

#[test]
fn known_embeddings_rank_in_expected_order() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("query.png");
    write_png(&reference, 4, 4, [128, 128, 128]);

    let gallery = GalleryIndex::new(
        vec!["item0".to_string(), "item1".to_string()],
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        2,
    )
    .unwrap();
    let encoder = FixedEncoder(vec![0.9, 0.1]);

    let result = inference(
        &ElementWiseSum::default(),
        &encoder,
        &transform(4),
        &gallery,
        &reference,
        "anything",
        &RankOptions::default(),
    )
    .unwrap();
    assert_eq!(result.identifiers(), vec!["item0", "item1"]);
    assert_eq!(result.reference, "query.png");
}

#[test]
fn missing_split_manifest_is_reported() {
    let (_dir, mut config) = fiq_fixture();
    config.dataset.split = "test".to_string();

    match DatasetAdapter::from_config(&config) {
        Err(DatasetError::ManifestNotFound { path }) => {
            assert!(path.ends_with("image_splits/split.dress.test.json"));
        }
        Err(other) => panic!("expected ManifestNotFound, got {other}"),
        Ok(_) => panic!("expected ManifestNotFound"),
    }
}

#[test]
fn rebuilding_the_index_is_idempotent() {
    let (_dir, config) = fiq_fixture();
    let gallery = classic_gallery(&config);
    let builder = IndexBuilder::new(Arc::new(ColourEncoder), transform(16)).with_batch_size(2);

    let (first, report) = builder.build(&gallery).unwrap();
    let (second, _) = builder.build(&gallery).unwrap();

    assert_eq!(report.indexed, 3);
    assert_eq!(first.identifiers(), &["red", "green", "blue"]);
    assert_eq!(first.identifiers(), second.identifiers());
    assert_eq!(first.embeddings(), second.embeddings());
    assert_eq!(first.embeddings().nrows(), first.len());
}

#[tokio::test]
async fn composed_query_finds_the_modified_image() {
    let (dir, config) = fiq_fixture();
    let gallery = classic_gallery(&config);
    let encoder: Arc<dyn Encoder> = Arc::new(ColourEncoder);
    let builder = IndexBuilder::new(Arc::clone(&encoder), transform(16)).with_prefetch(1);
    let (index, _) = builder.build_prefetched(&gallery).await.unwrap();

    let retriever = Retriever::new(
        encoder,
        Arc::new(ElementWiseSum::default()),
        transform(16),
        Arc::new(index),
    )
    .with_top_k(2);

    // Blue reference + "make it RED!" sits halfway between red and blue;
    // the tie resolves in gallery order and green falls outside the top 2.
    let result = retriever
        .search(&dir.path().join("images/blue.png"), "make it RED!")
        .unwrap();
    assert_eq!(result.query, "make it red");
    assert_eq!(result.identifiers(), vec!["red", "blue"]);
    assert!(result.results.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn validation_recall_over_fixture() {
    let (_dir, mut config) = fiq_fixture();
    let gallery = classic_gallery(&config);
    let (index, _) = IndexBuilder::new(Arc::new(ColourEncoder), transform(16))
        .build(&gallery)
        .unwrap();

    config.dataset.mode = "relative".to_string();
    let DatasetAdapter::Relative(queries) = DatasetAdapter::from_config(&config).unwrap() else {
        panic!("expected relative mode");
    };
    let report = refract_core::Evaluator::new(refract_core::EvalProtocol::FashionIq)
        .evaluate(&queries, &index, &ColourEncoder, &ElementWiseSum::default())
        .unwrap();
    assert_eq!(report.queries, 1);
    assert_eq!(report.at(10), Some(100.0));
}

#[test]
fn empty_gallery_cannot_be_ranked() {
    let err = refract_core::rank(&[1.0, 0.0], &GalleryIndex::empty(2), &RankOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RefractError::Retrieval(refract_core::RetrievalError::EmptyGallery)
    ));
}
