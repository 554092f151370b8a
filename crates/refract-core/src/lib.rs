//! Refract Core - composed image retrieval.
//!
//! Given a reference image and a free-text modification ("is red and has
//! sleeves"), Refract ranks a gallery of images by how well each matches the
//! reference as modified by the text.
//!
//! # Architecture
//!
//! ```text
//! Dataset (classic) → Preprocess → Encoder → GalleryIndex
//! Reference image → Preprocess → Encoder ┐
//!                                        ├→ Combiner → Ranker → identifiers
//! Text query ──────────────────→ Encoder ┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use refract_core::{
//!     combiner::load_combiner, ClipEncoder, Config, DatasetAdapter, IndexBuilder, Retriever,
//!     Transform,
//! };
//!
//! let config = Config::load()?;
//! let encoder = Arc::new(ClipEncoder::load(&config.encoder, &config.model_dir())?);
//! let transform = Transform::from_config(&config.preprocess, config.encoder.image_size)?;
//! let DatasetAdapter::Classic(gallery) = DatasetAdapter::from_config(&config)? else {
//!     unreachable!()
//! };
//!
//! let (index, _report) = IndexBuilder::new(encoder.clone(), transform.clone()).build(&gallery)?;
//! let combiner = load_combiner(&config.combiner, config.combiner_path().as_deref())?;
//! let retriever = Retriever::new(encoder, combiner.into(), transform, Arc::new(index));
//! let result = retriever.search("./dress.png".as_ref(), "is red and has sleeves")?;
//! ```

pub mod combiner;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod eval;
pub mod index;
pub mod math;
pub mod output;
pub mod preprocess;
pub mod rank;
pub mod retriever;
pub mod types;

pub use combiner::{Combiner, ElementWiseSum, LearnedCombiner};
pub use config::Config;
pub use dataset::{DatasetAdapter, DatasetOptions, DatasetSpec, GalleryDataset, QueryDataset};
pub use encoder::{ClipEncoder, Encoder};
pub use error::{
    ConfigError, DatasetError, DatasetResult, ModelError, RefractError, Result, RetrievalError,
};
pub use eval::{EvalProtocol, Evaluator, RecallReport};
pub use index::{BuildReport, GalleryIndex, IndexBuilder};
pub use output::{OutputFormat, ResultWriter};
pub use preprocess::Transform;
pub use rank::{rank, RankOptions};
pub use retriever::{inference, normalize_query, Retriever};
pub use types::{Embedding, ImageRef, QueryResult, RankedItem, Triplet};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
