//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLIP normalization mean (per RGB channel).
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per RGB channel).
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root directory all dataset manifests and images resolve against
    pub data_root: PathBuf,

    /// Directory where encoder models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("~/.refract/data"),
            model_dir: PathBuf::from("~/.refract/models"),
        }
    }
}

/// Dataset selection.
///
/// Names, splits and modes stay plain strings here; they are parsed into
/// tagged variants when a dataset adapter is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// "fiq", "cirr", "wikiart" or "folder"
    pub name: String,

    /// "train", "val" or "test" ("test1" is accepted for CIRR)
    pub split: String,

    /// "classic" or "relative"
    pub mode: String,

    /// FashionIQ categories to load
    pub categories: Vec<String>,

    /// FashionIQ classic gallery source: "split" or "val_triplets"
    pub fiq_gallery: String,

    /// Append the extended caption manifest to the train triplets
    pub extended_captions: bool,

    /// Use the LLM-written caption of extended triplets
    pub llm_captions: bool,

    /// Seed for training-time caption draws (entropy-seeded when absent)
    pub caption_seed: Option<u64>,

    /// Fixed caption composition 0-3 replacing the random draw
    pub caption_selector: Option<u8>,

    /// Identifier-index snapshot file name, relative to the data root
    pub snapshot_file: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "fiq".to_string(),
            split: "val".to_string(),
            mode: "classic".to_string(),
            categories: vec![
                "dress".to_string(),
                "shirt".to_string(),
                "toptee".to_string(),
            ],
            fiq_gallery: "split".to_string(),
            extended_captions: false,
            llm_captions: false,
            caption_seed: None,
            caption_selector: None,
            snapshot_file: "optimized_images.json".to_string(),
        }
    }
}

/// Image preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Padding policy: "targetpad" or "squarepad"
    pub transform: String,

    /// Aspect ratio bound for "targetpad"
    pub target_ratio: f32,

    /// Per-channel normalization mean; must match the encoder
    pub mean: [f32; 3],

    /// Per-channel normalization std; must match the encoder
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            transform: "targetpad".to_string(),
            target_ratio: 1.25,
            mean: CLIP_MEAN,
            std: CLIP_STD,
        }
    }
}

/// Visual-text encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Model directory name under `general.model_dir`
    pub model: String,

    /// Visual input resolution
    pub image_size: u32,

    /// Output embedding dimension
    pub embedding_dim: usize,

    /// Text token sequence length
    pub context_length: usize,

    /// Name of the visual model's embedding output
    pub image_output: String,

    /// Name of the text model's embedding output
    pub text_output: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model: "RN50x4".to_string(),
            image_size: 288,
            embedding_dim: 640,
            context_length: 77,
            image_output: "image_embeds".to_string(),
            text_output: "text_embeds".to_string(),
        }
    }
}

/// Combiner selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// "sum" or "combiner"
    pub strategy: String,

    /// Path to the trained combiner snapshot (required for "combiner")
    pub path: Option<PathBuf>,

    /// Re-normalize the element-wise sum to unit length
    pub renormalize: bool,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            strategy: "sum".to_string(),
            path: None,
            renormalize: true,
        }
    }
}

/// Gallery index building settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Images per encoder call
    pub batch_size: usize,

    /// Max decoded images buffered ahead of the encoder
    pub prefetch: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            prefetch: 64,
        }
    }
}

/// Ranking defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results returned by interactive single-query search
    pub top_k: usize,

    /// Results kept per query during evaluation (None = full gallery)
    pub eval_top_k: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            eval_top_k: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
