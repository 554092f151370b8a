//! Error types for composed image retrieval.
//!
//! Errors are organized by stage so that callers can tell fatal problems
//! (bad configuration, missing manifests, dimension mismatches) apart from
//! per-item problems (a single undecodable image) that the dataset layer skips.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Refract operations.
#[derive(Error, Debug)]
pub enum RefractError {
    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dataset construction and iteration errors
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Encoder / combiner model errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Indexing and ranking errors
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Dataset adapter errors.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Unknown dataset name, split, mode or category. Raised at construction.
    #[error("Invalid dataset configuration: {0}")]
    Configuration(String),

    /// A manifest the configured split depends on is missing
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: PathBuf },

    /// A manifest exists but could not be parsed
    #[error("Failed to parse manifest {path}: {message}")]
    ManifestParse { path: PathBuf, message: String },

    /// An image file is missing or corrupt
    #[error("Failed to decode image {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    /// A triplet references an identifier with no path mapping
    #[error("Unknown identifier {identifier:?} in {manifest}")]
    UnknownIdentifier {
        identifier: String,
        manifest: PathBuf,
    },

    /// The identifier-index snapshot could not be read or written
    #[error("Snapshot error for {path}: {message}")]
    Snapshot { path: PathBuf, message: String },
}

/// Encoder and combiner model errors.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A model or tokenizer file is missing
    #[error("Model file not found: {path}")]
    NotFound { path: PathBuf },

    /// A model file exists but failed to load
    #[error("Failed to load model {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Inference failed or produced unexpected output
    #[error("Inference failed: {message}")]
    Inference { message: String },
}

/// Index building and ranking errors.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Query and gallery embeddings do not share a dimensionality
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Ranking was attempted against a gallery with no rows
    #[error("Cannot rank against an empty gallery")]
    EmptyGallery,

    /// Combiner was given different numbers of image and text embeddings
    #[error("Batch size mismatch: {images} image embeddings vs {texts} text embeddings")]
    BatchMismatch { images: usize, texts: usize },

    /// The index build was interrupted between batches; the partial index is discarded
    #[error("Index build interrupted after {completed} items")]
    Interrupted { completed: usize },

    /// The same identifier was inserted into a gallery twice
    #[error("Duplicate gallery identifier: {0}")]
    DuplicateIdentifier(String),
}

/// Convenience type alias for Refract results.
pub type Result<T> = std::result::Result<T, RefractError>;

/// Convenience type alias for dataset-specific results.
pub type DatasetResult<T> = std::result::Result<T, DatasetError>;
