//! Dataset adapters: named splits as gallery images or composed query units.
//!
//! A dataset is opened in one of two modes:
//! - **classic**: every distinct gallery image, as `(identifier, image)` slots
//!   ([`GalleryDataset`])
//! - **relative**: query units whose content depends on the split
//!   ([`QueryDataset`], yielding [`RelativeItem`]s)
//!
//! Names, splits and modes arrive as configuration strings and are parsed
//! into the enums below when the adapter is constructed, so an unknown value
//! fails before any iteration starts.

mod adapter;
pub mod caption;
pub mod folder;
pub mod loader;
pub mod manifest;
pub mod tables;

pub use adapter::{
    DatasetAdapter, GalleryDataset, GalleryItem, QueryDataset, RelativeItem, RelativeIter,
    TestQuery, TrainQuery, ValQuery,
};
pub use caption::{CaptionComposition, CaptionSelector};
pub use loader::ImageLoader;
pub use tables::{IdentifierTables, IndexSnapshot, JsonSnapshotStore, NoSnapshot, SnapshotStore};

use std::fmt;

use crate::config::DatasetConfig;
use crate::error::{DatasetError, DatasetResult};

/// FashionIQ garment category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiqCategory {
    Dress,
    Shirt,
    Toptee,
}

impl FiqCategory {
    pub fn parse(s: &str) -> DatasetResult<Self> {
        match s {
            "dress" => Ok(Self::Dress),
            "shirt" => Ok(Self::Shirt),
            "toptee" => Ok(Self::Toptee),
            other => Err(DatasetError::Configuration(format!(
                "FashionIQ category must be one of dress, shirt, toptee; got {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dress => "dress",
            Self::Shirt => "shirt",
            Self::Toptee => "toptee",
        }
    }
}

/// Supported datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetName {
    /// FashionIQ over one or more categories
    FashionIq(Vec<FiqCategory>),
    /// CIRR
    Cirr,
    /// WikiArt landscapes (gallery only)
    Wikiart,
    /// Any folder of images (gallery only)
    Folder,
}

impl DatasetName {
    /// Parse a dataset name; `categories` only applies to FashionIQ.
    pub fn parse(name: &str, categories: &[String]) -> DatasetResult<Self> {
        match name {
            "fiq" | "fashioniq" => {
                if categories.is_empty() {
                    return Err(DatasetError::Configuration(
                        "FashionIQ needs at least one category".to_string(),
                    ));
                }
                let categories = categories
                    .iter()
                    .map(|c| FiqCategory::parse(c))
                    .collect::<DatasetResult<Vec<_>>>()?;
                Ok(Self::FashionIq(categories))
            }
            "cirr" => Ok(Self::Cirr),
            "wikiart" => Ok(Self::Wikiart),
            "folder" => Ok(Self::Folder),
            other => Err(DatasetError::Configuration(format!(
                "dataset name must be one of fiq, cirr, wikiart, folder; got {other:?}"
            ))),
        }
    }

    /// Whether the dataset has query triplets at all.
    pub fn has_queries(&self) -> bool {
        matches!(self, Self::FashionIq(_) | Self::Cirr)
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FashionIq(categories) => {
                let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
                write!(f, "FashionIQ [{}]", names.join(", "))
            }
            Self::Cirr => write!(f, "CIRR"),
            Self::Wikiart => write!(f, "WikiArt"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitKind {
    Train,
    Val,
    Test,
}

impl SplitKind {
    pub fn parse(s: &str) -> DatasetResult<Self> {
        match s {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            "test" | "test1" => Ok(Self::Test),
            other => Err(DatasetError::Configuration(format!(
                "split must be one of train, val, test; got {other:?}"
            ))),
        }
    }

    /// File-name component used by the dataset's manifests.
    pub fn file_stem(&self, name: &DatasetName) -> &'static str {
        match (self, name) {
            (Self::Train, _) => "train",
            (Self::Val, _) => "val",
            (Self::Test, DatasetName::Cirr) => "test1",
            (Self::Test, _) => "test",
        }
    }
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Val => write!(f, "val"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Iteration mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetMode {
    /// All gallery images
    Classic,
    /// Query units
    Relative,
}

impl DatasetMode {
    pub fn parse(s: &str) -> DatasetResult<Self> {
        match s {
            "classic" => Ok(Self::Classic),
            "relative" => Ok(Self::Relative),
            other => Err(DatasetError::Configuration(format!(
                "mode must be classic or relative; got {other:?}"
            ))),
        }
    }
}

/// Where a FashionIQ classic gallery comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FiqGallery {
    /// The image-split manifests
    #[default]
    Split,
    /// Distinct references and targets of the validation triplets
    ValTriplets,
}

/// Fully validated dataset selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: DatasetName,
    pub split: SplitKind,
    pub mode: DatasetMode,
}

impl DatasetSpec {
    /// Parse and cross-check name, split and mode.
    pub fn parse(
        name: &str,
        split: &str,
        mode: &str,
        categories: &[String],
    ) -> DatasetResult<Self> {
        let name = DatasetName::parse(name, categories)?;
        let split = SplitKind::parse(split)?;
        let mode = DatasetMode::parse(mode)?;
        if mode == DatasetMode::Relative && !name.has_queries() {
            return Err(DatasetError::Configuration(format!(
                "{name} has no query triplets; only classic mode is available"
            )));
        }
        Ok(Self { name, split, mode })
    }

    pub fn from_config(config: &DatasetConfig) -> DatasetResult<Self> {
        Self::parse(&config.name, &config.split, &config.mode, &config.categories)
    }

    /// Same dataset and split in another mode.
    pub fn with_mode(&self, mode: DatasetMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

/// Options that shape what an adapter yields.
#[derive(Debug, Clone, Default)]
pub struct DatasetOptions {
    pub fiq_gallery: FiqGallery,
    pub extended_captions: bool,
    pub llm_captions: bool,
    pub caption_seed: Option<u64>,
    pub caption_override: Option<CaptionComposition>,
}

impl DatasetOptions {
    pub fn from_config(config: &DatasetConfig) -> DatasetResult<Self> {
        let fiq_gallery = match config.fiq_gallery.as_str() {
            "split" => FiqGallery::Split,
            "val_triplets" => FiqGallery::ValTriplets,
            other => {
                return Err(DatasetError::Configuration(format!(
                    "fiq_gallery must be split or val_triplets; got {other:?}"
                )))
            }
        };
        let caption_override = match config.caption_selector {
            Some(s) => Some(CaptionComposition::from_selector(s).ok_or_else(|| {
                DatasetError::Configuration(format!("caption_selector must be 0-3; got {s}"))
            })?),
            None => None,
        };
        Ok(Self {
            fiq_gallery,
            extended_captions: config.extended_captions,
            llm_captions: config.llm_captions,
            caption_seed: config.caption_seed,
            caption_override,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_valid_spec() {
        let spec = DatasetSpec::parse("fiq", "val", "relative", &categories(&["dress"])).unwrap();
        assert_eq!(spec.name, DatasetName::FashionIq(vec![FiqCategory::Dress]));
        assert_eq!(spec.split, SplitKind::Val);
        assert_eq!(spec.mode, DatasetMode::Relative);
    }

    #[test]
    fn test_unknown_values_are_configuration_errors() {
        let cats = categories(&["dress"]);
        for (name, split, mode) in [
            ("imagenet", "val", "classic"),
            ("cirr", "dev", "classic"),
            ("cirr", "val", "triplet"),
        ] {
            let err = DatasetSpec::parse(name, split, mode, &cats).unwrap_err();
            assert!(matches!(err, DatasetError::Configuration(_)), "{name} {split} {mode}");
        }
        let err = DatasetSpec::parse("fiq", "val", "classic", &categories(&["hat"])).unwrap_err();
        assert!(err.to_string().contains("hat"));
    }

    #[test]
    fn test_gallery_only_datasets_reject_relative() {
        let err = DatasetSpec::parse("wikiart", "val", "relative", &[]).unwrap_err();
        assert!(matches!(err, DatasetError::Configuration(_)));
        assert!(DatasetSpec::parse("folder", "test", "classic", &[]).is_ok());
    }

    #[test]
    fn test_cirr_test_file_stem() {
        assert_eq!(SplitKind::parse("test1").unwrap(), SplitKind::Test);
        assert_eq!(SplitKind::Test.file_stem(&DatasetName::Cirr), "test1");
        assert_eq!(
            SplitKind::Test.file_stem(&DatasetName::FashionIq(vec![FiqCategory::Shirt])),
            "test"
        );
    }

    #[test]
    fn test_options_from_config() {
        let mut config = DatasetConfig {
            caption_selector: Some(2),
            fiq_gallery: "val_triplets".to_string(),
            ..DatasetConfig::default()
        };
        let options = DatasetOptions::from_config(&config).unwrap();
        assert_eq!(options.fiq_gallery, FiqGallery::ValTriplets);
        assert_eq!(options.caption_override, Some(CaptionComposition::FirstOnly));

        config.fiq_gallery = "all".to_string();
        assert!(DatasetOptions::from_config(&config).is_err());
    }
}
