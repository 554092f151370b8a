//! Classic and relative dataset adapters.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::config::Config;
use crate::error::{DatasetError, DatasetResult};
use crate::types::{ImageRef, Triplet};

use super::caption::CaptionSelector;
use super::folder;
use super::loader::ImageLoader;
use super::manifest::{
    load_manifest, pair_id_string, CirrTriplet, FiqTriplet, WikiartRecord,
};
use super::tables::{IdentifierTables, JsonSnapshotStore, NoSnapshot, SnapshotStore};
use super::{
    DatasetMode, DatasetName, DatasetOptions, DatasetSpec, FiqCategory, FiqGallery, SplitKind,
};

/// A dataset opened in a specific mode.
pub enum DatasetAdapter {
    Classic(GalleryDataset),
    Relative(QueryDataset),
}

impl DatasetAdapter {
    /// Open a dataset. Unknown names, splits or modes have already been
    /// rejected by [`DatasetSpec`]; missing manifests fail here.
    pub fn open(
        spec: &DatasetSpec,
        root: &Path,
        options: &DatasetOptions,
        store: &dyn SnapshotStore,
    ) -> DatasetResult<Self> {
        match spec.mode {
            DatasetMode::Classic => Ok(Self::Classic(GalleryDataset::open(
                &spec.name, spec.split, root, options, store,
            )?)),
            DatasetMode::Relative => Ok(Self::Relative(QueryDataset::open(
                &spec.name, spec.split, root, options, store,
            )?)),
        }
    }

    /// Open the dataset described by `config.dataset`, resolved against the data root.
    pub fn from_config(config: &Config) -> DatasetResult<Self> {
        let spec = DatasetSpec::from_config(&config.dataset)?;
        Self::from_spec(config, &spec)
    }

    /// Open `spec` with the rest of the dataset settings taken from `config`.
    ///
    /// The identifier snapshot is only consulted for the train split.
    pub fn from_spec(config: &Config, spec: &DatasetSpec) -> DatasetResult<Self> {
        let options = DatasetOptions::from_config(&config.dataset)?;
        let root = config.data_root();
        if spec.split == SplitKind::Train {
            let store = JsonSnapshotStore::new(root.join(&config.dataset.snapshot_file));
            Self::open(spec, &root, &options, &store)
        } else {
            Self::open(spec, &root, &options, &NoSnapshot)
        }
    }

    /// Number of items the adapter yields.
    pub fn len(&self) -> usize {
        match self {
            Self::Classic(gallery) => gallery.len(),
            Self::Relative(queries) => queries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded gallery image.
pub struct GalleryItem {
    pub identifier: String,
    pub image: DynamicImage,
}

/// Classic mode: every distinct gallery image of a split.
#[derive(Debug, Clone)]
pub struct GalleryDataset {
    name: DatasetName,
    split: SplitKind,
    images: Vec<ImageRef>,
}

impl GalleryDataset {
    /// Load the gallery listing. Images are decoded lazily by [`iter`](Self::iter).
    ///
    /// Order is manifest order unless a train-split snapshot exists, in which
    /// case the snapshot's order is used exactly. Relative snapshot paths
    /// resolve against `root`.
    pub fn open(
        name: &DatasetName,
        split: SplitKind,
        root: &Path,
        options: &DatasetOptions,
        store: &dyn SnapshotStore,
    ) -> DatasetResult<Self> {
        if split == SplitKind::Train {
            if let Some(snapshot) = store.load()? {
                snapshot.validate(&store.location())?;
                let images = snapshot
                    .image_names
                    .into_iter()
                    .zip(snapshot.image_paths)
                    .map(|(identifier, path)| ImageRef {
                        identifier,
                        path: root.join(path),
                    })
                    .collect();
                tracing::info!("{name} {split} gallery ordered by identifier snapshot");
                return Ok(Self::from_images(name.clone(), split, images));
            }
        }

        let images = match name {
            DatasetName::FashionIq(categories) => match options.fiq_gallery {
                FiqGallery::Split => fiq_split_images(root, categories, split)?,
                FiqGallery::ValTriplets => {
                    if split != SplitKind::Val {
                        return Err(DatasetError::Configuration(
                            "fiq_gallery = val_triplets is only valid for the val split"
                                .to_string(),
                        ));
                    }
                    let triplets = fiq_triplets(root, categories, split)?;
                    triplets
                        .into_iter()
                        .flat_map(|t| std::iter::once(t.reference).chain(t.target))
                        .collect()
                }
            },
            DatasetName::Cirr => cirr_split_images(root, split)?,
            DatasetName::Wikiart => {
                let manifest = root.join("landscape.json");
                let records: Vec<WikiartRecord> = load_manifest(&manifest)?;
                records
                    .into_iter()
                    .map(|r| {
                        let path = root.join("images").join(&r.image_path);
                        ImageRef::new(r.image_path, path)
                    })
                    .collect()
            }
            DatasetName::Folder => {
                if !root.is_dir() {
                    return Err(DatasetError::ManifestNotFound {
                        path: root.to_path_buf(),
                    });
                }
                folder::discover(root)
            }
        };

        let gallery = Self::from_images(name.clone(), split, images);
        tracing::info!(
            "{} {} dataset in classic mode initialized ({} images)",
            gallery.name,
            gallery.split,
            gallery.len()
        );
        Ok(gallery)
    }

    /// Build a gallery from an explicit image list, keeping the first
    /// occurrence of each identifier.
    pub fn from_images(name: DatasetName, split: SplitKind, images: Vec<ImageRef>) -> Self {
        let mut seen = HashSet::new();
        let total = images.len();
        let images: Vec<ImageRef> = images
            .into_iter()
            .filter(|image| seen.insert(image.identifier.clone()))
            .collect();
        if images.len() < total {
            tracing::debug!(
                "Dropped {} duplicate gallery identifiers",
                total - images.len()
            );
        }
        Self {
            name,
            split,
            images,
        }
    }

    pub fn name(&self) -> &DatasetName {
        &self.name
    }

    pub fn split(&self) -> SplitKind {
        self.split
    }

    /// Gallery listing in iteration order.
    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Lazily decode every gallery image, one slot per listing entry.
    ///
    /// The iterator is restartable: each call starts from the beginning.
    pub fn iter(&self) -> impl Iterator<Item = DatasetResult<GalleryItem>> + '_ {
        self.images.iter().map(|image_ref| {
            ImageLoader::load(&image_ref.path).map(|image| GalleryItem {
                identifier: image_ref.identifier.clone(),
                image,
            })
        })
    }
}

/// Train split unit: both images decoded, caption chosen, table indices attached.
pub struct TrainQuery {
    /// Position of the triplet in the dataset
    pub index: usize,
    pub reference_image: DynamicImage,
    pub target_image: DynamicImage,
    pub caption: String,
    /// Reference position in the image table
    pub reference_image_index: usize,
    /// Target position in the image table
    pub target_image_index: usize,
    /// Target position in the target table
    pub target_index: usize,
}

/// Validation split unit: identifiers only; images are resolved by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ValQuery {
    pub reference: String,
    pub target: String,
    /// Caption composed with the evaluation policy
    pub caption: String,
    /// Raw captions as annotated
    pub captions: Vec<String>,
    pub group_members: Option<Vec<String>>,
}

/// Test split unit: no target.
pub struct TestQuery {
    /// CIRR pair id, or the reference identifier for FashionIQ
    pub query_id: String,
    pub reference: String,
    pub reference_image: DynamicImage,
    pub caption: String,
    pub group_members: Option<Vec<String>>,
}

/// A relative-mode unit; the variant is fixed by the split.
pub enum RelativeItem {
    Train(TrainQuery),
    Val(ValQuery),
    Test(TestQuery),
}

/// Relative mode: composed query units of a split.
#[derive(Debug, Clone)]
pub struct QueryDataset {
    name: DatasetName,
    split: SplitKind,
    triplets: Vec<Triplet>,
    /// Triplets before any extended-manifest records were appended
    base_count: usize,
    tables: Option<IdentifierTables>,
    options: DatasetOptions,
}

impl QueryDataset {
    /// Load the caption manifests (plus the extended manifest for train when
    /// enabled) and, for the train split, the identifier tables.
    pub fn open(
        name: &DatasetName,
        split: SplitKind,
        root: &Path,
        options: &DatasetOptions,
        store: &dyn SnapshotStore,
    ) -> DatasetResult<Self> {
        let mut triplets = match name {
            DatasetName::FashionIq(categories) => fiq_triplets(root, categories, split)?,
            DatasetName::Cirr => cirr_triplets(root, split)?,
            DatasetName::Wikiart | DatasetName::Folder => {
                return Err(DatasetError::Configuration(format!(
                    "{name} has no query triplets; only classic mode is available"
                )))
            }
        };
        let base_count = triplets.len();

        if options.extended_captions {
            if split == SplitKind::Train {
                let extended = match name {
                    DatasetName::FashionIq(_) => fiq_extended(root, options.llm_captions)?,
                    _ => cirr_extended(root, options.llm_captions)?,
                };
                tracing::info!("Appending {} extended triplets", extended.len());
                triplets.extend(extended);
            } else {
                tracing::warn!("extended_captions only applies to the train split; ignoring");
            }
        }

        let dataset = Self::from_parts(name.clone(), split, triplets, base_count, options, store)?;
        tracing::info!(
            "{} {} dataset in relative mode initialized ({} triplets)",
            dataset.name,
            dataset.split,
            dataset.len()
        );
        Ok(dataset)
    }

    /// Build from already adapted triplets.
    pub fn from_triplets(
        name: DatasetName,
        split: SplitKind,
        triplets: Vec<Triplet>,
        options: &DatasetOptions,
        store: &dyn SnapshotStore,
    ) -> DatasetResult<Self> {
        let base_count = triplets.len();
        Self::from_parts(name, split, triplets, base_count, options, store)
    }

    fn from_parts(
        name: DatasetName,
        split: SplitKind,
        triplets: Vec<Triplet>,
        base_count: usize,
        options: &DatasetOptions,
        store: &dyn SnapshotStore,
    ) -> DatasetResult<Self> {
        for (i, triplet) in triplets.iter().enumerate() {
            if triplet.captions.is_empty() {
                return Err(DatasetError::ManifestParse {
                    path: triplet.reference.path.clone(),
                    message: format!("triplet {i} has no captions"),
                });
            }
            if split != SplitKind::Test && triplet.target.is_none() {
                return Err(DatasetError::ManifestParse {
                    path: triplet.reference.path.clone(),
                    message: format!("triplet {i} has no target"),
                });
            }
        }

        let tables = if split == SplitKind::Train {
            let tables = IdentifierTables::cache_or_compute(&triplets, store)?;
            tracing::info!(
                "Identifier tables: {} images, {} targets",
                tables.image_count(),
                tables.target_count()
            );
            Some(tables)
        } else {
            None
        };

        Ok(Self {
            name,
            split,
            triplets,
            base_count,
            tables,
            options: options.clone(),
        })
    }

    pub fn name(&self) -> &DatasetName {
        &self.name
    }

    pub fn split(&self) -> SplitKind {
        self.split
    }

    /// Adapted triplets in iteration order.
    pub fn triplets(&self) -> &[Triplet] {
        &self.triplets
    }

    /// Identifier tables (train split only).
    pub fn tables(&self) -> Option<&IdentifierTables> {
        self.tables.as_ref()
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    /// Start a fresh pass over the query units.
    ///
    /// Train passes draw captions randomly (seeded by `caption_seed` when set);
    /// other splits use the evaluation composition. A configured fixed
    /// selector overrides both.
    pub fn iter(&self) -> RelativeIter<'_> {
        let selector = match (self.options.caption_override, self.split) {
            (Some(composition), _) => CaptionSelector::fixed(composition),
            (None, SplitKind::Train) => CaptionSelector::random(self.options.caption_seed),
            (None, _) => CaptionSelector::evaluation(),
        };
        RelativeIter {
            dataset: self,
            position: 0,
            selector,
        }
    }

    fn item(&self, index: usize, selector: &mut CaptionSelector) -> DatasetResult<RelativeItem> {
        let triplet = &self.triplets[index];
        let is_fiq = matches!(self.name, DatasetName::FashionIq(_));

        match self.split {
            SplitKind::Train => {
                let target = required_target(triplet)?;
                let caption = if triplet.captions.len() > 1 {
                    if is_fiq && index < self.base_count {
                        selector.compose(&triplet.captions)
                    } else {
                        selector.choose(&triplet.captions)
                    }
                } else {
                    triplet.captions[0].clone()
                };

                let tables = self.tables.as_ref().ok_or_else(|| {
                    DatasetError::Configuration("train split without identifier tables".into())
                })?;
                let lookup = |found: Option<usize>, identifier: &str| {
                    found.ok_or_else(|| DatasetError::UnknownIdentifier {
                        identifier: identifier.to_string(),
                        manifest: PathBuf::new(),
                    })
                };
                let reference_image_index = lookup(
                    tables.image_index(&triplet.reference.identifier),
                    &triplet.reference.identifier,
                )?;
                let target_image_index =
                    lookup(tables.image_index(&target.identifier), &target.identifier)?;
                let target_index =
                    lookup(tables.target_index(&target.identifier), &target.identifier)?;

                Ok(RelativeItem::Train(TrainQuery {
                    index,
                    reference_image: ImageLoader::load(&triplet.reference.path)?,
                    target_image: ImageLoader::load(&target.path)?,
                    caption,
                    reference_image_index,
                    target_image_index,
                    target_index,
                }))
            }
            SplitKind::Val => {
                let target = required_target(triplet)?;
                let caption = if is_fiq {
                    selector.compose(&triplet.captions)
                } else {
                    triplet.captions[0].clone()
                };
                Ok(RelativeItem::Val(ValQuery {
                    reference: triplet.reference.identifier.clone(),
                    target: target.identifier.clone(),
                    caption,
                    captions: triplet.captions.clone(),
                    group_members: triplet.group_members.clone(),
                }))
            }
            SplitKind::Test => {
                let caption = if is_fiq {
                    selector.compose(&triplet.captions)
                } else {
                    triplet.captions[0].clone()
                };
                Ok(RelativeItem::Test(TestQuery {
                    query_id: triplet
                        .pair_id
                        .clone()
                        .unwrap_or_else(|| triplet.reference.identifier.clone()),
                    reference: triplet.reference.identifier.clone(),
                    reference_image: ImageLoader::load(&triplet.reference.path)?,
                    caption,
                    group_members: triplet.group_members.clone(),
                }))
            }
        }
    }
}

/// Lazy pass over a [`QueryDataset`]; one `Result` per triplet.
pub struct RelativeIter<'a> {
    dataset: &'a QueryDataset,
    position: usize,
    selector: CaptionSelector,
}

impl Iterator for RelativeIter<'_> {
    type Item = DatasetResult<RelativeItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.dataset.len() {
            return None;
        }
        let index = self.position;
        self.position += 1;
        Some(self.dataset.item(index, &mut self.selector))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len() - self.position;
        (remaining, Some(remaining))
    }
}

fn required_target(triplet: &Triplet) -> DatasetResult<&ImageRef> {
    triplet
        .target
        .as_ref()
        .ok_or_else(|| DatasetError::ManifestParse {
            path: triplet.reference.path.clone(),
            message: format!("triplet for {} has no target", triplet.reference.identifier),
        })
}

// ── FashionIQ ──

fn fiq_image(root: &Path, name: &str) -> ImageRef {
    ImageRef::new(name, root.join("images").join(format!("{name}.png")))
}

fn fiq_split_images(
    root: &Path,
    categories: &[FiqCategory],
    split: SplitKind,
) -> DatasetResult<Vec<ImageRef>> {
    let mut images = Vec::new();
    for category in categories {
        let manifest = root.join("image_splits").join(format!(
            "split.{}.{}.json",
            category.as_str(),
            split.file_stem(&DatasetName::FashionIq(vec![*category]))
        ));
        let names: Vec<String> = load_manifest(&manifest)?;
        images.extend(names.iter().map(|name| fiq_image(root, name)));
    }
    Ok(images)
}

fn fiq_triplets(
    root: &Path,
    categories: &[FiqCategory],
    split: SplitKind,
) -> DatasetResult<Vec<Triplet>> {
    let mut triplets = Vec::new();
    for category in categories {
        let manifest = root.join("captions").join(format!(
            "cap.{}.{}.json",
            category.as_str(),
            split.file_stem(&DatasetName::FashionIq(vec![*category]))
        ));
        let raw: Vec<FiqTriplet> = load_manifest(&manifest)?;
        triplets.extend(
            raw.into_iter()
                .map(|t| fiq_triplet(root, &manifest, t, false))
                .collect::<DatasetResult<Vec<_>>>()?,
        );
    }
    Ok(triplets)
}

fn fiq_extended(root: &Path, llm_captions: bool) -> DatasetResult<Vec<Triplet>> {
    let suffix = if llm_captions { "_llm" } else { "" };
    let manifest = root
        .join("captions")
        .join(format!("cap.extend_clip{suffix}.train.json"));
    let raw: Vec<FiqTriplet> = load_manifest(&manifest)?;
    raw.into_iter()
        .map(|t| fiq_triplet(root, &manifest, t, llm_captions))
        .collect()
}

fn fiq_triplet(
    root: &Path,
    manifest: &Path,
    raw: FiqTriplet,
    llm_captions: bool,
) -> DatasetResult<Triplet> {
    let captions = if llm_captions {
        vec![llm_caption(manifest, raw.llm_caption)?]
    } else {
        raw.captions
    };
    Ok(Triplet {
        reference: fiq_image(root, &raw.candidate),
        target: raw.target.as_deref().map(|t| fiq_image(root, t)),
        captions,
        pair_id: None,
        group_members: None,
    })
}

// ── CIRR ──

fn cirr_split_map(root: &Path, split: SplitKind) -> DatasetResult<(PathBuf, Vec<ImageRef>)> {
    let manifest = root.join("cirr").join("image_splits").join(format!(
        "split.rc2.{}.json",
        split.file_stem(&DatasetName::Cirr)
    ));
    let map: serde_json::Map<String, serde_json::Value> = load_manifest(&manifest)?;
    let images = map
        .into_iter()
        .map(|(name, relpath)| match relpath.as_str() {
            Some(relpath) => Ok(ImageRef::new(name, root.join(relpath))),
            None => Err(DatasetError::ManifestParse {
                path: manifest.clone(),
                message: format!("path for {name:?} is not a string"),
            }),
        })
        .collect::<DatasetResult<Vec<_>>>()?;
    Ok((manifest, images))
}

fn cirr_split_images(root: &Path, split: SplitKind) -> DatasetResult<Vec<ImageRef>> {
    cirr_split_map(root, split).map(|(_, images)| images)
}

struct CirrResolver {
    manifest: PathBuf,
    paths: std::collections::HashMap<String, PathBuf>,
}

impl CirrResolver {
    fn new(root: &Path, split: SplitKind) -> DatasetResult<Self> {
        let (manifest, images) = cirr_split_map(root, split)?;
        let paths = images
            .into_iter()
            .map(|image| (image.identifier, image.path))
            .collect();
        Ok(Self { manifest, paths })
    }

    fn resolve(&self, name: &str) -> DatasetResult<ImageRef> {
        self.paths
            .get(name)
            .map(|path| ImageRef::new(name, path.clone()))
            .ok_or_else(|| DatasetError::UnknownIdentifier {
                identifier: name.to_string(),
                manifest: self.manifest.clone(),
            })
    }

    fn triplet(
        &self,
        manifest: &Path,
        raw: CirrTriplet,
        llm_captions: bool,
    ) -> DatasetResult<Triplet> {
        let captions = if llm_captions {
            vec![llm_caption(manifest, raw.llm_caption)?]
        } else {
            raw.caption.into_vec()
        };
        Ok(Triplet {
            reference: self.resolve(&raw.reference)?,
            target: raw
                .target_hard
                .as_deref()
                .map(|t| self.resolve(t))
                .transpose()?,
            captions,
            pair_id: Some(pair_id_string(&raw.pairid)),
            group_members: Some(raw.img_set.members),
        })
    }
}

fn cirr_triplets(root: &Path, split: SplitKind) -> DatasetResult<Vec<Triplet>> {
    let manifest = root.join("cirr").join("captions").join(format!(
        "cap.rc2.{}.json",
        split.file_stem(&DatasetName::Cirr)
    ));
    let raw: Vec<CirrTriplet> = load_manifest(&manifest)?;
    let resolver = CirrResolver::new(root, split)?;
    raw.into_iter()
        .map(|t| resolver.triplet(&manifest, t, false))
        .collect()
}

fn cirr_extended(root: &Path, llm_captions: bool) -> DatasetResult<Vec<Triplet>> {
    let suffix = if llm_captions { "_llm" } else { "" };
    let manifest = root
        .join("cirr")
        .join("captions")
        .join(format!("cap.rc2.train.extend_clip{suffix}.json"));
    let raw: Vec<CirrTriplet> = load_manifest(&manifest)?;
    let resolver = CirrResolver::new(root, SplitKind::Train)?;
    raw.into_iter()
        .map(|t| resolver.triplet(&manifest, t, llm_captions))
        .collect()
}

fn llm_caption(manifest: &Path, caption: Option<String>) -> DatasetResult<String> {
    caption.ok_or_else(|| DatasetError::ManifestParse {
        path: manifest.to_path_buf(),
        message: "extended triplet has no llm_caption".to_string(),
    })
}
