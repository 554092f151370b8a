//! Dense identifier indices for training splits, with an optional snapshot cache.
//!
//! Every distinct image (reference or target) and every distinct target gets a
//! dense integer in first-seen order. The image table can be persisted as a
//! snapshot `[names, paths, {name: index}]` and reloaded verbatim; the target
//! table is always recomputed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DatasetError, DatasetResult};
use crate::types::Triplet;

/// Persisted image table.
///
/// `image_to_index` keeps the file's key order so a loaded snapshot saves
/// back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SnapshotRepr", into = "SnapshotRepr")]
pub struct IndexSnapshot {
    pub image_names: Vec<String>,
    pub image_paths: Vec<PathBuf>,
    pub image_to_index: Map<String, Value>,
}

/// Wire form: a 3-element JSON array.
#[derive(Serialize, Deserialize)]
struct SnapshotRepr(Vec<String>, Vec<PathBuf>, Map<String, Value>);

impl From<SnapshotRepr> for IndexSnapshot {
    fn from(repr: SnapshotRepr) -> Self {
        Self {
            image_names: repr.0,
            image_paths: repr.1,
            image_to_index: repr.2,
        }
    }
}

impl IndexSnapshot {
    fn empty() -> Self {
        Self {
            image_names: Vec::new(),
            image_paths: Vec::new(),
            image_to_index: Map::new(),
        }
    }

    /// Dense index recorded for `identifier`.
    pub fn index_of(&self, identifier: &str) -> Option<usize> {
        self.image_to_index
            .get(identifier)
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Check the three tables agree: one path per name, and an in-range
    /// index for every name.
    pub fn validate(&self, location: &Path) -> DatasetResult<()> {
        let error = |message: String| DatasetError::Snapshot {
            path: location.to_path_buf(),
            message,
        };
        if self.image_names.len() != self.image_paths.len() {
            return Err(error(format!(
                "snapshot lists {} names but {} paths",
                self.image_names.len(),
                self.image_paths.len()
            )));
        }
        for name in &self.image_names {
            match self.index_of(name) {
                Some(index) if index < self.image_names.len() => {}
                Some(index) => {
                    return Err(error(format!("index {index} for {name:?} is out of range")))
                }
                None => return Err(error(format!("snapshot has no index for {name:?}"))),
            }
        }
        Ok(())
    }
}

impl From<IndexSnapshot> for SnapshotRepr {
    fn from(snapshot: IndexSnapshot) -> Self {
        SnapshotRepr(
            snapshot.image_names,
            snapshot.image_paths,
            snapshot.image_to_index,
        )
    }
}

/// Storage port for the identifier-index snapshot.
pub trait SnapshotStore {
    /// Load the snapshot if one exists.
    fn load(&self) -> DatasetResult<Option<IndexSnapshot>>;

    /// Persist a snapshot, replacing any existing one.
    fn save(&self, snapshot: &IndexSnapshot) -> DatasetResult<()>;

    /// Where the snapshot lives, for error messages.
    fn location(&self) -> PathBuf {
        PathBuf::new()
    }
}

/// Snapshot stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl ToString) -> DatasetError {
        DatasetError::Snapshot {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> DatasetResult<Option<IndexSnapshot>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.error(e))?;
        let snapshot = serde_json::from_str(&content).map_err(|e| self.error(e))?;
        tracing::info!("Loaded identifier snapshot from {:?}", self.path);
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &IndexSnapshot) -> DatasetResult<()> {
        let json = serde_json::to_string(snapshot).map_err(|e| self.error(e))?;
        std::fs::write(&self.path, json).map_err(|e| self.error(e))?;
        tracing::info!(
            "Saved identifier snapshot ({} images) to {:?}",
            snapshot.image_names.len(),
            self.path
        );
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

/// A store with nothing in it; `save` discards.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSnapshot;

impl SnapshotStore for NoSnapshot {
    fn load(&self) -> DatasetResult<Option<IndexSnapshot>> {
        Ok(None)
    }

    fn save(&self, _snapshot: &IndexSnapshot) -> DatasetResult<()> {
        Ok(())
    }
}

/// Image and target lookup tables for a training split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierTables {
    image: IndexSnapshot,
    target_to_index: BTreeMap<String, usize>,
}

impl IdentifierTables {
    /// Assign dense indices in first-seen order.
    ///
    /// Per triplet the target is registered in the target table, then the
    /// reference and the target in the image table.
    pub fn compute(triplets: &[Triplet]) -> Self {
        let mut image = IndexSnapshot::empty();
        let mut target_to_index = BTreeMap::new();

        for triplet in triplets {
            if let Some(target) = &triplet.target {
                let next = target_to_index.len();
                target_to_index
                    .entry(target.identifier.clone())
                    .or_insert(next);
            }

            let refs = std::iter::once(&triplet.reference).chain(triplet.target.as_ref());
            for image_ref in refs {
                if !image.image_to_index.contains_key(&image_ref.identifier) {
                    image.image_to_index.insert(
                        image_ref.identifier.clone(),
                        Value::from(image.image_names.len()),
                    );
                    image.image_names.push(image_ref.identifier.clone());
                    image.image_paths.push(image_ref.path.clone());
                }
            }
        }

        Self {
            image,
            target_to_index,
        }
    }

    /// Use the stored snapshot when present, otherwise compute from `triplets`.
    ///
    /// An inconsistent snapshot, or one that does not cover every identifier
    /// in `triplets`, is rejected.
    pub fn cache_or_compute(
        triplets: &[Triplet],
        store: &dyn SnapshotStore,
    ) -> DatasetResult<Self> {
        let Some(snapshot) = store.load()? else {
            return Ok(Self::compute(triplets));
        };
        snapshot.validate(&store.location())?;

        let computed = Self::compute(triplets);
        if let Some(missing) = computed
            .image
            .image_names
            .iter()
            .find(|name| !snapshot.image_to_index.contains_key(*name))
        {
            return Err(DatasetError::Snapshot {
                path: store.location(),
                message: format!("snapshot has no entry for {missing:?}"),
            });
        }

        Ok(Self {
            image: snapshot,
            target_to_index: computed.target_to_index,
        })
    }

    /// Image table as a persistable snapshot.
    pub fn snapshot(&self) -> &IndexSnapshot {
        &self.image
    }

    /// Dense index of an image (reference or target).
    pub fn image_index(&self, identifier: &str) -> Option<usize> {
        self.image.index_of(identifier)
    }

    /// Dense index of a target.
    pub fn target_index(&self, identifier: &str) -> Option<usize> {
        self.target_to_index.get(identifier).copied()
    }

    /// Number of distinct images.
    pub fn image_count(&self) -> usize {
        self.image.image_names.len()
    }

    /// Number of distinct targets.
    pub fn target_count(&self) -> usize {
        self.target_to_index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageRef;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore(Mutex<Option<IndexSnapshot>>);

    impl SnapshotStore for MemoryStore {
        fn load(&self) -> DatasetResult<Option<IndexSnapshot>> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn save(&self, snapshot: &IndexSnapshot) -> DatasetResult<()> {
            *self.0.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }
    }

    fn triplet(reference: &str, target: &str) -> Triplet {
        Triplet {
            reference: ImageRef::new(reference, format!("/img/{reference}.png")),
            target: Some(ImageRef::new(target, format!("/img/{target}.png"))),
            captions: vec!["x".to_string()],
            pair_id: None,
            group_members: None,
        }
    }

    #[test]
    fn test_first_seen_order() {
        let triplets = vec![triplet("a", "b"), triplet("c", "b"), triplet("b", "d")];
        let tables = IdentifierTables::compute(&triplets);

        assert_eq!(tables.snapshot().image_names, vec!["a", "b", "c", "d"]);
        assert_eq!(tables.image_index("c"), Some(2));
        assert_eq!(tables.target_index("b"), Some(0));
        assert_eq!(tables.target_index("d"), Some(1));
        assert_eq!(tables.target_index("a"), None);
        assert_eq!(tables.target_count(), 2);
        assert_eq!(tables.image_count(), 4);
    }

    #[test]
    fn test_deterministic_given_input_order() {
        let triplets = vec![triplet("x", "y"), triplet("y", "z")];
        assert_eq!(
            IdentifierTables::compute(&triplets),
            IdentifierTables::compute(&triplets)
        );
    }

    #[test]
    fn test_snapshot_loaded_verbatim() {
        let triplets = vec![triplet("a", "b")];
        let store = MemoryStore::default();
        let reordered = IndexSnapshot {
            image_names: vec!["b".to_string(), "a".to_string()],
            image_paths: vec!["/cache/b.png".into(), "/cache/a.png".into()],
            image_to_index: [("b".to_string(), 0.into()), ("a".to_string(), 1.into())]
                .into_iter()
                .collect(),
        };
        store.save(&reordered).unwrap();

        let tables = IdentifierTables::cache_or_compute(&triplets, &store).unwrap();
        assert_eq!(tables.snapshot(), &reordered);
        assert_eq!(tables.image_index("a"), Some(1));
        assert_eq!(tables.target_index("b"), Some(0));
    }

    #[test]
    fn test_stale_snapshot_rejected() {
        let store = MemoryStore::default();
        store
            .save(&IdentifierTables::compute(&[triplet("a", "b")]).snapshot().clone())
            .unwrap();
        let err = IdentifierTables::cache_or_compute(&[triplet("a", "c")], &store).unwrap_err();
        assert!(err.to_string().contains("\"c\""));
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("optimized_images.json"));
        assert!(store.load().unwrap().is_none());

        let tables = IdentifierTables::compute(&[triplet("a", "b"), triplet("c", "a")]);
        store.save(tables.snapshot()).unwrap();
        assert_eq!(store.load().unwrap().as_ref(), Some(tables.snapshot()));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw.is_array());
        assert_eq!(raw.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let store = MemoryStore::default();
        store
            .save(&IndexSnapshot {
                image_names: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                image_paths: vec!["/x/a.png".into(), "/x/b.png".into()],
                image_to_index: [
                    ("a".to_string(), 0.into()),
                    ("b".to_string(), 1.into()),
                    ("c".to_string(), 2.into()),
                ]
                .into_iter()
                .collect(),
            })
            .unwrap();
        let err = IdentifierTables::cache_or_compute(&[triplet("a", "b")], &store).unwrap_err();
        assert!(matches!(err, DatasetError::Snapshot { .. }));
        assert!(err.to_string().contains("3 names but 2 paths"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let snapshot = IndexSnapshot {
            image_names: vec!["a".to_string()],
            image_paths: vec!["a.png".into()],
            image_to_index: [("a".to_string(), 4.into())].into_iter().collect(),
        };
        let err = snapshot.validate(Path::new("snap.json")).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_json_store_keeps_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("optimized_images.json"));
        let raw = r#"[["b","a"],["images/b.png","images/a.png"],{"b":0,"a":1}]"#;
        std::fs::write(store.path(), raw).unwrap();

        let snapshot = store.load().unwrap().unwrap();
        assert_eq!(snapshot.index_of("a"), Some(1));
        store.save(&snapshot).unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), raw);
    }
}
