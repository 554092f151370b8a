//! Plain image-folder galleries.

use std::path::Path;
use walkdir::WalkDir;

use crate::types::ImageRef;

/// File extensions treated as gallery images.
const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp", "gif", "tiff"];

/// Recursively find every supported image under `root`.
///
/// Identifiers are paths relative to `root` with `/` separators; entries are
/// sorted by identifier so repeated scans of an unchanged folder agree.
pub fn discover(root: &Path) -> Vec<ImageRef> {
    let mut images: Vec<ImageRef> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .filter_map(|e| {
            let relative = e.path().strip_prefix(root).ok()?;
            let identifier = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some(ImageRef::new(identifier, e.path()))
        })
        .collect();

    images.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    images
}

/// Check if a file has a supported image extension.
fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}
