//! Image file loading with content-based format detection.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::{DatasetError, DatasetResult};

/// Decodes image files into [`DynamicImage`]s.
///
/// Missing and corrupt files both surface as [`DatasetError::ImageDecode`];
/// the caller decides whether to skip the item or abort.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageLoader;

impl ImageLoader {
    /// Read and decode an image from disk.
    pub fn load(path: &Path) -> DatasetResult<DynamicImage> {
        let bytes = std::fs::read(path).map_err(|e| DatasetError::ImageDecode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::decode_bytes(bytes, path)
    }

    /// Decode an in-memory image, using `path` only for format fallback and errors.
    pub fn decode_bytes(bytes: Vec<u8>, path: &Path) -> DatasetResult<DynamicImage> {
        let mut reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| DatasetError::ImageDecode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {e}"),
            })?;

        if reader.format().is_none() {
            let format = ImageFormat::from_path(path).map_err(|_| DatasetError::ImageDecode {
                path: path.to_path_buf(),
                message: "Unsupported image format".to_string(),
            })?;
            reader.set_format(format);
        }

        reader.decode().map_err(|e| DatasetError::ImageDecode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbImage};

    #[test]
    fn test_format_detected_by_content() {
        // A PNG saved under a .jpg name still decodes.
        let dir = tempfile::tempdir().unwrap();
        let misnamed = dir.path().join("misnamed.jpg");
        RgbImage::new(6, 4)
            .save_with_format(&misnamed, ImageFormat::Png)
            .unwrap();

        let image = ImageLoader::load(&misnamed).unwrap();
        assert_eq!(image.dimensions(), (6, 4));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = ImageLoader::load(Path::new("/nonexistent/refract/missing.png")).unwrap_err();
        assert!(matches!(err, DatasetError::ImageDecode { .. }));
    }

    #[test]
    fn test_corrupt_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really a png").unwrap();
        let err = ImageLoader::load(&path).unwrap_err();
        assert!(matches!(err, DatasetError::ImageDecode { .. }));
    }
}
