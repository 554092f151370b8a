//! Gallery index: identifiers aligned with an embedding matrix, and its builder.

mod builder;
mod gallery;

pub use builder::{BuildProgress, BuildReport, IndexBuilder, SkippedItem};
pub use gallery::GalleryIndex;
