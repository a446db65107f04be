use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosterizeError {
    /// Every pixel was background after segmentation, so there is nothing to cluster.
    #[error("foreground is empty: every pixel is background")]
    EmptyForeground,

    #[error("color count must be between 1 and 256, got {0}")]
    InvalidColorCount(usize),

    #[error("resize scalar must be a positive number that keeps both sides non-empty, got {0}")]
    InvalidScale(f32),

    #[error("pixel buffer length {len} does not match dimensions {width}x{height}")]
    DimensionMismatch {
        len: usize,
        width: u32,
        height: u32,
    },

    #[error("segmenter returned a {}x{} image for a {}x{} input", .actual.0, .actual.1, .expected.0, .expected.1)]
    SegmentationMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("background removal failed: {0}")]
    Segmentation(String),

    #[error("no image encoder for output path {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PosterizeError>;
