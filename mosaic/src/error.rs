//! Error type shared by every stage of a stitch.
//!
//! All variants are fatal to the stitch call that produced them. A stitch either
//! returns a complete canvas or one of these, never a partial mosaic.

use thiserror::Error;

/// Errors that can occur while loading, placing or saving fields.
#[derive(Error, Debug)]
pub enum StitchError {
    /// Caller supplied something that cannot be stitched (empty input,
    /// bad rotation count, inconsistent downsampling, unknown extension).
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Stage position, pixel size or sidecar could not be resolved.
    #[error("Metadata error: {0}")]
    Metadata(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Pixel data could not be decoded by the field loader.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The output sink could not encode the mosaic.
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Stitch cancelled after placing {placed} of {total} fields")]
    Cancelled { placed: usize, total: usize },
}

impl StitchError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        StitchError::Configuration(msg.into())
    }

    pub(crate) fn metadata(msg: impl Into<String>) -> Self {
        StitchError::Metadata(msg.into())
    }
}

impl From<tiff::TiffError> for StitchError {
    fn from(err: tiff::TiffError) -> Self {
        match err {
            tiff::TiffError::IoError(e) => StitchError::Io(e),
            other => StitchError::Decode(other.to_string()),
        }
    }
}

impl From<image::ImageError> for StitchError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => StitchError::Io(e),
            other => StitchError::Decode(other.to_string()),
        }
    }
}

/// Result type for stitching operations
pub type StitchResult<T> = Result<T, StitchError>;
