//! Acquisition metadata lookup.
//!
//! The stitcher only needs a handful of values per field. Where they come from
//! (Micro-Manager sidecars, another acquisition package, a test fixture) is
//! hidden behind [`MetadataReader`].

pub mod micro_manager;

use serde::{Deserialize, Serialize};

use crate::coords::StagePosition;
use crate::error::StitchResult;
use crate::field::FieldSource;
use crate::image_size::PixelShape;

/// Instrument metadata for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    /// Stage position in microns
    pub position: StagePosition,
    /// Microns per pixel as reported by the instrument; scaled by `binning`
    /// when the stitch scale is derived
    pub pixel_size_um: f64,
    /// Camera binning factor
    pub binning: u32,
    /// Acquired width in pixels, before any downsampling
    pub width_px: usize,
    /// Acquired height in pixels, before any downsampling
    pub height_px: usize,
}

impl AcquisitionMetadata {
    pub fn raw_shape(&self) -> PixelShape {
        PixelShape::new(self.width_px, self.height_px)
    }
}

/// Looks up acquisition metadata for a field.
///
/// Implementations must return [`StitchError::Metadata`](crate::StitchError::Metadata)
/// when the metadata cannot be located or lacks a required value.
pub trait MetadataReader {
    fn read(&self, source: &FieldSource) -> StitchResult<AcquisitionMetadata>;
}

impl<M: MetadataReader + ?Sized> MetadataReader for &M {
    fn read(&self, source: &FieldSource) -> StitchResult<AcquisitionMetadata> {
        (**self).read(source)
    }
}
