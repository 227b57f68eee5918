//! One field of view: where it came from, its projected pixels, and the
//! acquisition metadata needed to place it.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Rotation;
use crate::coords::{downsample_factor, effective_pixel_size, StagePosition};
use crate::error::StitchResult;
use crate::image_size::PixelShape;
use crate::metadata::AcquisitionMetadata;
use crate::raster::Raster;

/// Image data making up a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// One file; multi-page files are max-projected across pages.
    File(PathBuf),
    /// Several files at the same stage position, max-combined. Metadata is
    /// taken from the first.
    Files(Vec<PathBuf>),
    /// A single page of a multi-position stack.
    Page { path: PathBuf, index: usize },
}

impl FieldSource {
    /// File that carries the metadata for this field.
    pub fn primary_path(&self) -> Option<&Path> {
        match self {
            FieldSource::File(path) => Some(path.as_path()),
            FieldSource::Files(paths) => paths.first().map(PathBuf::as_path),
            FieldSource::Page { path, .. } => Some(path.as_path()),
        }
    }

    /// One source per page of a stack that stores a stage position per page.
    pub fn pages(path: impl Into<PathBuf>, count: usize) -> Vec<FieldSource> {
        let path = path.into();
        (0..count)
            .map(|index| FieldSource::Page {
                path: path.clone(),
                index,
            })
            .collect()
    }
}

impl From<PathBuf> for FieldSource {
    fn from(path: PathBuf) -> Self {
        FieldSource::File(path)
    }
}

impl From<&Path> for FieldSource {
    fn from(path: &Path) -> Self {
        FieldSource::File(path.to_path_buf())
    }
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldSource::File(path) => write!(f, "{}", path.display()),
            FieldSource::Files(paths) => match paths.first() {
                Some(first) => write!(f, "{} (+{} more)", first.display(), paths.len() - 1),
                None => write!(f, "<no files>"),
            },
            FieldSource::Page { path, index } => write!(f, "{} page {}", path.display(), index),
        }
    }
}

/// Produces the projected 2-D raster for a field.
pub trait FieldLoader {
    fn project(&self, source: &FieldSource) -> StitchResult<Raster>;
}

impl<L: FieldLoader + ?Sized> FieldLoader for &L {
    fn project(&self, source: &FieldSource) -> StitchResult<Raster> {
        (**self).project(source)
    }
}

/// A field ready for placement: rotated pixels plus its metadata.
///
/// `raw_shape` is the acquisition shape from metadata with the same rotation
/// applied, so it can be compared directly against `image.shape()`.
#[derive(Debug, Clone)]
pub struct Field {
    pub image: Raster,
    pub position: StagePosition,
    pub pixel_size_um: f64,
    pub binning: u32,
    pub raw_shape: PixelShape,
}

impl Field {
    /// Apply the configured rotation to both the pixels and the metadata shape.
    pub fn new(projection: Raster, metadata: AcquisitionMetadata, rotation: Rotation) -> Self {
        let image = projection.rotated(rotation);
        let raw_shape = if rotation.swaps_dimensions() {
            metadata.raw_shape().transposed()
        } else {
            metadata.raw_shape()
        };
        Self {
            image,
            position: metadata.position,
            pixel_size_um: metadata.pixel_size_um,
            binning: metadata.binning,
            raw_shape,
        }
    }

    pub fn shape(&self) -> PixelShape {
        self.image.shape()
    }

    /// Microns per pixel of this field's array, accounting for binning and
    /// any downsampling applied before stitching.
    pub fn effective_pixel_size(&self) -> StitchResult<f64> {
        let factor = downsample_factor(self.raw_shape, self.shape())?;
        effective_pixel_size(self.pixel_size_um, self.binning, factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StitchError;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn metadata(width: usize, height: usize) -> AcquisitionMetadata {
        AcquisitionMetadata {
            position: StagePosition::new(1.0, 2.0, 3.0),
            pixel_size_um: 0.5,
            binning: 2,
            width_px: width,
            height_px: height,
        }
    }

    #[test]
    fn test_field_rotation_swaps_raw_shape() {
        let raster = Raster::U16(Array2::zeros((20, 40)));
        let field = Field::new(raster, metadata(40, 20), Rotation::Quarter);
        assert_eq!(field.shape(), PixelShape::new(20, 40));
        assert_eq!(field.raw_shape, PixelShape::new(20, 40));
        assert_relative_eq!(field.effective_pixel_size().unwrap(), 1.0);
    }

    #[test]
    fn test_field_half_turn_keeps_shape() {
        let raster = Raster::U16(Array2::zeros((20, 40)));
        let field = Field::new(raster, metadata(40, 20), Rotation::Half);
        assert_eq!(field.raw_shape, PixelShape::new(40, 20));
    }

    #[test]
    fn test_field_downsampled_pixel_size() {
        let raster = Raster::U8(Array2::zeros((5, 10)));
        let field = Field::new(raster, metadata(40, 20), Rotation::None);
        assert_relative_eq!(field.effective_pixel_size().unwrap(), 4.0);
    }

    #[test]
    fn test_field_inexact_downsample_fails() {
        let raster = Raster::U8(Array2::zeros((6, 12)));
        let field = Field::new(raster, metadata(40, 20), Rotation::None);
        assert!(matches!(
            field.effective_pixel_size(),
            Err(StitchError::Configuration(_))
        ));
    }

    #[test]
    fn test_pages_source_list() {
        let pages = FieldSource::pages("stack.ome.tif", 3);
        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages[2],
            FieldSource::Page {
                path: PathBuf::from("stack.ome.tif"),
                index: 2
            }
        );
        assert_eq!(pages[0].primary_path(), Some(Path::new("stack.ome.tif")));
    }

    #[test]
    fn test_display() {
        let src = FieldSource::Files(vec![PathBuf::from("a.tif"), PathBuf::from("b.tif")]);
        assert_eq!(src.to_string(), "a.tif (+1 more)");
        assert_eq!(FieldSource::Files(Vec::new()).primary_path(), None);
    }
}
