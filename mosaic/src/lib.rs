//! Mosaic stitching for light-sheet and fluorescence microscopy acquisitions.
//!
//! Each field of view is reduced to a single 2-D max projection, placed on a
//! growing canvas at the pixel offset implied by its stage position, and merged
//! with whatever is already there by taking the element-wise maximum.
//!
//! The stitcher itself never touches the file system directly. It talks to two
//! collaborators:
//! - a [`FieldLoader`] that turns a [`FieldSource`] into a projected raster
//! - a [`MetadataReader`] that reports stage position, pixel size and binning
//!
//! [`TiffStackLoader`] and [`MicroManagerReader`] are the implementations used
//! for Micro-Manager TIFF stacks with JSON metadata sidecars.

pub mod canvas;
pub mod config;
pub mod coords;
pub mod error;
pub mod field;
pub mod image_size;
pub mod io;
pub mod metadata;
pub mod raster;
pub mod stitcher;

pub use canvas::Canvas;
pub use config::{Rotation, StitchConfig};
pub use coords::{pixel_offset, xy_offsets, PixelRange, StagePosition};
pub use error::{StitchError, StitchResult};
pub use field::{Field, FieldLoader, FieldSource};
pub use image_size::PixelShape;
pub use io::tiff_stack::TiffStackLoader;
pub use io::writer::save_mosaic;
pub use io::ImageFileType;
pub use metadata::micro_manager::MicroManagerReader;
pub use metadata::{AcquisitionMetadata, MetadataReader};
pub use raster::{max_projection, rotate90, Pixel, Raster};
pub use stitcher::Stitcher;
