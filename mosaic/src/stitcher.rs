//! Mosaic stitching orchestration.
//!
//! A stitch is a sequential fold over the ordered field list. The first field
//! fixes the pixel origin, the scale (microns per pixel) and the sample type;
//! every later field is loaded, rotated, converted to a pixel offset relative
//! to the first, and max-merged onto the canvas.
//!
//! Any error aborts the whole stitch. No partial canvas is returned or written.

use ndarray::Array2;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::canvas::Canvas;
use crate::config::StitchConfig;
use crate::coords::{xy_offsets, StagePosition};
use crate::error::{StitchError, StitchResult};
use crate::field::{Field, FieldLoader, FieldSource};
use crate::image_size::PixelShape;
use crate::io::tiff_stack::TiffStackLoader;
use crate::io::writer::save_mosaic;
use crate::metadata::micro_manager::MicroManagerReader;
use crate::metadata::MetadataReader;
use crate::raster::{Pixel, Raster};

/// Reference frame fixed by the first field.
#[derive(Debug, Clone, Copy)]
struct Origin {
    position: StagePosition,
    pixel_size_um: f64,
}

/// Stitches fields into one mosaic using a field loader and metadata reader.
pub struct Stitcher<L, M> {
    loader: L,
    reader: M,
    config: StitchConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl Stitcher<TiffStackLoader, MicroManagerReader> {
    /// Stitcher for Micro-Manager TIFF stacks with JSON sidecars.
    pub fn micro_manager(config: StitchConfig) -> Self {
        Self::new(TiffStackLoader::new(), MicroManagerReader::new(), config)
    }
}

impl<L: FieldLoader, M: MetadataReader> Stitcher<L, M> {
    pub fn new(loader: L, reader: M, config: StitchConfig) -> Self {
        Self {
            loader,
            reader,
            config,
            cancel: None,
        }
    }

    /// Abort with [`StitchError::Cancelled`] once `flag` is set.
    ///
    /// The flag is only checked between field placements, so the canvas is
    /// never left half-extended.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Load, project and rotate one field and attach its metadata.
    pub fn load_field(&self, source: &FieldSource) -> StitchResult<Field> {
        let metadata = self.reader.read(source)?;
        let projection = self.loader.project(source)?;
        Ok(Field::new(projection, metadata, self.config.rotation))
    }

    /// Stitch into a canvas with the first field's sample type.
    pub fn stitch_raster(&self, sources: &[FieldSource]) -> StitchResult<Raster> {
        let (first, rest) = self.load_first(sources)?;
        let origin = Self::origin_of(&first)?;
        match first.image {
            Raster::U8(image) => self.place_all(Canvas::new(image), origin, rest).map(Raster::U8),
            Raster::U16(image) => self
                .place_all(Canvas::new(image), origin, rest)
                .map(Raster::U16),
            Raster::F32(image) => self
                .place_all(Canvas::new(image), origin, rest)
                .map(Raster::F32),
        }
    }

    /// Stitch into a canvas of a caller-chosen sample type.
    ///
    /// Fields of another type, including the first, are cast on load.
    pub fn stitch<T: Pixel>(&self, sources: &[FieldSource]) -> StitchResult<Array2<T>> {
        let (first, rest) = self.load_first(sources)?;
        let origin = Self::origin_of(&first)?;
        self.place_all(Canvas::new(T::from_raster(first.image)), origin, rest)
    }

    /// Stitch completely, then write the mosaic to `path`.
    ///
    /// Nothing is written if stitching fails.
    pub fn stitch_to_file(&self, sources: &[FieldSource], path: &Path) -> StitchResult<PixelShape> {
        let mosaic = self.stitch_raster(sources)?;
        save_mosaic(path, &mosaic)?;
        Ok(mosaic.shape())
    }

    fn load_first<'a>(
        &self,
        sources: &'a [FieldSource],
    ) -> StitchResult<(Field, &'a [FieldSource])> {
        let (first, rest) = sources
            .split_first()
            .ok_or_else(|| StitchError::config("no fields to stitch"))?;
        let field = self.load_field(first)?;
        info!(
            "Stitching {} fields starting from {} ({} {}, rotation {} quarter turns)",
            sources.len(),
            first,
            field.shape(),
            field.image.dtype(),
            self.config.rotation.quarter_turns()
        );
        Ok((field, rest))
    }

    fn origin_of(first: &Field) -> StitchResult<Origin> {
        let pixel_size_um = first.effective_pixel_size()?;
        debug!(
            "Scale {:.4} um/px from pixel size {} um, binning {}, raw {} vs array {}",
            pixel_size_um,
            first.pixel_size_um,
            first.binning,
            first.raw_shape,
            first.shape()
        );
        Ok(Origin {
            position: first.position,
            pixel_size_um,
        })
    }

    fn check_cancelled(&self, placed: usize, total: usize) -> StitchResult<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                Err(StitchError::Cancelled { placed, total })
            }
            _ => Ok(()),
        }
    }

    fn place_all<T: Pixel>(
        &self,
        mut canvas: Canvas<T>,
        origin: Origin,
        rest: &[FieldSource],
    ) -> StitchResult<Array2<T>> {
        let total = rest.len() + 1;

        for (i, source) in rest.iter().enumerate() {
            self.check_cancelled(i + 1, total)?;

            let field = self.load_field(source)?;
            let (x_offset, y_offset) = xy_offsets(
                &origin.position,
                &field.position,
                self.config.x_inverted,
                self.config.y_inverted,
                self.config.swap_axes,
                origin.pixel_size_um,
            )?;
            debug!(
                "Field {}/{} {} at ({}, {}) px",
                i + 2,
                total,
                source,
                x_offset,
                y_offset
            );

            let image = T::from_raster(field.image);
            canvas.add_field(image.view(), x_offset, y_offset)?;
        }

        info!(
            "Stitched {} fields into {} {} mosaic (x {:?}, y {:?})",
            total,
            canvas.shape(),
            T::DTYPE,
            canvas.x_range(),
            canvas.y_range()
        );
        Ok(canvas.into_image())
    }
}
