//! Growable composite raster.
//!
//! The canvas tracks which pixel coordinates it currently covers on each axis.
//! Coordinates are relative to the first field placed, so the ranges may run
//! negative once fields land above or to the left of it. The backing array
//! always has shape `(y_range.len(), x_range.len())`.

use ndarray::{s, Array2, ArrayView2};
use tracing::debug;

use crate::coords::PixelRange;
use crate::error::{StitchError, StitchResult};
use crate::image_size::PixelShape;
use crate::raster::{merge_max, Pixel};

/// Amount to grow on the low and high side of one axis. Non-positive entries
/// mean no growth on that side.
pub type Extensions = [i64; 2];

/// Composite image assembled from fields placed at pixel offsets.
#[derive(Debug, Clone)]
pub struct Canvas<T: Pixel> {
    image: Array2<T>,
    x_range: PixelRange,
    y_range: PixelRange,
}

impl<T: Pixel> Canvas<T> {
    /// Start a canvas from the first field, which defines pixel (0, 0).
    pub fn new(first: Array2<T>) -> Self {
        let shape = PixelShape::from_dim(first.dim());
        Self {
            image: first,
            x_range: PixelRange::new(0, shape.width as i64),
            y_range: PixelRange::new(0, shape.height as i64),
        }
    }

    pub fn image(&self) -> &Array2<T> {
        &self.image
    }

    pub fn into_image(self) -> Array2<T> {
        self.image
    }

    pub fn x_range(&self) -> PixelRange {
        self.x_range
    }

    pub fn y_range(&self) -> PixelRange {
        self.y_range
    }

    pub fn shape(&self) -> PixelShape {
        PixelShape::from_dim(self.image.dim())
    }

    /// Growth needed on each side for a field covering `new_x` by `new_y`.
    pub fn compute_extensions(
        &self,
        new_x: &PixelRange,
        new_y: &PixelRange,
    ) -> (Extensions, Extensions) {
        (
            self.x_range.extensions_for(new_x),
            self.y_range.extensions_for(new_y),
        )
    }

    /// Widen the tracked ranges to also cover `new_x` by `new_y`. Never shrinks.
    pub fn update_range(&mut self, new_x: &PixelRange, new_y: &PixelRange) {
        self.x_range = self.x_range.union(new_x);
        self.y_range = self.y_range.union(new_y);
    }

    /// Pad the array with zeros: left, right, top and bottom by the positive
    /// entries of `x_ext` and `y_ext`.
    ///
    /// The existing pixels keep their values and sample type.
    pub fn extend(&mut self, x_ext: Extensions, y_ext: Extensions) {
        let [left, right] = x_ext.map(|e| e.max(0) as usize);
        let [top, bottom] = y_ext.map(|e| e.max(0) as usize);
        if left + right + top + bottom == 0 {
            return;
        }

        let (rows, cols) = self.image.dim();
        let mut grown = Array2::from_elem((rows + top + bottom, cols + left + right), T::default());
        grown
            .slice_mut(s![top..top + rows, left..left + cols])
            .assign(&self.image);
        self.image = grown;
    }

    /// Merge `field` into the canvas with an element-wise maximum.
    ///
    /// `x_ext` and `y_ext` are the extensions computed for this field before the
    /// canvas was extended; they locate the field relative to the canvas origin.
    pub fn place(
        &mut self,
        field: ArrayView2<T>,
        x_ext: Extensions,
        y_ext: Extensions,
    ) -> StitchResult<()> {
        let (rows, cols) = field.dim();
        let x0 = if x_ext[0] > 0 { 0 } else { (-x_ext[0]) as usize };
        let y0 = if y_ext[0] > 0 { 0 } else { (-y_ext[0]) as usize };

        let (canvas_rows, canvas_cols) = self.image.dim();
        if y0 + rows > canvas_rows || x0 + cols > canvas_cols {
            return Err(StitchError::config(format!(
                "field {} at ({x0}, {y0}) does not fit canvas {}",
                PixelShape::new(cols, rows),
                self.shape()
            )));
        }

        let region = self.image.slice_mut(s![y0..y0 + rows, x0..x0 + cols]);
        merge_max(region, field);
        Ok(())
    }

    /// Place a field whose top-left corner sits at `(x_offset, y_offset)` in
    /// canvas coordinates, growing the canvas first if needed.
    pub fn add_field(&mut self, field: ArrayView2<T>, x_offset: i64, y_offset: i64) -> StitchResult<()> {
        let shape = PixelShape::from_dim(field.dim());
        let new_x = PixelRange::from_offset(x_offset, shape.width)?;
        let new_y = PixelRange::from_offset(y_offset, shape.height)?;
        if new_x.is_empty() || new_y.is_empty() {
            return Err(StitchError::config(format!(
                "cannot place empty field {shape} at ({x_offset}, {y_offset})"
            )));
        }

        let (x_ext, y_ext) = self.compute_extensions(&new_x, &new_y);
        debug!(
            "Placing {} field at ({}, {}), extensions x={:?} y={:?}",
            shape, x_offset, y_offset, x_ext, y_ext
        );

        self.update_range(&new_x, &new_y);
        self.extend(x_ext, y_ext);
        self.place(field, x_ext, y_ext)?;

        debug_assert_eq!(
            self.image.dim(),
            (self.y_range.len(), self.x_range.len()),
            "canvas shape out of sync with tracked ranges"
        );
        Ok(())
    }
}
