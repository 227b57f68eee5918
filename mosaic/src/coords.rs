//! Stage-to-pixel coordinate mapping.
//!
//! Stage positions are reported in microns. The first field placed defines
//! pixel (0, 0) and every later field is positioned by the difference between
//! its stage position and the first one, divided by the effective pixel size.

use serde::{Deserialize, Serialize};

use crate::error::{StitchError, StitchResult};
use crate::image_size::PixelShape;

/// Physical stage coordinate in microns.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePosition {
    pub x: f64,
    pub y: f64,
    /// Carried for completeness; stitching is purely 2-D.
    pub z: f64,
}

impl StagePosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Half-open pixel interval `[min, max)` along one canvas axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRange {
    pub min: i64,
    pub max: i64,
}

impl PixelRange {
    pub fn new(min: i64, max: i64) -> Self {
        debug_assert!(min <= max, "pixel range must be ascending");
        Self { min, max }
    }

    /// Range covered by a field of `len` pixels starting at `offset`.
    pub fn from_offset(offset: i64, len: usize) -> StitchResult<Self> {
        let max = i64::try_from(len)
            .ok()
            .and_then(|len| offset.checked_add(len))
            .filter(|max| offset.unsigned_abs().max(max.unsigned_abs()) <= MAX_PIXEL_OFFSET as u64)
            .ok_or_else(|| {
                StitchError::config(format!(
                    "field of {len} px at offset {offset} exceeds the canvas coordinate range"
                ))
            })?;
        Ok(Self::new(offset, max))
    }

    pub fn len(&self) -> usize {
        (self.max - self.min) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.max == self.min
    }

    /// How far `other` sticks out past this range on the low and high side.
    ///
    /// Positive values mean the range must grow on that side; zero or negative
    /// means `other` already fits.
    pub fn extensions_for(&self, other: &PixelRange) -> [i64; 2] {
        [self.min - other.min, other.max - self.max]
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &PixelRange) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }
}

/// Largest distance from the first field, in pixels, a canvas coordinate may
/// take. Keeps range arithmetic far away from `i64` overflow.
pub const MAX_PIXEL_OFFSET: i64 = i32::MAX as i64;

/// Convert a stage displacement into a whole number of pixels.
///
/// Rounds half away from zero, so a displacement of exactly +0.5 px becomes
/// 1 and -0.5 px becomes -1. A displacement that is not finite or lies beyond
/// [`MAX_PIXEL_OFFSET`] is a metadata error.
pub fn pixel_offset(start_um: f64, end_um: f64, pixel_size_um: f64) -> StitchResult<i64> {
    let pixels = ((end_um - start_um) / pixel_size_um).round();
    if !pixels.is_finite() || pixels.abs() > MAX_PIXEL_OFFSET as f64 {
        return Err(StitchError::metadata(format!(
            "stage move from {start_um} um to {end_um} um at {pixel_size_um} um/px \
             is out of pixel range"
        )));
    }
    Ok(pixels as i64)
}

/// Pixel offset of `pos` relative to `start`, with axis inversion and swap.
///
/// Inversion is applied per stage axis first; the swap then exchanges the
/// results so that stage x drives camera y.
pub fn xy_offsets(
    start: &StagePosition,
    pos: &StagePosition,
    invert_x: bool,
    invert_y: bool,
    swap_axes: bool,
    pixel_size_um: f64,
) -> StitchResult<(i64, i64)> {
    let mut x = pixel_offset(start.x, pos.x, pixel_size_um)?;
    if invert_x {
        x = -x;
    }
    let mut y = pixel_offset(start.y, pos.y, pixel_size_um)?;
    if invert_y {
        y = -y;
    }
    Ok(if swap_axes { (y, x) } else { (x, y) })
}

/// Integer factor by which `actual` was reduced from the acquired `raw` shape.
///
/// Both axes must shrink by the same exact integer; anything else means the
/// pixel size derived from metadata would be wrong for every field.
pub fn downsample_factor(raw: PixelShape, actual: PixelShape) -> StitchResult<usize> {
    if raw == actual {
        return Ok(1);
    }
    if actual.width == 0 || actual.height == 0 {
        return Err(StitchError::config(format!(
            "field has empty shape {actual}, metadata reports {raw}"
        )));
    }
    if raw.width % actual.width != 0 || raw.height % actual.height != 0 {
        return Err(StitchError::config(format!(
            "field shape {actual} is not an integer downsample of metadata shape {raw}"
        )));
    }
    let fx = raw.width / actual.width;
    let fy = raw.height / actual.height;
    if fx != fy {
        return Err(StitchError::config(format!(
            "field shape {actual} implies different downsample factors ({fx} in x, {fy} in y) from {raw}"
        )));
    }
    Ok(fx)
}

/// Microns per canvas pixel: sensor pixel size times binning times downsampling.
pub fn effective_pixel_size(
    pixel_size_um: f64,
    binning: u32,
    downsample: usize,
) -> StitchResult<f64> {
    let size = pixel_size_um * binning as f64 * downsample as f64;
    if !size.is_finite() || size <= 0.0 {
        return Err(StitchError::config(format!(
            "effective pixel size must be positive, got {size} um \
             (pixel size {pixel_size_um}, binning {binning}, downsample {downsample})"
        )));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_offset_basic() {
        assert_eq!(pixel_offset(0.0, 10.0, 1.0).unwrap(), 10);
        assert_eq!(pixel_offset(10.0, 0.0, 1.0).unwrap(), -10);
        assert_eq!(pixel_offset(100.0, 100.0, 0.1625).unwrap(), 0);
        assert_eq!(pixel_offset(0.0, 332.8, 0.325).unwrap(), 1024);
    }

    #[test]
    fn test_pixel_offset_rounds_half_away_from_zero() {
        assert_eq!(pixel_offset(0.0, 0.5, 1.0).unwrap(), 1);
        assert_eq!(pixel_offset(0.0, -0.5, 1.0).unwrap(), -1);
        assert_eq!(pixel_offset(0.0, 1.5, 1.0).unwrap(), 2);
        assert_eq!(pixel_offset(0.0, 2.5, 1.0).unwrap(), 3);
        assert_eq!(pixel_offset(0.0, 0.49, 1.0).unwrap(), 0);
    }

    #[test]
    fn test_pixel_offset_rejects_absurd_displacement() {
        assert!(matches!(
            pixel_offset(0.0, 1e30, 1.0),
            Err(StitchError::Metadata(_))
        ));
        assert!(matches!(
            pixel_offset(0.0, -1e30, 1.0),
            Err(StitchError::Metadata(_))
        ));
        assert!(pixel_offset(0.0, f64::NAN, 1.0).is_err());
        assert!(pixel_offset(0.0, 1.0, 0.0).is_err());

        let start = StagePosition::default();
        let far = StagePosition::new(0.0, 1e30, 0.0);
        assert!(xy_offsets(&start, &far, false, false, false, 1.0).is_err());
    }

    #[test]
    fn test_range_from_offset_rejects_overflow() {
        assert_eq!(
            PixelRange::from_offset(-5, 10).unwrap(),
            PixelRange::new(-5, 5)
        );
        assert!(matches!(
            PixelRange::from_offset(MAX_PIXEL_OFFSET, 10),
            Err(StitchError::Configuration(_))
        ));
        assert!(PixelRange::from_offset(i64::MAX, 1).is_err());
        assert!(PixelRange::from_offset(i64::MIN, 1).is_err());
    }

    #[test]
    fn test_xy_offsets_plain() {
        let start = StagePosition::new(0.0, 0.0, 0.0);
        let pos = StagePosition::new(10.0, 0.0, 5.0);
        assert_eq!(xy_offsets(&start, &pos, false, false, false, 1.0).unwrap(), (10, 0));
    }

    #[test]
    fn test_xy_offsets_inversion() {
        let start = StagePosition::new(0.0, 0.0, 0.0);
        let pos = StagePosition::new(10.0, 4.0, 0.0);
        assert_eq!(xy_offsets(&start, &pos, true, false, false, 1.0).unwrap(), (-10, 4));
        assert_eq!(xy_offsets(&start, &pos, false, true, false, 1.0).unwrap(), (10, -4));
    }

    #[test]
    fn test_xy_offsets_swap_after_inversion() {
        let start = StagePosition::new(0.0, 0.0, 0.0);
        let pos = StagePosition::new(10.0, 4.0, 0.0);
        assert_eq!(xy_offsets(&start, &pos, false, false, true, 1.0).unwrap(), (4, 10));
        assert_eq!(xy_offsets(&start, &pos, true, false, true, 1.0).unwrap(), (4, -10));
    }

    #[test]
    fn test_pixel_range_extensions() {
        let canvas = PixelRange::new(0, 100);
        assert_eq!(canvas.extensions_for(&PixelRange::new(10, 90)), [-10, -10]);
        assert_eq!(canvas.extensions_for(&PixelRange::new(-20, 80)), [20, -20]);
        assert_eq!(canvas.extensions_for(&PixelRange::new(50, 150)), [-50, 50]);
        assert_eq!(canvas.extensions_for(&PixelRange::new(0, 100)), [0, 0]);
    }

    #[test]
    fn test_pixel_range_union_is_monotonic() {
        let a = PixelRange::new(0, 100);
        let b = PixelRange::from_offset(-10, 50).unwrap();
        let u = a.union(&b);
        assert_eq!(u, PixelRange::new(-10, 100));
        assert_eq!(u.len(), 110);
        assert_eq!(u.union(&PixelRange::new(20, 30)), u);
    }

    #[test]
    fn test_downsample_factor_exact() {
        let raw = PixelShape::new(2048, 2048);
        assert_eq!(downsample_factor(raw, raw).unwrap(), 1);
        assert_eq!(downsample_factor(raw, PixelShape::new(512, 512)).unwrap(), 4);
    }

    #[test]
    fn test_downsample_factor_rejects_inexact() {
        let raw = PixelShape::new(2048, 2048);
        assert!(matches!(
            downsample_factor(raw, PixelShape::new(600, 600)),
            Err(StitchError::Configuration(_))
        ));
        assert!(matches!(
            downsample_factor(raw, PixelShape::new(1024, 512)),
            Err(StitchError::Configuration(_))
        ));
        assert!(matches!(
            downsample_factor(raw, PixelShape::new(0, 512)),
            Err(StitchError::Configuration(_))
        ));
    }

    #[test]
    fn test_effective_pixel_size() {
        assert_relative_eq!(effective_pixel_size(0.1625, 2, 4).unwrap(), 1.3);
        assert!(effective_pixel_size(0.0, 1, 1).is_err());
        assert!(effective_pixel_size(f64::NAN, 1, 1).is_err());
    }
}
