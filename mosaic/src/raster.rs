//! Pixel types, dynamically typed rasters, and the array primitives used by
//! the stitcher: max projection, max merge and quarter-turn rotation.
//!
//! Field loaders return a [`Raster`] because the sample type is only known once
//! a file has been decoded. The canvas is generic over a concrete [`Pixel`]
//! type fixed by the first field, and every later raster is cast into it.

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2, Zip};
use std::fmt::Debug;

use crate::config::Rotation;
use crate::error::{StitchError, StitchResult};
use crate::image_size::PixelShape;

/// 2-D grayscale image whose sample type is decided at decode time.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    U8(Array2<u8>),
    U16(Array2<u16>),
    F32(Array2<f32>),
}

/// Sample type a canvas can be built from.
pub trait Pixel: Copy + PartialOrd + Default + Debug + Send + Sync + 'static {
    /// Short dtype name used in log messages and errors.
    const DTYPE: &'static str;

    /// Wrap a typed array without conversion.
    fn into_raster(array: Array2<Self>) -> Raster;

    /// Take the array out of a raster, casting if its dtype differs.
    ///
    /// Integer narrowing saturates and float to integer rounds to nearest, so a
    /// bright pixel never wraps around to a dark one.
    fn from_raster(raster: Raster) -> Array2<Self>;

    /// The brighter of two samples.
    fn brighter(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl Pixel for u8 {
    const DTYPE: &'static str = "u8";

    fn into_raster(array: Array2<Self>) -> Raster {
        Raster::U8(array)
    }

    fn from_raster(raster: Raster) -> Array2<Self> {
        match raster {
            Raster::U8(a) => a,
            Raster::U16(a) => a.mapv(|v| v.min(u8::MAX as u16) as u8),
            Raster::F32(a) => a.mapv(|v| v.round() as u8),
        }
    }
}

impl Pixel for u16 {
    const DTYPE: &'static str = "u16";

    fn into_raster(array: Array2<Self>) -> Raster {
        Raster::U16(array)
    }

    fn from_raster(raster: Raster) -> Array2<Self> {
        match raster {
            Raster::U8(a) => a.mapv(u16::from),
            Raster::U16(a) => a,
            Raster::F32(a) => a.mapv(|v| v.round() as u16),
        }
    }
}

impl Pixel for f32 {
    const DTYPE: &'static str = "f32";

    fn into_raster(array: Array2<Self>) -> Raster {
        Raster::F32(array)
    }

    fn from_raster(raster: Raster) -> Array2<Self> {
        match raster {
            Raster::U8(a) => a.mapv(f32::from),
            Raster::U16(a) => a.mapv(f32::from),
            Raster::F32(a) => a,
        }
    }
}

impl Raster {
    /// ndarray `(rows, cols)` shape.
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Raster::U8(a) => a.dim(),
            Raster::U16(a) => a.dim(),
            Raster::F32(a) => a.dim(),
        }
    }

    pub fn shape(&self) -> PixelShape {
        PixelShape::from_dim(self.dim())
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Raster::U8(_) => u8::DTYPE,
            Raster::U16(_) => u16::DTYPE,
            Raster::F32(_) => f32::DTYPE,
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Raster {
        match self {
            Raster::U8(a) => Raster::U8(rotate90(a.view(), rotation)),
            Raster::U16(a) => Raster::U16(rotate90(a.view(), rotation)),
            Raster::F32(a) => Raster::F32(rotate90(a.view(), rotation)),
        }
    }

    /// Element-wise maximum with `other`, keeping this raster's dtype.
    pub fn max_with(self, other: Raster) -> StitchResult<Raster> {
        if self.dim() != other.dim() {
            return Err(StitchError::config(format!(
                "cannot max-project rasters of shape {} and {}",
                self.shape(),
                other.shape()
            )));
        }
        Ok(match self {
            Raster::U8(a) => Raster::U8(max_merged(a, other)),
            Raster::U16(a) => Raster::U16(max_merged(a, other)),
            Raster::F32(a) => Raster::F32(max_merged(a, other)),
        })
    }
}

fn max_merged<T: Pixel>(mut acc: Array2<T>, other: Raster) -> Array2<T> {
    let other = T::from_raster(other);
    merge_max(acc.view_mut(), other.view());
    acc
}

/// Overwrite `dst` with the element-wise maximum of `dst` and `src`.
///
/// Shapes must match; callers check this before slicing.
pub fn merge_max<T: Pixel>(dst: ArrayViewMut2<T>, src: ArrayView2<T>) {
    Zip::from(dst)
        .and(src)
        .for_each(|d, &s| *d = d.brighter(s));
}

/// Position-wise maximum of a sequence of same-shaped rasters.
///
/// The result has the dtype of the first raster.
pub fn max_projection<I>(rasters: I) -> StitchResult<Raster>
where
    I: IntoIterator<Item = Raster>,
{
    let mut iter = rasters.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| StitchError::config("max projection of zero images"))?;
    iter.try_fold(first, Raster::max_with)
}

/// Rotate counter-clockwise by the given number of quarter turns.
///
/// Matches the usual rot90 convention: one quarter turn moves the last column
/// to the first row. The result is always in standard layout.
pub fn rotate90<T: Pixel>(array: ArrayView2<T>, rotation: Rotation) -> Array2<T> {
    let rotated = match rotation {
        Rotation::None => array,
        Rotation::Quarter => array.slice_move(s![.., ..;-1]).reversed_axes(),
        Rotation::Half => array.slice_move(s![..;-1, ..;-1]),
        Rotation::ThreeQuarter => array.reversed_axes().slice_move(s![.., ..;-1]),
    };
    rotated.as_standard_layout().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rotate_quarter_matches_rot90() {
        let a = array![[1u16, 2, 3], [4, 5, 6]];
        let r = rotate90(a.view(), Rotation::Quarter);
        assert_eq!(r, array![[3u16, 6], [2, 5], [1, 4]]);
    }

    #[test]
    fn test_rotate_half() {
        let a = array![[1u16, 2, 3], [4, 5, 6]];
        let r = rotate90(a.view(), Rotation::Half);
        assert_eq!(r, array![[6u16, 5, 4], [3, 2, 1]]);
    }

    #[test]
    fn test_rotate_three_quarter() {
        let a = array![[1u16, 2, 3], [4, 5, 6]];
        let r = rotate90(a.view(), Rotation::ThreeQuarter);
        assert_eq!(r, array![[4u16, 1], [5, 2], [6, 3]]);
    }

    #[test]
    fn test_rotate_full_cycle_is_identity() {
        let a = Array2::from_shape_fn((3, 5), |(y, x)| (y * 5 + x) as u8);
        let mut r = a.clone();
        for _ in 0..4 {
            r = rotate90(r.view(), Rotation::Quarter);
        }
        assert_eq!(r, a);
    }

    #[test]
    fn test_rotated_result_is_standard_layout() {
        let a = Array2::from_shape_fn((4, 7), |(y, x)| (y * 7 + x) as f32);
        let r = rotate90(a.view(), Rotation::ThreeQuarter);
        assert!(r.is_standard_layout());
        assert_eq!(r.dim(), (7, 4));
    }

    #[test]
    fn test_max_projection_keeps_brightest() {
        let a = Raster::U16(array![[1, 9], [5, 0]]);
        let b = Raster::U16(array![[4, 2], [5, 7]]);
        let c = Raster::U16(array![[0, 3], [6, 1]]);
        let p = max_projection(vec![a, b, c]).unwrap();
        assert_eq!(p, Raster::U16(array![[4, 9], [6, 7]]));
    }

    #[test]
    fn test_max_projection_keeps_first_dtype() {
        let a = Raster::U8(array![[1, 200]]);
        let b = Raster::U16(array![[300, 5]]);
        let p = max_projection(vec![a, b]).unwrap();
        assert_eq!(p, Raster::U8(array![[255, 200]]));
    }

    #[test]
    fn test_max_projection_empty_and_mismatch() {
        assert!(matches!(
            max_projection(Vec::new()),
            Err(StitchError::Configuration(_))
        ));
        let a = Raster::U16(Array2::zeros((2, 2)));
        let b = Raster::U16(Array2::zeros((2, 3)));
        assert!(matches!(
            max_projection(vec![a, b]),
            Err(StitchError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_raster_casts() {
        let f = Raster::F32(array![[1.4, 1.6, -3.0, 70000.0]]);
        assert_eq!(u16::from_raster(f.clone()), array![[1u16, 2, 0, 65535]]);
        assert_eq!(u8::from_raster(f), array![[1u8, 2, 0, 255]]);
        assert_eq!(
            f32::from_raster(Raster::U16(array![[7]])),
            array![[7.0f32]]
        );
    }

    #[test]
    fn test_merge_max_in_place() {
        let mut dst = array![[1u16, 10], [0, 3]];
        let src = array![[2u16, 4], [0, 8]];
        merge_max(dst.view_mut(), src.view());
        assert_eq!(dst, array![[2u16, 10], [0, 8]]);
    }

    #[test]
    fn test_raster_shape_and_dtype() {
        let r = Raster::F32(Array2::zeros((3, 8)));
        assert_eq!(r.shape(), PixelShape::new(8, 3));
        assert_eq!(r.dtype(), "f32");
    }
}
