//! Field and canvas dimensions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height of a field or canvas in pixels.
///
/// ndarray reports shapes as `(rows, cols)`; this type always stores them in
/// image order so width can never be confused with row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelShape {
    /// Width in pixels (x, columns)
    pub width: usize,
    /// Height in pixels (y, rows)
    pub height: usize,
}

impl PixelShape {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Build from an ndarray `dim()` tuple, which is `(rows, cols)`.
    pub fn from_dim(dim: (usize, usize)) -> Self {
        let (rows, cols) = dim;
        Self::new(cols, rows)
    }

    /// Shape as an ndarray `(rows, cols)` tuple.
    pub fn to_dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Width and height exchanged, as seen after an odd number of quarter turns.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

impl From<(usize, usize)> for PixelShape {
    /// Interprets the tuple as `(width, height)`.
    fn from(dimensions: (usize, usize)) -> Self {
        Self::new(dimensions.0, dimensions.1)
    }
}

impl fmt::Display for PixelShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_from_dim_swaps_rows_and_cols() {
        let arr = Array2::<u16>::zeros((30, 40));
        let shape = PixelShape::from_dim(arr.dim());
        assert_eq!(shape.width, 40);
        assert_eq!(shape.height, 30);
        assert_eq!(shape.to_dim(), (30, 40));
    }

    #[test]
    fn test_transposed() {
        let shape = PixelShape::new(2048, 1024);
        assert_eq!(shape.transposed(), PixelShape::new(1024, 2048));
        assert_eq!(shape.transposed().transposed(), shape);
    }

    #[test]
    fn test_pixel_count() {
        assert_eq!(PixelShape::new(16, 8).pixel_count(), 128);
        assert_eq!(PixelShape::new(0, 100).pixel_count(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PixelShape::new(2048, 2048)), "2048x2048");
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = PixelShape::new(1920, 1080);
        let json = serde_json::to_string(&original).unwrap();
        let recovered: PixelShape = serde_json::from_str(&json).unwrap();
        assert_eq!(original, recovered);
    }
}
