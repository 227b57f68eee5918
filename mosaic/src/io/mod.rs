//! File-backed collaborators: the TIFF/PNG field loader and the mosaic writer.

pub mod tiff_stack;
pub mod writer;

use std::path::Path;

use crate::error::{StitchError, StitchResult};

/// Raster container formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFileType {
    Tiff,
    Png,
}

impl ImageFileType {
    pub fn from_path(path: &Path) -> StitchResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("tif") | Some("tiff") => Ok(ImageFileType::Tiff),
            Some("png") => Ok(ImageFileType::Png),
            _ => Err(StitchError::config(format!(
                "unsupported image file type: {}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(
            ImageFileType::from_path(Path::new("a/MMStack_Pos0.ome.tif")).unwrap(),
            ImageFileType::Tiff
        );
        assert_eq!(
            ImageFileType::from_path(Path::new("mip.TIFF")).unwrap(),
            ImageFileType::Tiff
        );
        assert_eq!(
            ImageFileType::from_path(Path::new("mip.png")).unwrap(),
            ImageFileType::Png
        );
        assert!(matches!(
            ImageFileType::from_path(Path::new("notes.txt")),
            Err(StitchError::Configuration(_))
        ));
        assert!(ImageFileType::from_path(Path::new("no_extension")).is_err());
    }
}
