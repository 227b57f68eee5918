//! Output sink for finished mosaics.
//!
//! The format follows the file extension. Pixel values are written exactly as
//! stitched: no rescaling or normalization is applied, so a 16-bit mosaic stays
//! 16-bit on disk.

use image::{ImageBuffer, ImageFormat, Luma};
use ndarray::Array2;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::info;

use super::ImageFileType;
use crate::error::{StitchError, StitchResult};
use crate::raster::Raster;

/// Write a mosaic to `path`, creating parent directories as needed.
///
/// TIFF accepts u8, u16 and f32 rasters. PNG accepts u8 and u16 only.
///
/// The image is encoded into a temporary file next to `path` and renamed into
/// place once complete, so a failed write leaves any previous file untouched
/// and never leaves a truncated mosaic behind.
pub fn save_mosaic(path: &Path, raster: &Raster) -> StitchResult<()> {
    let file_type = ImageFileType::from_path(path)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    match file_type {
        ImageFileType::Tiff => save_as_tiff(staged.as_file_mut(), path, raster)?,
        ImageFileType::Png => save_as_png(staged.as_file_mut(), path, raster)?,
    }
    staged.persist(path).map_err(|e| StitchError::Io(e.error))?;

    info!(
        "Saved {} {} mosaic to {}",
        raster.shape(),
        raster.dtype(),
        path.display()
    );
    Ok(())
}

fn encode_err(path: &Path, e: impl std::fmt::Display) -> StitchError {
    StitchError::Encode(format!("{}: {e}", path.display()))
}

fn flat<T: Copy>(frame: &Array2<T>) -> (u32, u32, Vec<T>) {
    let (height, width) = frame.dim();
    let data = frame.iter().copied().collect();
    (width as u32, height as u32, data)
}

fn save_as_tiff(file: &mut File, path: &Path, raster: &Raster) -> StitchResult<()> {
    let mut encoder = TiffEncoder::new(file).map_err(|e| encode_err(path, e))?;

    match raster {
        Raster::U8(frame) => {
            let (w, h, data) = flat(frame);
            encoder.write_image::<colortype::Gray8>(w, h, &data)
        }
        Raster::U16(frame) => {
            let (w, h, data) = flat(frame);
            encoder.write_image::<colortype::Gray16>(w, h, &data)
        }
        Raster::F32(frame) => {
            let (w, h, data) = flat(frame);
            encoder.write_image::<colortype::Gray32Float>(w, h, &data)
        }
    }
    .map_err(|e| encode_err(path, e))
}

fn save_as_png(file: &mut File, path: &Path, raster: &Raster) -> StitchResult<()> {
    match raster {
        Raster::U8(frame) => {
            let (w, h, data) = flat(frame);
            let buf = ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(w, h, data)
                .ok_or_else(|| encode_err(path, "buffer size mismatch"))?;
            buf.write_to(file, ImageFormat::Png)
                .map_err(|e| encode_err(path, e))
        }
        Raster::U16(frame) => {
            let (w, h, data) = flat(frame);
            let buf = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, data)
                .ok_or_else(|| encode_err(path, "buffer size mismatch"))?;
            buf.write_to(file, ImageFormat::Png)
                .map_err(|e| encode_err(path, e))
        }
        Raster::F32(_) => Err(encode_err(
            path,
            "f32 mosaics cannot be stored as PNG, use a .tif path",
        )),
    }
}
