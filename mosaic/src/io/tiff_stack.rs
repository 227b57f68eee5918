//! Field loader for TIFF stacks and PNG images.
//!
//! A multi-page TIFF is reduced to one plane by a running max projection, so
//! only two pages are held in memory at a time regardless of stack depth.

use ndarray::Array2;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;
use tracing::debug;

use super::ImageFileType;
use crate::error::{StitchError, StitchResult};
use crate::field::{FieldLoader, FieldSource};
use crate::raster::Raster;

/// Loads fields from TIFF and PNG files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffStackLoader;

impl TiffStackLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FieldLoader for TiffStackLoader {
    fn project(&self, source: &FieldSource) -> StitchResult<Raster> {
        match source {
            FieldSource::File(path) => project_file(path),
            FieldSource::Files(paths) => {
                let mut iter = paths.iter();
                let first = iter
                    .next()
                    .ok_or_else(|| StitchError::config("field source lists no files"))?;
                iter.try_fold(project_file(first)?, |acc, path| {
                    acc.max_with(project_file(path)?)
                })
            }
            FieldSource::Page { path, index } => match ImageFileType::from_path(path)? {
                ImageFileType::Tiff => read_tiff_page(path, *index),
                ImageFileType::Png if *index == 0 => read_png(path),
                ImageFileType::Png => Err(StitchError::config(format!(
                    "{} is a single-page PNG, page {index} requested",
                    path.display()
                ))),
            },
        }
    }
}

/// Max projection of every plane in one file.
pub fn project_file(path: &Path) -> StitchResult<Raster> {
    match ImageFileType::from_path(path)? {
        ImageFileType::Tiff => project_tiff(path),
        ImageFileType::Png => read_png(path),
    }
}

fn open_decoder(path: &Path) -> StitchResult<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    Decoder::new(BufReader::new(file))
        .map_err(|e| StitchError::Decode(format!("{}: {e}", path.display())))
}

fn decode_page(decoder: &mut Decoder<BufReader<File>>, path: &Path) -> StitchResult<Raster> {
    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(StitchError::Decode(format!(
                "{}: expected grayscale pages, found {other:?}",
                path.display()
            )))
        }
    }

    let (width, height) = decoder.dimensions()?;
    let shape = (height as usize, width as usize);
    let reshape_err =
        |e: ndarray::ShapeError| StitchError::Decode(format!("{}: {e}", path.display()));

    match decoder.read_image()? {
        DecodingResult::U8(data) => Ok(Raster::U8(
            Array2::from_shape_vec(shape, data).map_err(reshape_err)?,
        )),
        DecodingResult::U16(data) => Ok(Raster::U16(
            Array2::from_shape_vec(shape, data).map_err(reshape_err)?,
        )),
        DecodingResult::F32(data) => Ok(Raster::F32(
            Array2::from_shape_vec(shape, data).map_err(reshape_err)?,
        )),
        _ => Err(StitchError::Decode(format!(
            "{}: unsupported sample format (expected u8, u16 or f32)",
            path.display()
        ))),
    }
}

/// Max projection across all pages of a TIFF stack.
pub fn project_tiff(path: &Path) -> StitchResult<Raster> {
    let mut decoder = open_decoder(path)?;
    let mut projection = decode_page(&mut decoder, path)?;
    let mut pages = 1;

    while decoder.more_images() {
        decoder.next_image()?;
        let page = decode_page(&mut decoder, path)?;
        projection = projection.max_with(page)?;
        pages += 1;
    }

    debug!("Projected {} pages from {}", pages, path.display());
    Ok(projection)
}

/// A single page of a TIFF stack, counting from zero.
pub fn read_tiff_page(path: &Path, index: usize) -> StitchResult<Raster> {
    let mut decoder = open_decoder(path)?;
    for _ in 0..index {
        if !decoder.more_images() {
            return Err(StitchError::Decode(format!(
                "{}: page {index} requested but the stack is shorter",
                path.display()
            )));
        }
        decoder.next_image()?;
    }
    decode_page(&mut decoder, path)
}

/// Read a PNG as a grayscale raster, keeping 16-bit data at 16 bits.
pub fn read_png(path: &Path) -> StitchResult<Raster> {
    use image::DynamicImage;

    let image = image::open(path)?;
    let (width, height) = (image.width() as usize, image.height() as usize);
    let reshape_err =
        |e: ndarray::ShapeError| StitchError::Decode(format!("{}: {e}", path.display()));

    match image {
        DynamicImage::ImageLuma16(buf) => Ok(Raster::U16(
            Array2::from_shape_vec((height, width), buf.into_raw()).map_err(reshape_err)?,
        )),
        DynamicImage::ImageLuma8(buf) => Ok(Raster::U8(
            Array2::from_shape_vec((height, width), buf.into_raw()).map_err(reshape_err)?,
        )),
        wide @ (DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)) => {
            let gray = wide.into_luma16();
            Ok(Raster::U16(
                Array2::from_shape_vec((height, width), gray.into_raw()).map_err(reshape_err)?,
            ))
        }
        other => {
            let gray = other.into_luma8();
            Ok(Raster::U8(
                Array2::from_shape_vec((height, width), gray.into_raw()).map_err(reshape_err)?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn write_stack(path: &Path, pages: &[Array2<u16>]) {
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        for page in pages {
            let (h, w) = page.dim();
            let data: Vec<u16> = page.iter().copied().collect();
            encoder
                .write_image::<colortype::Gray16>(w as u32, h as u32, &data)
                .unwrap();
        }
    }

    #[test]
    fn test_project_tiff_stack() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.tif");
        write_stack(
            &path,
            &[
                array![[1, 50, 3], [4, 5, 6]],
                array![[9, 2, 3], [4, 5, 60]],
                array![[0, 0, 30], [40, 0, 0]],
            ],
        );

        let projection = TiffStackLoader.project(&FieldSource::File(path)).unwrap();
        assert_eq!(projection, Raster::U16(array![[9, 50, 30], [40, 5, 60]]));
    }

    #[test]
    fn test_read_single_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("positions.tif");
        write_stack(&path, &[array![[1, 1]], array![[2, 2]], array![[3, 3]]]);

        let page = TiffStackLoader
            .project(&FieldSource::Page {
                path: path.clone(),
                index: 1,
            })
            .unwrap();
        assert_eq!(page, Raster::U16(array![[2, 2]]));

        let past_end = TiffStackLoader.project(&FieldSource::Page { path, index: 3 });
        assert!(matches!(past_end, Err(StitchError::Decode(_))));
    }

    #[test]
    fn test_multiple_files_are_max_combined() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.tif");
        let b = dir.path().join("b.tif");
        write_stack(&a, &[array![[10, 0], [0, 0]]]);
        write_stack(&b, &[array![[0, 20], [0, 5]], array![[0, 0], [7, 0]]]);

        let projection = TiffStackLoader
            .project(&FieldSource::Files(vec![a, b]))
            .unwrap();
        assert_eq!(projection, Raster::U16(array![[10, 20], [7, 5]]));
    }

    #[test]
    fn test_png_roundtrip_keeps_16_bit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mip.png");
        let buf = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_raw(
            2,
            1,
            vec![1000, 40000],
        )
        .unwrap();
        buf.save(&path).unwrap();

        let raster = project_file(&path).unwrap();
        assert_eq!(raster, Raster::U16(array![[1000, 40000]]));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = project_file(&dir.path().join("missing.tif"));
        assert!(matches!(result, Err(StitchError::Io(_))));
    }

    #[test]
    fn test_empty_file_list() {
        assert!(matches!(
            TiffStackLoader.project(&FieldSource::Files(Vec::new())),
            Err(StitchError::Configuration(_))
        ));
    }
}
