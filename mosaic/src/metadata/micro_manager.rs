//! Micro-Manager JSON metadata sidecars.
//!
//! Micro-Manager writes a `*metadata.txt` file next to each TIFF stack. It is a
//! JSON object with a `Summary` block followed by one `FrameKey-t-c-z` entry
//! per image plane, in acquisition order:
//!
//! ```json
//! {
//!   "Summary": { "Width": 2048, "Height": 2048, ... },
//!   "FrameKey-0-0-0": {
//!     "FileName": "MMStack_Pos0.ome.tif",
//!     "ROI": "0-0-2048-2048",
//!     "XPositionUm": 1520.5, "YPositionUm": -310.0, "ZPositionUm": 42.0,
//!     "PixelSizeUm": 0.1625, "Binning": 1
//!   }
//! }
//! ```
//!
//! Numeric values are sometimes written as strings, so every lookup accepts both.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

use super::{AcquisitionMetadata, MetadataReader};
use crate::coords::StagePosition;
use crate::error::{StitchError, StitchResult};
use crate::field::FieldSource;

const FRAME_KEY: &str = "FrameKey";
const SUMMARY_KEY: &str = "Summary";
const METADATA_MARKER: &str = "metadata";
const OME_MARKER: &str = ".ome";

/// True if `path` names a Micro-Manager metadata sidecar.
pub fn is_metadata_file(path: &Path) -> bool {
    let is_txt = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
    let named = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(METADATA_MARKER));
    is_txt && named
}

/// Find the sidecar that describes `path`.
///
/// `path` may be the sidecar itself, an image file, or the directory holding
/// them. Sidecars are ranked by how their name relates to the image name
/// (without `.ome...`): starting with it, then containing it as a whole
/// `_`/`.`-delimited part, then containing it at all. Without any match the
/// first sidecar in the directory is used.
pub fn locate_sidecar(path: &Path) -> StitchResult<PathBuf> {
    if path.is_file() && is_metadata_file(path) {
        return Ok(path.to_path_buf());
    }

    let dir = if path.is_dir() {
        path.to_path_buf()
    } else {
        match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    };

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map_err(|e| {
            StitchError::metadata(format!("cannot list {} for metadata: {e}", dir.display()))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_metadata_file(p))
        .collect();
    candidates.sort();

    if !path.is_dir() {
        if let Some(stem) = image_stem(path) {
            let best = candidates
                .iter()
                .filter_map(|c| {
                    let name = c.file_name()?.to_str()?;
                    stem_match_rank(name, stem).map(|rank| (rank, c))
                })
                .min_by_key(|(rank, _)| *rank);
            if let Some((rank, found)) = best {
                if rank == StemMatch::Embedded {
                    warn!(
                        "Metadata sidecar {} only loosely matches {}",
                        found.display(),
                        path.display()
                    );
                }
                return Ok(found.clone());
            }
        }
    }

    match candidates.into_iter().next() {
        Some(fallback) => {
            warn!(
                "No metadata sidecar named after {}, falling back to {}",
                path.display(),
                fallback.display()
            );
            Ok(fallback)
        }
        None => Err(StitchError::metadata(format!(
            "Micro-Manager metadata file not found for {}",
            path.display()
        ))),
    }
}

/// How a sidecar name relates to an image stem, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum StemMatch {
    Prefix,
    Delimited,
    Embedded,
}

/// `MMStack_Pos1` names `MMStack_Pos1_metadata.txt` but not
/// `MMStack_Pos10_metadata.txt`, so the stem has to end at a delimiter.
fn stem_match_rank(name: &str, stem: &str) -> Option<StemMatch> {
    let delimited_at = |idx: usize| {
        matches!(name[idx + stem.len()..].chars().next(), None | Some('_' | '.'))
    };
    let hits: Vec<usize> = name.match_indices(stem).map(|(idx, _)| idx).collect();
    if hits.first() == Some(&0) && delimited_at(0) {
        Some(StemMatch::Prefix)
    } else if hits.iter().any(|&idx| delimited_at(idx)) {
        Some(StemMatch::Delimited)
    } else if !hits.is_empty() {
        Some(StemMatch::Embedded)
    } else {
        None
    }
}

/// Image file name with everything from `.ome` onwards removed.
fn image_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let stem = match name.find(OME_MARKER) {
        Some(idx) => &name[..idx],
        None => path.file_stem()?.to_str()?,
    };
    (!stem.is_empty()).then_some(stem)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Binning may be `2`, `"2"` or `"2x2"`.
fn as_binning(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|b| b as u64))
            .and_then(|b| u32::try_from(b).ok()),
        Value::String(s) => s.split('x').next()?.trim().parse().ok(),
        _ => None,
    }
}

/// Width and height from an `x-y-width-height` ROI string.
fn parse_roi(roi: &str) -> Option<(usize, usize)> {
    let parts: Vec<&str> = roi.split('-').collect();
    if parts.len() < 2 {
        return None;
    }
    let width = parts[parts.len() - 2].trim().parse().ok()?;
    let height = parts[parts.len() - 1].trim().parse().ok()?;
    Some((width, height))
}

/// Parsed contents of one metadata sidecar.
#[derive(Debug, Clone)]
pub struct MicroManagerMetadata {
    path: PathBuf,
    summary: Map<String, Value>,
    frames: Vec<Map<String, Value>>,
}

impl MicroManagerMetadata {
    /// Locate and parse the sidecar for an image, directory or sidecar path.
    pub fn open(path: &Path) -> StitchResult<Self> {
        let sidecar = locate_sidecar(path)?;
        let json = std::fs::read_to_string(&sidecar).map_err(|e| {
            StitchError::metadata(format!("cannot read {}: {e}", sidecar.display()))
        })?;
        Self::parse(&json, sidecar)
    }

    pub fn parse(json: &str, path: PathBuf) -> StitchResult<Self> {
        let root: Map<String, Value> = serde_json::from_str(json).map_err(|e| {
            StitchError::metadata(format!("invalid metadata JSON in {}: {e}", path.display()))
        })?;

        let summary = match root.get(SUMMARY_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        let frames: Vec<Map<String, Value>> = root
            .iter()
            .filter(|(key, _)| key.contains(FRAME_KEY))
            .filter_map(|(_, value)| value.as_object().cloned())
            .collect();

        if frames.is_empty() {
            return Err(StitchError::metadata(format!(
                "no {FRAME_KEY} entries in {}",
                path.display()
            )));
        }

        Ok(Self {
            path,
            summary,
            frames,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of image planes described by the sidecar.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of planes stored in the given image file.
    pub fn frames_in_file(&self, file_name: &str) -> usize {
        self.frames
            .iter()
            .filter(|f| f.get("FileName").and_then(Value::as_str) == Some(file_name))
            .count()
    }

    /// Index of the first frame stored in `file_name`.
    pub fn first_frame_of_file(&self, file_name: &str) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.get("FileName").and_then(Value::as_str) == Some(file_name))
    }

    /// Stage position, pixel size, binning and acquired shape of one frame.
    pub fn frame(&self, index: usize) -> StitchResult<AcquisitionMetadata> {
        let frame = self.frames.get(index).ok_or_else(|| {
            StitchError::metadata(format!(
                "frame {index} out of range, {} has {} frames",
                self.path.display(),
                self.frames.len()
            ))
        })?;

        let number = |key: &str| -> StitchResult<f64> {
            frame.get(key).and_then(as_f64).ok_or_else(|| {
                StitchError::metadata(format!(
                    "frame {index} in {} has no numeric {key}",
                    self.path.display()
                ))
            })
        };

        let position = StagePosition::new(
            number("XPositionUm")?,
            number("YPositionUm")?,
            frame.get("ZPositionUm").and_then(as_f64).unwrap_or(0.0),
        );
        let pixel_size_um = number("PixelSizeUm")?;
        let binning = frame.get("Binning").and_then(as_binning).ok_or_else(|| {
            StitchError::metadata(format!(
                "frame {index} in {} has no Binning",
                self.path.display()
            ))
        })?;

        let (width_px, height_px) = match frame
            .get("ROI")
            .and_then(Value::as_str)
            .and_then(parse_roi)
        {
            Some(dims) => dims,
            None => self.summary_dims().ok_or_else(|| {
                StitchError::metadata(format!(
                    "frame {index} in {} has no ROI and the summary has no Width/Height",
                    self.path.display()
                ))
            })?,
        };

        Ok(AcquisitionMetadata {
            position,
            pixel_size_um,
            binning,
            width_px,
            height_px,
        })
    }

    fn summary_dims(&self) -> Option<(usize, usize)> {
        let width = self.summary.get("Width").and_then(as_f64)? as usize;
        let height = self.summary.get("Height").and_then(as_f64)? as usize;
        Some((width, height))
    }
}

/// [`MetadataReader`] backed by Micro-Manager sidecars.
///
/// Parsed sidecars are cached by path, since a multi-position stack resolves
/// the same sidecar once per page.
#[derive(Debug, Default)]
pub struct MicroManagerReader {
    cache: RefCell<HashMap<PathBuf, Rc<MicroManagerMetadata>>>,
}

impl MicroManagerReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed sidecar for an image path, from cache when possible.
    pub fn sidecar_for(&self, image: &Path) -> StitchResult<Rc<MicroManagerMetadata>> {
        let sidecar = locate_sidecar(image)?;
        if let Some(cached) = self.cache.borrow().get(&sidecar) {
            return Ok(Rc::clone(cached));
        }

        debug!("Reading metadata sidecar {}", sidecar.display());
        let parsed = Rc::new(MicroManagerMetadata::open(&sidecar)?);
        self.cache.borrow_mut().insert(sidecar, Rc::clone(&parsed));
        Ok(parsed)
    }

    /// One page source per frame stored in `image`, for stacks that hold a
    /// separate stage position on every page.
    pub fn page_sources(&self, image: &Path) -> StitchResult<Vec<FieldSource>> {
        let metadata = self.sidecar_for(image)?;
        let count = file_name(image)
            .map(|name| metadata.frames_in_file(name))
            .filter(|&n| n > 0)
            .unwrap_or_else(|| metadata.frame_count());
        Ok(FieldSource::pages(image, count))
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

impl MetadataReader for MicroManagerReader {
    fn read(&self, source: &FieldSource) -> StitchResult<AcquisitionMetadata> {
        let image = source
            .primary_path()
            .ok_or_else(|| StitchError::metadata(format!("field {source} has no image file")))?;
        let metadata = self.sidecar_for(image)?;

        let first = file_name(image)
            .and_then(|name| metadata.first_frame_of_file(name))
            .unwrap_or(0);
        let index = match source {
            FieldSource::Page { index, .. } => first + index,
            FieldSource::File(_) | FieldSource::Files(_) => first,
        };
        metadata.frame(index)
    }
}
