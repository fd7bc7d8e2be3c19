use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::canvas::LabelBuffer;
use crate::components::events::EventLog;
use crate::config::{LabelConfig, SessionConfig};

/// Suffix appended to an image's file stem for its mask file.
pub const MASK_SUFFIX: &str = "_mask";

#[derive(Debug)]
pub enum IoError {
    Io(std::io::Error),
    Image(image::ImageError),
    Json(serde_json::Error),
    InvalidFormat(String),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::Io(e) => write!(f, "I/O error: {}", e),
            IoError::Image(e) => write!(f, "Image error: {}", e),
            IoError::Json(e) => write!(f, "JSON error: {}", e),
            IoError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::Io(e) => Some(e),
            IoError::Image(e) => Some(e),
            IoError::Json(e) => Some(e),
            IoError::InvalidFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e)
    }
}

impl From<image::ImageError> for IoError {
    fn from(e: image::ImageError) -> Self {
        IoError::Image(e)
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        IoError::Json(e)
    }
}

// ============================================================================
// IMAGES & MASKS
// ============================================================================

/// Decode any supported image format to RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage, IoError> {
    let img = image::open(path)?;
    Ok(img.to_rgba8())
}

/// Read an 8-bit grayscale mask; the intensity is the label id.
///
/// Colour or 16-bit files are rejected rather than converted, since a
/// luminance conversion would not preserve label ids.
pub fn load_mask(path: &Path) -> Result<LabelBuffer, IoError> {
    let img = image::open(path)?;
    match img {
        image::DynamicImage::ImageLuma8(gray) => Ok(LabelBuffer::from_gray_image(&gray)),
        other => Err(IoError::InvalidFormat(format!(
            "{}: expected 8-bit grayscale mask, found {:?}",
            path.display(),
            other.color()
        ))),
    }
}

/// Write a mask as an 8-bit grayscale PNG.
pub fn save_mask(mask: &LabelBuffer, path: &Path) -> Result<(), IoError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    PngEncoder::new(writer).write_image(mask.as_raw(), mask.width(), mask.height(), ColorType::L8)?;
    Ok(())
}

/// `dir/photo.jpg` → `dir/photo_mask.png`, or into `out_dir` when given.
pub fn mask_path_for(image: &Path, out_dir: Option<&Path>) -> PathBuf {
    let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let name = format!("{}{}.png", stem, MASK_SUFFIX);
    match out_dir {
        Some(dir) => dir.join(name),
        None => image.with_file_name(name),
    }
}

// ============================================================================
// CONFIGURATION & EVENT LOG
// ============================================================================

pub fn load_session_config(path: &Path) -> Result<SessionConfig, IoError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn load_label_config(path: &Path) -> Result<LabelConfig, IoError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_events(events: &EventLog, path: &Path) -> Result<(), IoError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, events.events())?;
    Ok(())
}
