//! JPEG encoding of captured frames.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tracing::{debug, warn};

use crate::error::{CameraError, Result};
use crate::traits::{FourCC, Frame};

/// Write `frame` to `path` as a JPEG file.
///
/// MJPG frames are already JPEG and are written untouched. YUYV and RGB3
/// frames are converted and encoded at `quality`. A file that fails halfway
/// is removed so it never counts as a capture.
pub fn save_jpeg(frame: &Frame, quality: u8, path: &Path) -> Result<()> {
    let result = write_jpeg(frame, quality, path);
    if result.is_err() && path.exists() {
        if let Err(err) = fs::remove_file(path) {
            warn!("Could not remove partial capture {}: {err}", path.display());
        }
    }
    result
}

fn write_jpeg(frame: &Frame, quality: u8, path: &Path) -> Result<()> {
    let fourcc = frame.metadata.format.fourcc;
    // Convert before touching the filesystem
    let image = match fourcc {
        FourCC::MJPG => None,
        FourCC::YUYV => Some(yuyv_to_rgb(frame)?),
        FourCC::RGB3 => Some(rgb3_to_image(frame)?),
        _ => return Err(CameraError::FormatNotSupported(frame.metadata.format.clone())),
    };

    let mut writer = BufWriter::new(File::create(path)?);
    match image {
        None => {
            let used = (frame.metadata.bytes_used as usize).min(frame.data.len());
            writer.write_all(frame.data.get(..used).unwrap_or_default())?;
        }
        Some(image) => {
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode_image(&image)?;
        }
    }
    writer.flush()?;

    debug!(path = %path.display(), ?fourcc, "frame encoded");
    Ok(())
}

fn check_length(frame: &Frame) -> Result<()> {
    let format = &frame.metadata.format;
    let needed = format.stride as usize * format.height as usize;
    if frame.data.len() < needed {
        return Err(CameraError::StreamError(format!(
            "short frame: {} bytes, expected {needed}",
            frame.data.len()
        )));
    }
    Ok(())
}

fn yuyv_to_rgb(frame: &Frame) -> Result<RgbImage> {
    check_length(frame)?;
    let format = &frame.metadata.format;
    Ok(RgbImage::from_fn(format.width, format.height, |x, y| {
        let (r, g, b) = frame.pixel_at(x, y).unwrap_or((0, 0, 0));
        Rgb([r, g, b])
    }))
}

fn rgb3_to_image(frame: &Frame) -> Result<RgbImage> {
    check_length(frame)?;
    let format = &frame.metadata.format;
    let row_bytes = format.width as usize * 3;
    let pixels: Vec<u8> = frame
        .data
        .chunks(format.stride as usize)
        .take(format.height as usize)
        .flat_map(|row| row.iter().take(row_bytes).copied())
        .collect();

    RgbImage::from_raw(format.width, format.height, pixels)
        .ok_or_else(|| CameraError::StreamError("RGB3 frame does not fill its format".to_owned()))
}
