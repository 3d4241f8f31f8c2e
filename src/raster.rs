// src/raster.rs

//! Raster input/output shared by the detector and the extractor.
//!
//! Every source image is reduced to 8-bit grayscale as soon as it is decoded;
//! the rest of the crate only ever deals with `GrayImage` buffers. A pixel is
//! "ink" when its intensity is strictly below the binarization threshold.

use image::{GrayImage, ImageFormat, Luma};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Intensity assigned to foreground pixels after binarization.
pub const INK: u8 = 0;
/// Intensity assigned to background pixels after binarization.
pub const PAPER: u8 = 255;

/// Errors raised while reading or writing rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The source bytes could not be decoded as an image.
    #[error("invalid image{}: {reason}", source_label(.path))]
    InvalidImage {
        path: Option<PathBuf>,
        reason: String,
    },

    /// A raster could not be written to disk.
    #[error("failed to write raster to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

fn source_label(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" '{}'", p.display()),
        None => String::new(),
    }
}

/// Decodes an in-memory image (PNG, JPEG, BMP) into grayscale.
pub fn decode(bytes: &[u8]) -> Result<GrayImage, RasterError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| RasterError::InvalidImage {
        path: None,
        reason: e.to_string(),
    })?;
    Ok(decoded.to_luma8())
}

/// Opens an image file and converts it to grayscale.
pub fn open(path: &Path) -> Result<GrayImage, RasterError> {
    let decoded = image::open(path).map_err(|e| RasterError::InvalidImage {
        path: Some(path.to_path_buf()),
        reason: e.to_string(),
    })?;
    log::debug!(
        "Raster: Opened '{}' ({}x{})",
        path.display(),
        decoded.width(),
        decoded.height()
    );
    Ok(decoded.to_luma8())
}

/// The foreground predicate used by detection and binarization alike.
#[inline]
pub fn is_ink(luma: u8, threshold: u8) -> bool {
    luma < threshold
}

/// Produces a two-level copy of `image`: ink pixels become `INK`, the rest `PAPER`.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, Luma([value])) in image.enumerate_pixels() {
        let level = if is_ink(*value, threshold) { INK } else { PAPER };
        out.put_pixel(x, y, Luma([level]));
    }
    out
}

/// Writes a raster as PNG, regardless of the extension on `path`.
pub fn save_png(image: &GrayImage, path: &Path) -> Result<(), RasterError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| RasterError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn decode_rejects_garbage() {
        let err = decode(b"definitely not a png").unwrap_err();
        assert!(matches!(err, RasterError::InvalidImage { path: None, .. }));
    }

    #[test_log::test]
    fn binarize_splits_at_threshold() {
        let mut img = GrayImage::from_pixel(3, 1, Luma([200]));
        img.put_pixel(0, 0, Luma([10]));
        img.put_pixel(1, 0, Luma([128]));
        let bin = binarize(&img, 128);
        assert_eq!(bin.get_pixel(0, 0).0[0], INK);
        // Exactly at threshold counts as paper.
        assert_eq!(bin.get_pixel(1, 0).0[0], PAPER);
        assert_eq!(bin.get_pixel(2, 0).0[0], PAPER);
    }

    #[test_log::test]
    fn png_written_by_save_png_decodes_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crop.png");
        let img = GrayImage::from_pixel(4, 5, Luma([INK]));
        save_png(&img, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.dimensions(), (4, 5));
        assert_eq!(back.get_pixel(3, 4).0[0], INK);
    }
}
