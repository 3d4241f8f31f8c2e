// src/extract.rs

//! Crops a mapped shape out of its source image as a standalone,
//! binarized character raster.
//!
//! Rectangles and polygons follow the same rules: the crop window is the
//! shape's bounding box rounded to whole pixels, grown by a fixed padding,
//! and clipped to the image. The polygon outline does not mask pixels; the
//! font compiler places every glyph in a rectangular advance box anyway.

use crate::config::ExtractionConfig;
use crate::mapping::{BoundingBox, Shape};
use crate::raster;
use image::{imageops, GrayImage};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// The crop window is empty once clipped to the image.
    #[error("invalid region {window:?} for {image_width}x{image_height} image")]
    InvalidRegion {
        window: BoundingBox,
        image_width: u32,
        image_height: u32,
    },
}

/// Integer crop window `[x1, x2) x [y1, y2)` in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropWindow {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, Default)]
pub struct CharacterExtractor {
    config: ExtractionConfig,
}

impl CharacterExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Computes the padded, clipped crop window for `bounds` on an image of
    /// the given size.
    pub fn crop_window(
        &self,
        bounds: BoundingBox,
        image_width: u32,
        image_height: u32,
    ) -> Result<CropWindow, ExtractError> {
        let pad = f64::from(self.config.padding);
        let clamp_x = |v: f64| v.clamp(0.0, f64::from(image_width)) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, f64::from(image_height)) as u32;

        let invalid = || ExtractError::InvalidRegion {
            window: bounds,
            image_width,
            image_height,
        };
        // NaN would survive clamp() and cast to 0; reject it up front.
        if [bounds.x1, bounds.y1, bounds.x2, bounds.y2]
            .iter()
            .any(|v| !v.is_finite())
        {
            return Err(invalid());
        }

        let window = CropWindow {
            x1: clamp_x(bounds.x1.round() - pad),
            y1: clamp_y(bounds.y1.round() - pad),
            x2: clamp_x(bounds.x2.round() + pad),
            y2: clamp_y(bounds.y2.round() + pad),
        };
        if window.x2 <= window.x1 || window.y2 <= window.y1 {
            return Err(invalid());
        }
        Ok(window)
    }

    /// Extracts `shape` from `source` and binarizes the crop.
    pub fn extract(&self, source: &GrayImage, shape: &Shape) -> Result<GrayImage, ExtractError> {
        let (width, height) = source.dimensions();
        // A degenerate shape can still produce a non-empty padded window; the
        // shape itself must have area.
        let bounds = shape.bounding_box();
        if bounds.is_degenerate() {
            return Err(ExtractError::InvalidRegion {
                window: bounds,
                image_width: width,
                image_height: height,
            });
        }

        let window = self.crop_window(bounds, width, height)?;
        let crop = imageops::crop_imm(source, window.x1, window.y1, window.width(), window.height())
            .to_image();
        log::trace!("Extractor: Cropped {:?} -> {:?}", bounds, window);
        Ok(raster::binarize(&crop, self.config.binarize_threshold))
    }
}
