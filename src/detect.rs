// src/detect.rs

//! Locates candidate glyph regions in a raster image.
//!
//! Detection is projection-histogram segmentation, a cheap stand-in for full
//! connected-component analysis:
//!
//! ```text
//! gray image ──> row histogram ──> text bands (runs of dense rows)
//!                                      │
//!                                      v
//!                 per band: column histogram ──> column runs ──> size filter ──> regions
//! ```
//!
//! No classifier is involved. The detector is a pure function of the pixel
//! buffer and its configuration: the same image always yields the same
//! regions, in reading order (bands top-to-bottom, regions left-to-right).

use crate::config::DetectionConfig;
use crate::raster::is_ink;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A rectangular pixel-space window believed to contain one glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Clips the region to an image of `image_width` x `image_height`.
    ///
    /// Returns `None` when nothing of the region lies inside the image.
    pub fn clipped(&self, image_width: u32, image_height: u32) -> Option<Region> {
        let right = self.right().min(image_width);
        let bottom = self.bottom().min(image_height);
        if self.x >= right || self.y >= bottom {
            return None;
        }
        Some(Region::new(self.x, self.y, right - self.x, bottom - self.y))
    }
}

/// Projection-histogram region detector.
#[derive(Debug, Clone, Default)]
pub struct RegionDetector {
    config: DetectionConfig,
}

impl RegionDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Runs detection over `image`. An image without foreground pixels yields
    /// an empty vector.
    pub fn detect(&self, image: &GrayImage) -> Vec<Region> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let row_counts = self.row_histogram(image);
        let row_threshold = f64::from(width) * self.config.row_density;
        let bands = dense_runs(&row_counts, row_threshold);
        log::debug!(
            "Detector: {} text band(s) in {}x{} image (row threshold {:.2})",
            bands.len(),
            width,
            height,
            row_threshold
        );

        let mut regions = Vec::new();
        for band in bands {
            let band_height = band.end - band.start;
            let col_counts = self.column_histogram(image, band.clone());
            let col_threshold = f64::from(band_height) * self.config.column_density;

            for columns in dense_runs(&col_counts, col_threshold) {
                let candidate = Region::new(
                    columns.start,
                    band.start,
                    columns.end - columns.start,
                    band_height,
                );
                if self.accepts(&candidate, width, height) {
                    regions.push(candidate);
                } else {
                    log::trace!("Detector: Rejected candidate {:?}", candidate);
                }
            }
        }

        log::info!("Detector: Found {} candidate region(s).", regions.len());
        regions
    }

    /// Size filter: rejects noise specks and whole-image false positives.
    fn accepts(&self, region: &Region, image_width: u32, image_height: u32) -> bool {
        let min = self.config.min_extent;
        let max_w = f64::from(image_width) * self.config.max_fraction;
        let max_h = f64::from(image_height) * self.config.max_fraction;
        region.width >= min
            && region.height >= min
            && f64::from(region.width) <= max_w
            && f64::from(region.height) <= max_h
    }

    fn row_histogram(&self, image: &GrayImage) -> Vec<u32> {
        let threshold = self.config.binarize_threshold;
        image
            .rows()
            .map(|row| row.filter(|p| is_ink(p.0[0], threshold)).count() as u32)
            .collect()
    }

    fn column_histogram(&self, image: &GrayImage, rows: Range<u32>) -> Vec<u32> {
        let threshold = self.config.binarize_threshold;
        let mut counts = vec![0u32; image.width() as usize];
        for y in rows {
            for (x, count) in counts.iter_mut().enumerate() {
                if is_ink(image.get_pixel(x as u32, y).0[0], threshold) {
                    *count += 1;
                }
            }
        }
        counts
    }
}

/// Maximal runs of indices whose count is strictly greater than `threshold`.
fn dense_runs(counts: &[u32], threshold: f64) -> Vec<Range<u32>> {
    let mut runs = Vec::new();
    let mut start: Option<u32> = None;
    for (i, &count) in counts.iter().enumerate() {
        let i = i as u32;
        match (f64::from(count) > threshold, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..counts.len() as u32);
    }
    runs
}
