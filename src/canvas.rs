// src/canvas.rs

//! Affine mapping between a display canvas and original-image pixels.
//!
//! Editors draw on a scaled, offset canvas while mappings are stored in the
//! pixel space of the unscaled source image. Everything that crosses that
//! boundary goes through a `CanvasTransform`:
//!
//! ```text
//! canvas = image * scale + offset
//! image  = (canvas - offset) / scale
//! ```

use crate::mapping::{BoundingBox, Point};

/// Image → canvas transform: independent x/y scale plus a translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl CanvasTransform {
    pub const IDENTITY: CanvasTransform = CanvasTransform {
        scale_x: 1.0,
        scale_y: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    /// Uniformly scales an image into a canvas, preserving aspect ratio and
    /// centering the unused axis (letterboxing).
    pub fn fit(image_width: f64, image_height: f64, canvas_width: f64, canvas_height: f64) -> Self {
        if image_width <= 0.0 || image_height <= 0.0 {
            return Self::IDENTITY;
        }
        let scale = (canvas_width / image_width).min(canvas_height / image_height);
        CanvasTransform {
            scale_x: scale,
            scale_y: scale,
            offset_x: (canvas_width - image_width * scale) / 2.0,
            offset_y: (canvas_height - image_height * scale) / 2.0,
        }
    }

    pub fn is_invertible(&self) -> bool {
        self.scale_x != 0.0 && self.scale_y != 0.0 && self.scale_x.is_finite() && self.scale_y.is_finite()
    }

    pub fn to_canvas(&self, p: Point) -> Point {
        Point::new(
            p.x * self.scale_x + self.offset_x,
            p.y * self.scale_y + self.offset_y,
        )
    }

    /// Inverse of `to_canvas`. Returns `None` for a non-invertible transform.
    pub fn to_image(&self, p: Point) -> Option<Point> {
        if !self.is_invertible() {
            return None;
        }
        Some(Point::new(
            (p.x - self.offset_x) / self.scale_x,
            (p.y - self.offset_y) / self.scale_y,
        ))
    }

    /// Maps a box drawn on the canvas back to image space, normalizing the
    /// corners so that `x1 <= x2` and `y1 <= y2` (drags can go either way).
    pub fn box_to_image(&self, canvas_box: BoundingBox) -> Option<BoundingBox> {
        let a = self.to_image(Point::new(canvas_box.x1, canvas_box.y1))?;
        let b = self.to_image(Point::new(canvas_box.x2, canvas_box.y2))?;
        Some(BoundingBox::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y)))
    }

    pub fn box_to_canvas(&self, image_box: BoundingBox) -> BoundingBox {
        let a = self.to_canvas(Point::new(image_box.x1, image_box.y1));
        let b = self.to_canvas(Point::new(image_box.x2, image_box.y2));
        BoundingBox::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }
}
