// src/mapping.rs

//! The character ↔ region mapping model.
//!
//! A mapping binds one character to a shape inside one source image. Shapes
//! are either axis-aligned rectangles or arbitrary polygons, always stored in
//! the pixel space of the *original, unscaled* image. Display/canvas
//! coordinates never reach this module; see `crate::canvas` for the
//! transform that lives at the UI boundary.
//!
//! The store exposes queries and commands only. It has no notion of a
//! "selected" mapping.

use crate::detect::Region;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// --- Geometry ---

/// A point in original-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned box `{x1, y1, x2, y2}` with `(x1, y1)` the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Coordinate-wise min/max over `points`. `None` for an empty slice.
    pub fn enclosing(points: &[Point]) -> Option<BoundingBox> {
        let first = points.first()?;
        let init = BoundingBox::new(first.x, first.y, first.x, first.y);
        Some(points.iter().skip(1).fold(init, |b, p| BoundingBox {
            x1: b.x1.min(p.x),
            y1: b.y1.min(p.y),
            x2: b.x2.max(p.x),
            y2: b.y2.max(p.y),
        }))
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// True when the width or height is not strictly positive (NaN included).
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Half-open containment: the top/left edges are inside, bottom/right are not.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x1 && p.x < self.x2 && p.y >= self.y1 && p.y < self.y2
    }
}

impl From<Region> for BoundingBox {
    fn from(r: Region) -> Self {
        BoundingBox::new(
            f64::from(r.x),
            f64::from(r.y),
            f64::from(r.right()),
            f64::from(r.bottom()),
        )
    }
}

/// A closed polygon with a cached bounding box.
///
/// The cache is refreshed by every mutation, so `bounding_box()` is always the
/// min/max over the current points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolygonPoints", into = "PolygonPoints")]
pub struct Polygon {
    points: Vec<Point>,
    bounds: BoundingBox,
}

/// Minimum vertex count of a polygon.
pub const MIN_POLYGON_POINTS: usize = 3;

impl Polygon {
    pub fn new(points: Vec<Point>) -> Result<Self, MappingError> {
        if points.len() < MIN_POLYGON_POINTS {
            return Err(MappingError::TooFewPoints(points.len()));
        }
        let bounds = BoundingBox::enclosing(&points).ok_or(MappingError::TooFewPoints(0))?;
        Ok(Self { points, bounds })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    /// Moves vertex `index` and recomputes the bounding box.
    pub fn set_point(&mut self, index: usize, point: Point) -> Result<(), MappingError> {
        let len = self.points.len();
        let slot = self
            .points
            .get_mut(index)
            .ok_or(MappingError::PointOutOfRange { index, len })?;
        *slot = point;
        if let Some(bounds) = BoundingBox::enclosing(&self.points) {
            self.bounds = bounds;
        }
        Ok(())
    }

    /// Ray-casting point-in-polygon test.
    ///
    /// For each edge, a crossing is counted when the horizontal ray through
    /// `p.y` falls within the edge's y-range and the crossing lies to the
    /// right of `p.x`. An odd count means inside.
    pub fn contains(&self, p: Point) -> bool {
        contains_point(&self.points, p)
    }
}

/// Serialized form of a polygon; the bounding box is derived on load.
#[derive(Serialize, Deserialize)]
struct PolygonPoints {
    points: Vec<Point>,
}

impl TryFrom<PolygonPoints> for Polygon {
    type Error = MappingError;

    fn try_from(repr: PolygonPoints) -> Result<Self, Self::Error> {
        Polygon::new(repr.points)
    }
}

impl From<Polygon> for PolygonPoints {
    fn from(polygon: Polygon) -> Self {
        PolygonPoints {
            points: polygon.points,
        }
    }
}

/// Ray-casting test over a raw vertex list; fewer than three vertices is
/// always "outside".
pub fn contains_point(points: &[Point], p: Point) -> bool {
    if points.len() < MIN_POLYGON_POINTS {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (a, b) = (points[i], points[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let cross_x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// The region a character is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Rectangle(BoundingBox),
    Polygon(Polygon),
}

impl Shape {
    /// The crop window handed to extraction.
    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Shape::Rectangle(b) => *b,
            Shape::Polygon(p) => p.bounding_box(),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        match self {
            Shape::Rectangle(b) => b.contains(p),
            Shape::Polygon(poly) => poly.contains(p),
        }
    }
}

impl From<Region> for Shape {
    fn from(r: Region) -> Self {
        Shape::Rectangle(r.into())
    }
}

// --- Identifiers ---

/// Identifier of a mapping entry. Allocated monotonically, so id order is
/// creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(pub u64);

/// Identifier of a source image within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub u64);

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image {}", self.0)
    }
}

// --- Errors ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("shape has a degenerate bounding box ({width} x {height})")]
    DegenerateShape { width: f64, height: f64 },

    #[error("polygon needs at least 3 points, got {0}")]
    TooFewPoints(usize),

    #[error("no mapping with id {0}")]
    UnknownMapping(MappingId),

    #[error("mapping {0} is not a polygon")]
    NotAPolygon(MappingId),

    #[error("point index {index} out of range for polygon with {len} points")]
    PointOutOfRange { index: usize, len: usize },
}

fn check_shape(shape: &Shape) -> Result<(), MappingError> {
    let b = shape.bounding_box();
    if b.is_degenerate() {
        return Err(MappingError::DegenerateShape {
            width: b.width(),
            height: b.height(),
        });
    }
    Ok(())
}

// --- Store ---

/// One character bound to one shape in one source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub id: MappingId,
    pub image: ImageId,
    pub character: char,
    pub shape: Shape,
}

/// The mapping entries of one font-creation session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredMappings")]
pub struct MappingStore {
    /// Kept sorted by id (insertion order).
    entries: Vec<MappingEntry>,
    next_id: u64,
}

/// Serialized form of a store. The id counter on disk is not trusted: it is
/// raised past every stored id on load so new mappings always win ties.
#[derive(Deserialize)]
struct StoredMappings {
    #[serde(default)]
    entries: Vec<MappingEntry>,
    #[serde(default)]
    next_id: u64,
}

impl From<StoredMappings> for MappingStore {
    fn from(stored: StoredMappings) -> Self {
        let mut entries = stored.entries;
        entries.sort_by_key(|e| e.id);
        let past_last = entries.last().map_or(0, |e| e.id.0 + 1);
        if stored.next_id < past_last {
            log::warn!(
                "Mapping: Stored id counter {} is behind existing ids, resuming at {}",
                stored.next_id,
                past_last
            );
        }
        MappingStore {
            entries,
            next_id: stored.next_id.max(past_last),
        }
    }
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn get(&self, id: MappingId) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Binds `character` to `shape` in `image`.
    pub fn add_mapping(
        &mut self,
        image: ImageId,
        character: char,
        shape: Shape,
    ) -> Result<MappingId, MappingError> {
        check_shape(&shape)?;
        let id = MappingId(self.next_id);
        self.next_id += 1;
        log::debug!(
            "Mapping: Added {} '{}' on {} at {:?}",
            id,
            character,
            image,
            shape.bounding_box()
        );
        self.entries.push(MappingEntry {
            id,
            image,
            character,
            shape,
        });
        Ok(id)
    }

    /// Moves one vertex of a polygon mapping. A move that would collapse the
    /// bounding box is rejected and leaves the polygon unchanged.
    pub fn update_polygon_point(
        &mut self,
        id: MappingId,
        index: usize,
        point: Point,
    ) -> Result<(), MappingError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(MappingError::UnknownMapping(id))?;
        let Shape::Polygon(polygon) = &mut entry.shape else {
            return Err(MappingError::NotAPolygon(id));
        };

        let mut updated = polygon.clone();
        updated.set_point(index, point)?;
        let b = updated.bounding_box();
        if b.is_degenerate() {
            return Err(MappingError::DegenerateShape {
                width: b.width(),
                height: b.height(),
            });
        }
        *polygon = updated;
        Ok(())
    }

    pub fn remove_mapping(&mut self, id: MappingId) -> Option<MappingEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Cascade delete for a removed source image. Returns the number of
    /// entries removed.
    pub fn remove_image(&mut self, image: ImageId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.image != image);
        let removed = before - self.entries.len();
        if removed > 0 {
            log::debug!("Mapping: Removed {} mapping(s) with {}", removed, image);
        }
        removed
    }

    /// All mappings on `image`, in creation order.
    pub fn mappings_for_image(&self, image: ImageId) -> Vec<&MappingEntry> {
        self.entries.iter().filter(|e| e.image == image).collect()
    }

    /// The mapping used for `character` during font assembly: when several
    /// images map the same character, the most recently created entry wins.
    pub fn active_mapping_for_char(&self, character: char) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .filter(|e| e.character == character)
            .max_by_key(|e| e.id)
    }

    /// One active mapping per character, ordered by character.
    pub fn active_mappings(&self) -> Vec<&MappingEntry> {
        let mut chars: Vec<char> = self.entries.iter().map(|e| e.character).collect();
        chars.sort_unstable();
        chars.dedup();
        chars
            .into_iter()
            .filter_map(|c| self.active_mapping_for_char(c))
            .collect()
    }

    /// The most recently created mapping on `image` whose shape contains `point`.
    pub fn hit_test(&self, image: ImageId, point: Point) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.image == image && e.shape.contains(point))
    }
}

#[cfg(test)]
mod tests;
