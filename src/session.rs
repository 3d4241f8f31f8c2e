// src/session.rs

//! A font-creation session on disk.
//!
//! The session document ties together the source images, their mapping
//! entries, and the layout adjustments of one font. It is plain JSON so the
//! CLI can detect into it and assemble from it in separate invocations.
//! Mappings are owned by the session: removing an image removes its
//! mappings with it.

use crate::assembly::ImageSource;
use crate::detect::Region;
use crate::layout::LayoutAdjustments;
use crate::mapping::{ImageId, MappingId, MappingStore, Shape};
use crate::raster::{self, RasterError};
use anyhow::{Context, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A source image registered with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    pub id: ImageId,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SessionDocument")]
pub struct Session {
    pub family_name: String,
    pub images: Vec<SourceImage>,
    pub mappings: MappingStore,
    pub adjustments: LayoutAdjustments,
    next_image_id: u64,
}

/// A session as read from disk, before the image id counter is reconciled
/// with the stored images.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDocument {
    family_name: String,
    #[serde(default)]
    images: Vec<SourceImage>,
    #[serde(default)]
    mappings: MappingStore,
    #[serde(default)]
    adjustments: LayoutAdjustments,
    #[serde(default)]
    next_image_id: u64,
}

impl From<SessionDocument> for Session {
    fn from(doc: SessionDocument) -> Self {
        let past_last = doc.images.iter().map(|i| i.id.0 + 1).max().unwrap_or(0);
        if doc.next_image_id < past_last {
            log::warn!(
                "Session: Stored image counter {} is behind existing ids, resuming at {}",
                doc.next_image_id,
                past_last
            );
        }
        Session {
            family_name: doc.family_name,
            images: doc.images,
            mappings: doc.mappings,
            adjustments: doc.adjustments,
            next_image_id: doc.next_image_id.max(past_last),
        }
    }
}

impl Session {
    pub fn new(family_name: impl Into<String>) -> Self {
        Self {
            family_name: family_name.into(),
            images: Vec::new(),
            mappings: MappingStore::new(),
            adjustments: LayoutAdjustments::default(),
            next_image_id: 0,
        }
    }

    pub fn open(path: &Path) -> Result<Session> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session '{}'", path.display()))?;
        let session = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse session '{}'", path.display()))?;
        Ok(session)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize session")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write session '{}'", path.display()))
    }

    /// Registers an image, reusing the existing id if the path is already known.
    pub fn add_image(&mut self, path: impl Into<PathBuf>) -> ImageId {
        let path = path.into();
        if let Some(existing) = self.images.iter().find(|i| i.path == path) {
            return existing.id;
        }
        let id = ImageId(self.next_image_id);
        self.next_image_id += 1;
        self.images.push(SourceImage { id, path });
        id
    }

    /// Removes an image and every mapping bound to it. Returns the number of
    /// mappings removed, or `None` if the image was unknown.
    pub fn remove_image(&mut self, id: ImageId) -> Option<usize> {
        let pos = self.images.iter().position(|i| i.id == id)?;
        self.images.remove(pos);
        Some(self.mappings.remove_image(id))
    }

    pub fn image_path(&self, id: ImageId) -> Option<&Path> {
        self.images
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.path.as_path())
    }

    /// Binds detected regions to `chars` in reading order. Whitespace in
    /// `chars` is skipped; surplus regions or characters are left unbound.
    pub fn bind_regions(&mut self, image: ImageId, regions: &[Region], chars: &str) -> Vec<MappingId> {
        let glyph_chars = chars.chars().filter(|c| !c.is_whitespace());
        let mut bound = Vec::new();
        for (region, c) in regions.iter().zip(glyph_chars) {
            match self.mappings.add_mapping(image, c, Shape::from(*region)) {
                Ok(id) => bound.push(id),
                Err(e) => log::warn!("Session: Could not bind '{}' to {:?}: {}", c, region, e),
            }
        }
        log::info!("Session: Bound {} region(s) on {}", bound.len(), image);
        bound
    }
}

impl ImageSource for Session {
    fn load(&self, image: ImageId) -> Result<GrayImage, RasterError> {
        let path = self.image_path(image).ok_or_else(|| RasterError::InvalidImage {
            path: None,
            reason: format!("{} is not part of the session", image),
        })?;
        raster::open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn binds_regions_in_reading_order_skipping_whitespace() {
        let mut session = Session::new("Test Hand");
        let img = session.add_image("sample.png");
        let regions = [
            Region::new(0, 0, 12, 12),
            Region::new(20, 0, 12, 12),
            Region::new(40, 0, 12, 12),
        ];
        let ids = session.bind_regions(img, &regions, "a b");
        assert_eq!(ids.len(), 2);
        assert_eq!(session.mappings.active_mapping_for_char('a').unwrap().id, ids[0]);
        let b = session.mappings.active_mapping_for_char('b').unwrap();
        assert_eq!(b.shape.bounding_box().x1, 20.0);
    }

    #[test_log::test]
    fn image_ids_are_stable_per_path() {
        let mut session = Session::new("x");
        let a = session.add_image("a.png");
        let b = session.add_image("b.png");
        assert_ne!(a, b);
        assert_eq!(session.add_image("a.png"), a);
    }

    #[test_log::test]
    fn removing_an_image_cascades() {
        let mut session = Session::new("x");
        let a = session.add_image("a.png");
        let b = session.add_image("b.png");
        session.bind_regions(a, &[Region::new(0, 0, 10, 10)], "q");
        session.bind_regions(b, &[Region::new(0, 0, 10, 10)], "r");

        assert_eq!(session.remove_image(a), Some(1));
        assert!(session.mappings.active_mapping_for_char('q').is_none());
        assert!(session.mappings.active_mapping_for_char('r').is_some());
        assert_eq!(session.remove_image(a), None);
    }

    #[test_log::test]
    fn save_and_load_preserve_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut session = Session::new("Round Trip");
        let img = session.add_image(dir.path().join("page.png"));
        session.bind_regions(img, &[Region::new(5, 5, 20, 30)], "Z");
        session.adjustments.letter_spacing = 1.5;
        session.save(&path).unwrap();

        let mut loaded = Session::open(&path).unwrap();
        assert_eq!(loaded, session);
        // Ids keep increasing after a reload.
        assert_eq!(loaded.add_image(dir.path().join("other.png")), ImageId(1));
    }

    #[test_log::test]
    fn loading_unknown_image_is_invalid_image() {
        let session = Session::new("x");
        let err = ImageSource::load(&session, ImageId(4)).unwrap_err();
        assert!(matches!(err, RasterError::InvalidImage { .. }));
    }

    #[test_log::test]
    fn image_counter_is_raised_past_stored_images() {
        let json = r#"{
            "familyName": "Old File",
            "images": [{"id": 0, "path": "a.png"}, {"id": 3, "path": "b.png"}]
        }"#;
        let mut session: Session = serde_json::from_str(json).unwrap();
        let fresh = session.add_image("c.png");
        assert_eq!(fresh, ImageId(4));
        assert_eq!(session.image_path(ImageId(0)), Some(Path::new("a.png")));
        assert_eq!(session.image_path(fresh), Some(Path::new("c.png")));
    }
}
