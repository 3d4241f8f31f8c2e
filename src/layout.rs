// src/layout.rs

//! Global and per-character layout adjustments applied during font assembly.
//!
//! `LayoutAdjustments` is a plain value object. Every field is independent:
//! a `LayoutPatch` replaces exactly the fields it carries and leaves the rest
//! untouched. Values are in the editor's slider units; conversion to font
//! units happens in `crate::metrics`.
//!
//! The serialized form is the flat camelCase record handed to the font
//! compiler as the adjustments file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Optical size (in points) at which the unit factors are 1:1.
pub const REFERENCE_OPTICAL_SIZE: f64 = 12.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("kerning pair must be exactly two characters, got {0:?}")]
    InvalidKerningPair(String),
}

/// An ordered pair of characters, e.g. `AV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KerningPair {
    pub left: char,
    pub right: char,
}

impl KerningPair {
    pub const fn new(left: char, right: char) -> Self {
        Self { left, right }
    }
}

impl FromStr for KerningPair {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(left), Some(right), None) => Ok(KerningPair { left, right }),
            _ => Err(LayoutError::InvalidKerningPair(s.to_string())),
        }
    }
}

impl TryFrom<String> for KerningPair {
    type Error = LayoutError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<KerningPair> for String {
    fn from(pair: KerningPair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for KerningPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.left, self.right)
    }
}

/// Per-character nudge. Only `y` moves the glyph vertically; `x` widens or
/// narrows the left side bearing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharOffset {
    pub x: f64,
    pub y: f64,
}

/// Layout parameters of one font.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutAdjustments {
    /// Extra space added to every advance (signed).
    pub letter_spacing: f64,
    /// Global vertical shift of every glyph (signed).
    pub baseline_offset: f64,
    /// Character width scale, in percent.
    pub char_width: f64,
    /// Signed kerning per character pair.
    pub kerning_pairs: BTreeMap<KerningPair, f64>,
    /// Per-character offsets.
    pub char_positions: BTreeMap<char, CharOffset>,
    /// Optical size in points; scales all unit factors relative to 12 pt.
    pub optical_size: f64,
}

impl Default for LayoutAdjustments {
    fn default() -> Self {
        LayoutAdjustments {
            letter_spacing: 0.0,
            baseline_offset: 0.0,
            char_width: 100.0,
            kerning_pairs: BTreeMap::new(),
            char_positions: BTreeMap::new(),
            optical_size: REFERENCE_OPTICAL_SIZE,
        }
    }
}

/// A partial update of `LayoutAdjustments`: each `Some` field replaces the
/// corresponding field wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutPatch {
    pub letter_spacing: Option<f64>,
    pub baseline_offset: Option<f64>,
    pub char_width: Option<f64>,
    pub kerning_pairs: Option<BTreeMap<KerningPair, f64>>,
    pub char_positions: Option<BTreeMap<char, CharOffset>>,
    pub optical_size: Option<f64>,
}

impl LayoutPatch {
    pub fn is_empty(&self) -> bool {
        *self == LayoutPatch::default()
    }
}

impl LayoutAdjustments {
    /// Returns a new state with the fields present in `patch` replaced.
    pub fn patch(&self, patch: &LayoutPatch) -> LayoutAdjustments {
        LayoutAdjustments {
            letter_spacing: patch.letter_spacing.unwrap_or(self.letter_spacing),
            baseline_offset: patch.baseline_offset.unwrap_or(self.baseline_offset),
            char_width: patch.char_width.unwrap_or(self.char_width),
            kerning_pairs: patch
                .kerning_pairs
                .clone()
                .unwrap_or_else(|| self.kerning_pairs.clone()),
            char_positions: patch
                .char_positions
                .clone()
                .unwrap_or_else(|| self.char_positions.clone()),
            optical_size: patch.optical_size.unwrap_or(self.optical_size),
        }
    }

    /// Width scale as a factor (`char_width / 100`).
    pub fn width_scale(&self) -> f64 {
        self.char_width / 100.0
    }

    /// True when every field is at its neutral default.
    pub fn is_neutral(&self) -> bool {
        *self == LayoutAdjustments::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LayoutAdjustments {
        let mut adj = LayoutAdjustments {
            letter_spacing: 2.5,
            baseline_offset: -1.0,
            char_width: 90.0,
            ..LayoutAdjustments::default()
        };
        adj.kerning_pairs.insert(KerningPair::new('A', 'V'), -3.0);
        adj.char_positions.insert('g', CharOffset { x: 0.0, y: -2.0 });
        adj
    }

    #[test_log::test]
    fn defaults_are_neutral() {
        let adj = LayoutAdjustments::default();
        assert!(adj.is_neutral());
        assert_eq!(adj.width_scale(), 1.0);
        assert!(adj.kerning_pairs.is_empty());
        assert!(!sample().is_neutral());
    }

    #[test_log::test]
    fn empty_patch_is_identity() {
        let adj = sample();
        let patched = adj.patch(&LayoutPatch::default());
        assert_eq!(patched, adj);
        assert!(LayoutPatch::default().is_empty());
    }

    #[test_log::test]
    fn patch_touches_only_given_fields() {
        let adj = sample();
        let patched = adj.patch(&LayoutPatch {
            letter_spacing: Some(-4.0),
            ..LayoutPatch::default()
        });
        assert_eq!(patched.letter_spacing, -4.0);
        assert_eq!(patched.baseline_offset, adj.baseline_offset);
        assert_eq!(patched.kerning_pairs, adj.kerning_pairs);
        assert_eq!(patched.char_positions, adj.char_positions);
        // The input is a value; it is not mutated.
        assert_eq!(adj.letter_spacing, 2.5);
    }

    #[test_log::test]
    fn kerning_pair_must_be_two_characters() {
        assert_eq!("AV".parse::<KerningPair>(), Ok(KerningPair::new('A', 'V')));
        assert_eq!("éß".parse::<KerningPair>(), Ok(KerningPair::new('é', 'ß')));
        assert!("A".parse::<KerningPair>().is_err());
        assert!("AVA".parse::<KerningPair>().is_err());
        assert!("".parse::<KerningPair>().is_err());
    }

    #[test_log::test]
    fn serializes_as_flat_camel_case_record() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["letterSpacing"], 2.5);
        assert_eq!(json["baselineOffset"], -1.0);
        assert_eq!(json["charWidth"], 90.0);
        assert_eq!(json["kerningPairs"]["AV"], -3.0);
        assert_eq!(json["charPositions"]["g"]["y"], -2.0);

        let back: LayoutAdjustments = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }

    #[test_log::test]
    fn rejects_malformed_kerning_keys() {
        let bad = r#"{ "kerningPairs": { "AVX": -2 } }"#;
        assert!(serde_json::from_str::<LayoutAdjustments>(bad).is_err());

        let partial: LayoutAdjustments = serde_json::from_str(r#"{ "letterSpacing": 3 }"#).unwrap();
        assert_eq!(partial.letter_spacing, 3.0);
        assert_eq!(partial.char_width, 100.0);
    }
}
