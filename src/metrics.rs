// src/metrics.rs

//! Typeface metrics and the conversion of layout adjustments to font units.
//!
//! The external compiler works on a 1000-unit em square. Slider values from
//! `LayoutAdjustments` are multiplied by per-field factors that grow with the
//! optical size:
//!
//! | field            | factor at 12 pt |
//! |------------------|-----------------|
//! | letter spacing   | 20              |
//! | baseline offset  | 40              |
//! | kerning          | 20              |
//! | char position y  | 40              |
//!
//! Advance hints start from a width class (narrow, medium, wide) so that a
//! handwritten `i` does not get the same advance as an `m`.

use crate::layout::{KerningPair, LayoutAdjustments, REFERENCE_OPTICAL_SIZE};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const DEFAULT_WIDTH: i32 = 512;
pub const DEFAULT_SPACING: i32 = 50;

const LETTER_SPACING_FACTOR: f64 = 20.0;
const BASELINE_OFFSET_FACTOR: f64 = 40.0;
const KERNING_FACTOR: f64 = 20.0;
const POSITION_FACTOR: f64 = 40.0;

/// Coarse horizontal footprint of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidthClass {
    Narrow,
    Medium,
    Wide,
}

impl WidthClass {
    /// Fraction of `DEFAULT_WIDTH` used as the base advance.
    pub fn ratio(self) -> f64 {
        match self {
            WidthClass::Narrow => 0.45,
            WidthClass::Medium => 0.55,
            WidthClass::Wide => 0.85,
        }
    }
}

static WIDTH_CLASSES: Lazy<HashMap<char, WidthClass>> = Lazy::new(|| {
    let narrow = "ilIJft1".chars().map(|c| (c, WidthClass::Narrow));
    let wide = "mwMW".chars().map(|c| (c, WidthClass::Wide));
    narrow.chain(wide).collect()
});

/// Width class of `c`; anything not listed as narrow or wide is medium.
pub fn width_class(c: char) -> WidthClass {
    WIDTH_CLASSES.get(&c).copied().unwrap_or(WidthClass::Medium)
}

/// Multiplier applied to every unit factor for the configured optical size.
pub fn size_factor(adjustments: &LayoutAdjustments) -> f64 {
    if adjustments.optical_size > 0.0 {
        adjustments.optical_size / REFERENCE_OPTICAL_SIZE
    } else {
        1.0
    }
}

/// Suggested advance width of `c` in font units.
pub fn advance_hint(c: char, adjustments: &LayoutAdjustments) -> i32 {
    let base = f64::from(DEFAULT_WIDTH) * width_class(c).ratio();
    let scaled = (base * adjustments.width_scale()).round() as i32;
    let spacing =
        (adjustments.letter_spacing * LETTER_SPACING_FACTOR * size_factor(adjustments)).round() as i32;
    (scaled + DEFAULT_SPACING + spacing).max(0)
}

/// Vertical shift of `c` in font units: its own `y` offset when it has a
/// custom position, otherwise the global baseline offset.
pub fn vertical_offset(c: char, adjustments: &LayoutAdjustments) -> i32 {
    let factor = size_factor(adjustments);
    let shift = match adjustments.char_positions.get(&c) {
        Some(pos) => pos.y * POSITION_FACTOR * factor,
        None => adjustments.baseline_offset * BASELINE_OFFSET_FACTOR * factor,
    };
    shift.round() as i32
}

/// Every kerning pair converted to font units, in pair order.
pub fn kerning_units(adjustments: &LayoutAdjustments) -> Vec<(KerningPair, i32)> {
    let factor = KERNING_FACTOR * size_factor(adjustments);
    adjustments
        .kerning_pairs
        .iter()
        .map(|(pair, value)| (*pair, (value * factor).round() as i32))
        .collect()
}
