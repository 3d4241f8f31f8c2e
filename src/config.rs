// src/config.rs

//! Defines the configuration structures for `inkfont`.
//!
//! The configuration is a JSON document whose sections mirror the stages of
//! the pipeline: region detection, character extraction, the external font
//! compiler, and the assembly run itself. Every section carries
//! `#[serde(default)]`, so a partial file (or none at all) yields sensible
//! defaults for everything left unspecified.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a configuration file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "INKFONT_CONFIG";

// --- Top-Level Configuration Structure ---

/// Represents the complete configuration for the font builder.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Region detection thresholds.
    pub detection: DetectionConfig,
    /// Crop padding and binarization for extracted characters.
    pub extraction: ExtractionConfig,
    /// How the external font compiler is launched.
    pub compiler: CompilerConfig,
    /// Working-directory policy for assembly runs.
    pub assembly: AssemblyConfig,
}

impl Config {
    /// Loads configuration from `path`, or from `$INKFONT_CONFIG` when `path`
    /// is `None`. Without either, the defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let Some(path) = path.map(Path::to_path_buf).or(from_env) else {
            log::info!("Config: No configuration file given, using defaults.");
            return Ok(Config::default());
        };
        Self::from_file(&path)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        log::info!("Config: Loaded configuration from '{}'.", path.display());
        Ok(config)
    }
}

// --- Detection Configuration ---

/// Parameters of the projection-histogram region detector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Pixels with intensity strictly below this value are foreground.
    pub binarize_threshold: u8,
    /// A row belongs to a text band when its foreground count exceeds
    /// `image_width * row_density`.
    pub row_density: f64,
    /// A column belongs to a candidate when its foreground count (within the
    /// band) exceeds `band_height * column_density`.
    pub column_density: f64,
    /// Minimum accepted width and height, in pixels.
    pub min_extent: u32,
    /// Maximum accepted width/height as a fraction of the image width/height.
    pub max_fraction: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            binarize_threshold: 128,
            row_density: 0.01,
            column_density: 0.01,
            min_extent: 10,
            max_fraction: 0.5,
        }
    }
}

// --- Extraction Configuration ---

/// Parameters of the character extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Pixels added around the crop window on every side (clipped to the image).
    pub padding: u32,
    /// Threshold used to binarize the crop.
    pub binarize_threshold: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            padding: 2,
            binarize_threshold: 128,
        }
    }
}

// --- Compiler Configuration ---

/// Describes the external font compiler executable.
///
/// The process is launched as
/// `<program> <args...> <charmap> <output stem> <family> <format> [<adjustments>]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments placed before the positional job arguments
    /// (e.g. `["-script", "scripts/generate_font.py"]` for FontForge).
    pub args: Vec<String>,
    /// Wall-clock limit for a single compile, in seconds.
    pub timeout_secs: u64,
}

impl CompilerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            program: PathBuf::from("fontforge"),
            args: vec!["-script".to_string(), "scripts/generate_font.py".to_string()],
            timeout_secs: 120,
        }
    }
}

// --- Assembly Configuration ---

/// Working-directory policy for assembly runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Parent directory for per-run working directories. `None` uses the
    /// system temporary directory.
    pub work_dir: Option<PathBuf>,
    /// Keep the working directory (crops, character map, adjustments file)
    /// after the run, for debugging.
    pub keep_artifacts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "extraction": { "padding": 4 } }"#).unwrap();
        assert_eq!(config.extraction.padding, 4);
        assert_eq!(config.extraction.binarize_threshold, 128);
        assert_eq!(config.detection, DetectionConfig::default());
        assert_eq!(config.compiler.timeout(), Duration::from_secs(120));
    }

    #[test_log::test]
    fn from_file_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
    }

    #[test_log::test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inkfont.json");
        std::fs::write(&path, r#"{ "compiler": { "program": "/usr/bin/true", "timeout_secs": 5 } }"#)
            .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.compiler.program, PathBuf::from("/usr/bin/true"));
        assert_eq!(config.compiler.timeout_secs, 5);
        // Unspecified arguments keep their defaults.
        assert_eq!(config.compiler.args, CompilerConfig::default().args);
    }
}
