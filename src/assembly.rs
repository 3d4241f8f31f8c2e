// src/assembly.rs

//! The font assembly pipeline.
//!
//! One run walks a fixed state machine:
//!
//! ```text
//! Init -> ExtractingCharacters -> BuildingCharacterMap -> InvokingCompiler -> VerifyingOutput -> Completed
//!   \____________________\_____________________\___________________\______________> Failed
//! ```
//!
//! Per-character problems (a degenerate crop, an unreadable source image) are
//! collected as warnings and the character is dropped. Everything else
//! aborts the run at the current stage. The caller always receives an
//! `AssemblyOutcome`, never a bare error.
//!
//! Every run writes its crops, character map, and adjustments file into its
//! own fresh working directory, so two runs never share artifacts. There are
//! no retries; a failed run is started again from `Init` by the caller.

use crate::compiler::{CompileError, CompileJob, FontCompiler, FontFormat};
use crate::config::{AssemblyConfig, ExtractionConfig};
use crate::extract::CharacterExtractor;
use crate::layout::LayoutAdjustments;
use crate::mapping::{ImageId, MappingId, MappingStore};
use crate::metrics;
use crate::raster::{self, RasterError};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

pub const CHARMAP_FILE: &str = "charmap.json";
pub const ADJUSTMENTS_FILE: &str = "adjustments.json";

// --- Image sources ---

/// Supplies the decoded source image for an `ImageId`.
pub trait ImageSource {
    fn load(&self, image: ImageId) -> Result<GrayImage, RasterError>;
}

impl ImageSource for HashMap<ImageId, GrayImage> {
    fn load(&self, image: ImageId) -> Result<GrayImage, RasterError> {
        self.get(&image).cloned().ok_or_else(|| RasterError::InvalidImage {
            path: None,
            reason: format!("no source image for {}", image),
        })
    }
}

// --- State machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyStage {
    Init,
    ExtractingCharacters,
    BuildingCharacterMap,
    InvokingCompiler,
    VerifyingOutput,
    Completed,
    Failed,
}

impl AssemblyStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, AssemblyStage::Completed | AssemblyStage::Failed)
    }

    /// The next stage on the success path, `None` for terminal stages.
    pub fn successor(self) -> Option<AssemblyStage> {
        use AssemblyStage::*;
        match self {
            Init => Some(ExtractingCharacters),
            ExtractingCharacters => Some(BuildingCharacterMap),
            BuildingCharacterMap => Some(InvokingCompiler),
            InvokingCompiler => Some(VerifyingOutput),
            VerifyingOutput => Some(Completed),
            Completed | Failed => None,
        }
    }

    pub fn can_transition_to(self, next: AssemblyStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == AssemblyStage::Failed || self.successor() == Some(next)
    }
}

impl fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssemblyStage::Init => "init",
            AssemblyStage::ExtractingCharacters => "extracting characters",
            AssemblyStage::BuildingCharacterMap => "building character map",
            AssemblyStage::InvokingCompiler => "invoking compiler",
            AssemblyStage::VerifyingOutput => "verifying output",
            AssemblyStage::Completed => "completed",
            AssemblyStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current stage and the path taken through the state machine.
#[derive(Debug)]
struct AssemblyRun {
    stage: AssemblyStage,
    history: Vec<AssemblyStage>,
}

impl AssemblyRun {
    fn new() -> Self {
        Self {
            stage: AssemblyStage::Init,
            history: vec![AssemblyStage::Init],
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.successor() {
            log::info!("Assembly: {} -> {}", self.stage, next);
            self.stage = next;
            self.history.push(next);
        }
    }

    /// Moves to `Failed`, remembering the stage the failure happened in.
    fn fail(mut self, error: AssemblyError, warnings: Vec<ExtractionWarning>) -> AssemblyOutcome {
        debug_assert!(self.stage.can_transition_to(AssemblyStage::Failed));
        let stage = self.stage;
        log::error!("Assembly: Failed while {}: {}", stage, error);
        self.history.push(AssemblyStage::Failed);
        AssemblyOutcome::Failed(FailedAssembly {
            stage,
            error,
            warnings,
            stages: self.history,
        })
    }
}

// --- Errors and results ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    /// Every selected mapping was dropped during extraction.
    #[error("no characters could be extracted ({skipped} mapping(s) skipped)")]
    NoCharactersExtracted { skipped: usize },

    /// The compiler reported failure (or timed out).
    #[error("font compiler failed (exit code {}): {diagnostics}", exit_label(.exit_code))]
    CompilerFailed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// The compiler claimed success but the expected file is missing or empty.
    #[error("expected font file '{}' is missing or empty", .path.display())]
    OutputMissing { path: PathBuf },

    /// A working artifact could not be written.
    #[error("failed to write '{}': {reason}", .path.display())]
    Artifact { path: PathBuf, reason: String },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl From<CompileError> for AssemblyError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Failed {
                exit_code,
                diagnostics,
            } => AssemblyError::CompilerFailed {
                exit_code,
                diagnostics,
            },
        }
    }
}

/// A character dropped during extraction, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionWarning {
    pub character: char,
    pub mapping: MappingId,
    pub reason: String,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped '{}' (mapping {}): {}", self.character, self.mapping, self.reason)
    }
}

/// Which mapping ended up in the font for a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembledCharacter {
    pub character: char,
    pub mapping: MappingId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFont {
    pub path: PathBuf,
    pub data: Vec<u8>,
    pub format: FontFormat,
    pub characters: Vec<AssembledCharacter>,
    pub warnings: Vec<ExtractionWarning>,
    /// Location of the kept character map, when artifacts are kept.
    pub charmap_path: Option<PathBuf>,
    pub stages: Vec<AssemblyStage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedAssembly {
    /// The stage that was running when the run failed.
    pub stage: AssemblyStage,
    pub error: AssemblyError,
    pub warnings: Vec<ExtractionWarning>,
    pub stages: Vec<AssemblyStage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    Completed(CompletedFont),
    Failed(FailedAssembly),
}

impl AssemblyOutcome {
    pub fn warnings(&self) -> &[ExtractionWarning] {
        match self {
            AssemblyOutcome::Completed(c) => &c.warnings,
            AssemblyOutcome::Failed(f) => &f.warnings,
        }
    }

    pub fn stages(&self) -> &[AssemblyStage] {
        match self {
            AssemblyOutcome::Completed(c) => &c.stages,
            AssemblyOutcome::Failed(f) => &f.stages,
        }
    }

    pub fn final_stage(&self) -> AssemblyStage {
        match self {
            AssemblyOutcome::Completed(_) => AssemblyStage::Completed,
            AssemblyOutcome::Failed(_) => AssemblyStage::Failed,
        }
    }
}

impl fmt::Display for AssemblyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyOutcome::Completed(c) => write!(
                f,
                "completed with {} character(s), {} warning(s): {}",
                c.characters.len(),
                c.warnings.len(),
                c.path.display()
            ),
            AssemblyOutcome::Failed(x) => write!(f, "failed at stage '{}': {}", x.stage, x.error),
        }
    }
}

// --- Character map artifact ---

/// One record of the character map handed to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterMapEntry {
    #[serde(rename = "char")]
    pub character: char,
    pub unicode: u32,
    /// Binarized PNG crop.
    pub path: PathBuf,
    pub advance_hint: i32,
    pub vertical_offset: i32,
    /// Kerning against following characters present in the map, in font units.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kerning: BTreeMap<char, i32>,
}

/// The ordered, write-once handoff to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CharacterMap {
    entries: Vec<CharacterMapEntry>,
}

impl CharacterMap {
    fn new(mut entries: Vec<CharacterMapEntry>) -> Self {
        entries.sort_by_key(|e| e.character);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A successfully extracted character on its way into the map.
#[derive(Debug, Clone)]
struct GlyphRecord {
    character: char,
    mapping: MappingId,
    raster: GrayImage,
}

// --- Pipeline ---

/// Inputs of one assembly run.
pub struct AssemblyRequest<'a> {
    pub family_name: &'a str,
    pub format: FontFormat,
    /// Output path without extension; the font lands at `<stem>.<format>`.
    pub output_stem: &'a Path,
    pub mappings: &'a MappingStore,
    pub images: &'a dyn ImageSource,
    pub adjustments: &'a LayoutAdjustments,
}

/// Runs assembly against a `FontCompiler`.
pub struct FontAssembler<'a> {
    compiler: &'a dyn FontCompiler,
    extractor: CharacterExtractor,
    config: AssemblyConfig,
}

impl<'a> FontAssembler<'a> {
    pub fn new(
        compiler: &'a dyn FontCompiler,
        extraction: ExtractionConfig,
        config: AssemblyConfig,
    ) -> Self {
        Self {
            compiler,
            extractor: CharacterExtractor::new(extraction),
            config,
        }
    }

    pub fn assemble(&self, request: &AssemblyRequest<'_>) -> AssemblyOutcome {
        let mut run = AssemblyRun::new();
        log::info!(
            "Assembly: Building '{}' ({}) from {} mapping(s)",
            request.family_name,
            request.format,
            request.mappings.len()
        );

        // --- Extracting characters ---
        run.advance();
        let mut warnings = Vec::new();
        let glyphs = self.extract_characters(request, &mut warnings);
        if glyphs.is_empty() {
            let skipped = warnings.len();
            return run.fail(AssemblyError::NoCharactersExtracted { skipped }, warnings);
        }

        // --- Building the character map ---
        run.advance();
        let work_dir = match self.create_work_dir() {
            Ok(dir) => dir,
            Err(e) => return run.fail(e, warnings),
        };
        let charmap = match write_character_map(work_dir.path(), &glyphs, request.adjustments) {
            Ok(map) => map,
            Err(e) => return run.fail(e, warnings),
        };
        // Neutral adjustments are left off the command line entirely.
        let adjustments_path = if request.adjustments.is_neutral() {
            None
        } else {
            let path = work_dir.path().join(ADJUSTMENTS_FILE);
            if let Err(e) = write_json(&path, request.adjustments) {
                return run.fail(e, warnings);
            }
            Some(path)
        };
        log::debug!("Assembly: Character map has {} entries", charmap.len());

        // --- Invoking the compiler ---
        run.advance();
        let job = CompileJob {
            charmap_path: work_dir.path().join(CHARMAP_FILE),
            adjustments_path,
            output_stem: request.output_stem.to_path_buf(),
            family_name: request.family_name.to_string(),
            format: request.format,
        };
        let output_path = job.output_path();
        if let Err(e) = prepare_output(&output_path) {
            return run.fail(e, warnings);
        }
        if let Err(e) = self.compiler.compile(&job) {
            return run.fail(e.into(), warnings);
        }

        // --- Verifying the output ---
        run.advance();
        let data = match verify_output(&output_path) {
            Ok(data) => data,
            Err(e) => return run.fail(e, warnings),
        };

        run.advance();
        let charmap_path = if self.config.keep_artifacts {
            let kept = work_dir.keep();
            log::info!("Assembly: Kept working artifacts in '{}'", kept.display());
            Some(kept.join(CHARMAP_FILE))
        } else {
            None
        };

        let characters = glyphs
            .iter()
            .map(|g| AssembledCharacter {
                character: g.character,
                mapping: g.mapping,
            })
            .collect();
        AssemblyOutcome::Completed(CompletedFont {
            path: output_path,
            data,
            format: request.format,
            characters,
            warnings,
            charmap_path,
            stages: run.history,
        })
    }

    /// Extracts the active mapping of every character. Failures are recorded
    /// in `warnings` and the character is dropped.
    fn extract_characters(
        &self,
        request: &AssemblyRequest<'_>,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Vec<GlyphRecord> {
        let mut images: HashMap<ImageId, Result<GrayImage, String>> = HashMap::new();
        let mut glyphs = Vec::new();

        for entry in request.mappings.active_mappings() {
            let source = images
                .entry(entry.image)
                .or_insert_with(|| request.images.load(entry.image).map_err(|e| e.to_string()));

            let result = match source {
                Ok(image) => self
                    .extractor
                    .extract(image, &entry.shape)
                    .map_err(|e| e.to_string()),
                Err(reason) => Err(reason.clone()),
            };

            match result {
                Ok(raster) => {
                    log::debug!(
                        "Assembly: Extracted '{}' from mapping {} ({}x{})",
                        entry.character,
                        entry.id,
                        raster.width(),
                        raster.height()
                    );
                    glyphs.push(GlyphRecord {
                        character: entry.character,
                        mapping: entry.id,
                        raster,
                    });
                }
                Err(reason) => {
                    let warning = ExtractionWarning {
                        character: entry.character,
                        mapping: entry.id,
                        reason,
                    };
                    log::warn!("Assembly: {}", warning);
                    warnings.push(warning);
                }
            }
        }
        glyphs
    }

    fn create_work_dir(&self) -> Result<TempDir, AssemblyError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("inkfont-");
        let result = match &self.config.work_dir {
            Some(parent) => std::fs::create_dir_all(parent).and_then(|_| builder.tempdir_in(parent)),
            None => builder.tempdir(),
        };
        result.map_err(|e| AssemblyError::Artifact {
            path: self
                .config
                .work_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            reason: e.to_string(),
        })
    }
}

/// Saves every crop as PNG and writes the character map next to them.
fn write_character_map(
    dir: &Path,
    glyphs: &[GlyphRecord],
    adjustments: &LayoutAdjustments,
) -> Result<CharacterMap, AssemblyError> {
    let present: Vec<char> = glyphs.iter().map(|g| g.character).collect();
    let kerning = metrics::kerning_units(adjustments);
    let mut entries = Vec::with_capacity(glyphs.len());
    for glyph in glyphs {
        let unicode = u32::from(glyph.character);
        let path = dir.join(format!("char_{:04X}.png", unicode));
        raster::save_png(&glyph.raster, &path).map_err(|e| AssemblyError::Artifact {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        entries.push(CharacterMapEntry {
            character: glyph.character,
            unicode,
            path,
            advance_hint: metrics::advance_hint(glyph.character, adjustments),
            vertical_offset: metrics::vertical_offset(glyph.character, adjustments),
            kerning: kerning
                .iter()
                .filter(|(pair, _)| pair.left == glyph.character && present.contains(&pair.right))
                .map(|(pair, units)| (pair.right, *units))
                .collect(),
        });
    }
    let map = CharacterMap::new(entries);
    write_json(&dir.join(CHARMAP_FILE), &map)?;
    Ok(map)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AssemblyError> {
    let artifact_err = |reason: String| AssemblyError::Artifact {
        path: path.to_path_buf(),
        reason,
    };
    let text = serde_json::to_string_pretty(value).map_err(|e| artifact_err(e.to_string()))?;
    std::fs::write(path, text).map_err(|e| artifact_err(e.to_string()))
}

/// Makes sure the output directory exists and no stale font from an earlier
/// run can pass verification.
fn prepare_output(output_path: &Path) -> Result<(), AssemblyError> {
    let artifact_err = |path: &Path, e: std::io::Error| AssemblyError::Artifact {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| artifact_err(parent, e))?;
    }
    match std::fs::remove_file(output_path) {
        Ok(()) => {
            log::debug!("Assembly: Removed stale '{}'", output_path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(artifact_err(output_path, e)),
    }
}

/// Reads the produced font; a missing or empty file is `OutputMissing`.
fn verify_output(path: &Path) -> Result<Vec<u8>, AssemblyError> {
    match std::fs::read(path) {
        Ok(data) if !data.is_empty() => {
            log::info!("Assembly: Verified '{}' ({} bytes)", path.display(), data.len());
            Ok(data)
        }
        Ok(_) | Err(_) => Err(AssemblyError::OutputMissing {
            path: path.to_path_buf(),
        }),
    }
}
