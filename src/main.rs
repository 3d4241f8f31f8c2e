// In src/main.rs

// Declare modules
pub mod assembly;
pub mod canvas;
pub mod compiler;
pub mod config;
pub mod detect;
pub mod extract;
pub mod layout;
pub mod mapping;
pub mod metrics;
pub mod raster;
pub mod session;

use crate::{
    assembly::{AssemblyOutcome, AssemblyRequest, FontAssembler},
    canvas::CanvasTransform,
    compiler::{FontFormat, ProcessCompiler},
    config::Config,
    detect::RegionDetector,
    extract::CharacterExtractor,
    mapping::{BoundingBox, Shape},
    session::Session,
};

use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "inkfont", about = "Turn handwriting samples into installable fonts")]
struct Args {
    /// JSON configuration file (defaults to $INKFONT_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Detect candidate glyph regions in an image
    Detect {
        /// Image to scan
        image: PathBuf,
        /// Session file to bind the detected regions into (created if missing)
        #[arg(long)]
        session: Option<PathBuf>,
        /// Characters to bind to the regions, in reading order
        #[arg(long, requires = "session")]
        chars: Option<String>,
        /// Family name for a newly created session
        #[arg(long)]
        family: Option<String>,
        /// Print regions as JSON instead of one per line
        #[arg(long)]
        json: bool,
    },
    /// Crop and binarize a single character from an image
    Extract {
        image: PathBuf,
        /// Crop rectangle in image pixels: x1,y1,x2,y2
        #[arg(long, value_parser = parse_rect)]
        rect: BoundingBox,
        /// Treat --rect as drawn on a WxH canvas showing the whole image letterboxed
        #[arg(long, value_parser = parse_canvas_size)]
        canvas: Option<(f64, f64)>,
        /// Output PNG
        #[arg(long)]
        out: PathBuf,
    },
    /// Build a font file from a session
    Assemble {
        session: PathBuf,
        /// Output path without extension
        #[arg(long)]
        out: PathBuf,
        /// ttf, otf, woff or woff2
        #[arg(long, default_value = "ttf")]
        format: FontFormat,
        /// Keep the working directory (crops, character map) after the run
        #[arg(long)]
        keep_artifacts: bool,
    },
}

fn parse_rect(s: &str) -> Result<BoundingBox, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid rectangle '{}': {}", s, e))?;
    match values.as_slice() {
        [x1, y1, x2, y2] => Ok(BoundingBox::new(*x1, *y1, *x2, *y2)),
        _ => Err(format!("expected x1,y1,x2,y2, got '{}'", s)),
    }
}

fn parse_canvas_size(s: &str) -> Result<(f64, f64), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let w: f64 = w.trim().parse().map_err(|e| format!("invalid width '{}': {}", w, e))?;
    let h: f64 = h.trim().parse().map_err(|e| format!("invalid height '{}': {}", h, e))?;
    if w <= 0.0 || h <= 0.0 {
        return Err(format!("canvas size must be positive, got '{}'", s));
    }
    Ok((w, h))
}

/// Main entry point for the `inkfont` application.
fn main() -> anyhow::Result<()> {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Detect {
            image,
            session,
            chars,
            family,
            json,
        } => run_detect(&config, &image, session.as_deref(), chars.as_deref(), family, json),
        Command::Extract {
            image,
            rect,
            canvas,
            out,
        } => run_extract(&config, &image, rect, canvas, &out),
        Command::Assemble {
            session,
            out,
            format,
            keep_artifacts,
        } => run_assemble(&config, &session, &out, format, keep_artifacts),
    }
}

fn run_detect(
    config: &Config,
    image_path: &Path,
    session_path: Option<&Path>,
    chars: Option<&str>,
    family: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let image = raster::open(image_path)?;
    let regions = RegionDetector::new(config.detection.clone()).detect(&image);

    if json {
        println!("{}", serde_json::to_string_pretty(&regions)?);
    } else {
        for r in &regions {
            println!("{}\t{}\t{}\t{}", r.x, r.y, r.width, r.height);
        }
    }

    let Some(session_path) = session_path else {
        return Ok(());
    };
    let mut session = if session_path.exists() {
        Session::open(session_path)?
    } else {
        let name = family.unwrap_or_else(|| {
            session_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Untitled".to_string())
        });
        info!("Creating new session '{}' at '{}'", name, session_path.display());
        Session::new(name)
    };

    let image_id = session.add_image(image_path);
    if let Some(chars) = chars {
        let glyph_count = chars.chars().filter(|c| !c.is_whitespace()).count();
        if glyph_count != regions.len() {
            warn!(
                "{} character(s) given for {} detected region(s); binding the first {}",
                glyph_count,
                regions.len(),
                glyph_count.min(regions.len())
            );
        }
        session.bind_regions(image_id, &regions, chars);
    }
    session.save(session_path)
}

fn run_extract(
    config: &Config,
    image_path: &Path,
    rect: BoundingBox,
    canvas: Option<(f64, f64)>,
    out: &Path,
) -> anyhow::Result<()> {
    let image = raster::open(image_path)?;
    let rect = match canvas {
        Some((canvas_width, canvas_height)) => {
            let transform = CanvasTransform::fit(
                f64::from(image.width()),
                f64::from(image.height()),
                canvas_width,
                canvas_height,
            );
            transform
                .box_to_image(rect)
                .with_context(|| format!("Canvas transform {:?} is not invertible", transform))?
        }
        None => rect,
    };
    let extractor = CharacterExtractor::new(config.extraction.clone());
    let crop = extractor
        .extract(&image, &Shape::Rectangle(rect))
        .with_context(|| format!("Failed to extract {:?} from '{}'", rect, image_path.display()))?;
    raster::save_png(&crop, out)?;
    info!("Wrote {}x{} crop to '{}'", crop.width(), crop.height(), out.display());
    Ok(())
}

fn run_assemble(
    config: &Config,
    session_path: &Path,
    out: &Path,
    format: FontFormat,
    keep_artifacts: bool,
) -> anyhow::Result<()> {
    let session = Session::open(session_path)?;
    let compiler = ProcessCompiler::from_config(&config.compiler);
    let mut assembly_config = config.assembly.clone();
    assembly_config.keep_artifacts |= keep_artifacts;

    let assembler = FontAssembler::new(&compiler, config.extraction.clone(), assembly_config);
    let outcome = assembler.assemble(&AssemblyRequest {
        family_name: &session.family_name,
        format,
        output_stem: out,
        mappings: &session.mappings,
        images: &session,
        adjustments: &session.adjustments,
    });

    for warning in outcome.warnings() {
        warn!("{}", warning);
    }
    match &outcome {
        AssemblyOutcome::Completed(font) => {
            println!("{}", outcome);
            if let Some(charmap) = &font.charmap_path {
                println!("character map: {}", charmap.display());
            }
            Ok(())
        }
        AssemblyOutcome::Failed(_) => bail!("{}", outcome),
    }
}
