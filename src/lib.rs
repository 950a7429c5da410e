//! # asciivid - ASCII Art Video Renderer
//!
//! `asciivid` re-renders a video as a grid of monospaced glyphs, frame by
//! frame, and puts the original audio back on the result.
//!
//! ## Features
//!
//! - Area-averaged downsampling to a character grid with aspect correction
//! - Ten-step brightness ramp `" .:-=+*#%@"`
//! - Per-cell true color or a flat green accent
//! - Built-in bitmap font or any TrueType font
//! - Streaming through ffmpeg with progress reporting every 50 frames
//!
//! ## Example
//!
//! ```no_run
//! use asciivid::{AsciiVideoConverter, ColorMode, ConversionOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = AsciiVideoConverter::new();
//! let options = ConversionOptions::default()
//!     .with_columns(120)
//!     .with_color_mode(ColorMode::AccentOnly);
//! let report = converter.convert_video(
//!     Path::new("input.mp4"),
//!     Path::new("input_ascii.mp4"),
//!     &options,
//!     |progress| println!("{}", progress.message),
//! )?;
//! println!("{} frames written to {}", report.frames, report.output.display());
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod error;
pub mod geometry;
pub mod glyph;
pub mod grid;
pub mod params;
pub mod pipeline;
pub mod ramp;
pub mod raster;
pub mod remux;
pub mod video;

pub use color::{resolve_color, ColorMode, ACCENT_GREEN};
pub use error::ConversionError;
pub use geometry::{plan, GeometryPlan, DEFAULT_CELL_ASPECT, DEFAULT_GRID_WIDTH, MAX_GRID_WIDTH};
pub use glyph::{BitmapFont, CellSize, GlyphAtlas, GlyphMask, TrueTypeFont};
pub use grid::{Cell, CellGrid};
pub use pipeline::{ConversionPipeline, PipelineState, Progress, PROGRESS_INTERVAL};
pub use ramp::{quantize, GlyphRamp};
pub use raster::FrameRasterizer;
pub use remux::remux;
pub use video::{FfmpegConfig, FfmpegSink, FfmpegSource, FrameSink, FrameSource, OutputFrame, SourceFrame, VideoProperties};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Quality preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub columns: u32,
    #[serde(default = "default_cell_aspect")]
    pub cell_aspect: f32,
    #[serde(default)]
    pub color_mode: ColorMode,
}

fn default_cell_aspect() -> f32 {
    DEFAULT_CELL_ASPECT
}

fn default_font_size() -> f32 {
    12.0
}

fn default_preset_name() -> String {
    "default".to_string()
}

/// Application configuration: presets, external tools and font.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub presets: HashMap<String, Preset>,
    #[serde(default = "default_preset_name")]
    pub default_preset: String,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    /// TrueType font to render with instead of the built-in bitmap font
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let preset = |columns| Preset {
            columns,
            cell_aspect: DEFAULT_CELL_ASPECT,
            color_mode: ColorMode::TrueColor,
        };
        Self {
            presets: HashMap::from([
                ("default".to_string(), preset(DEFAULT_GRID_WIDTH)),
                ("small".to_string(), preset(80)),
                ("large".to_string(), preset(320)),
            ]),
            default_preset: default_preset_name(),
            ffmpeg: FfmpegConfig::default(),
            font: None,
            font_size: default_font_size(),
        }
    }
}

impl AppConfig {
    /// Load a `.toml` or `.json` configuration file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let is_toml = path.extension().is_some_and(|e| e == "toml");
        let cfg: AppConfig = if is_toml {
            toml::from_str(&text).with_context(|| format!("parsing config toml {}", path.display()))?
        } else {
            serde_json::from_str(&text).with_context(|| format!("parsing config json {}", path.display()))?
        };
        if !cfg.presets.contains_key(&cfg.default_preset) {
            anyhow::bail!("config {} names missing default preset '{}'", path.display(), cfg.default_preset);
        }
        Ok(cfg)
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }
}

/// Options for one conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Grid width in characters; raised to at least 4
    pub columns: u32,
    /// Height-to-width ratio of a glyph cell
    pub cell_aspect: f32,
    pub color_mode: ColorMode,
    /// TrueType font, built-in bitmap font when `None`
    pub font: Option<PathBuf>,
    pub font_size: f32,
    /// Copy the source's first audio stream into the result
    pub keep_audio: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            columns: DEFAULT_GRID_WIDTH,
            cell_aspect: DEFAULT_CELL_ASPECT,
            color_mode: ColorMode::TrueColor,
            font: None,
            font_size: default_font_size(),
            keep_audio: true,
        }
    }
}

impl ConversionOptions {
    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_cell_aspect(mut self, cell_aspect: f32) -> Self {
        self.cell_aspect = cell_aspect;
        self
    }

    pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self
    }

    pub fn with_font(mut self, font: PathBuf, size: f32) -> Self {
        self.font = Some(font);
        self.font_size = size;
        self
    }

    pub fn with_audio(mut self, keep_audio: bool) -> Self {
        self.keep_audio = keep_audio;
        self
    }

    pub fn from_preset(preset: &Preset) -> Self {
        Self {
            columns: preset.columns,
            cell_aspect: preset.cell_aspect,
            color_mode: preset.color_mode,
            ..Self::default()
        }
    }
}

/// Outcome of a finished conversion.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub frames: usize,
    pub output: PathBuf,
    pub plan: GeometryPlan,
    pub source: VideoProperties,
    /// Whether the source audio made it into `output`
    pub with_audio: bool,
}

/// Main converter
pub struct AsciiVideoConverter {
    config: AppConfig,
}

impl AsciiVideoConverter {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Options from a named preset, with the configured font.
    pub fn options_from_preset(&self, name: &str) -> Result<ConversionOptions, ConversionError> {
        let preset = self
            .config
            .preset(name)
            .ok_or_else(|| ConversionError::InvalidParameter(format!("preset '{}' not found", name)))?;
        let mut options = ConversionOptions::from_preset(preset);
        options.font = self.config.font.clone();
        options.font_size = self.config.font_size;
        Ok(options)
    }

    /// Build the rasterizer for `options`, failing fast when the font cannot
    /// render the ramp.
    pub fn rasterizer(&self, options: &ConversionOptions) -> Result<FrameRasterizer, ConversionError> {
        match &options.font {
            Some(path) => FrameRasterizer::new(&TrueTypeFont::from_file(path, options.font_size)?, GlyphRamp::STANDARD),
            None => FrameRasterizer::new(&BitmapFont::new(), GlyphRamp::STANDARD),
        }
    }

    /// Convert `input` into `output`.
    ///
    /// The render is encoded to [`params::silent_video_path`] first and the
    /// source audio is muxed in afterwards. If muxing fails the silent
    /// render is kept and [`ConversionError::Remux`] names it.
    pub fn convert_video<P>(&self, input: &Path, output: &Path, options: &ConversionOptions, progress: P) -> Result<ConversionReport, ConversionError>
    where
        P: FnMut(&Progress),
    {
        let ffmpeg = &self.config.ffmpeg;
        let rasterizer = self.rasterizer(options)?;

        let mut source = FfmpegSource::open(ffmpeg, input)?;
        let props = source.properties();
        let plan = GeometryPlan::new(props.width, props.height, options.columns, options.cell_aspect, rasterizer.cell_size())?;
        log::info!(
            "grid {}x{} cells, output {}x{} px, {} mode",
            plan.grid_width,
            plan.grid_height,
            plan.output_width,
            plan.output_height,
            options.color_mode
        );

        let video_path = if options.keep_audio {
            params::silent_video_path(output)
        } else {
            output.to_path_buf()
        };
        let mut sink = FfmpegSink::open(ffmpeg, &video_path, plan.output_width, plan.output_height, props.fps)?;

        let mut pipeline = ConversionPipeline::new(plan, &rasterizer, options.color_mode);
        let frames = pipeline.run(&mut source, &mut sink, progress)?;

        if options.keep_audio {
            remux::remux(ffmpeg, &video_path, input, output)?;
            if let Err(e) = fs::remove_file(&video_path) {
                log::warn!("could not remove {}: {}", video_path.display(), e);
            }
        }

        Ok(ConversionReport {
            frames,
            output: output.to_path_buf(),
            plan,
            source: props,
            with_audio: options.keep_audio,
        })
    }
}

impl Default for AsciiVideoConverter {
    fn default() -> Self {
        Self::new()
    }
}
