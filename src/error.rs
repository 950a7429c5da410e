use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while converting a video to ASCII art.
///
/// Every failure is fatal to the run except [`ConversionError::Remux`], which
/// leaves the silent video at `fallback` as a usable result.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The source reported a zero-sized frame.
    #[error("invalid source geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("cannot open video source {}: {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    #[error("cannot open video sink {}: {reason}", path.display())]
    SinkOpen { path: PathBuf, reason: String },

    /// Decoding stopped mid-stream; `frame` frames were already written.
    #[error("decode failed after {frame} frames: {reason}")]
    Decode { frame: usize, reason: String },

    /// The encoder rejected a frame; `frame` frames were already written.
    #[error("writing frame {frame} failed: {reason}")]
    SinkWrite { frame: usize, reason: String },

    /// A ramp glyph has no rendering in the active font.
    #[error("glyph {0:?} cannot be rendered by the active font")]
    Rasterization(char),

    #[error("audio remux failed ({reason}); silent video kept at {}", fallback.display())]
    Remux { fallback: PathBuf, reason: String },

    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("font error: {0}")]
    Font(String),
}

impl ConversionError {
    /// True when a partial or fallback artifact may exist on disk.
    pub fn leaves_partial_output(&self) -> bool {
        matches!(
            self,
            ConversionError::Decode { .. } | ConversionError::SinkWrite { .. } | ConversionError::Remux { .. }
        )
    }
}
