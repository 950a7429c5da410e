//! Glyph rendering: fixed-size coverage masks per character.
//!
//! Every font is pre-rasterized into one [`GlyphMask`] per supported
//! character, all of the same [`CellSize`], so drawing a cell is a plain
//! blend of the mask into the output buffer.

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::ConversionError;
use crate::ramp::GlyphRamp;

/// Glyph whose extent defines the cell size.
pub const REFERENCE_GLYPH: char = 'A';

/// Pixel size of one character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSize {
    pub width: u32,
    pub height: u32,
}

impl CellSize {
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Row-major coverage for one glyph, `cell.width * cell.height` bytes,
/// 0 = background, 255 = full ink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphMask {
    coverage: Vec<u8>,
}

impl GlyphMask {
    pub fn new(coverage: Vec<u8>) -> Self {
        Self { coverage }
    }

    pub fn coverage(&self) -> &[u8] {
        &self.coverage
    }

    /// Number of pixels with any ink.
    pub fn ink(&self) -> usize {
        self.coverage.iter().filter(|&&a| a > 0).count()
    }
}

/// A source of pre-rendered glyph masks.
pub trait GlyphAtlas: Sync {
    /// Cell size measured from [`REFERENCE_GLYPH`].
    fn cell_size(&self) -> CellSize;

    /// Mask for `ch`, or `None` when the font cannot render it.
    fn glyph(&self, ch: char) -> Option<&GlyphMask>;

    /// Fail with [`ConversionError::Rasterization`] for the first ramp glyph
    /// this atlas cannot render.
    fn check_ramp(&self, ramp: &GlyphRamp) -> Result<(), ConversionError> {
        match ramp.glyphs().iter().find(|&&ch| self.glyph(ch).is_none()) {
            Some(&missing) => Err(ConversionError::Rasterization(missing)),
            None => Ok(()),
        }
    }
}

const BITMAP_WIDTH: u32 = 6;
const BITMAP_HEIGHT: u32 = 12;
/// Rows above the 5x7 glyph body.
const BITMAP_TOP: u32 = 2;

/// 5x7 glyph bodies, `#` = ink.
const BITMAP_GLYPHS: &[(char, [&str; 7])] = &[
    (' ', [".....", ".....", ".....", ".....", ".....", ".....", "....."]),
    ('.', [".....", ".....", ".....", ".....", ".....", ".##..", ".##.."]),
    (':', [".....", ".##..", ".##..", ".....", ".##..", ".##..", "....."]),
    ('-', [".....", ".....", ".....", "#####", ".....", ".....", "....."]),
    ('=', [".....", ".....", "#####", ".....", "#####", ".....", "....."]),
    ('+', [".....", "..#..", "..#..", "#####", "..#..", "..#..", "....."]),
    ('*', [".....", "..#..", "#.#.#", ".###.", "#.#.#", "..#..", "....."]),
    ('#', [".#.#.", ".#.#.", "#####", ".#.#.", "#####", ".#.#.", ".#.#."]),
    ('%', ["##...", "##..#", "...#.", "..#..", ".#...", "#..##", "...##"]),
    ('@', [".###.", "#...#", "#.###", "#.#.#", "#.###", "#....", ".###."]),
    ('A', [".###.", "#...#", "#...#", "#####", "#...#", "#...#", "#...#"]),
];

/// Built-in 6x12 bitmap font covering the standard ramp.
#[derive(Debug, Clone)]
pub struct BitmapFont {
    glyphs: HashMap<char, GlyphMask>,
}

impl BitmapFont {
    pub fn new() -> Self {
        let glyphs = BITMAP_GLYPHS
            .iter()
            .map(|(ch, rows)| {
                let mut coverage = vec![0u8; (BITMAP_WIDTH * BITMAP_HEIGHT) as usize];
                for (dy, row) in rows.iter().enumerate() {
                    for (dx, bit) in row.bytes().enumerate() {
                        if bit == b'#' {
                            let y = BITMAP_TOP as usize + dy;
                            coverage[y * BITMAP_WIDTH as usize + dx] = 255;
                        }
                    }
                }
                (*ch, GlyphMask::new(coverage))
            })
            .collect();
        Self { glyphs }
    }
}

impl Default for BitmapFont {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphAtlas for BitmapFont {
    fn cell_size(&self) -> CellSize {
        CellSize {
            width: BITMAP_WIDTH,
            height: BITMAP_HEIGHT,
        }
    }

    fn glyph(&self, ch: char) -> Option<&GlyphMask> {
        self.glyphs.get(&ch)
    }
}

/// A TrueType/OpenType font rasterized with `ab_glyph` at a fixed pixel size.
///
/// Only printable ASCII is cached; glyphs missing from the font are left out
/// rather than drawn as the `.notdef` box.
pub struct TrueTypeFont {
    cell: CellSize,
    glyphs: HashMap<char, GlyphMask>,
}

impl TrueTypeFont {
    pub fn from_file(path: &Path, size_px: f32) -> Result<Self, ConversionError> {
        let data = fs::read(path).map_err(|e| ConversionError::Font(format!("reading {}: {}", path.display(), e)))?;
        Self::from_bytes(data, size_px)
    }

    pub fn from_bytes(data: Vec<u8>, size_px: f32) -> Result<Self, ConversionError> {
        if !(size_px.is_finite() && size_px > 0.0) {
            return Err(ConversionError::Font(format!("font size must be positive, got {}", size_px)));
        }
        let font = FontVec::try_from_vec(data).map_err(|e| ConversionError::Font(e.to_string()))?;
        let scale = PxScale::from(size_px);
        let scaled = font.as_scaled(scale);

        let reference = font.glyph_id(REFERENCE_GLYPH);
        if reference.0 == 0 {
            return Err(ConversionError::Font(format!("font has no glyph for reference character {:?}", REFERENCE_GLYPH)));
        }
        let cell = CellSize {
            width: (scaled.h_advance(reference).ceil() as u32).max(1),
            height: ((scaled.ascent() - scaled.descent()).ceil() as u32).max(1),
        };

        let mut glyphs = HashMap::new();
        for ch in (32u8..=126).map(char::from) {
            let id = font.glyph_id(ch);
            if id.0 == 0 && ch != ' ' {
                continue;
            }
            let mut coverage = vec![0u8; cell.area()];
            let glyph = id.with_scale_and_position(scale, point(0.0, scaled.ascent()));
            if let Some(outline) = font.outline_glyph(glyph) {
                let bounds = outline.px_bounds();
                outline.draw(|x, y, v| {
                    let px = x as i32 + bounds.min.x as i32;
                    let py = y as i32 + bounds.min.y as i32;
                    if px >= 0 && py >= 0 && (px as u32) < cell.width && (py as u32) < cell.height {
                        let idx = py as usize * cell.width as usize + px as usize;
                        coverage[idx] = coverage[idx].max((v.clamp(0.0, 1.0) * 255.0).round() as u8);
                    }
                });
            }
            glyphs.insert(ch, GlyphMask::new(coverage));
        }

        log::debug!("loaded font: cell {}x{}, {} glyphs", cell.width, cell.height, glyphs.len());
        Ok(Self { cell, glyphs })
    }
}

impl GlyphAtlas for TrueTypeFont {
    fn cell_size(&self) -> CellSize {
        self.cell
    }

    fn glyph(&self, ch: char) -> Option<&GlyphMask> {
        self.glyphs.get(&ch)
    }
}
