//! Composes a cell grid into a full-resolution output frame.

use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::color::{resolve_color, ColorMode};
use crate::error::ConversionError;
use crate::glyph::{CellSize, GlyphAtlas, GlyphMask};
use crate::grid::CellGrid;
use crate::ramp::{quantize, GlyphRamp};

/// Draws cell grids with one glyph per cell.
///
/// Ramp glyphs are resolved against the font once, at construction, so a
/// font that cannot render the ramp is rejected before any frame is read.
#[derive(Debug, Clone)]
pub struct FrameRasterizer {
    cell: CellSize,
    ramp: GlyphRamp,
    /// Mask for each ramp index.
    masks: Vec<GlyphMask>,
}

impl FrameRasterizer {
    pub fn new(atlas: &dyn GlyphAtlas, ramp: GlyphRamp) -> Result<Self, ConversionError> {
        atlas.check_ramp(&ramp)?;
        let cell = atlas.cell_size();
        let masks = ramp
            .glyphs()
            .iter()
            .map(|&ch| {
                let mask = atlas.glyph(ch).ok_or(ConversionError::Rasterization(ch))?;
                if mask.coverage().len() != cell.area() {
                    return Err(ConversionError::Rasterization(ch));
                }
                Ok(mask.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cell, ramp, masks })
    }

    pub fn cell_size(&self) -> CellSize {
        self.cell
    }

    pub fn ramp(&self) -> &GlyphRamp {
        &self.ramp
    }

    /// Output dimensions for a grid of `grid_width`x`grid_height` cells.
    pub fn target_dimensions(&self, grid_width: u32, grid_height: u32) -> (u32, u32) {
        (grid_width * self.cell.width, grid_height * self.cell.height)
    }

    /// Render `grid` onto a fresh black frame.
    ///
    /// Cell `(x, y)` occupies the pixel block starting at
    /// `(x * cell.width, y * cell.height)`; blocks never overlap. Rows of
    /// cells are drawn in parallel, each into its own band of the buffer.
    pub fn rasterize(&self, grid: &CellGrid, mode: ColorMode) -> RgbImage {
        let (width, height) = self.target_dimensions(grid.width(), grid.height());
        let mut data = vec![0u8; width as usize * height as usize * 3];
        if data.is_empty() {
            return RgbImage::new(width, height);
        }

        let cell_w = self.cell.width as usize;
        let cell_h = self.cell.height as usize;
        let stride = width as usize * 3;
        let band_size = stride * cell_h;

        data.par_chunks_exact_mut(band_size).enumerate().for_each(|(gy, band)| {
            for (gx, cell) in grid.row(gy as u32).iter().enumerate() {
                let mask = &self.masks[quantize(cell.luma, self.masks.len())];
                let Rgb([r, g, b]) = resolve_color(mode, cell.color);
                let x0 = gx * cell_w;
                for cy in 0..cell_h {
                    let row = &mut band[cy * stride..(cy + 1) * stride];
                    let coverage = &mask.coverage()[cy * cell_w..(cy + 1) * cell_w];
                    for (cx, &alpha) in coverage.iter().enumerate() {
                        if alpha == 0 {
                            continue;
                        }
                        let px = (x0 + cx) * 3;
                        row[px] = blend(r, alpha);
                        row[px + 1] = blend(g, alpha);
                        row[px + 2] = blend(b, alpha);
                    }
                }
            }
        });

        // Length is exactly width * height * 3 by construction.
        RgbImage::from_raw(width, height, data).unwrap_or_else(|| RgbImage::new(width, height))
    }
}

/// Channel value of `fg` drawn with `alpha` coverage over black.
fn blend(fg: u8, alpha: u8) -> u8 {
    ((fg as u32 * alpha as u32 + 127) / 255) as u8
}
