//! Area-averaging downsample from a source frame to a cell grid.

use image::{Rgb, RgbImage};

/// One grid position: the averaged color of its source region and the
/// grayscale sample derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub luma: u8,
    pub color: Rgb<u8>,
}

/// Downsampled frame, row-major, `width * height` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGrid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl CellGrid {
    /// Build a grid directly from cells. Returns `None` when the cell count
    /// does not match the dimensions.
    pub fn from_cells(width: u32, height: u32, cells: Vec<Cell>) -> Option<Self> {
        if cells.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, cells })
    }

    /// A grid where every cell has the same color.
    pub fn filled(width: u32, height: u32, color: Rgb<u8>) -> Self {
        let cell = Cell { luma: luma(color), color };
        Self {
            width,
            height,
            cells: vec![cell; width as usize * height as usize],
        }
    }

    /// Shrink (or stretch) `frame` to `width`x`height` cells.
    ///
    /// Each cell is the coverage-weighted mean of the source pixels under its
    /// footprint, so partially covered edge pixels count fractionally.
    pub fn downsample(frame: &RgbImage, width: u32, height: u32) -> Self {
        let (src_w, src_h) = frame.dimensions();
        if width == 0 || height == 0 || src_w == 0 || src_h == 0 {
            return Self {
                width,
                height,
                cells: vec![Cell { luma: 0, color: Rgb([0, 0, 0]) }; width as usize * height as usize],
            };
        }

        let x_spans = axis_spans(src_w, width);
        let y_spans = axis_spans(src_h, height);

        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y_span in &y_spans {
            for x_span in &x_spans {
                let mut sum = [0f64; 3];
                let mut total = 0f64;
                for &(py, wy) in y_span {
                    for &(px, wx) in x_span {
                        let w = wx * wy;
                        let p = frame.get_pixel(px, py);
                        sum[0] += p[0] as f64 * w;
                        sum[1] += p[1] as f64 * w;
                        sum[2] += p[2] as f64 * w;
                        total += w;
                    }
                }
                let channel = |s: f64| (s / total).round().clamp(0.0, 255.0) as u8;
                let color = Rgb([channel(sum[0]), channel(sum[1]), channel(sum[2])]);
                cells.push(Cell { luma: luma(color), color });
            }
        }

        Self { width, height, cells }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, x: u32, y: u32) -> Cell {
        self.cells[(y * self.width + x) as usize]
    }

    /// Cells of row `y`.
    pub fn row(&self, y: u32) -> &[Cell] {
        let start = (y * self.width) as usize;
        &self.cells[start..start + self.width as usize]
    }
}

/// For every output index along one axis, the source pixels it covers and
/// how much of each (in source pixels, summing to `src / dst`).
fn axis_spans(src: u32, dst: u32) -> Vec<Vec<(u32, f64)>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|i| {
            let start = i as f64 * scale;
            let end = ((i + 1) as f64 * scale).min(src as f64);
            let first = start.floor() as u32;
            let last = (end.ceil() as u32).clamp(first + 1, src);
            (first..last)
                .filter_map(|p| {
                    let covered = end.min(p as f64 + 1.0) - start.max(p as f64);
                    (covered > 1e-9).then_some((p, covered))
                })
                .collect()
        })
        .collect()
}

/// BT.601 luma, rounded, as used for grayscale video frames.
pub fn luma(rgb: Rgb<u8>) -> u8 {
    let [r, g, b] = rgb.0;
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}
