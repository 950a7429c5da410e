//! Character grid and output frame dimensions.

use crate::error::ConversionError;
use crate::glyph::CellSize;

/// Narrowest grid a run will produce.
pub const MIN_GRID_WIDTH: u32 = 4;
/// Shortest grid a run will produce.
pub const MIN_GRID_HEIGHT: u32 = 2;
/// Widest grid a user may ask for.
pub const MAX_GRID_WIDTH: u32 = 4096;
/// Grid width used when the caller does not ask for one.
pub const DEFAULT_GRID_WIDTH: u32 = 160;
/// Height-to-width ratio of a typical console glyph cell.
pub const DEFAULT_CELL_ASPECT: f32 = 2.0;

/// Fixed layout for a whole conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPlan {
    pub grid_width: u32,
    pub grid_height: u32,
    pub cell: CellSize,
    pub output_width: u32,
    pub output_height: u32,
}

impl GeometryPlan {
    /// Plan the grid for a `source_width`x`source_height` video.
    ///
    /// The grid height is divided by `cell_aspect` so that tall glyph cells do
    /// not stretch the picture vertically.
    pub fn new(source_width: u32, source_height: u32, requested_grid_width: u32, cell_aspect: f32, cell: CellSize) -> Result<Self, ConversionError> {
        if source_width == 0 || source_height == 0 {
            return Err(ConversionError::InvalidGeometry {
                width: source_width,
                height: source_height,
            });
        }
        if !(cell_aspect.is_finite() && cell_aspect > 0.0) {
            return Err(ConversionError::InvalidParameter(format!("cell aspect ratio must be positive, got {}", cell_aspect)));
        }

        let grid_width = requested_grid_width.max(MIN_GRID_WIDTH);
        let rows = ((source_height as f64 / source_width as f64) * grid_width as f64 / cell_aspect as f64).round();
        if rows > u32::MAX as f64 {
            return Err(too_large(grid_width, rows, cell));
        }
        let grid_height = (rows as u32).max(MIN_GRID_HEIGHT);

        let output_width = cell.width.checked_mul(grid_width);
        let output_height = cell.height.checked_mul(grid_height);
        let (Some(output_width), Some(output_height)) = (output_width, output_height) else {
            return Err(too_large(grid_width, rows, cell));
        };
        // The rendered RGB buffer must be addressable too.
        (output_width as usize)
            .checked_mul(output_height as usize)
            .and_then(|px| px.checked_mul(3))
            .ok_or_else(|| too_large(grid_width, rows, cell))?;

        Ok(Self {
            grid_width,
            grid_height,
            cell,
            output_width,
            output_height,
        })
    }

    /// Number of cells in the grid.
    pub fn cell_count(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }
}

fn too_large(grid_width: u32, rows: f64, cell: CellSize) -> ConversionError {
    ConversionError::InvalidParameter(format!(
        "grid of {}x{} cells at {}x{} px per cell is too large to render",
        grid_width, rows, cell.width, cell.height
    ))
}

/// Free-function form of [`GeometryPlan::new`].
pub fn plan(source_width: u32, source_height: u32, requested_grid_width: u32, cell_aspect: f32, cell: CellSize) -> Result<GeometryPlan, ConversionError> {
    GeometryPlan::new(source_width, source_height, requested_grid_width, cell_aspect, cell)
}
