//! Frame-by-frame conversion loop.

use serde::{Deserialize, Serialize};

use crate::color::ColorMode;
use crate::error::ConversionError;
use crate::geometry::GeometryPlan;
use crate::grid::CellGrid;
use crate::raster::FrameRasterizer;
use crate::video::{FrameSink, FrameSource, OutputFrame};

/// Frames between two progress notifications.
pub const PROGRESS_INTERVAL: usize = 50;

/// Progress information for a running conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Frames written to the sink so far
    pub completed: usize,
    /// Total frames reported by the source, if known
    pub total: Option<usize>,
    /// Percentage complete (0.0 to 100.0), if the total is known
    pub percentage: Option<f64>,
    /// Human-readable status line
    pub message: String,
}

impl Progress {
    pub fn converting_frames(completed: usize, total: Option<usize>) -> Self {
        let total = total.filter(|&t| t > 0);
        let percentage = total.map(|t| completed as f64 / t as f64 * 100.0);
        let message = match (total, percentage) {
            (Some(t), Some(pct)) => format!("Frames: {}/{} ({:.1}%)", completed, t, pct),
            _ => format!("Frames: {}", completed),
        };
        Self {
            completed,
            total,
            percentage,
            message,
        }
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Drives one source through the rasterizer into one sink.
pub struct ConversionPipeline<'a> {
    plan: GeometryPlan,
    rasterizer: &'a FrameRasterizer,
    mode: ColorMode,
    state: PipelineState,
    processed: usize,
}

impl<'a> ConversionPipeline<'a> {
    pub fn new(plan: GeometryPlan, rasterizer: &'a FrameRasterizer, mode: ColorMode) -> Self {
        Self {
            plan,
            rasterizer,
            mode,
            state: PipelineState::Idle,
            processed: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Frames written to the sink by the last run.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Render a single source frame.
    pub fn render_frame(&self, frame: &image::RgbImage) -> OutputFrame {
        let grid = CellGrid::downsample(frame, self.plan.grid_width, self.plan.grid_height);
        self.rasterizer.rasterize(&grid, self.mode)
    }

    /// Convert every frame of `source` into `sink`, in order.
    ///
    /// `progress` is called after every [`PROGRESS_INTERVAL`] frames. Source
    /// and sink are released whether the run completes or fails; frames
    /// written before a failure stay in the sink.
    pub fn run<S, K, P>(&mut self, source: &mut S, sink: &mut K, mut progress: P) -> Result<usize, ConversionError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
        P: FnMut(&Progress),
    {
        self.state = PipelineState::Running;
        self.processed = 0;
        let total = source.properties().frame_count;
        log::debug!(
            "pipeline start: grid {}x{}, output {}x{}, mode {}",
            self.plan.grid_width,
            self.plan.grid_height,
            self.plan.output_width,
            self.plan.output_height,
            self.mode
        );

        let outcome = self.drive(source, sink, total, &mut progress);

        source.close();
        let finished = sink.finish();

        let result = match (outcome, finished) {
            (Ok(()), Ok(())) => Ok(self.processed),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                log::warn!("sink close also failed: {}", close);
                Err(e)
            }
        };

        self.state = match result {
            Ok(_) => PipelineState::Completed,
            Err(_) => PipelineState::Failed,
        };
        if let Err(e) = &result {
            log::error!("pipeline failed after {} frames: {}", self.processed, e);
        }
        result
    }

    fn drive<S, K, P>(&mut self, source: &mut S, sink: &mut K, total: Option<usize>, progress: &mut P) -> Result<(), ConversionError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
        P: FnMut(&Progress),
    {
        while let Some(frame) = source.read_frame()? {
            let rendered = self.render_frame(&frame);
            drop(frame);
            sink.write_frame(&rendered)?;
            self.processed += 1;
            if self.processed % PROGRESS_INTERVAL == 0 {
                progress(&Progress::converting_frames(self.processed, total));
            }
        }
        Ok(())
    }
}
