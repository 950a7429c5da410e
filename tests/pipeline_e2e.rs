//! End-to-end tests for the conversion pipeline.
//!
//! These drive `ConversionPipeline` with in-memory sources and sinks:
//! - Geometry of a full run
//! - Accent palette and true color output
//! - Determinism across runs
//! - Partial output on decode and write failures
//! - Progress cadence

use asciivid::*;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;

/// Source that replays frames, optionally failing after them.
struct ScriptedSource {
    props: VideoProperties,
    frames: VecDeque<RgbImage>,
    fail_after: bool,
    closed: bool,
}

impl ScriptedSource {
    fn new(frames: Vec<RgbImage>, frame_count: Option<usize>) -> Self {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((640, 360));
        Self {
            props: VideoProperties {
                width,
                height,
                fps: 25.0,
                frame_count,
            },
            frames: frames.into(),
            fail_after: false,
            closed: false,
        }
    }

    fn failing(mut self) -> Self {
        self.fail_after = true;
        self
    }
}

impl FrameSource for ScriptedSource {
    fn properties(&self) -> VideoProperties {
        self.props
    }

    fn read_frame(&mut self) -> Result<Option<SourceFrame>, ConversionError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.fail_after => Err(ConversionError::Decode {
                frame: 0,
                reason: "corrupt packet".to_string(),
            }),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Sink that keeps every frame, optionally rejecting writes past a limit.
#[derive(Default)]
struct RecordingSink {
    frames: Vec<RgbImage>,
    reject_after: Option<usize>,
    finished: bool,
}

impl FrameSink for RecordingSink {
    fn write_frame(&mut self, frame: &OutputFrame) -> Result<(), ConversionError> {
        if self.reject_after.is_some_and(|limit| self.frames.len() >= limit) {
            return Err(ConversionError::SinkWrite {
                frame: self.frames.len(),
                reason: "disk full".to_string(),
            });
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConversionError> {
        self.finished = true;
        Ok(())
    }
}

fn gradient_frame(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 255 / width.max(1) + seed) % 256) as u8,
            ((y * 255 / height.max(1)) % 256) as u8,
            ((x + y + seed * 7) % 256) as u8,
        ])
    })
}

fn rasterizer() -> FrameRasterizer {
    FrameRasterizer::new(&BitmapFont::new(), GlyphRamp::STANDARD).unwrap()
}

fn plan_for(width: u32, height: u32, columns: u32, r: &FrameRasterizer) -> GeometryPlan {
    GeometryPlan::new(width, height, columns, 2.0, r.cell_size()).unwrap()
}

// ==================== Geometry ====================

#[test]
fn test_widescreen_run_geometry() {
    let r = rasterizer();
    let plan = plan_for(640, 360, 160, &r);
    // 360 / 640 * 160 / 2.0 = 45 rows
    assert_eq!((plan.grid_width, plan.grid_height), (160, 45));

    let mut source = ScriptedSource::new(vec![gradient_frame(640, 360, 0); 3], Some(3));
    let mut sink = RecordingSink::default();
    let mut pipeline = ConversionPipeline::new(plan, &r, ColorMode::TrueColor);
    let n = pipeline.run(&mut source, &mut sink, |_| {}).unwrap();

    assert_eq!(n, 3);
    assert_eq!(pipeline.state(), PipelineState::Completed);
    for frame in &sink.frames {
        assert_eq!(frame.dimensions(), (160 * 6, 45 * 12));
    }
}

// ==================== Color modes ====================

#[test]
fn test_accent_mode_palette() {
    let r = rasterizer();
    let plan = plan_for(640, 360, 160, &r);
    let frames = (0..2).map(|i| gradient_frame(640, 360, i * 40)).collect();
    let mut source = ScriptedSource::new(frames, None);
    let mut sink = RecordingSink::default();
    ConversionPipeline::new(plan, &r, ColorMode::AccentOnly)
        .run(&mut source, &mut sink, |_| {})
        .unwrap();

    assert_eq!(sink.frames.len(), 2);
    for frame in &sink.frames {
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0]) || *p == ACCENT_GREEN));
        assert!(frame.pixels().any(|p| *p == ACCENT_GREEN));
    }
}

#[test]
fn test_true_color_cells_do_not_bleed() {
    // Solid white source: every cell is '@' in white, confined to its block.
    let r = rasterizer();
    let plan = plan_for(80, 40, 8, &r);
    let mut source = ScriptedSource::new(vec![RgbImage::from_pixel(80, 40, Rgb([255, 255, 255]))], Some(1));
    let mut sink = RecordingSink::default();
    ConversionPipeline::new(plan, &r, ColorMode::TrueColor)
        .run(&mut source, &mut sink, |_| {})
        .unwrap();

    let frame = &sink.frames[0];
    let font = BitmapFont::new();
    let at = font.glyph('@').unwrap().coverage();
    for (x, y, p) in frame.enumerate_pixels() {
        let local = ((y % 12) * 6 + (x % 6)) as usize;
        let expected = if at[local] > 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
        assert_eq!(*p, expected, "pixel ({}, {})", x, y);
    }
}

#[test]
fn test_true_color_uses_region_average() {
    let r = rasterizer();
    let plan = plan_for(8, 8, 4, &r);
    assert_eq!((plan.grid_width, plan.grid_height), (4, 2));
    // Left half pure blue-ish, right half pure orange-ish.
    let frame = RgbImage::from_fn(8, 8, |x, _| if x < 4 { Rgb([40, 80, 250]) } else { Rgb([250, 160, 20]) });
    let out = ConversionPipeline::new(plan, &r, ColorMode::TrueColor).render_frame(&frame);
    let colors: std::collections::HashSet<_> = out.pixels().copied().collect();
    assert!(colors.contains(&Rgb([40, 80, 250])));
    assert!(colors.contains(&Rgb([250, 160, 20])));
    assert!(colors.iter().all(|c| *c == Rgb([0, 0, 0]) || *c == Rgb([40, 80, 250]) || *c == Rgb([250, 160, 20])));
}

// ==================== Determinism ====================

#[test]
fn test_runs_are_byte_identical() {
    let r = rasterizer();
    let plan = plan_for(320, 240, 64, &r);
    let frames: Vec<_> = (0..5).map(|i| gradient_frame(320, 240, i * 13)).collect();

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let mut source = ScriptedSource::new(frames.clone(), Some(5));
        let mut sink = RecordingSink::default();
        ConversionPipeline::new(plan, &r, ColorMode::TrueColor)
            .run(&mut source, &mut sink, |_| {})
            .unwrap();
        outputs.push(sink.frames.iter().map(|f| f.as_raw().clone()).collect::<Vec<_>>());
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_frame_order_is_preserved() {
    let r = rasterizer();
    let plan = plan_for(16, 16, 4, &r);
    let shades = [0u8, 255, 60, 200, 120];
    let frames = shades.iter().map(|&s| RgbImage::from_pixel(16, 16, Rgb([s, s, s]))).collect();
    let mut source = ScriptedSource::new(frames, None);
    let mut sink = RecordingSink::default();
    ConversionPipeline::new(plan, &r, ColorMode::TrueColor)
        .run(&mut source, &mut sink, |_| {})
        .unwrap();

    for (frame, &s) in sink.frames.iter().zip(&shades) {
        let expected = r.rasterize(&CellGrid::filled(4, 2, Rgb([s, s, s])), ColorMode::TrueColor);
        assert_eq!(frame, &expected);
    }
}

// ==================== Failures ====================

#[test]
fn test_decode_failure_keeps_written_frames() {
    let r = rasterizer();
    let plan = plan_for(64, 36, 16, &r);
    let frames = (0..7).map(|i| gradient_frame(64, 36, i)).collect();
    let mut source = ScriptedSource::new(frames, Some(20)).failing();
    let mut sink = RecordingSink::default();
    let mut pipeline = ConversionPipeline::new(plan, &r, ColorMode::TrueColor);

    let err = pipeline.run(&mut source, &mut sink, |_| {}).unwrap_err();
    assert!(matches!(err, ConversionError::Decode { .. }));
    assert_eq!(sink.frames.len(), 7);
    assert_eq!(pipeline.processed(), 7);
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(source.closed);
    assert!(sink.finished);
}

#[test]
fn test_sink_failure_aborts_run() {
    let r = rasterizer();
    let plan = plan_for(64, 36, 16, &r);
    let frames = (0..10).map(|i| gradient_frame(64, 36, i)).collect();
    let mut source = ScriptedSource::new(frames, Some(10));
    let mut sink = RecordingSink {
        reject_after: Some(4),
        ..RecordingSink::default()
    };

    let err = ConversionPipeline::new(plan, &r, ColorMode::AccentOnly)
        .run(&mut source, &mut sink, |_| {})
        .unwrap_err();
    assert!(matches!(err, ConversionError::SinkWrite { frame: 4, .. }));
    assert_eq!(sink.frames.len(), 4);
    // The run stopped pulling frames at the failure.
    assert_eq!(source.frames.len(), 5);
    assert!(source.closed);
    assert!(sink.finished);
}

#[test]
fn test_empty_source_completes_with_zero_frames() {
    let r = rasterizer();
    let plan = plan_for(64, 36, 16, &r);
    let mut source = ScriptedSource::new(Vec::new(), None);
    let mut sink = RecordingSink::default();
    let mut pipeline = ConversionPipeline::new(plan, &r, ColorMode::TrueColor);
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.run(&mut source, &mut sink, |_| {}).unwrap(), 0);
    assert_eq!(pipeline.state(), PipelineState::Completed);
    assert!(sink.finished);
}

// ==================== Progress ====================

#[test]
fn test_progress_every_fifty_frames() {
    let r = rasterizer();
    let plan = plan_for(8, 8, 4, &r);
    let frames = vec![RgbImage::from_pixel(8, 8, Rgb([90, 90, 90])); 120];
    let mut source = ScriptedSource::new(frames, Some(120));
    let mut sink = RecordingSink::default();

    let mut seen = Vec::new();
    ConversionPipeline::new(plan, &r, ColorMode::TrueColor)
        .run(&mut source, &mut sink, |p| seen.push(p.clone()))
        .unwrap();

    let counts: Vec<_> = seen.iter().map(|p| p.completed).collect();
    assert_eq!(counts, vec![50, 100]);
    assert_eq!(seen[0].message, "Frames: 50/120 (41.7%)");
    assert_eq!(seen[1].total, Some(120));
}

#[test]
fn test_progress_without_total() {
    let r = rasterizer();
    let plan = plan_for(8, 8, 4, &r);
    let frames = vec![RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])); PROGRESS_INTERVAL];
    let mut source = ScriptedSource::new(frames, None);
    let mut sink = RecordingSink::default();

    let mut seen = Vec::new();
    ConversionPipeline::new(plan, &r, ColorMode::TrueColor)
        .run(&mut source, &mut sink, |p| seen.push(p.clone()))
        .unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].total, None);
    assert_eq!(seen[0].message, "Frames: 50");
}
