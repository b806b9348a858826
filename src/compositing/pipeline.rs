use super::placement::{compute_placement, PlacementRect};
use super::surface::OutputSurface;
use crate::capture::CaptureSource;
use crate::config::{PipelineConfig, PlacementConfig};
use crate::error::PipelineError;
use crate::scheduler::TickGuard;
use crate::segmentation::{EngineState, PrimaryBackend, SegmentationEngine, SegmentationPath};
use image::imageops;
use std::time::{Duration, Instant};

/// Frames smaller than this on either side have no refinable interior
pub const MIN_FRAME_DIMENSION: u32 = 3;

const LOW_COVERAGE: f32 = 0.01;

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Drawn {
        rect: PlacementRect,
        path: SegmentationPath,
        coverage: f32,
    },
    Skipped(SkipReason),
    /// The run was stopped while this tick was in flight
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Output surface has zero area
    EmptySurface,
    /// Captured frame is below the minimum size
    DegenerateFrame { width: u32, height: u32 },
    /// Subject scales down to nothing on this surface
    EmptyPlacement,
}

/// Rolling per-stage timings, logged every 30 drawn frames
#[derive(Debug, Default)]
struct TickStats {
    frames: u64,
    capture: Duration,
    segment: Duration,
    composite: Duration,
    heuristic_frames: u64,
    low_coverage_frames: u64,
}

impl TickStats {
    const REPORT_EVERY: u64 = 30;

    fn record(&mut self, capture: Duration, segment: Duration, composite: Duration, path: SegmentationPath, coverage: f32) {
        self.frames += 1;
        self.capture += capture;
        self.segment += segment;
        self.composite += composite;
        if path == SegmentationPath::Heuristic {
            self.heuristic_frames += 1;
        }
        if coverage < LOW_COVERAGE {
            self.low_coverage_frames += 1;
        }

        if self.frames % Self::REPORT_EVERY != 0 {
            return;
        }

        let n = self.frames as f64;
        let avg_capture_ms = self.capture.as_secs_f64() * 1000.0 / n;
        let avg_segment_ms = self.segment.as_secs_f64() * 1000.0 / n;
        let avg_composite_ms = self.composite.as_secs_f64() * 1000.0 / n;
        let total_ms = avg_capture_ms + avg_segment_ms + avg_composite_ms;

        tracing::info!(
            "Frame {}: capture={:.1}ms, segment={:.1}ms, composite={:.1}ms, total={:.1}ms, fps={:.1}, heuristic={}",
            self.frames,
            avg_capture_ms,
            avg_segment_ms,
            avg_composite_ms,
            total_ms,
            1000.0 / total_ms,
            self.heuristic_frames
        );

        if self.low_coverage_frames > 0 {
            tracing::warn!(
                "Subject barely detected in {} of the last {} frames",
                self.low_coverage_frames,
                Self::REPORT_EVERY
            );
            self.low_coverage_frames = 0;
        }
    }
}

/// One capture -> segment -> composite pass per tick
pub struct CompositingPipeline<C, B, S> {
    capture: C,
    engine: SegmentationEngine<B>,
    surface: S,
    placement: PlacementConfig,
    opacity: f32,
    mirror: bool,
    stats: TickStats,
}

impl<C, B, S> CompositingPipeline<C, B, S>
where
    C: CaptureSource,
    B: PrimaryBackend,
    S: OutputSurface,
{
    pub fn new(capture: C, engine: SegmentationEngine<B>, surface: S, config: &PipelineConfig) -> Self {
        Self {
            capture,
            engine,
            surface,
            placement: config.placement.clone(),
            opacity: config.overlay_opacity,
            mirror: config.mirror,
            stats: TickStats::default(),
        }
    }

    pub fn engine(&self) -> &SegmentationEngine<B> {
        &self.engine
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn capture_mut(&mut self) -> &mut C {
        &mut self.capture
    }

    /// Run one tick
    ///
    /// Nothing is drawn when the surface has no area, the frame is degenerate,
    /// or `guard` went stale while segmentation was running.
    pub async fn tick(&mut self, guard: &TickGuard) -> Result<TickOutcome, PipelineError> {
        let (surface_width, surface_height) = self.surface.dimensions();
        if surface_width == 0 || surface_height == 0 {
            return Ok(TickOutcome::Skipped(SkipReason::EmptySurface));
        }

        let capture_start = Instant::now();
        let frame = self
            .capture
            .capture_frame()
            .map_err(PipelineError::Capture)?;
        let (width, height) = frame.dimensions();
        if width < MIN_FRAME_DIMENSION || height < MIN_FRAME_DIMENSION {
            return Ok(TickOutcome::Skipped(SkipReason::DegenerateFrame { width, height }));
        }
        let frame = if self.mirror {
            imageops::flip_horizontal(&frame)
        } else {
            frame
        };
        let capture_time = capture_start.elapsed();

        let segment_start = Instant::now();
        let result = self.engine.segment(&frame).await?;
        let segment_time = segment_start.elapsed();

        if !guard.is_current() {
            tracing::debug!("Dropping result of a stopped run");
            return Ok(TickOutcome::Discarded);
        }

        let Some(rect) = compute_placement(
            (surface_width, surface_height),
            result.subject.dimensions(),
            &self.placement,
        ) else {
            return Ok(TickOutcome::Skipped(SkipReason::EmptyPlacement));
        };

        let composite_start = Instant::now();
        self.surface.clear();
        self.surface
            .draw(&result.subject, rect, self.opacity)
            .map_err(PipelineError::Surface)?;
        self.surface.present().map_err(PipelineError::Surface)?;
        let composite_time = composite_start.elapsed();

        let coverage = result.coverage();
        tracing::debug!(
            "Drew subject at {:?} via {:?}, coverage {:.1}%",
            rect,
            result.path,
            coverage * 100.0
        );
        self.stats
            .record(capture_time, segment_time, composite_time, result.path, coverage);

        Ok(TickOutcome::Drawn {
            rect,
            path: result.path,
            coverage,
        })
    }
}
