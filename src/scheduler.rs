//! Fixed-cadence driver for the compositing pipeline
//!
//! Ticks never overlap: each tick is awaited before the next interval fires,
//! and missed intervals are skipped rather than queued. Stopping bumps a
//! generation counter so a tick that is still in flight cannot draw.

use crate::capture::CaptureSource;
use crate::compositing::{CompositingPipeline, OutputSurface, TickOutcome};
use crate::error::PipelineError;
use crate::segmentation::{EngineState, PrimaryBackend};
use crate::status::{Status, StatusSink};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

/// Shared run generation; advancing it invalidates outstanding ticks
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn guard(&self) -> TickGuard {
        TickGuard {
            generation: self.clone(),
            issued: self.current(),
        }
    }
}

/// Issued per tick; a tick may only draw while its guard is current
#[derive(Debug, Clone)]
pub struct TickGuard {
    generation: Generation,
    issued: u64,
}

impl TickGuard {
    /// A guard on a private generation, for driving the pipeline by hand
    pub fn detached() -> Self {
        Generation::default().guard()
    }

    pub fn is_current(&self) -> bool {
        self.generation.current() == self.issued
    }
}

/// Stops a running scheduler from anywhere
#[derive(Debug, Clone, Default)]
pub struct SchedulerHandle {
    generation: Generation,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.generation.advance();
            self.stop.notify_one();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }
}

/// Tick counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub ticks: u64,
    pub drawn: u64,
    pub skipped: u64,
    pub discarded: u64,
    pub errors: u64,
}

pub struct FrameScheduler {
    cadence: Duration,
    max_ticks: Option<u64>,
    handle: SchedulerHandle,
}

impl FrameScheduler {
    pub fn new(target_fps: u32) -> Self {
        Self::with_cadence(Duration::from_secs_f64(1.0 / target_fps.max(1) as f64))
    }

    pub fn with_cadence(cadence: Duration) -> Self {
        Self {
            cadence,
            max_ticks: None,
            handle: SchedulerHandle::default(),
        }
    }

    /// Stop on its own after `max_ticks` ticks
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Drive `pipeline` until stopped
    ///
    /// Non-fatal tick errors are logged, reported to `status` and skipped.
    /// A fatal error ends the run and is returned.
    pub async fn run<C, B, S>(
        &self,
        pipeline: &mut CompositingPipeline<C, B, S>,
        status: &dyn StatusSink,
    ) -> Result<SchedulerReport, PipelineError>
    where
        C: CaptureSource,
        B: PrimaryBackend,
        S: OutputSurface,
    {
        let mut interval = tokio::time::interval(self.cadence);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut report = SchedulerReport::default();
        let mut last_state = EngineState::Uninitialized;

        tracing::info!(
            "Starting frame scheduler at {:.1} ticks/s",
            1.0 / self.cadence.as_secs_f64()
        );
        status.notify(&Status::Initializing);

        loop {
            if self.handle.is_stopped() || self.max_ticks.is_some_and(|max| report.ticks >= max) {
                break;
            }

            tokio::select! {
                biased;
                _ = self.handle.stop.notified() => break,
                _ = interval.tick() => {}
            }

            let guard = self.handle.generation.guard();
            report.ticks += 1;

            let outcome = tokio::select! {
                biased;
                _ = self.handle.stop.notified() => {
                    report.discarded += 1;
                    break;
                }
                outcome = pipeline.tick(&guard) => outcome,
            };

            match outcome {
                Ok(TickOutcome::Drawn { .. }) => report.drawn += 1,
                Ok(TickOutcome::Skipped(reason)) => {
                    tracing::debug!("Tick skipped: {:?}", reason);
                    report.skipped += 1;
                }
                Ok(TickOutcome::Discarded) => report.discarded += 1,
                Err(err) if err.is_fatal() => {
                    tracing::error!("Fatal pipeline error: {}", err);
                    status.notify(&Status::Error(err.to_string()));
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!("Tick failed: {}", err);
                    report.errors += 1;
                    status.notify(&Status::Error(err.to_string()));
                }
            }

            let state = pipeline.engine_state();
            if state != last_state {
                match state {
                    EngineState::Ready => status.notify(&Status::Ready),
                    EngineState::Degraded => status.notify(&Status::Degraded),
                    _ => {}
                }
                last_state = state;
            }
        }

        tracing::info!(
            "Scheduler stopped: {} ticks, {} drawn, {} skipped, {} discarded, {} errors",
            report.ticks,
            report.drawn,
            report.skipped,
            report.discarded,
            report.errors
        );
        status.notify(&Status::Stopped);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_goes_stale_when_generation_advances() {
        let generation = Generation::default();
        let guard = generation.guard();
        assert!(guard.is_current());
        generation.advance();
        assert!(!guard.is_current());
        assert!(generation.guard().is_current());
    }

    #[test]
    fn stop_is_idempotent() {
        let handle = SchedulerHandle::default();
        let guard = handle.generation().guard();
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert_eq!(handle.generation().current(), 1);
        assert!(!guard.is_current());
    }

    #[test]
    fn cadence_follows_target_fps() {
        assert_eq!(FrameScheduler::new(25).cadence(), Duration::from_millis(40));
        assert_eq!(FrameScheduler::new(0).cadence(), Duration::from_secs(1));
    }
}
