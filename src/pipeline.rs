//! The detection loop.
//!
//! One thread, one frame at a time: pull a frame, run the detector, map and name
//! the detections, log the records, hand everything to the sink. The next frame
//! is not requested until the current one is fully processed.
//!
//! State machine: `Idle --start--> Running --(stop | end of stream | source
//! failure)--> Stopped`. Entering `Stopped` drops the frame source, releasing the
//! camera on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::detect::Detector;
use crate::error::is_recoverable;
use crate::ingest::FrameSource;
use crate::mapper::CoordinateMapper;
use crate::record::{build_records, DetectionRecord};
use crate::sink::OutputSink;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// What happened to one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// Frame processed; these records were emitted (possibly none).
    Processed(Vec<DetectionRecord>),
    /// The detector rejected the frame; zero records.
    Skipped,
    /// The source has no more frames. The loop is now stopped.
    EndOfStream,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub records_emitted: u64,
}

pub struct DetectionLoop<S, D, O> {
    source: Option<S>,
    detector: D,
    sink: O,
    mapper: CoordinateMapper,
    state: LoopState,
    summary: LoopSummary,
    max_frames: Option<u64>,
    last_health_log: Instant,
}

impl<S, D, O> DetectionLoop<S, D, O>
where
    S: FrameSource,
    D: Detector,
    O: OutputSink,
{
    pub fn new(source: S, detector: D, sink: O, mapper: CoordinateMapper) -> Self {
        Self {
            source: Some(source),
            detector,
            sink,
            mapper,
            state: LoopState::Idle,
            summary: LoopSummary::default(),
            max_frames: None,
            last_health_log: Instant::now(),
        }
    }

    /// Stop after this many frames (processed or skipped).
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    /// Idle -> Running: acquire the camera and warm up the detector.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LoopState::Idle {
            return Err(anyhow!("detection loop already started ({:?})", self.state));
        }
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| anyhow!("detection loop has no frame source"))?;
        if let Err(err) = source.connect() {
            self.stop();
            return Err(err);
        }
        if let Err(err) = self.detector.warm_up() {
            self.stop();
            return Err(err);
        }
        log::info!(
            "detection loop running: source={} detector={} sink={} fov={}x{} projection={}",
            self.source.as_ref().map(|s| s.describe()).unwrap_or_default(),
            self.detector.name(),
            self.sink.name(),
            self.mapper.fov_w,
            self.mapper.fov_h,
            self.mapper.projection.as_str()
        );
        self.state = LoopState::Running;
        Ok(())
    }

    /// Any state -> Stopped. Releases the frame source.
    pub fn stop(&mut self) {
        if let Some(source) = self.source.take() {
            let stats = source.stats();
            log::info!(
                "detection loop stopped: released {} after {} frames",
                stats.source,
                stats.frames_captured
            );
        }
        self.state = LoopState::Stopped;
    }

    /// Process exactly one frame.
    ///
    /// Source failures stop the loop and are returned; detector failures skip
    /// the frame.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.state != LoopState::Running {
            return Err(anyhow!("detection loop is not running ({:?})", self.state));
        }
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| anyhow!("detection loop has no frame source"))?;

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("frame source reached end of stream");
                self.stop();
                return Ok(StepOutcome::EndOfStream);
            }
            Err(err) => {
                log::error!("frame source failed: {:#}", err);
                self.stop();
                return Err(err);
            }
        };

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                // Detector failures are per-frame; unexpected ones are logged louder.
                if is_recoverable(&err) {
                    log::warn!("skipping frame: {:#}", err);
                } else {
                    log::error!("detector {} failed, skipping frame: {:#}", self.detector.name(), err);
                }
                self.summary.frames_skipped += 1;
                return Ok(StepOutcome::Skipped);
            }
        };

        let records = build_records(&self.mapper, &detections, frame.width, frame.height);
        for record in &records {
            match record.to_json() {
                Ok(json) => log::info!("detection: {}", json),
                Err(err) => log::warn!("failed to serialize record: {}", err),
            }
        }

        if let Err(err) = self.sink.render(&frame, &records) {
            log::warn!("{} sink failed to render frame: {:#}", self.sink.name(), err);
        }

        self.summary.frames_processed += 1;
        self.summary.records_emitted += records.len() as u64;
        Ok(StepOutcome::Processed(records))
    }

    /// Drive `step` until stopped, the stop flag is raised, or `max_frames` is hit.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<LoopSummary> {
        if self.state == LoopState::Idle {
            self.start()?;
        }
        while self.state == LoopState::Running {
            if stop.load(Ordering::SeqCst) {
                log::info!("stop signal received");
                self.stop();
                break;
            }
            if let Some(max) = self.max_frames {
                if self.summary.frames_processed + self.summary.frames_skipped >= max {
                    log::info!("frame limit {} reached", max);
                    self.stop();
                    break;
                }
            }

            self.step()?;
            self.log_health();
        }
        Ok(self.summary)
    }

    fn log_health(&mut self) {
        if self.last_health_log.elapsed() < HEALTH_LOG_INTERVAL {
            return;
        }
        if let Some(source) = &self.source {
            let stats = source.stats();
            log::info!(
                "camera health={} captured={} processed={} skipped={} records={} source={}",
                source.is_healthy(),
                stats.frames_captured,
                self.summary.frames_processed,
                self.summary.frames_skipped,
                self.summary.records_emitted,
                stats.source
            );
        }
        self.last_health_log = Instant::now();
    }
}
