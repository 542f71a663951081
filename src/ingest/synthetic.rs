//! Synthetic camera for `stub://` sources.
//!
//! Produces a gray background with a bright square sweeping left to right, so a
//! deployment without a camera still exercises the whole pipeline. Frames are
//! paced to `target_fps` like a real camera; `0` means as fast as requested.

use std::time::{Duration, Instant};

use anyhow::Result;

use super::{CameraConfig, SourceStats};
use crate::frame::Frame;

const BACKGROUND: u8 = 114;
const MARKER: [u8; 3] = [240, 240, 240];

pub(crate) struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            last_frame_at: None,
        }
    }

    /// Synthetic sources are always "connected".
    pub(crate) fn connect(&mut self) -> Result<()> {
        log::info!(
            "CameraSource: connected to {} (synthetic {}x{})",
            self.config.source,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.pace();
        self.frame_count += 1;
        Ok(Some(Frame::new(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
        )))
    }

    /// Sleep until one frame interval has passed since the previous frame.
    fn pace(&mut self) {
        if let (Some(last), Some(interval)) =
            (self.last_frame_at, frame_interval(self.config.target_fps))
        {
            let due = last + interval;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![BACKGROUND; width * height * 3];
        if width == 0 || height == 0 {
            return pixels;
        }

        let side = (width.min(height) / 4).max(1);
        let travel = width.saturating_sub(side).max(1);
        let left = (self.frame_count as usize * 8) % travel;
        let top = (height - side.min(height)) / 2;
        for y in top..(top + side).min(height) {
            for x in left..(left + side).min(width) {
                let offset = (y * width + x) * 3;
                pixels[offset..offset + 3].copy_from_slice(&MARKER);
            }
        }
        pixels
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.source.to_string(),
        }
    }
}

fn frame_interval(target_fps: u32) -> Option<Duration> {
    if target_fps == 0 {
        None
    } else {
        Some(Duration::from_secs_f64(1.0 / f64::from(target_fps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::CameraSourceId;

    fn config() -> CameraConfig {
        CameraConfig {
            source: CameraSourceId::Synthetic("test".to_string()),
            width: 64,
            height: 48,
            target_fps: 10,
        }
    }

    #[test]
    fn produces_valid_frames_of_configured_size() -> Result<()> {
        let mut source = SyntheticSource::new(config());
        source.connect()?;
        let frame = source.next_frame()?.expect("synthetic sources never end");
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(frame.validate().is_ok());
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn marker_moves_between_frames() -> Result<()> {
        let mut source = SyntheticSource::new(config());
        let first = source.next_frame()?.unwrap();
        let second = source.next_frame()?.unwrap();
        assert_ne!(first.pixels(), second.pixels());
        assert!(first.pixels().contains(&MARKER[0]));
        Ok(())
    }

    #[test]
    fn frames_are_paced_to_target_fps() -> Result<()> {
        let mut source = SyntheticSource::new(config());
        source.next_frame()?;
        let started = Instant::now();
        source.next_frame()?;
        assert!(
            started.elapsed() >= Duration::from_millis(95),
            "second frame after {:?}",
            started.elapsed()
        );
        Ok(())
    }

    #[test]
    fn zero_fps_is_unpaced() -> Result<()> {
        let mut source = SyntheticSource::new(CameraConfig {
            target_fps: 0,
            ..config()
        });
        let started = Instant::now();
        for _ in 0..20 {
            source.next_frame()?;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
        Ok(())
    }
}
