//! V4L2 camera backend.
//!
//! Opens a local device node (e.g. `/dev/video0`), negotiates a capture format and
//! streams memory-mapped buffers. Every buffer is normalized to packed RGB8 before
//! it leaves this module. The device handle is held until the source is dropped.

use anyhow::{Context, Result};
use ouroboros::self_referencing;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraConfig, SourceStats};
use crate::error::DemoError;
use crate::frame::Frame;

const PREFERRED_FOURCCS: [&[u8; 4]; 3] = [b"RGB3", b"YUYV", b"MJPG"];

pub(crate) struct V4l2Source {
    config: CameraConfig,
    path: PathBuf,
    state: Option<DeviceState>,
    format: Option<PixelFormat>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub(crate) fn new(config: CameraConfig, path: PathBuf) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            path,
            state: None,
            format: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> DemoError {
        DemoError::device_unavailable(self.path.display().to_string(), reason.to_string())
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.path)
            .map_err(|err| self.unavailable(format!("open failed: {err}")))?;

        let mut negotiated = None;
        for fourcc in PREFERRED_FOURCCS {
            let mut format = device
                .format()
                .map_err(|err| self.unavailable(format!("read format: {err}")))?;
            format.width = self.config.width;
            format.height = self.config.height;
            format.fourcc = v4l::FourCC::new(fourcc);
            match device.set_format(&format) {
                Ok(actual) => {
                    let name = actual.fourcc.str().unwrap_or_default().to_string();
                    if let Some(pixel_format) = PixelFormat::from_fourcc(&name) {
                        negotiated = Some((actual, pixel_format));
                        break;
                    }
                    log::debug!("CameraSource: driver answered {} for request", name);
                }
                Err(err) => {
                    log::warn!(
                        "CameraSource: failed to set format on {}: {}",
                        self.path.display(),
                        err
                    );
                }
            }
        }
        let (format, pixel_format) = negotiated
            .ok_or_else(|| self.unavailable("no supported pixel format (RGB3, YUYV, MJPG)"))?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.path.display(),
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.format = Some(pixel_format);
        self.last_error = None;

        let source_id = self.path.display().to_string();
        let state = DeviceState::try_new(device, |device| {
            v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4).map_err(|err| {
                DemoError::device_unavailable(source_id, format!("create buffer stream: {err}"))
            })
        })
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{} {:?})",
            self.path.display(),
            self.active_width,
            self.active_height,
            pixel_format
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let format = self.format.context("v4l2 device not connected")?;
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let captured = state.with_mut(|fields| {
            fields.stream.next().map(|(buf, meta)| {
                let used = meta.bytesused as usize;
                if used > 0 && used <= buf.len() {
                    buf[..used].to_vec()
                } else {
                    buf.to_vec()
                }
            })
        });
        let raw = match captured {
            Ok(raw) => raw,
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Err(self.unavailable(format!("capture failed: {err}")).into());
            }
        };

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        // Decode failures yield an empty frame; the detector rejects it and the
        // loop skips this iteration.
        let pixels = match normalize_to_rgb(&raw, self.active_width, self.active_height, format) {
            Ok(pixels) => pixels,
            Err(err) => {
                log::warn!("CameraSource: dropping undecodable buffer: {:#}", err);
                Vec::new()
            }
        };
        Ok(Some(Frame::new(pixels, self.active_width, self.active_height)))
    }

    pub(crate) fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.path.display().to_string(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        if self.state.take().is_some() {
            log::info!("CameraSource: released {}", self.path.display());
        }
    }
}
