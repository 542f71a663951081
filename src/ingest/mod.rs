//! Frame sources.
//!
//! This module provides the camera side of the pipeline:
//! - USB/CSI cameras through V4L2 (feature: ingest-v4l2)
//! - Synthetic `stub://` cameras (no hardware, always available)
//!
//! A source is owned by the detection loop for its whole lifetime. It holds the
//! device handle from `connect` until it is dropped, and every frame it yields is
//! packed RGB8.

pub mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;

use crate::error::DemoError;
use crate::frame::Frame;
use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
use v4l2::V4l2Source;

/// Anything that yields frames to the detection loop.
pub trait FrameSource {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Acquire the device. Fails with `DemoError::DeviceUnavailable`.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame. `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Where frames come from, as given by `LOCAL_CAMERA_SOURCE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSourceId {
    /// `/dev/video<N>`
    Index(u32),
    /// Absolute device path.
    Path(PathBuf),
    /// `stub://<name>` synthetic camera.
    Synthetic(String),
}

impl CameraSourceId {
    pub fn device_path(&self) -> Option<PathBuf> {
        match self {
            CameraSourceId::Index(index) => Some(PathBuf::from(format!("/dev/video{}", index))),
            CameraSourceId::Path(path) => Some(path.clone()),
            CameraSourceId::Synthetic(_) => None,
        }
    }
}

impl FromStr for CameraSourceId {
    type Err = DemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() {
            return Err(DemoError::configuration("camera source is empty"));
        }
        if let Some(name) = value.strip_prefix("stub://") {
            if name.is_empty() {
                return Err(DemoError::configuration("stub:// camera source needs a name"));
            }
            return Ok(CameraSourceId::Synthetic(name.to_string()));
        }
        if value.starts_with('/') {
            return Ok(CameraSourceId::Path(PathBuf::from(value)));
        }
        value.parse::<u32>().map(CameraSourceId::Index).map_err(|_| {
            DemoError::configuration(format!(
                "invalid camera source '{}'; expected a device index, an absolute device path or stub://<name>",
                value
            ))
        })
    }
}

impl fmt::Display for CameraSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSourceId::Index(index) => write!(f, "/dev/video{}", index),
            CameraSourceId::Path(path) => write!(f, "{}", path.display()),
            CameraSourceId::Synthetic(name) => write!(f, "stub://{}", name),
        }
    }
}

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    pub source: CameraSourceId,
    /// Requested frame width. Devices may negotiate a different size.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Requested frame rate, 0 leaves the driver default.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSourceId::Index(0),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Camera frame source.
///
/// Uses V4L2 for real devices, with a synthetic fallback for `stub://` sources.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Source),
    /// Device requested but V4L2 support was not compiled in.
    #[cfg(not(feature = "ingest-v4l2"))]
    Unsupported(CameraConfig),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        let backend = match config.source.device_path() {
            None => CameraBackend::Synthetic(SyntheticSource::new(config)),
            #[cfg(feature = "ingest-v4l2")]
            Some(path) => CameraBackend::Device(V4l2Source::new(config, path)),
            #[cfg(not(feature = "ingest-v4l2"))]
            Some(_) => CameraBackend::Unsupported(config),
        };
        Self { backend }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats().source,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats().source,
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(config) => config.source.to_string(),
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(config) => Err(DemoError::device_unavailable(
                config.source.to_string(),
                "built without the ingest-v4l2 feature",
            )
            .into()),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(config) => Err(DemoError::device_unavailable(
                config.source.to_string(),
                "built without the ingest-v4l2 feature",
            )
            .into()),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => false,
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(config) => SourceStats {
                frames_captured: 0,
                source: config.source.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camera_source_identifiers() {
        assert_eq!("0".parse::<CameraSourceId>().unwrap(), CameraSourceId::Index(0));
        assert_eq!(
            " 2 ".parse::<CameraSourceId>().unwrap(),
            CameraSourceId::Index(2)
        );
        assert_eq!(
            "/dev/video4".parse::<CameraSourceId>().unwrap(),
            CameraSourceId::Path(PathBuf::from("/dev/video4"))
        );
        assert_eq!(
            "stub://front".parse::<CameraSourceId>().unwrap(),
            CameraSourceId::Synthetic("front".to_string())
        );
    }

    #[test]
    fn rejects_invalid_camera_sources() {
        for bad in ["", "  ", "-1", "camera", "video0", "stub://", "rtsp://cam/stream"] {
            let err = bad.parse::<CameraSourceId>().unwrap_err();
            assert!(
                matches!(err, DemoError::Configuration(_)),
                "{:?} should be a configuration error",
                bad
            );
        }
    }

    #[test]
    fn index_maps_to_device_node() {
        assert_eq!(
            CameraSourceId::Index(1).device_path(),
            Some(PathBuf::from("/dev/video1"))
        );
        assert_eq!(CameraSourceId::Index(1).to_string(), "/dev/video1");
        assert_eq!(
            CameraSourceId::Synthetic("x".to_string()).device_path(),
            None
        );
    }

    #[test]
    fn synthetic_camera_source_produces_frames() -> Result<()> {
        let mut source = CameraSource::new(CameraConfig {
            source: CameraSourceId::Synthetic("test".to_string()),
            width: 32,
            height: 24,
            target_fps: 10,
        });
        source.connect()?;
        let frame = source.next_frame()?.unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
        assert!(source.is_healthy());
        assert_eq!(source.describe(), "stub://test");
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_without_v4l2_support_is_unavailable() {
        let mut source = CameraSource::new(CameraConfig::default());
        let err = source.connect().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DemoError>(),
            Some(DemoError::DeviceUnavailable { .. })
        ));
    }
}
