//! Edge YOLO demo
//!
//! Reads frames from a local camera, runs a YOLOv8n detector on each one and
//! converts every detection into a compact JSON record giving the object's
//! angular position relative to the camera's optical axis.
//!
//! # Architecture
//!
//! A single detection loop drives the pipeline one frame at a time:
//!
//! 1. **Frame Source**: V4L2 camera (or synthetic `stub://` camera) yielding RGB frames.
//! 2. **Detector Adapter**: YOLOv8n through tract, or a stub with fixed detections.
//! 3. **Coordinate Mapper**: box center to integer degrees (x right, y up).
//! 4. **Records**: per-frame `unique_name` assignment (`person0`, `person1`, ...).
//! 5. **Output Sink**: local display window or web viewer, chosen at startup.
//!
//! # Module Structure
//!
//! - `config`: layered startup configuration (`LOCAL_CAMERA_SOURCE`, FOV, output)
//! - `ingest`: frame sources and pixel-format normalization
//! - `detect`: detector trait, backends, YOLO post-processing
//! - `mapper`, `record`: pixel-to-angle mapping and the JSON record
//! - `pipeline`: the Idle/Running/Stopped detection loop
//! - `sink`, `latest`, `viewer`, `display`: output side

pub mod config;
pub mod detect;
#[cfg(feature = "display-window")]
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod latest;
pub mod mapper;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod viewer;

pub use config::{DemoConfig, DetectorKind, OutputMode};
pub use detect::{BoundingBox, Detector, RawDetection, StubBackend, YoloParams};
#[cfg(feature = "backend-tract")]
pub use detect::TractYoloBackend;
pub use error::{is_recoverable, DemoError};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, CameraSourceId, FrameSource, SourceStats};
pub use mapper::{CoordinateMapper, Projection};
pub use pipeline::{DetectionLoop, LoopState, LoopSummary, StepOutcome};
pub use record::{build_records, DetectionRecord};
pub use sink::{Annotator, DisplaySink, DisplaySnapshot, OutputSink, ViewerSnapshot, WebViewerSink};
pub use viewer::{ViewerConfig, ViewerHandle, ViewerServer};
