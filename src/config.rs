use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::detect::YoloParams;
use crate::error::DemoError;
use crate::ingest::{CameraConfig, CameraSourceId};
use crate::mapper::{CoordinateMapper, Projection};
use crate::viewer::DEFAULT_VIEWER_ADDR;

pub const CAMERA_SOURCE_ENV: &str = "LOCAL_CAMERA_SOURCE";
const DEFAULT_FOV_DEGREES: u32 = 90;
const DEFAULT_MODEL_PATH: &str = "assets/yolov8n.onnx";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DemoConfigFile {
    camera: Option<CameraConfigFile>,
    output: Option<String>,
    viewer: Option<ViewerConfigFile>,
    detector: Option<DetectorConfigFile>,
    annotation: Option<AnnotationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    fov_w: Option<u32>,
    fov_h: Option<u32>,
    projection: Option<Projection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ViewerConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnnotationConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    kind: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    classes: Option<Vec<String>>,
}

/// Which output sink the demo renders to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Web,
    Display,
}

impl FromStr for OutputMode {
    type Err = DemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(OutputMode::Web),
            "display" | "local" => Ok(OutputMode::Display),
            other => Err(DemoError::configuration(format!(
                "unknown output '{}'; expected web or display",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// YOLOv8n ONNX model through tract (feature: backend-tract).
    Tract,
    /// Fixed detections, no model.
    Stub,
}

impl Default for DetectorKind {
    fn default() -> Self {
        if cfg!(feature = "backend-tract") {
            DetectorKind::Tract
        } else {
            DetectorKind::Stub
        }
    }
}

impl FromStr for DetectorKind {
    type Err = DemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tract" | "yolo" => Ok(DetectorKind::Tract),
            "stub" => Ok(DetectorKind::Stub),
            other => Err(DemoError::configuration(format!(
                "unknown detector '{}'; expected tract or stub",
                other
            ))),
        }
    }
}

/// Startup configuration: JSON file (`EDGE_YOLO_CONFIG`), then environment
/// overrides, then validation. CLI flags are applied by the binary on top.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub camera: CameraConfig,
    pub fov_w: u32,
    pub fov_h: u32,
    pub projection: Projection,
    pub output: OutputMode,
    pub viewer_addr: String,
    pub detector: DetectorKind,
    pub model_path: PathBuf,
    pub yolo: YoloParams,
    /// TrueType font for frame labels. `None` searches the usual system paths.
    pub font_path: Option<PathBuf>,
}

impl DemoConfig {
    pub fn load() -> Result<Self> {
        let config_path = env_value("EDGE_YOLO_CONFIG");
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => DemoConfigFile::default(),
        };

        // The camera is only ever chosen by the environment.
        let raw_source = env_value(CAMERA_SOURCE_ENV).ok_or_else(|| {
            DemoError::configuration(format!("{} is not set", CAMERA_SOURCE_ENV))
        })?;
        let source: CameraSourceId = raw_source
            .parse()
            .with_context(|| format!("{}='{}'", CAMERA_SOURCE_ENV, raw_source))?;

        let mut cfg = Self::from_file(file_cfg, source)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DemoConfigFile, source: CameraSourceId) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let defaults = CameraConfig::default();
        let camera = CameraConfig {
            source,
            width: camera_file.width.unwrap_or(defaults.width),
            height: camera_file.height.unwrap_or(defaults.height),
            target_fps: camera_file.target_fps.unwrap_or(defaults.target_fps),
        };

        let output = match file.output.as_deref() {
            Some(output) => output.parse()?,
            None => OutputMode::default(),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = match detector_file.kind.as_deref() {
            Some(kind) => kind.parse()?,
            None => DetectorKind::default(),
        };
        let yolo_defaults = YoloParams::default();
        let yolo = YoloParams {
            input_width: detector_file
                .input_width
                .unwrap_or(yolo_defaults.input_width),
            input_height: detector_file
                .input_height
                .unwrap_or(yolo_defaults.input_height),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(yolo_defaults.confidence_threshold),
            iou_threshold: detector_file
                .iou_threshold
                .unwrap_or(yolo_defaults.iou_threshold),
            max_detections: detector_file
                .max_detections
                .unwrap_or(yolo_defaults.max_detections),
            classes: detector_file.classes.unwrap_or(yolo_defaults.classes),
        };

        Ok(Self {
            camera,
            fov_w: camera_file.fov_w.unwrap_or(DEFAULT_FOV_DEGREES),
            fov_h: camera_file.fov_h.unwrap_or(DEFAULT_FOV_DEGREES),
            projection: camera_file.projection.unwrap_or_default(),
            output,
            viewer_addr: file
                .viewer
                .and_then(|viewer| viewer.addr)
                .unwrap_or_else(|| DEFAULT_VIEWER_ADDR.to_string()),
            detector,
            model_path: detector_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            yolo,
            font_path: file.annotation.and_then(|annotation| annotation.font_path),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(fov) = env_value("CAMERA_FOV_W") {
            self.fov_w = parse_number("CAMERA_FOV_W", &fov)?;
        }
        if let Some(fov) = env_value("CAMERA_FOV_H") {
            self.fov_h = parse_number("CAMERA_FOV_H", &fov)?;
        }
        if let Some(projection) = env_value("EDGE_YOLO_PROJECTION") {
            self.projection = projection.parse()?;
        }
        if let Some(output) = env_value("EDGE_YOLO_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(addr) = env_value("EDGE_YOLO_VIEWER_ADDR") {
            self.viewer_addr = addr;
        }
        if let Some(kind) = env_value("EDGE_YOLO_DETECTOR") {
            self.detector = kind.parse()?;
        }
        if let Some(path) = env_value("EDGE_YOLO_FONT") {
            self.font_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("EDGE_YOLO_MODEL") {
            self.model_path = PathBuf::from(path);
        }
        if let Some(classes) = env_value("EDGE_YOLO_CLASSES") {
            // "*" keeps every class.
            self.yolo.classes = if classes.trim() == "*" {
                Vec::new()
            } else {
                split_csv(&classes)
            };
        }
        if let Some(threshold) = env_value("EDGE_YOLO_CONFIDENCE") {
            self.yolo.confidence_threshold = parse_number("EDGE_YOLO_CONFIDENCE", &threshold)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, fov) in [("CAMERA_FOV_W", self.fov_w), ("CAMERA_FOV_H", self.fov_h)] {
            if fov == 0 || fov > 360 {
                return Err(DemoError::configuration(format!(
                    "{} must be between 1 and 360 degrees, got {}",
                    name, fov
                ))
                .into());
            }
            if self.projection == Projection::Rectilinear && fov >= 180 {
                return Err(DemoError::configuration(format!(
                    "{} must be below 180 degrees for the rectilinear projection, got {}",
                    name, fov
                ))
                .into());
            }
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(DemoError::configuration("camera width and height must be non-zero").into());
        }
        if self.yolo.input_width == 0 || self.yolo.input_height == 0 {
            return Err(DemoError::configuration("model input size must be non-zero").into());
        }
        if !(0.0..=1.0).contains(&self.yolo.confidence_threshold) {
            return Err(DemoError::configuration(format!(
                "confidence threshold must be within [0, 1], got {}",
                self.yolo.confidence_threshold
            ))
            .into());
        }
        if !(self.yolo.iou_threshold > 0.0 && self.yolo.iou_threshold <= 1.0) {
            return Err(DemoError::configuration(format!(
                "IoU threshold must be within (0, 1], got {}",
                self.yolo.iou_threshold
            ))
            .into());
        }
        self.yolo.class_filter()?;
        self.viewer_addr.parse::<SocketAddr>().map_err(|_| {
            DemoError::configuration(format!("invalid viewer address '{}'", self.viewer_addr))
        })?;

        if self.output == OutputMode::Display && !cfg!(feature = "display-window") {
            return Err(DemoError::configuration(
                "display output requires the display-window feature",
            )
            .into());
        }
        if self.detector == DetectorKind::Tract && !cfg!(feature = "backend-tract") {
            return Err(DemoError::configuration(
                "tract detector requires the backend-tract feature",
            )
            .into());
        }
        Ok(())
    }

    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.fov_w, self.fov_h, self.projection)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        DemoError::configuration(format!("{} must be a number, got '{}'", name, value)).into()
    })
}

fn read_config_file(path: &Path) -> Result<DemoConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        DemoError::configuration(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let cfg = serde_json::from_str(&raw).map_err(|e| {
        DemoError::configuration(format!("invalid config file {}: {}", path.display(), e))
    })?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
