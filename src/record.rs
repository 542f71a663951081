//! Public detection records.
//!
//! One `DetectionRecord` is emitted per detection per frame. The JSON field set and
//! order are a public contract consumed by downstream robotics code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detect::{BoundingBox, RawDetection};
use crate::mapper::CoordinateMapper;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub x: i32,
    pub y: i32,
    pub confidence: f64,
    pub pixels_wide: u32,
    pub pixels_high: u32,
    pub field_of_view_w: u32,
    pub field_of_view_h: u32,
    pub class_name: String,
    pub unique_name: String,
    /// Kept for annotation only; not part of the wire format.
    #[serde(skip)]
    pub bounding_box: BoundingBox,
}

impl DetectionRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Round a confidence up to two decimals, clamped to `[0, 1]`.
///
/// The small bias absorbs f32 representation error so that 0.94 stays 0.94.
pub fn round_confidence(confidence: f32) -> f64 {
    let scaled = (confidence as f64 * 100.0 - 1e-4).ceil();
    if scaled <= 0.0 || scaled.is_nan() {
        return 0.0;
    }
    (scaled / 100.0).min(1.0)
}

/// Map one frame's detections into records.
///
/// `unique_name` counters are local to this call: each frame starts every class
/// at zero. Class names ending in a digit or `_` get a `_` before the counter,
/// so `class1` #20 (`class1_20`) never collides with `class12` #0 (`class12_0`).
pub fn build_records(
    mapper: &CoordinateMapper,
    detections: &[RawDetection],
    frame_width: u32,
    frame_height: u32,
) -> Vec<DetectionRecord> {
    let mut counters: HashMap<&str, usize> = HashMap::new();
    detections
        .iter()
        .map(|det| {
            let count = counters.entry(det.class_name.as_str()).or_insert(0);
            let unique_name = unique_name(&det.class_name, *count);
            *count += 1;

            let (x, y) = mapper.map(&det.bounding_box, frame_width, frame_height);
            DetectionRecord {
                x,
                y,
                confidence: round_confidence(det.confidence),
                pixels_wide: frame_width,
                pixels_high: frame_height,
                field_of_view_w: mapper.fov_w,
                field_of_view_h: mapper.fov_h,
                class_name: det.class_name.clone(),
                unique_name,
                bounding_box: det.bounding_box,
            }
        })
        .collect()
}

fn unique_name(class_name: &str, index: usize) -> String {
    let needs_separator = class_name
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_digit() || c == '_');
    if needs_separator {
        format!("{}_{}", class_name, index)
    } else {
        format!("{}{}", class_name, index)
    }
}
