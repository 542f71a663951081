//! YOLOv8 output decoding.
//!
//! The exported YOLOv8 detection head produces one tensor of shape
//! `[1, 4 + classes, anchors]`: rows 0..4 hold `cx, cy, w, h` in model-input
//! pixels, the remaining rows hold per-class scores (already sigmoid-activated).
//! Decoding picks the best class per anchor, applies the confidence threshold and
//! class filter, then runs per-class non-max suppression.

use std::cmp::Ordering;

use anyhow::{anyhow, Result};

use crate::detect::classes::{class_id, class_name};
use crate::detect::result::{BoundingBox, RawDetection};
use crate::error::DemoError;

/// Tuning knobs for YOLO post-processing.
#[derive(Clone, Debug, PartialEq)]
pub struct YoloParams {
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Class names to keep. Empty keeps every class.
    pub classes: Vec<String>,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
            classes: vec!["person".to_string()],
        }
    }
}

impl YoloParams {
    /// Resolve `classes` to class ids. `None` means keep everything.
    pub fn class_filter(&self) -> Result<Option<Vec<usize>>> {
        if self.classes.is_empty() {
            return Ok(None);
        }
        let ids = self
            .classes
            .iter()
            .map(|name| {
                class_id(name).ok_or_else(|| {
                    anyhow::Error::from(DemoError::configuration(format!(
                        "unknown class name '{}'",
                        name
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(ids))
    }
}

/// A decoded box before suppression, in model-input pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Decode a `[rows, anchors]` row-major slice (batch dimension already removed).
pub fn decode(
    output: &[f32],
    rows: usize,
    anchors: usize,
    confidence_threshold: f32,
    class_filter: Option<&[usize]>,
) -> Result<Vec<Candidate>> {
    if rows < 5 {
        return Err(anyhow!(
            "yolo output has {} rows; expected 4 box rows plus class scores",
            rows
        ));
    }
    let expected = rows
        .checked_mul(anchors)
        .ok_or_else(|| anyhow!("yolo output dimensions overflow"))?;
    if output.len() != expected {
        return Err(anyhow!(
            "yolo output has {} values; expected {}x{}",
            output.len(),
            rows,
            anchors
        ));
    }

    let at = |row: usize, anchor: usize| output[row * anchors + anchor];
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..rows - 4 {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < confidence_threshold {
            continue;
        }
        if let Some(filter) = class_filter {
            if !filter.contains(&best_class) {
                continue;
            }
        }
        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            bbox: BoundingBox::from_center(
                at(0, anchor),
                at(1, anchor),
                at(2, anchor),
                at(3, anchor),
            ),
        });
    }
    Ok(candidates)
}

/// Greedy per-class non-max suppression, highest confidence first.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.bbox.iou(&cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

/// Scale candidates from model-input pixels to frame pixels.
pub fn to_raw_detections(
    candidates: &[Candidate],
    input_width: u32,
    input_height: u32,
    frame_width: u32,
    frame_height: u32,
) -> Vec<RawDetection> {
    let sx = frame_width as f32 / input_width.max(1) as f32;
    let sy = frame_height as f32 / input_height.max(1) as f32;
    candidates
        .iter()
        .map(|cand| {
            let name = class_name(cand.class_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class{}", cand.class_id));
            RawDetection::new(
                name,
                cand.confidence.clamp(0.0, 1.0),
                cand.bbox.scale(sx, sy).clamp_to(frame_width, frame_height),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[4 + classes, anchors]` tensor from per-anchor (box, scores).
    fn tensor(anchors: &[([f32; 4], Vec<f32>)], classes: usize) -> Vec<f32> {
        let n = anchors.len();
        let mut out = vec![0.0f32; (4 + classes) * n];
        for (i, (bbox, scores)) in anchors.iter().enumerate() {
            for (row, v) in bbox.iter().enumerate() {
                out[row * n + i] = *v;
            }
            for (class, score) in scores.iter().enumerate() {
                out[(4 + class) * n + i] = *score;
            }
        }
        out
    }

    #[test]
    fn decodes_best_class_above_threshold() -> Result<()> {
        let out = tensor(
            &[
                ([100.0, 100.0, 20.0, 40.0], vec![0.1, 0.8, 0.05]),
                ([300.0, 300.0, 10.0, 10.0], vec![0.2, 0.1, 0.1]),
            ],
            3,
        );
        let cands = decode(&out, 7, 2, 0.25, None)?;
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].class_id, 1);
        assert_eq!(cands[0].confidence, 0.8);
        assert_eq!(cands[0].bbox, BoundingBox::new(90.0, 80.0, 110.0, 120.0));
        Ok(())
    }

    #[test]
    fn class_filter_drops_other_classes() -> Result<()> {
        let out = tensor(
            &[
                ([10.0, 10.0, 4.0, 4.0], vec![0.9, 0.0]),
                ([50.0, 50.0, 4.0, 4.0], vec![0.0, 0.9]),
            ],
            2,
        );
        let cands = decode(&out, 6, 2, 0.25, Some(&[0]))?;
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].class_id, 0);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shapes() {
        assert!(decode(&[0.0; 10], 6, 2, 0.25, None).is_err());
        assert!(decode(&[0.0; 8], 4, 2, 0.25, None).is_err());
    }

    #[test]
    fn nms_keeps_best_overlapping_box_per_class() {
        let a = Candidate {
            class_id: 0,
            confidence: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, 100.0, 100.0),
        };
        let b = Candidate {
            class_id: 0,
            confidence: 0.7,
            bbox: BoundingBox::new(5.0, 5.0, 105.0, 105.0),
        };
        let other_class = Candidate {
            class_id: 16,
            confidence: 0.6,
            bbox: BoundingBox::new(5.0, 5.0, 105.0, 105.0),
        };
        let far = Candidate {
            class_id: 0,
            confidence: 0.5,
            bbox: BoundingBox::new(300.0, 300.0, 350.0, 350.0),
        };
        let kept = non_max_suppression(vec![b, far.clone(), a.clone(), other_class.clone()], 0.45, 10);
        assert_eq!(kept, vec![a, other_class, far]);
    }

    #[test]
    fn nms_respects_max_detections() {
        let cands: Vec<Candidate> = (0..5)
            .map(|i| Candidate {
                class_id: 0,
                confidence: 0.5 + i as f32 * 0.01,
                bbox: BoundingBox::new(i as f32 * 100.0, 0.0, i as f32 * 100.0 + 10.0, 10.0),
            })
            .collect();
        assert_eq!(non_max_suppression(cands, 0.45, 3).len(), 3);
    }

    #[test]
    fn scales_back_to_frame_pixels() {
        let cands = vec![Candidate {
            class_id: 0,
            confidence: 0.9,
            bbox: BoundingBox::new(320.0, 320.0, 640.0, 660.0),
        }];
        let dets = to_raw_detections(&cands, 640, 640, 1280, 480);
        assert_eq!(dets[0].class_name, "person");
        assert_eq!(dets[0].bounding_box, BoundingBox::new(640.0, 240.0, 1280.0, 480.0));
    }

    #[test]
    fn default_filter_is_person_only() -> Result<()> {
        assert_eq!(YoloParams::default().class_filter()?, Some(vec![0]));
        let all = YoloParams {
            classes: Vec::new(),
            ..YoloParams::default()
        };
        assert_eq!(all.class_filter()?, None);
        let bad = YoloParams {
            classes: vec!["unicorn".to_string()],
            ..YoloParams::default()
        };
        assert!(bad.class_filter().is_err());
        Ok(())
    }
}
