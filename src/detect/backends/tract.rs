#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::result::RawDetection;
use crate::detect::yolo::{decode, non_max_suppression, to_raw_detections, YoloParams};
use crate::error::DemoError;
use crate::frame::Frame;

/// Tract-based YOLOv8 backend for ONNX inference.
///
/// The model is loaded, given a fixed input shape and optimized once. Frames of
/// any size are resized to the model input; boxes are scaled back to frame pixels.
pub struct TractYoloBackend {
    model: TypedRunnableModel<TypedModel>,
    params: YoloParams,
    class_filter: Option<Vec<usize>>,
}

impl TractYoloBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, params: YoloParams) -> Result<Self> {
        let model_path = model_path.as_ref();
        let class_filter = params.class_filter()?;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(
                        1,
                        3,
                        params.input_height as usize,
                        params.input_width as usize
                    ),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractYoloBackend: loaded {} ({}x{} input, threshold {:.2})",
            model_path.display(),
            params.input_width,
            params.input_height,
            params.confidence_threshold
        );

        Ok(Self {
            model,
            params,
            class_filter,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        frame.validate()?;
        let image = frame.to_rgb_image()?;
        let resized = if image.dimensions() == (self.params.input_width, self.params.input_height)
        {
            image
        } else {
            imageops::resize(
                &image,
                self.params.input_width,
                self.params.input_height,
                FilterType::Triangle,
            )
        };

        let width = self.params.input_width as usize;
        let height = self.params.input_height as usize;
        let pixels = resized.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
            pixels[(y * width + x) * 3 + c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode_outputs(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let (rows, anchors) = match shape.as_slice() {
            [1, rows, anchors] => (*rows, *anchors),
            other => return Err(anyhow!("unexpected yolo output shape {:?}", other)),
        };
        let flat: Vec<f32> = view.iter().copied().collect();

        let candidates = decode(
            &flat,
            rows,
            anchors,
            self.params.confidence_threshold,
            self.class_filter.as_deref(),
        )?;
        let kept = non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        );
        Ok(to_raw_detections(
            &kept,
            self.params.input_width,
            self.params.input_height,
            frame.width,
            frame.height,
        ))
    }
}

impl Detector for TractYoloBackend {
    fn name(&self) -> &'static str {
        "tract-yolov8"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|err| DemoError::inference(format!("ONNX inference failed: {err}")))?;
        self.decode_outputs(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.params.input_width, self.params.input_height, [114, 114, 114]);
        let detections = self.detect(&blank).context("model warm-up failed")?;
        log::debug!(
            "TractYoloBackend: warm-up produced {} detections",
            detections.len()
        );
        Ok(())
    }
}
