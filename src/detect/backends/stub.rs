use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Stub backend. Validates frames and reports a fixed list of detections.
///
/// With no detections configured it reports nothing, which is what a synthetic
/// camera deployment without a model wants.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<RawDetection>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        frame.validate()?;
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::error::is_recoverable;

    #[test]
    fn reports_configured_detections() -> Result<()> {
        let det = RawDetection::new("person", 0.9, BoundingBox::new(0.0, 0.0, 5.0, 5.0));
        let backend = StubBackend::with_detections(vec![det.clone()]);
        let frame = Frame::filled(8, 8, [0, 0, 0]);
        assert_eq!(backend.detect(&frame)?, vec![det]);
        Ok(())
    }

    #[test]
    fn rejects_malformed_frames_as_recoverable() {
        let backend = StubBackend::new();
        let frame = Frame::new(vec![0u8; 7], 8, 8);
        let err = backend.detect(&frame).unwrap_err();
        assert!(is_recoverable(&err));
    }
}
