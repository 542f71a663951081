//! Captured frames.
//!
//! A `Frame` is a tightly packed RGB8 image as produced by a frame source. Frames
//! live for one loop iteration: captured, handed to the detector, annotated by the
//! sink, then dropped.
//!
//! Frames are not validated on construction. A source may hand over a truncated
//! buffer (partial read, driver hiccup); it is the detector that rejects it with
//! an inference error so the loop can skip that frame.

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::error::DemoError;

/// Bytes per pixel for packed RGB8.
pub const RGB_CHANNELS: usize = 3;

pub struct Frame {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Solid-color frame. Handy for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * RGB_CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height)
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Expected byte length for the frame's dimensions, `None` on overflow.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
    }

    /// Check that dimensions and buffer length describe a usable RGB8 image.
    pub fn validate(&self) -> std::result::Result<(), DemoError> {
        if self.width == 0 || self.height == 0 {
            return Err(DemoError::inference(format!(
                "frame has zero dimension {}x{}",
                self.width, self.height
            )));
        }
        let expected = self
            .expected_len()
            .ok_or_else(|| DemoError::inference("frame dimensions overflow"))?;
        if self.data.len() != expected {
            return Err(DemoError::inference(format!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Copy into an `image` buffer for resizing, drawing or encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        self.validate()?;
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_frame_is_valid() {
        let frame = Frame::filled(4, 3, [10, 20, 30]);
        assert_eq!(frame.pixels().len(), 4 * 3 * 3);
        assert!(frame.validate().is_ok());
        assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
    }

    #[test]
    fn short_buffer_is_an_inference_error() {
        let frame = Frame::new(vec![0u8; 10], 4, 3);
        let err = frame.validate().unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("expected 36 RGB bytes"));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let frame = Frame::new(Vec::new(), 0, 480);
        assert!(frame.validate().is_err());
    }

    #[test]
    fn round_trips_through_rgb_image() -> Result<()> {
        let frame = Frame::filled(2, 2, [1, 2, 3]);
        let image = frame.to_rgb_image()?;
        assert_eq!(image.get_pixel(1, 1).0, [1, 2, 3]);

        let back = Frame::from_rgb_image(image);
        assert_eq!(back.width, 2);
        assert_eq!(back.pixels(), frame.pixels());
        Ok(())
    }

    #[test]
    fn debug_does_not_dump_pixels() {
        let frame = Frame::filled(2, 2, [0, 0, 0]);
        let text = format!("{:?}", frame);
        assert!(text.contains("bytes: 12"));
    }
}
