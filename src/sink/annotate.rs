//! Frame annotation and JPEG encoding.
//!
//! Every record gets a magenta box and its `unique_name` at the box's top-left
//! corner; the model name sits at the top of the frame. Labels need a TrueType
//! font. Without one, only boxes are drawn.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::BoundingBox;
use crate::error::DemoError;
use crate::frame::Frame;
use crate::record::DetectionRecord;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
pub const BOX_THICKNESS: u32 = 3;
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const LABEL_SCALE: f32 = 24.0;
pub const TITLE_SCALE: f32 = 14.0;
pub const JPEG_QUALITY: u8 = 90;
pub const DEFAULT_MODEL_NAME: &str = "edge-yolo-demo";

/// Searched in order when no font is configured.
pub const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
];

/// Draws detections onto frames. Cheap to clone; the font is shared.
#[derive(Clone)]
pub struct Annotator {
    font: Option<Arc<FontVec>>,
    model_name: String,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_NAME)
    }
}

impl Annotator {
    /// Boxes only, until a font is attached.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            font: None,
            model_name: model_name.into(),
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(Arc::new(font));
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Attach the configured font, or the first system font found.
    ///
    /// A configured font that cannot be loaded is a configuration error. A
    /// missing system font only costs the labels.
    pub fn with_font_from(self, configured: Option<&Path>) -> Result<Self> {
        match configured {
            Some(path) => {
                let font = load_font(path).map_err(|err| {
                    DemoError::configuration(format!(
                        "cannot load label font {}: {:#}",
                        path.display(),
                        err
                    ))
                })?;
                log::info!("annotate: using label font {}", path.display());
                Ok(self.with_font(font))
            }
            None => match find_system_font() {
                Some(path) => {
                    let font = load_font(&path)?;
                    log::info!("annotate: using label font {}", path.display());
                    Ok(self.with_font(font))
                }
                None => {
                    log::warn!(
                        "annotate: no TrueType font found; set EDGE_YOLO_FONT to draw labels"
                    );
                    Ok(self)
                }
            },
        }
    }

    /// Copy the frame, outline every record's box and label it.
    pub fn annotate(&self, frame: &Frame, records: &[DetectionRecord]) -> Result<RgbImage> {
        let mut image = frame.to_rgb_image().context("annotate frame")?;
        for record in records {
            draw_box(&mut image, &record.bounding_box, BOX_COLOR, BOX_THICKNESS);
        }
        if let Some(font) = &self.font {
            for record in records {
                // Text sits above the box, like a caption on its top edge.
                let x = record.bounding_box.x_min.max(0.0) as i32;
                let y = (record.bounding_box.y_min - LABEL_SCALE).max(0.0) as i32;
                draw_text_mut(
                    &mut image,
                    TEXT_COLOR,
                    x,
                    y,
                    PxScale::from(LABEL_SCALE),
                    font.as_ref(),
                    &record.unique_name,
                );
            }
            draw_text_mut(
                &mut image,
                TEXT_COLOR,
                0,
                4,
                PxScale::from(TITLE_SCALE),
                font.as_ref(),
                &self.model_name,
            );
        }
        Ok(image)
    }
}

pub fn load_font(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
    let font = FontVec::try_from_vec(data)
        .with_context(|| format!("parse font {}", path.display()))?;
    Ok(font)
}

pub fn find_system_font() -> Option<PathBuf> {
    SYSTEM_FONT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Draw a hollow rectangle `thickness` pixels wide, growing inward, clipped to
/// the image.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let bbox = bbox.clamp_to(width - 1, height - 1);
    let x0 = bbox.x_min.round() as i32;
    let y0 = bbox.y_min.round() as i32;
    let x1 = bbox.x_max.round() as i32;
    let y1 = bbox.y_max.round() as i32;

    for t in 0..thickness as i32 {
        let box_width = x1 - x0 + 1 - 2 * t;
        let box_height = y1 - y0 + 1 - 2 * t;
        if box_width <= 0 || box_height <= 0 {
            break;
        }
        let rect = Rect::at(x0 + t, y0 + t).of_size(box_width as u32, box_height as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(image)
        .context("encode JPEG")?;
    Ok(jpeg)
}
