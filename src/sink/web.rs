use anyhow::Result;

use super::annotate::{encode_jpeg, Annotator, JPEG_QUALITY};
use super::OutputSink;
use crate::frame::Frame;
use crate::latest::{LatestReader, LatestWriter};
use crate::record::DetectionRecord;

/// What the web viewer serves: one annotated JPEG and the records drawn on it.
#[derive(Clone, Debug)]
pub struct ViewerSnapshot {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub records: Vec<DetectionRecord>,
}

pub struct WebViewerSink {
    writer: LatestWriter<ViewerSnapshot>,
    annotator: Annotator,
    quality: u8,
}

impl WebViewerSink {
    pub fn new(writer: LatestWriter<ViewerSnapshot>) -> Self {
        Self {
            writer,
            annotator: Annotator::default(),
            quality: JPEG_QUALITY,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn reader(&self) -> LatestReader<ViewerSnapshot> {
        self.writer.reader()
    }
}

impl OutputSink for WebViewerSink {
    fn name(&self) -> &'static str {
        "web"
    }

    fn render(&mut self, frame: &Frame, records: &[DetectionRecord]) -> Result<()> {
        let image = self.annotator.annotate(frame, records)?;
        let jpeg = encode_jpeg(&image, self.quality)?;
        self.writer.publish(ViewerSnapshot {
            jpeg,
            width: frame.width,
            height: frame.height,
            records: records.to_vec(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latest;

    #[test]
    fn render_replaces_the_latest_snapshot() -> Result<()> {
        let (writer, reader) = latest::channel();
        let mut sink = WebViewerSink::new(writer);

        sink.render(&Frame::filled(16, 8, [10, 10, 10]), &[])?;
        sink.render(&Frame::filled(32, 16, [10, 10, 10]), &[])?;

        let (seq, snapshot) = reader.latest()?.expect("rendered");
        assert_eq!(seq, 2);
        assert_eq!((snapshot.width, snapshot.height), (32, 16));
        assert!(snapshot.records.is_empty());
        assert_eq!(&snapshot.jpeg[..2], &[0xFF, 0xD8]);
        Ok(())
    }
}
