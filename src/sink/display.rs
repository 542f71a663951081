use anyhow::Result;

use super::annotate::Annotator;
use super::OutputSink;
use crate::frame::Frame;
use crate::latest::{LatestReader, LatestWriter};
use crate::record::DetectionRecord;

/// Annotated frame for the local display window.
#[derive(Clone, Debug)]
pub struct DisplaySnapshot {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8.
    pub rgb: Vec<u8>,
    pub records: Vec<DetectionRecord>,
}

/// Local display variant. The window itself lives in `crate::display` and reads
/// the snapshots this sink publishes.
pub struct DisplaySink {
    writer: LatestWriter<DisplaySnapshot>,
    annotator: Annotator,
}

impl DisplaySink {
    pub fn new(writer: LatestWriter<DisplaySnapshot>) -> Self {
        Self {
            writer,
            annotator: Annotator::default(),
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn reader(&self) -> LatestReader<DisplaySnapshot> {
        self.writer.reader()
    }
}

impl OutputSink for DisplaySink {
    fn name(&self) -> &'static str {
        "display"
    }

    fn render(&mut self, frame: &Frame, records: &[DetectionRecord]) -> Result<()> {
        let image = self.annotator.annotate(frame, records)?;
        self.writer.publish(DisplaySnapshot {
            width: image.width(),
            height: image.height(),
            rgb: image.into_raw(),
            records: records.to_vec(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, RawDetection};
    use crate::latest;
    use crate::mapper::{CoordinateMapper, Projection};
    use crate::record::build_records;

    #[test]
    fn publishes_annotated_pixels() -> Result<()> {
        let (writer, reader) = latest::channel();
        let mut sink = DisplaySink::new(writer);
        let frame = Frame::filled(20, 20, [0, 0, 0]);
        let records = build_records(
            &CoordinateMapper::new(90, 90, Projection::Linear),
            &[RawDetection::new("dog", 0.7, BoundingBox::new(0.0, 0.0, 10.0, 10.0))],
            20,
            20,
        );
        sink.render(&frame, &records)?;

        let (_, snapshot) = reader.latest()?.expect("rendered");
        assert_eq!(snapshot.rgb.len(), 20 * 20 * 3);
        assert_eq!(&snapshot.rgb[..3], &[255, 0, 255]);
        assert_eq!(snapshot.records[0].unique_name, "dog0");
        Ok(())
    }
}
