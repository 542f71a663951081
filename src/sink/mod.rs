//! Output sinks.
//!
//! The detection loop hands every processed frame and its records to one
//! `OutputSink`, chosen once at startup:
//! - `WebViewerSink`: annotated JPEG + records for the HTTP viewer
//! - `DisplaySink`: annotated RGB image for the local display window

pub mod annotate;
mod display;
mod web;

use anyhow::Result;

use crate::frame::Frame;
use crate::record::DetectionRecord;

pub use annotate::Annotator;
pub use display::{DisplaySink, DisplaySnapshot};
pub use web::{ViewerSnapshot, WebViewerSink};

pub trait OutputSink {
    fn name(&self) -> &'static str;

    /// Publish one processed frame. Called once per successfully detected frame.
    fn render(&mut self, frame: &Frame, records: &[DetectionRecord]) -> Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn render(&mut self, frame: &Frame, records: &[DetectionRecord]) -> Result<()> {
        (**self).render(frame, records)
    }
}
