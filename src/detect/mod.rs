//! Detector adapters.
//!
//! A detector turns one RGB frame into class-labeled boxes in frame pixels. The
//! heavy lifting (convolutions, anchor decoding inside the graph) belongs to the
//! inference runtime; this module only prepares input tensors and post-processes
//! the YOLO head.

mod backend;
mod backends;
pub mod classes;
mod result;
pub mod yolo;

pub use backend::Detector;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractYoloBackend;
pub use result::{BoundingBox, RawDetection};
pub use yolo::YoloParams;
