//! Failure taxonomy for the detection pipeline.
//!
//! Every failure is either fatal (stops the loop / aborts startup) or skipped
//! (the current frame produces no records). There is no retry tier.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemoError {
    /// Missing or invalid startup configuration. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The camera could not be opened, or failed after start. Fatal.
    #[error("camera {source_id} unavailable: {reason}")]
    DeviceUnavailable { source_id: String, reason: String },

    /// The detector rejected a frame. Recoverable; the frame is skipped.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl DemoError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn device_unavailable(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// True when the loop may skip the frame and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Inference(_))
    }
}

/// Returns true when `err` (or anything in its chain) is a recoverable `DemoError`.
pub fn is_recoverable(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<DemoError>())
        .any(DemoError::is_recoverable)
}
