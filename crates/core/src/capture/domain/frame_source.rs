use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("no frames available at {0}")]
    NoFrames(String),
    #[error("camera support is not compiled in: {0}")]
    Unsupported(String),
}

/// Owns a capture device and produces frames on demand.
///
/// `read` never tears anything down: a failed or empty read yields `None`
/// and the caller simply tries again on its next tick. `close` is
/// idempotent and safe on a source that was never opened.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CameraError>;

    fn read(&mut self) -> Option<Frame>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}
