use thiserror::Error;

use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum DetectorInitError {
    #[error("face model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("failed to load face model: {0}")]
    Load(#[source] BoxedError),
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("inference failed: {0}")]
    Inference(#[source] BoxedError),
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// Domain interface for face detection.
///
/// Detectors start out not ready. `initialize` may block while a model is
/// fetched; until it succeeds, `detect` returns no boxes rather than an
/// error. Implementations may keep state between frames, hence `&mut self`.
pub trait FaceDetector: Send {
    fn initialize(&mut self) -> Result<(), DetectorInitError>;

    fn is_ready(&self) -> bool;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, DetectionError>;
}
