use thiserror::Error;

use crate::capture::domain::frame_source::CameraError;
use crate::detection::domain::face_detector::{DetectionError, DetectorInitError};
use crate::imaging::image_codec::CodecError;
use crate::remote::domain::directory_client::RegistrationError;
use crate::remote::domain::profile::ValidationError;

/// Failures of coordinator operations. None of them are fatal: the
/// coordinator stays usable after every variant.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to open camera: {0}")]
    Camera(#[from] CameraError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Another submission is still being processed.")]
    Busy,
    #[error("No frame could be captured from the camera.")]
    NoFrame,
    #[error("No face detected. Please position your face in the camera view.")]
    NoFaceDetected,
    #[error("Multiple faces detected ({0}). Please ensure only one person is in frame.")]
    MultipleFaces(usize),
    #[error("Face detector unavailable: {0}")]
    DetectorUnavailable(#[from] DetectorInitError),
    #[error("Face detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("Failed to prepare face image: {0}")]
    Codec(#[from] CodecError),
    #[error("Registration failed: {0}")]
    Registration(#[from] RegistrationError),
    /// The polling thread died and took the camera and detector with it.
    #[error("Scanner is unavailable after an internal failure.")]
    Unavailable,
}
