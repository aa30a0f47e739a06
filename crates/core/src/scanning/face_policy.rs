use crate::shared::face_box::FaceBox;

/// Shown while more than one face is in view.
pub const MULTIPLE_FACES_ADVISORY: &str =
    "Multiple faces detected. Please ensure only one person is in frame.";

/// What a tick should do with the faces it found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaceVerdict {
    NoFace,
    /// Ambiguous frame. Never submitted.
    Multiple(usize),
    /// Exactly one face; eligible for submission.
    Single(FaceBox),
}

pub fn classify(faces: &[FaceBox]) -> FaceVerdict {
    match faces {
        [] => FaceVerdict::NoFace,
        [face] => FaceVerdict::Single(*face),
        many => FaceVerdict::Multiple(many.len()),
    }
}
