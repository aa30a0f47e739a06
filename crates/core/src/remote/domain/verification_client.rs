use crate::remote::domain::scan_mode::ScanMode;
use crate::remote::domain::submission::SubmissionResult;

/// Sends one encoded face image for verification.
///
/// Never fails: transport problems come back as
/// [`SubmissionResult::TransportFailure`]. Implementations bound every call
/// with a timeout and never retry.
pub trait VerificationClient: Send + Sync {
    fn verify(&self, image: &[u8], mode: ScanMode) -> SubmissionResult;
}
