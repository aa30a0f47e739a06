use thiserror::Error;

use crate::remote::domain::client_error::ClientError;
use crate::remote::domain::profile::{IdentityProfile, ProfileFields};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("failed to create profile: {0}")]
    Create(#[source] ClientError),
    /// Enrollment failed; the profile created for it was deleted again.
    #[error("failed to enroll face for profile {id} (profile removed): {source}")]
    RolledBack {
        id: String,
        #[source]
        source: ClientError,
    },
    /// Enrollment failed and so did the compensating delete.
    #[error("failed to enroll face for profile {id}: {source}; removing the profile also failed: {rollback}")]
    RollbackFailed {
        id: String,
        #[source]
        source: ClientError,
        rollback: ClientError,
    },
}

/// Remote directory of registered people.
pub trait DirectoryClient: Send + Sync {
    /// Creates a profile in one request carrying the face image and the
    /// fields.
    fn create_profile(
        &self,
        image: &[u8],
        fields: &ProfileFields,
    ) -> Result<IdentityProfile, ClientError>;

    /// Whether `create_profile` already enrolls the face. When it does,
    /// `register` skips `enroll_face`.
    fn enrolls_on_create(&self) -> bool {
        false
    }

    /// Associates a face image with an existing profile.
    fn enroll_face(&self, id: &str, image: &[u8]) -> Result<(), ClientError>;

    /// Removing a profile that no longer exists is not an error.
    fn delete_profile(&self, id: &str) -> Result<(), ClientError>;

    /// Best-effort lookup. Absence and failures both yield `None`.
    fn fetch_profile(&self, id: &str) -> Option<IdentityProfile>;

    /// Create, then enroll unless the directory enrolled on create. If
    /// enrollment fails the freshly created profile is deleted before the
    /// error is returned.
    fn register(
        &self,
        image: &[u8],
        fields: &ProfileFields,
    ) -> Result<IdentityProfile, RegistrationError> {
        let profile = self
            .create_profile(image, fields)
            .map_err(RegistrationError::Create)?;
        if self.enrolls_on_create() {
            log::info!("Registered profile {}", profile.id);
            return Ok(profile);
        }

        match self.enroll_face(&profile.id, image) {
            Ok(()) => {
                log::info!("Registered profile {}", profile.id);
                Ok(profile)
            }
            Err(source) => match self.delete_profile(&profile.id) {
                Ok(()) => {
                    log::warn!("Enrollment failed, profile {} removed: {source}", profile.id);
                    Err(RegistrationError::RolledBack {
                        id: profile.id,
                        source,
                    })
                }
                Err(rollback) => {
                    log::warn!(
                        "Enrollment failed and profile {} could not be removed: {rollback}",
                        profile.id
                    );
                    Err(RegistrationError::RollbackFailed {
                        id: profile.id,
                        source,
                        rollback,
                    })
                }
            },
        }
    }
}
