use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde_json::json;

use crate::remote::domain::client_error::ClientError;
use crate::remote::domain::directory_client::DirectoryClient;
use crate::remote::domain::profile::{IdentityProfile, ProfileFields};

use super::http_support::{
    build_client, jpeg_data_uri, join_url, read_response, read_success, transport_error,
};

/// Directory records live behind a REST resource (`/api/UserDatas`).
///
/// Registration posts the photo together with the fields, and the
/// directory enrolls the face itself. Directories that only store records
/// can be paired with a recognition service via
/// [`with_separate_enrollment`](Self::with_separate_enrollment), in which
/// case the face is enrolled with `/addFace` after the record is created.
pub struct HttpDirectoryClient {
    client: Client,
    directory_url: String,
    recognition_url: Option<String>,
}

impl HttpDirectoryClient {
    pub fn new(directory_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(timeout)?,
            directory_url: directory_url.into(),
            recognition_url: None,
        })
    }

    pub fn with_separate_enrollment(mut self, recognition_url: impl Into<String>) -> Self {
        self.recognition_url = Some(recognition_url.into());
        self
    }

    fn profile_url(&self, id: &str) -> String {
        join_url(&self.directory_url, id)
    }
}

fn registration_form(image: &[u8], fields: &ProfileFields) -> Result<Form, ClientError> {
    let photo = Part::bytes(image.to_vec())
        .file_name("face.jpg")
        .mime_str("image/jpeg")
        .map_err(transport_error)?;
    Ok(Form::new()
        .part("Photo", photo)
        .text("FirstName", fields.first_name.clone())
        .text("LastName", fields.last_name.clone())
        .text("Email", fields.email.clone())
        .text("BirthDate", fields.birth_date.clone())
        .text(
            "StudentNumber",
            fields.student_number.clone().unwrap_or_default(),
        ))
}

impl DirectoryClient for HttpDirectoryClient {
    fn create_profile(
        &self,
        image: &[u8],
        fields: &ProfileFields,
    ) -> Result<IdentityProfile, ClientError> {
        let response = self
            .client
            .post(&self.directory_url)
            .multipart(registration_form(image, fields)?)
            .send()
            .map_err(transport_error)?;
        let body = read_success(response)?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn enrolls_on_create(&self) -> bool {
        self.recognition_url.is_none()
    }

    fn enroll_face(&self, id: &str, image: &[u8]) -> Result<(), ClientError> {
        let Some(recognition_url) = &self.recognition_url else {
            return Err(ClientError::Transport(
                "no recognition service configured for enrollment".into(),
            ));
        };
        let response = self
            .client
            .post(join_url(recognition_url, "addFace"))
            .query(&[("id", id)])
            .json(&json!({ "img": jpeg_data_uri(image), "id": id }))
            .send()
            .map_err(transport_error)?;
        read_success(response).map(|_| ())
    }

    fn delete_profile(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.profile_url(id))
            .send()
            .map_err(transport_error)?;
        match read_success(response) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    fn fetch_profile(&self, id: &str) -> Option<IdentityProfile> {
        let response = match self.client.get(self.profile_url(id)).send() {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Profile fetch for {id} failed: {}", transport_error(e));
                return None;
            }
        };
        match read_response(response) {
            Ok((200..=299, body)) => match serde_json::from_str(&body) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    log::warn!("Profile {id} unreadable: {e}");
                    None
                }
            },
            Ok((404, _)) => None,
            Ok((status, _)) => {
                log::warn!("Profile fetch for {id} returned {status}");
                None
            }
            Err(e) => {
                log::warn!("Profile fetch for {id} failed: {e}");
                None
            }
        }
    }
}
