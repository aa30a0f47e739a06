use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::remote::domain::client_error::ClientError;
use crate::remote::domain::scan_mode::ScanMode;
use crate::remote::domain::submission::{AttendanceRecord, Identity, SubmissionResult};
use crate::remote::domain::verification_client::VerificationClient;
use crate::remote::domain::verify_response::rejection_reason;

use super::http_support::{build_client, read_response, transport_error};

/// Posts a face to the attendance service, which verifies it and persists
/// an attendance record in one call.
pub struct HttpAttendanceClient {
    client: Client,
    url: String,
}

impl HttpAttendanceClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }

    fn send(&self, image: &[u8], mode: ScanMode) -> Result<(u16, String), ClientError> {
        let photo = Part::bytes(image.to_vec())
            .file_name("face.jpg")
            .mime_str("image/jpeg")
            .map_err(transport_error)?;
        let form = Form::new()
            .part("Photo", photo)
            .text("Type", mode.wire_name());

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(transport_error)?;
        read_response(response)
    }
}

impl VerificationClient for HttpAttendanceClient {
    fn verify(&self, image: &[u8], mode: ScanMode) -> SubmissionResult {
        match self.send(image, mode) {
            Ok((status, body)) => interpret(status, &body, mode),
            Err(e) => SubmissionResult::TransportFailure {
                cause: e.to_string(),
            },
        }
    }
}

/// 2xx carries the new record, 4xx is a rejection, anything else is a
/// service failure with the body kept as detail.
fn interpret(status: u16, body: &str, mode: ScanMode) -> SubmissionResult {
    match status {
        200..=299 => match serde_json::from_str::<AttendanceRecord>(body) {
            Ok(record) => {
                let derived_status = if record.status.is_empty() {
                    mode.wire_name().to_string()
                } else {
                    record.status.clone()
                };
                SubmissionResult::Verified {
                    identity: Identity::new(record.user_id.clone()),
                    derived_status,
                    record: Some(record),
                }
            }
            Err(e) => SubmissionResult::TransportFailure {
                cause: format!("unreadable attendance record: {e}"),
            },
        },
        400..=499 => {
            let reason = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| rejection_reason(&v))
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        format!("rejected with status {status}")
                    } else {
                        body.trim().to_string()
                    }
                });
            SubmissionResult::Rejected { reason }
        }
        _ => SubmissionResult::TransportFailure {
            cause: format!("Attendance recording failed: {status} - {body}"),
        },
    }
}
