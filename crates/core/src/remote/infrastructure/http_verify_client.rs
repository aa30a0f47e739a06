use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;

use crate::remote::domain::client_error::ClientError;
use crate::remote::domain::scan_mode::ScanMode;
use crate::remote::domain::submission::{Identity, SubmissionResult};
use crate::remote::domain::verification_client::VerificationClient;
use crate::remote::domain::verify_response::{
    parse_verify_response, rejection_reason, VerifyOutcome,
};

use super::http_support::{build_client, jpeg_data_uri, join_url, read_response, transport_error};

/// Talks to the recognition service directly. Matches are reported but no
/// attendance record is written.
pub struct HttpVerifyClient {
    client: Client,
    verify_url: String,
}

impl HttpVerifyClient {
    /// `base_url` is the recognition service root; requests go to `/verify`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(timeout)?,
            verify_url: join_url(base_url, "verify"),
        })
    }

    fn send(&self, image: &[u8]) -> Result<(u16, String), ClientError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&json!({ "img": jpeg_data_uri(image) }))
            .send()
            .map_err(transport_error)?;
        read_response(response)
    }
}

impl VerificationClient for HttpVerifyClient {
    fn verify(&self, image: &[u8], mode: ScanMode) -> SubmissionResult {
        let (status, body) = match self.send(image) {
            Ok(reply) => reply,
            Err(e) => {
                return SubmissionResult::TransportFailure {
                    cause: e.to_string(),
                }
            }
        };

        if !(200..300).contains(&status) {
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| rejection_reason(&v))
                .unwrap_or(body);
            return if (400..500).contains(&status) {
                SubmissionResult::Rejected { reason: detail }
            } else {
                SubmissionResult::TransportFailure {
                    cause: format!("Verification failed: {status} - {detail}"),
                }
            };
        }

        match parse_verify_response(&body) {
            Ok(VerifyOutcome::Match { id, distance }) => {
                log::debug!("Matched {id} (distance {distance:?})");
                SubmissionResult::Verified {
                    identity: Identity::new(id),
                    derived_status: mode.wire_name().to_string(),
                    record: None,
                }
            }
            Ok(VerifyOutcome::NoMatch { reason }) => SubmissionResult::Rejected { reason },
            Err(cause) => SubmissionResult::TransportFailure { cause },
        }
    }
}
