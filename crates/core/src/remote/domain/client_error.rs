use thiserror::Error;

/// Failure of a single remote call, independent of transport library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Connection refused, timeout, unreadable body.
    #[error("transport error: {0}")]
    Transport(String),
    /// The remote answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}
