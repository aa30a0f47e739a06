use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier the remote side assigned to a person.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted attendance entry as returned by the attendance service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(
        default,
        alias = "attendanceID",
        alias = "attendanceId",
        deserialize_with = "optional_id"
    )]
    pub attendance_id: Option<String>,
    #[serde(alias = "userID", alias = "userId", deserialize_with = "required_id")]
    pub user_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "eventDate")]
    pub event_date: Option<String>,
    #[serde(default, alias = "eventTime")]
    pub event_time: Option<String>,
}

/// Outcome of one submission attempt. Produced once and never retried.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionResult {
    Verified {
        identity: Identity,
        derived_status: String,
        record: Option<AttendanceRecord>,
    },
    Rejected {
        reason: String,
    },
    TransportFailure {
        cause: String,
    },
}

impl SubmissionResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, SubmissionResult::Verified { .. })
    }
}

/// Ids arrive as JSON numbers from some services and strings from others.
pub(crate) fn id_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn optional_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(id_from_value(&value))
}

fn required_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    id_from_value(&value).ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
}
