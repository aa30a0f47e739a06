use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::domain::submission::{id_from_value, optional_id};
use crate::shared::constants::MIN_REGISTRANT_AGE_YEARS;

/// A directory entry, fetched after verification for display only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProfile {
    #[serde(alias = "userID", alias = "userId", deserialize_with = "profile_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub student_number: Option<String>,
}

impl IdentityProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// `First Last (StudentNumber)`, or just the name without one.
    pub fn display_name(&self) -> String {
        match self.student_number.as_deref() {
            Some(number) if !number.is_empty() => format!("{} ({number})", self.full_name()),
            _ => self.full_name(),
        }
    }
}

fn profile_id<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    id_from_value(&value).ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter your {0}.")]
    MissingField(&'static str),
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Please enter a valid birth date (YYYY-MM-DD): {0}")]
    InvalidBirthDate(String),
    #[error("Registrants must be at least {0} years old.")]
    TooYoung(u32),
}

/// Caller-supplied registration input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// `YYYY-MM-DD`
    pub birth_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
}

impl ProfileFields {
    /// Checks the fields as of `today`, returning the parsed birth date.
    pub fn validate(&self, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
        if self.first_name.trim().is_empty() {
            return Err(ValidationError::MissingField("first name"));
        }
        if self.last_name.trim().is_empty() {
            return Err(ValidationError::MissingField("last name"));
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(ValidationError::InvalidEmail);
        }
        let birth = NaiveDate::parse_from_str(self.birth_date.trim(), "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidBirthDate(self.birth_date.clone()))?;
        if birth > latest_allowed_birth_date(today) {
            return Err(ValidationError::TooYoung(MIN_REGISTRANT_AGE_YEARS));
        }
        Ok(birth)
    }
}

fn latest_allowed_birth_date(today: NaiveDate) -> NaiveDate {
    let year = today.year() - MIN_REGISTRANT_AGE_YEARS as i32;
    // Feb 29 falls back to Feb 28 in non-leap years.
    NaiveDate::from_ymd_opt(year, today.month(), today.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, today.month(), today.day() - 1))
        .unwrap_or(today)
}
