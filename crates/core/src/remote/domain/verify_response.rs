use serde_json::Value;

use crate::remote::domain::submission::id_from_value;

pub const NO_MATCH_REASON: &str = "No matching face found";

/// Decision extracted from a recognition-service reply.
#[derive(Clone, Debug, PartialEq)]
pub enum VerifyOutcome {
    Match { id: String, distance: Option<f64> },
    NoMatch { reason: String },
}

/// Interprets a verification reply.
///
/// The reply is an object `{verified, id, distance?, reason?}` or an array
/// of them. For arrays the first element wins and an empty array is no
/// match. A positive verdict without an id counts as no match.
pub fn parse_verify_response(body: &str) -> Result<VerifyOutcome, String> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("invalid verification reply: {e}"))?;

    let entry = match &value {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => {
                return Ok(VerifyOutcome::NoMatch {
                    reason: NO_MATCH_REASON.into(),
                })
            }
        },
        Value::Object(_) => &value,
        other => return Err(format!("unexpected verification reply: {other}")),
    };

    let verified = field(entry, "verified")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let id = field(entry, "id").and_then(id_from_value);

    match (verified, id) {
        (true, Some(id)) => Ok(VerifyOutcome::Match {
            id,
            distance: field(entry, "distance").and_then(Value::as_f64),
        }),
        _ => Ok(VerifyOutcome::NoMatch {
            reason: rejection_reason(entry).unwrap_or_else(|| NO_MATCH_REASON.into()),
        }),
    }
}

/// Pulls a human-readable reason out of an error or rejection body.
///
/// Prefers `reason`, then `error` (with `details` appended when present),
/// then `exception`.
pub fn rejection_reason(value: &Value) -> Option<String> {
    if let Some(reason) = field(value, "reason").and_then(Value::as_str) {
        return Some(reason.to_string());
    }
    let Some(error) = field(value, "error").and_then(Value::as_str) else {
        return field(value, "exception")
            .and_then(Value::as_str)
            .map(str::to_string);
    };
    match field(value, "details").and_then(Value::as_str) {
        Some(details) if !details.is_empty() => Some(format!("{error}: {details}")),
        _ => Some(error.to_string()),
    }
}

/// Case-insensitive key lookup.
fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_single_match_object() {
        let outcome = parse_verify_response(r#"{"verified": true, "id": "42", "distance": 0.21}"#)
            .unwrap();
        let VerifyOutcome::Match { id, distance } = outcome else {
            panic!("expected match");
        };
        assert_eq!(id, "42");
        assert_relative_eq!(distance.unwrap(), 0.21);
    }

    #[test]
    fn test_array_first_element_wins() {
        let body = r#"[
            {"verified": true, "id": 7, "distance": 0.30},
            {"verified": true, "id": 9, "distance": 0.10}
        ]"#;
        assert_eq!(
            parse_verify_response(body).unwrap(),
            VerifyOutcome::Match {
                id: "7".into(),
                distance: Some(0.30)
            }
        );
    }

    #[test]
    fn test_empty_array_is_no_match() {
        assert_eq!(
            parse_verify_response("[]").unwrap(),
            VerifyOutcome::NoMatch {
                reason: NO_MATCH_REASON.into()
            }
        );
    }

    #[test]
    fn test_rejection_carries_reason() {
        let body = r#"{"verified": false, "id": null, "reason": "Face too blurry"}"#;
        assert_eq!(
            parse_verify_response(body).unwrap(),
            VerifyOutcome::NoMatch {
                reason: "Face too blurry".into()
            }
        );
    }

    #[rstest]
    #[case::verified_without_id(r#"{"verified": true}"#)]
    #[case::empty_id(r#"{"verified": true, "id": ""}"#)]
    #[case::missing_flag(r#"{"id": "3"}"#)]
    fn test_incomplete_match_is_no_match(#[case] body: &str) {
        assert!(matches!(
            parse_verify_response(body).unwrap(),
            VerifyOutcome::NoMatch { .. }
        ));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let outcome = parse_verify_response(r#"{"Verified": true, "Id": "5"}"#).unwrap();
        assert!(matches!(outcome, VerifyOutcome::Match { ref id, .. } if id == "5"));
    }

    #[rstest]
    #[case("not json")]
    #[case("42")]
    fn test_malformed_reply_is_error(#[case] body: &str) {
        assert!(parse_verify_response(body).is_err());
    }

    #[test]
    fn test_rejection_reason_from_error_body() {
        let body: Value = serde_json::from_str(
            r#"{"error": "Face recognition service unavailable", "details": "refused"}"#,
        )
        .unwrap();
        assert_eq!(
            rejection_reason(&body).unwrap(),
            "Face recognition service unavailable: refused"
        );
    }

    #[test]
    fn test_rejection_reason_from_exception_body() {
        let body: Value = serde_json::from_str(r#"{"exception": "Face could not be detected"}"#)
            .unwrap();
        assert_eq!(
            rejection_reason(&body).as_deref(),
            Some("Face could not be detected")
        );
        assert_eq!(rejection_reason(&Value::Null), None);
    }
}
