//! Lead domain models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_EMAIL_LEN, MAX_IDEMPOTENCY_KEY_LEN, MAX_MESSAGE_LEN, MAX_NAME_LEN, RECENT_DEFAULT_LIMIT,
    RECENT_MAX_LIMIT,
};
use crate::errors::{Result, ValidationError};

/// A persisted lead submission plus its timing metadata.
///
/// All `*_at` fields are milliseconds since the Unix epoch. `client_submit_at`
/// comes from the submitting client's clock, `server_broadcast_at` from ours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: NaiveDateTime,
    pub client_submit_at: Option<i64>,
    pub server_broadcast_at: Option<i64>,
    pub submit_to_server_ms: Option<i64>,
    pub server_to_display_ms: Option<i64>,
    pub submit_to_display_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Input model for submitting a new lead
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    pub client_submit_at: Option<i64>,
    pub idempotency_key: Option<String>,
}

impl NewLead {
    /// Trims the text fields and checks them, returning the value that should be stored.
    pub fn normalized(self) -> Result<Self> {
        let name = required("name", &self.name, MAX_NAME_LEN)?;
        let email = required("email", &self.email, MAX_EMAIL_LEN)?;
        let message = required("message", &self.message, MAX_MESSAGE_LEN)?;

        if !is_plausible_email(&email) {
            return Err(ValidationError::InvalidInput(format!(
                "'{email}' is not an email address"
            ))
            .into());
        }

        if let Some(at) = self.client_submit_at {
            if at <= 0 {
                return Err(ValidationError::InvalidInput(
                    "clientSubmitAt must be a positive millisecond timestamp".to_string(),
                )
                .into());
            }
        }

        let idempotency_key = match self.idempotency_key {
            Some(key) => {
                let key = key.trim().to_string();
                if key.is_empty() || key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
                    return Err(ValidationError::InvalidInput(format!(
                        "idempotency key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
                    ))
                    .into());
                }
                Some(key)
            }
            None => None,
        };

        Ok(Self {
            name,
            email,
            message,
            client_submit_at: self.client_submit_at,
            idempotency_key,
        })
    }
}

fn required(field: &str, value: &str, max_len: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field.to_string()).into());
    }
    if trimmed.chars().count() > max_len {
        return Err(ValidationError::InvalidInput(format!(
            "{field} must be at most {max_len} characters"
        ))
        .into());
    }
    Ok(trimmed.to_string())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Post-hoc latency corrections measured by a displaying client.
///
/// Each field is optional; only the ones supplied are written.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LatencyUpdate {
    pub submit_to_server_ms: Option<i64>,
    pub server_to_display_ms: Option<i64>,
    pub submit_to_display_ms: Option<i64>,
}

impl LatencyUpdate {
    pub fn is_empty(&self) -> bool {
        self.submit_to_server_ms.is_none()
            && self.server_to_display_ms.is_none()
            && self.submit_to_display_ms.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ValidationError::NoLatencyFields.into());
        }
        let fields = [
            ("submitToServerMs", self.submit_to_server_ms),
            ("serverToDisplayMs", self.server_to_display_ms),
            ("submitToDisplayMs", self.submit_to_display_ms),
        ];
        for (field, value) in fields {
            if let Some(ms) = value {
                if ms < 0 {
                    return Err(ValidationError::InvalidInput(format!(
                        "{field} must not be negative"
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// Result of a submit call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub id: i64,
    /// True when an earlier submission with the same idempotency key was returned.
    pub duplicate: bool,
}

impl SubmitOutcome {
    pub fn created(id: i64) -> Self {
        Self {
            id,
            duplicate: false,
        }
    }

    pub fn duplicate(id: i64) -> Self {
        Self {
            id,
            duplicate: true,
        }
    }
}

/// Missing or non-positive limits fall back to the default; large ones are capped.
pub fn clamp_recent_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n.min(RECENT_MAX_LIMIT),
        _ => RECENT_DEFAULT_LIMIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn sample() -> NewLead {
        NewLead {
            name: "  Ada ".to_string(),
            email: "ada@example.com".to_string(),
            message: "hello".to_string(),
            client_submit_at: Some(1000),
            idempotency_key: None,
        }
    }

    #[test]
    fn normalized_trims_fields() {
        let lead = sample().normalized().unwrap();
        assert_eq!(lead.name, "Ada");
        assert_eq!(lead.client_submit_at, Some(1000));
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let mut lead = sample();
        lead.message = "   ".to_string();
        match lead.normalized() {
            Err(Error::Validation(ValidationError::MissingField(field))) => {
                assert_eq!(field, "message")
            }
            other => panic!("expected missing field, got {other:?}"),
        }
    }

    #[test]
    fn malformed_email_is_rejected() {
        for bad in ["no-at-sign", "@example.com", "a@", "a@b@c", "a b@example.com"] {
            let mut lead = sample();
            lead.email = bad.to_string();
            assert!(lead.normalized().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn non_positive_client_timestamp_is_rejected() {
        let mut lead = sample();
        lead.client_submit_at = Some(0);
        assert!(lead.normalized().is_err());
    }

    #[test]
    fn oversized_idempotency_key_is_rejected() {
        let mut lead = sample();
        lead.idempotency_key = Some("k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1));
        assert!(lead.normalized().is_err());
    }

    #[test]
    fn empty_latency_update_is_rejected() {
        assert!(matches!(
            LatencyUpdate::default().validate(),
            Err(Error::Validation(ValidationError::NoLatencyFields))
        ));
    }

    #[test]
    fn negative_latency_is_rejected() {
        let update = LatencyUpdate {
            server_to_display_ms: Some(-1),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn recent_limit_is_clamped() {
        assert_eq!(clamp_recent_limit(None), RECENT_DEFAULT_LIMIT);
        assert_eq!(clamp_recent_limit(Some(0)), RECENT_DEFAULT_LIMIT);
        assert_eq!(clamp_recent_limit(Some(-5)), RECENT_DEFAULT_LIMIT);
        assert_eq!(clamp_recent_limit(Some(500)), RECENT_MAX_LIMIT);
        assert_eq!(clamp_recent_limit(Some(10)), 10);
    }

    #[test]
    fn new_lead_deserializes_camel_case() {
        let json = r#"{"name":"A","email":"a@x.com","message":"hi","clientSubmitAt":1000}"#;
        let lead: NewLead = serde_json::from_str(json).unwrap();
        assert_eq!(lead.client_submit_at, Some(1000));
        assert!(lead.idempotency_key.is_none());
    }
}
