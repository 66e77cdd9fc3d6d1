//! Profile update request - the reviewable change proposal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Updatable profile fields.
///
/// A closed enum rather than a string keeps field dispatch exhaustive at
/// compile time; each variant knows whether changing it demands a verified
/// OTP and whether its stored form is encrypted + hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    Name,
    Email,
    PhoneNumber,
    IsdCode,
    DateOfBirth,
    Address,
    City,
    Country,
}

impl ProfileField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Email => "email",
            ProfileField::PhoneNumber => "phoneNumber",
            ProfileField::IsdCode => "isdCode",
            ProfileField::DateOfBirth => "dateOfBirth",
            ProfileField::Address => "address",
            ProfileField::City => "city",
            ProfileField::Country => "country",
        }
    }

    /// Email changes prove control of the new address first.
    pub fn requires_otp(&self) -> bool {
        matches!(self, ProfileField::Email)
    }

    /// PII fields stored as ciphertext with a companion lookup hash.
    pub fn is_protected(&self) -> bool {
        matches!(self, ProfileField::Email | ProfileField::PhoneNumber)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    ProfileUpdate,
    EmailChange,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::ProfileUpdate => "PROFILE_UPDATE",
            RequestType::EmailChange => "EMAIL_CHANGE",
        }
    }
}

/// Persisted workflow states. Revocation deletes the record instead of
/// writing a terminal status; the audit stream keeps the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// A proposed change to one field of one member.
///
/// Old/new values are stored encrypted only; plaintext never reaches the
/// store. Terminal fields (`reviewed_by`, `reviewed_at`, `rejection_reason`)
/// are written exactly once, by the reviewing transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub id: String,
    pub subject_id: String,
    pub request_type: RequestType,
    pub field: ProfileField,
    pub old_value_encrypted: String,
    pub new_value_encrypted: String,
    pub status: RequestStatus,
    pub requested_by: String,
    pub reviewed_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Email changes only: the OTP proof that authorized this request.
    pub otp_verified: bool,
    pub otp_id: Option<String>,
}

impl UpdateRequest {
    pub fn new(
        subject_id: String,
        request_type: RequestType,
        field: ProfileField,
        old_value_encrypted: String,
        new_value_encrypted: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requested_by: subject_id.clone(),
            subject_id,
            request_type,
            field,
            old_value_encrypted,
            new_value_encrypted,
            status: RequestStatus::Pending,
            reviewed_by: None,
            requested_at: now,
            reviewed_at: None,
            rejection_reason: None,
            otp_verified: false,
            otp_id: None,
        }
    }
}

/// An update request with values decrypted for presentation. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRequestView {
    pub id: String,
    pub subject_id: String,
    pub request_type: RequestType,
    pub field: ProfileField,
    pub old_value: String,
    pub new_value: String,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_starts_pending() {
        let req = UpdateRequest::new(
            "user-1".into(),
            RequestType::ProfileUpdate,
            ProfileField::City,
            "enc-old".into(),
            "enc-new".into(),
            Utc::now(),
        );
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.requested_by, "user-1");
        assert!(!req.otp_verified);
        assert!(req.reviewed_by.is_none());
    }

    #[test]
    fn test_only_email_requires_otp() {
        assert!(ProfileField::Email.requires_otp());
        assert!(!ProfileField::PhoneNumber.requires_otp());
        assert!(!ProfileField::Name.requires_otp());
    }

    #[test]
    fn test_protected_fields() {
        assert!(ProfileField::Email.is_protected());
        assert!(ProfileField::PhoneNumber.is_protected());
        assert!(!ProfileField::Address.is_protected());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_persisted_status_strings() {
        assert_eq!(RequestStatus::Pending.as_str(), "PENDING");
        assert_eq!(RequestStatus::Approved.as_str(), "APPROVED");
        assert_eq!(RequestStatus::Rejected.as_str(), "REJECTED");
    }

    #[test]
    fn test_serde_matches_persisted_strings() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&ProfileField::PhoneNumber).unwrap(),
            "\"phoneNumber\""
        );
        assert_eq!(
            serde_json::from_str::<RequestType>("\"EMAIL_CHANGE\"").unwrap(),
            RequestType::EmailChange
        );
        assert_eq!(RequestType::ProfileUpdate.as_str(), "PROFILE_UPDATE");
    }
}
