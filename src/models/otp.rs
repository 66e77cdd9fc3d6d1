//! OTP record - one-time password verification.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed OTP lifetime.
pub const OTP_TTL_MINUTES: i64 = 10;

/// OTP purpose codes, persisted as the strings below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpPurpose {
    Login,
    EmailChange,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "LOGIN",
            OtpPurpose::EmailChange => "EMAIL_CHANGE",
        }
    }
}

/// One issued code.
///
/// Only hashes are persisted: `email_hash` identifies the protected address
/// without storing it, `otp_hash` lets verification compare digests instead
/// of plaintext codes. `used` is monotonic false -> true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Otp {
    pub id: String,
    pub email_hash: String,
    pub otp_hash: String,
    pub purpose: OtpPurpose,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl Otp {
    pub fn new(
        email_hash: String,
        otp_hash: String,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email_hash,
            otp_hash,
            purpose,
            created_at: now,
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
            used: false,
        }
    }

    /// Expiry is exclusive: a code presented at exactly `expires_at` is
    /// already dead.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired(now)
    }
}

/// A freshly issued OTP together with its plaintext code.
///
/// The code exists only to hand to the email collaborator; it is never
/// persisted.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub otp: Otp,
    pub code: String,
}
