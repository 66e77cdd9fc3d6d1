//! Failed-verification counter per (email hash, purpose).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OtpPurpose;

/// Tracks consecutive failed OTP verifications for one pair and the lockout
/// window imposed once the configured threshold is crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpVerificationAttempt {
    pub email_hash: String,
    pub purpose: OtpPurpose,
    pub failed_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OtpVerificationAttempt {
    pub fn new(email_hash: String, purpose: OtpPurpose, now: DateTime<Utc>) -> Self {
        Self {
            email_hash,
            purpose,
            failed_attempts: 0,
            lockout_until: None,
            updated_at: now,
        }
    }

    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lockout_until, Some(until) if now < until)
    }

    /// Lockout window exists but has already passed.
    pub fn lockout_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lockout_until, Some(until) if now >= until)
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.failed_attempts = 0;
        self.lockout_until = None;
        self.updated_at = now;
    }
}
