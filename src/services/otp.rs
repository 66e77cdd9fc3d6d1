//! OTP lifecycle: issuance with sliding-window rate limiting, hash-only
//! storage, single-flight invalidation, and constant-time verification.
//!
//! Lockout bookkeeping deliberately lives outside `verify`: the caller
//! (ProfileService) consults and updates [`super::LockoutService`] around
//! the verification call.

use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::config::OtpConfig;
use crate::models::{IssuedOtp, Otp, OtpPurpose};
use crate::services::{EncryptionService, ServiceError};
use crate::store::OtpStore;
use crate::utils::Clock;

#[derive(Clone)]
pub struct OtpService {
    otps: Arc<dyn OtpStore>,
    encryption: Arc<EncryptionService>,
    clock: Arc<dyn Clock>,
    max_per_window: u32,
    rate_limit_window: Duration,
}

impl OtpService {
    pub fn new(
        otps: Arc<dyn OtpStore>,
        encryption: Arc<EncryptionService>,
        clock: Arc<dyn Clock>,
        config: &OtpConfig,
    ) -> Self {
        Self {
            otps,
            encryption,
            clock,
            max_per_window: config.max_attempts_per_window,
            rate_limit_window: Duration::minutes(config.rate_limit_window_minutes),
        }
    }

    /// Uniformly random 6-digit code, 100000..=999999.
    fn generate_code() -> String {
        rand::thread_rng().gen_range(100_000..=999_999).to_string()
    }

    /// Issue a code for `(email, purpose)`.
    ///
    /// Enforces the sliding-window rate limit, then invalidates every
    /// existing unused code for the pair so at most one code is live, then
    /// stores the new record with only the code's hash. The plaintext code
    /// is returned solely for the email collaborator.
    pub async fn issue(&self, email: &str, purpose: OtpPurpose) -> Result<IssuedOtp, ServiceError> {
        let email_hash = self
            .encryption
            .hash(email)
            .ok_or_else(|| ServiceError::InvalidState("identifier is required".to_string()))?;
        let now = self.clock.now();

        let window_start = now - self.rate_limit_window;
        let issued_in_window = self
            .otps
            .count_created_since(&email_hash, purpose, window_start)
            .await?;
        if issued_in_window >= u64::from(self.max_per_window) {
            tracing::warn!(
                purpose = purpose.as_str(),
                attempts = issued_in_window,
                max = self.max_per_window,
                window_minutes = self.rate_limit_window.num_minutes(),
                "OTP rate limit exceeded"
            );
            return Err(ServiceError::RateLimitExceeded {
                max: self.max_per_window,
                window_minutes: self.rate_limit_window.num_minutes(),
            });
        }

        // Only one live code per (identifier, purpose).
        for stale in self.otps.find_unused(&email_hash, purpose).await? {
            self.otps.mark_used(&stale.id).await?;
        }

        let code = Self::generate_code();
        let otp_hash = self
            .encryption
            .hash(&code)
            .ok_or_else(|| ServiceError::InvalidState("generated code is empty".to_string()))?;
        let otp = Otp::new(email_hash, otp_hash, purpose, now);
        self.otps.insert(otp.clone()).await?;

        tracing::info!(purpose = purpose.as_str(), otp_id = %otp.id, "OTP created");
        Ok(IssuedOtp { otp, code })
    }

    /// Verify a code. Failure is an expected outcome, not an error: any
    /// mismatch, expiry, or absence returns `Ok(false)`.
    pub async fn verify(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<bool, ServiceError> {
        Ok(self.verify_and_take(email, code, purpose).await?.is_some())
    }

    /// Like [`verify`](Self::verify) but hands back the record that matched
    /// so the email-change workflow can reference the authorizing OTP.
    /// Marks the record used on success.
    pub async fn verify_and_take(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>, ServiceError> {
        let (Some(email_hash), Some(code_hash)) =
            (self.encryption.hash(email), self.encryption.hash(code))
        else {
            return Ok(None);
        };
        let now = self.clock.now();

        let candidates = self.otps.find_unused(&email_hash, purpose).await?;
        if candidates.is_empty() {
            tracing::warn!(purpose = purpose.as_str(), "OTP not found or already used");
            return Ok(None);
        }

        let Some(matched) = candidates
            .into_iter()
            .find(|otp| digests_match(&otp.otp_hash, &code_hash))
        else {
            tracing::warn!(purpose = purpose.as_str(), "Invalid OTP code");
            return Ok(None);
        };

        if matched.is_expired(now) {
            tracing::warn!(purpose = purpose.as_str(), otp_id = %matched.id, "OTP expired");
            return Ok(None);
        }

        self.otps.mark_used(&matched.id).await?;
        tracing::info!(purpose = purpose.as_str(), otp_id = %matched.id, "OTP verified");
        Ok(Some(Otp {
            used: true,
            ..matched
        }))
    }
}

/// Constant-time comparison of two hex digests.
fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
