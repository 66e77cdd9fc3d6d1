//! Failed-verification lockout.
//!
//! Counts consecutive OTP verification failures per (email hash, purpose)
//! and imposes a temporary lockout once the configured threshold is
//! crossed. Counter updates go through the attempt store's per-key atomic
//! mutation, so concurrent failures never lose an increment and independent
//! pairs never contend.

use chrono::Duration;
use std::sync::Arc;

use crate::config::OtpConfig;
use crate::models::{OtpPurpose, OtpVerificationAttempt};
use crate::services::ServiceError;
use crate::store::AttemptStore;
use crate::utils::Clock;

#[derive(Clone)]
pub struct LockoutService {
    attempts: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    max_failed_attempts: u32,
    lockout_duration: Duration,
}

impl LockoutService {
    pub fn new(attempts: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>, config: &OtpConfig) -> Self {
        Self {
            attempts,
            clock,
            max_failed_attempts: config.max_failed_verification_attempts,
            lockout_duration: Duration::minutes(config.lockout_duration_minutes),
        }
    }

    /// Fails with [`ServiceError::LockedOut`] while the pair is inside a
    /// lockout window; lazily resets a counter whose window has passed.
    pub async fn check(&self, email_hash: &str, purpose: OtpPurpose) -> Result<(), ServiceError> {
        let now = self.clock.now();
        let Some(attempt) = self.attempts.find(email_hash, purpose).await? else {
            return Ok(());
        };

        if attempt.is_locked_out(now) {
            let until = attempt.lockout_until.unwrap_or(now);
            let minutes_remaining = (until - now).num_minutes() + 1;
            tracing::warn!(
                purpose = purpose.as_str(),
                minutes_remaining,
                "OTP verification locked out"
            );
            return Err(ServiceError::LockedOut {
                retry_after_minutes: minutes_remaining,
            });
        }

        if attempt.lockout_expired(now) {
            // Self-healing read: the window passed, clear the stale lock.
            self.attempts
                .mutate(email_hash, purpose, now, Box::new(move |a| a.reset(now)))
                .await?;
        }

        Ok(())
    }

    pub async fn is_locked_out(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
    ) -> Result<bool, ServiceError> {
        let now = self.clock.now();
        Ok(self
            .attempts
            .find(email_hash, purpose)
            .await?
            .map(|attempt| attempt.is_locked_out(now))
            .unwrap_or(false))
    }

    /// Atomically bump the failure counter; crossing the threshold starts
    /// the lockout window. Returns the updated record so the caller can see
    /// whether this failure triggered the lockout.
    pub async fn record_failure(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
    ) -> Result<OtpVerificationAttempt, ServiceError> {
        let now = self.clock.now();
        let threshold = self.max_failed_attempts;
        let duration = self.lockout_duration;

        let attempt = self
            .attempts
            .mutate(
                email_hash,
                purpose,
                now,
                Box::new(move |a| {
                    if a.lockout_expired(now) {
                        a.reset(now);
                    }
                    a.failed_attempts += 1;
                    if a.failed_attempts >= threshold && a.lockout_until.is_none() {
                        a.lockout_until = Some(now + duration);
                    }
                }),
            )
            .await?;

        if attempt.is_locked_out(now) {
            tracing::warn!(
                purpose = purpose.as_str(),
                failed_attempts = attempt.failed_attempts,
                threshold,
                "OTP verification lockout triggered"
            );
        } else {
            tracing::debug!(
                failed_attempts = attempt.failed_attempts,
                threshold,
                "Failed OTP verification attempt recorded"
            );
        }

        Ok(attempt)
    }

    /// Reset the counter and clear any lockout after a successful
    /// verification.
    pub async fn record_success(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
    ) -> Result<(), ServiceError> {
        let now = self.clock.now();
        self.attempts
            .mutate(email_hash, purpose, now, Box::new(move |a| a.reset(now)))
            .await?;
        tracing::debug!(purpose = purpose.as_str(), "Failed OTP attempts reset");
        Ok(())
    }
}
