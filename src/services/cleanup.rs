//! Periodic purge of expired OTP rows and stale attempt counters.
//!
//! Stores are append-heavy; this keeps them bounded without the workflow
//! paths ever having to delete anything themselves.

use chrono::Duration;
use std::sync::Arc;

use crate::services::ServiceError;
use crate::store::{AttemptStore, OtpStore};
use crate::utils::Clock;

/// Attempt counters untouched for this long are garbage.
const STALE_ATTEMPT_DAYS: i64 = 7;

#[derive(Clone)]
pub struct CleanupService {
    otps: Arc<dyn OtpStore>,
    attempts: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
}

impl CleanupService {
    pub fn new(
        otps: Arc<dyn OtpStore>,
        attempts: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            otps,
            attempts,
            clock,
        }
    }

    /// One sweep: expired OTP rows go regardless of used flag, attempt
    /// counters go once their lockout has passed and they have sat idle
    /// for a week.
    pub async fn run_once(&self) -> Result<(), ServiceError> {
        let now = self.clock.now();

        let otps_removed = self.otps.delete_expired_before(now).await?;
        let attempts_removed = self
            .attempts
            .delete_stale(now, now - Duration::days(STALE_ATTEMPT_DAYS))
            .await?;

        if otps_removed > 0 || attempts_removed > 0 {
            tracing::info!(otps_removed, attempts_removed, "Cleanup sweep completed");
        }
        Ok(())
    }

    /// Run sweeps forever on a fixed interval. Callers own the handle.
    pub fn spawn(self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Cleanup sweep failed");
                }
            }
        })
    }
}
