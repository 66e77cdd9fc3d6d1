//! Repository traits for the member core.
//!
//! Persistence is an external concern: a production deployment backs these
//! with its document store, while tests and the default wiring use the
//! DashMap implementations in [`memory`]. Whatever the backend, writes are
//! atomic per record and the attempt store guarantees per-key
//! read-modify-write atomicity.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Member, Otp, OtpPurpose, OtpVerificationAttempt, RequestStatus, UpdateRequest};
use crate::services::ServiceError;

pub use memory::{
    InMemoryAttemptStore, InMemoryMemberStore, InMemoryOtpStore, InMemoryUpdateRequestStore,
};

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert(&self, otp: Otp) -> Result<(), ServiceError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Otp>, ServiceError>;

    /// Unused records for the pair, newest first.
    async fn find_unused(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
    ) -> Result<Vec<Otp>, ServiceError>;

    async fn mark_used(&self, id: &str) -> Result<(), ServiceError>;

    /// Issuances for the pair since `since` (used for the sliding rate
    /// window); counts used and unused records alike.
    async fn count_created_since(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
        since: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;

    /// Reap records expired before `cutoff` regardless of `used`. Returns
    /// the number removed.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError>;
}

/// Mutation applied atomically to one attempt record.
pub type AttemptMutation = Box<dyn FnOnce(&mut OtpVerificationAttempt) + Send>;

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpVerificationAttempt>, ServiceError>;

    /// Apply `mutation` to the pair's record under the store's per-key
    /// atomicity guarantee, creating a zeroed record first when absent.
    /// Concurrent mutations of the same key must not lose updates; distinct
    /// keys must not contend.
    async fn mutate(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
        mutation: AttemptMutation,
    ) -> Result<OtpVerificationAttempt, ServiceError>;

    /// Drop records whose lockout expired before `lockout_cutoff` or which
    /// have not been touched since `updated_cutoff`.
    async fn delete_stale(
        &self,
        lockout_cutoff: DateTime<Utc>,
        updated_cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait UpdateRequestStore: Send + Sync {
    async fn insert(&self, request: UpdateRequest) -> Result<(), ServiceError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UpdateRequest>, ServiceError>;

    /// Overwrite an existing record only while the stored copy is still
    /// PENDING, atomically with the status check. Returns whether the write
    /// was applied; `NotFound` if the id is absent. This is the backstop
    /// that keeps terminal states written exactly once under concurrent
    /// review.
    async fn save_if_pending(&self, request: UpdateRequest) -> Result<bool, ServiceError>;

    /// Returns whether a record was actually removed.
    async fn delete(&self, id: &str) -> Result<bool, ServiceError>;

    /// Newest-first listing by status.
    async fn list_by_status(&self, status: RequestStatus)
        -> Result<Vec<UpdateRequest>, ServiceError>;

    /// Newest-first listing for one subject.
    async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<UpdateRequest>, ServiceError>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn insert(&self, member: Member) -> Result<(), ServiceError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Member>, ServiceError>;

    /// O(1) lookup through the deterministic hash column.
    async fn find_by_email_hash(&self, email_hash: &str) -> Result<Option<Member>, ServiceError>;

    /// Overwrite an existing record; enforces the unique `email_hash` /
    /// `phone_hash` indexes as a backstop.
    async fn save(&self, member: Member) -> Result<(), ServiceError>;
}
