//! In-memory store implementations on DashMap.
//!
//! Per-key atomicity comes from DashMap's entry locking: an `entry()` call
//! holds the shard lock for the key while the mutation runs, so concurrent
//! read-modify-writes of the same key serialize without a process-wide lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{Member, Otp, OtpPurpose, OtpVerificationAttempt, RequestStatus, UpdateRequest};
use crate::services::ServiceError;
use crate::store::{
    AttemptMutation, AttemptStore, MemberStore, OtpStore, UpdateRequestStore,
};

#[derive(Default)]
pub struct InMemoryOtpStore {
    otps: DashMap<String, Otp>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn insert(&self, otp: Otp) -> Result<(), ServiceError> {
        self.otps.insert(otp.id.clone(), otp);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Otp>, ServiceError> {
        Ok(self.otps.get(id).map(|entry| entry.clone()))
    }

    async fn find_unused(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
    ) -> Result<Vec<Otp>, ServiceError> {
        let mut matches: Vec<Otp> = self
            .otps
            .iter()
            .filter(|entry| {
                !entry.used && entry.email_hash == email_hash && entry.purpose == purpose
            })
            .map(|entry| entry.clone())
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn mark_used(&self, id: &str) -> Result<(), ServiceError> {
        match self.otps.get_mut(id) {
            Some(mut entry) => {
                entry.used = true;
                Ok(())
            }
            None => Err(ServiceError::not_found("Otp", id)),
        }
    }

    async fn count_created_since(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
        since: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        Ok(self
            .otps
            .iter()
            .filter(|entry| {
                entry.email_hash == email_hash
                    && entry.purpose == purpose
                    && entry.created_at > since
            })
            .count() as u64)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let before = self.otps.len();
        self.otps.retain(|_, otp| otp.expires_at >= cutoff);
        Ok((before - self.otps.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: DashMap<(String, OtpPurpose), OtpVerificationAttempt>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn find(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpVerificationAttempt>, ServiceError> {
        Ok(self
            .attempts
            .get(&(email_hash.to_string(), purpose))
            .map(|entry| entry.clone()))
    }

    async fn mutate(
        &self,
        email_hash: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
        mutation: AttemptMutation,
    ) -> Result<OtpVerificationAttempt, ServiceError> {
        let mut entry = self
            .attempts
            .entry((email_hash.to_string(), purpose))
            .or_insert_with(|| {
                OtpVerificationAttempt::new(email_hash.to_string(), purpose, now)
            });
        mutation(entry.value_mut());
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn delete_stale(
        &self,
        lockout_cutoff: DateTime<Utc>,
        updated_cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let before = self.attempts.len();
        self.attempts.retain(|_, attempt| {
            let lockout_stale =
                matches!(attempt.lockout_until, Some(until) if until < lockout_cutoff);
            let untouched = attempt.updated_at < updated_cutoff;
            !(lockout_stale || untouched)
        });
        Ok((before - self.attempts.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryUpdateRequestStore {
    requests: DashMap<String, UpdateRequest>,
}

impl InMemoryUpdateRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UpdateRequestStore for InMemoryUpdateRequestStore {
    async fn insert(&self, request: UpdateRequest) -> Result<(), ServiceError> {
        self.requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UpdateRequest>, ServiceError> {
        Ok(self.requests.get(id).map(|entry| entry.clone()))
    }

    async fn save_if_pending(&self, request: UpdateRequest) -> Result<bool, ServiceError> {
        // get_mut holds the shard lock, so the status check and the
        // overwrite are one atomic step.
        match self.requests.get_mut(&request.id) {
            Some(mut entry) => {
                if entry.status != RequestStatus::Pending {
                    return Ok(false);
                }
                *entry = request;
                Ok(true)
            }
            None => Err(ServiceError::not_found("UpdateRequest", request.id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        Ok(self.requests.remove(id).is_some())
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<UpdateRequest>, ServiceError> {
        let mut matches: Vec<UpdateRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.clone())
            .collect();
        matches.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(matches)
    }

    async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<UpdateRequest>, ServiceError> {
        let mut matches: Vec<UpdateRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.subject_id == subject_id)
            .map(|entry| entry.clone())
            .collect();
        matches.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(matches)
    }
}

#[derive(Default)]
pub struct InMemoryMemberStore {
    members: DashMap<String, Member>,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique-index backstop for `email_hash` and `phone_hash`.
    fn check_hash_conflicts(&self, member: &Member) -> Result<(), ServiceError> {
        for entry in self.members.iter() {
            if entry.id == member.id {
                continue;
            }
            if entry.email_hash == member.email_hash {
                return Err(ServiceError::Store(anyhow::anyhow!(
                    "duplicate key: email_hash_unique_idx"
                )));
            }
            if let (Some(a), Some(b)) = (&entry.phone_hash, &member.phone_hash) {
                if a == b {
                    return Err(ServiceError::Store(anyhow::anyhow!(
                        "duplicate key: phone_hash_unique_idx"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn insert(&self, member: Member) -> Result<(), ServiceError> {
        self.check_hash_conflicts(&member)?;
        self.members.insert(member.id.clone(), member);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Member>, ServiceError> {
        Ok(self.members.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_email_hash(&self, email_hash: &str) -> Result<Option<Member>, ServiceError> {
        Ok(self
            .members
            .iter()
            .find(|entry| entry.email_hash == email_hash)
            .map(|entry| entry.clone()))
    }

    async fn save(&self, member: Member) -> Result<(), ServiceError> {
        if !self.members.contains_key(&member.id) {
            return Err(ServiceError::not_found("Member", member.id));
        }
        self.check_hash_conflicts(&member)?;
        self.members.insert(member.id.clone(), member);
        Ok(())
    }
}
