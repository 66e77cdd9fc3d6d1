#![allow(dead_code)]

use std::sync::Arc;

use member_service::config::{EncryptionConfig, OtpConfig};
use member_service::services::{
    EncryptionService, LockoutService, MemberService, MockAuditSink, MockEmailService, OtpService,
    ProfileService, UpdateRequestService,
};
use member_service::store::{
    InMemoryAttemptStore, InMemoryMemberStore, InMemoryOtpStore, InMemoryUpdateRequestStore,
};
use member_service::utils::ManualClock;

pub const ADMIN_EMAIL: &str = "admin@example.com";

pub fn encryption_config() -> EncryptionConfig {
    EncryptionConfig {
        password: "test-passphrase".to_string(),
        key_version: "2".to_string(),
        legacy_keys: vec![("1".to_string(), "old-test-passphrase".to_string())],
    }
}

pub fn otp_config() -> OtpConfig {
    OtpConfig {
        max_attempts_per_window: 3,
        rate_limit_window_minutes: 15,
        max_failed_verification_attempts: 3,
        lockout_duration_minutes: 15,
    }
}

/// Full service graph on in-memory stores, a manual clock, and recording
/// mocks for the side-effecting collaborators.
pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub email: Arc<MockEmailService>,
    pub audit: Arc<MockAuditSink>,
    pub encryption: Arc<EncryptionService>,
    pub otp_store: Arc<InMemoryOtpStore>,
    pub attempt_store: Arc<InMemoryAttemptStore>,
    pub request_store: Arc<InMemoryUpdateRequestStore>,
    pub member_store: Arc<InMemoryMemberStore>,
    pub otp: Arc<OtpService>,
    pub lockout: Arc<LockoutService>,
    pub members: Arc<MemberService>,
    pub requests: Arc<UpdateRequestService>,
    pub profile: ProfileService,
}

pub fn harness() -> TestHarness {
    let clock = Arc::new(ManualClock::starting_now());
    let email = Arc::new(MockEmailService::new());
    let audit = Arc::new(MockAuditSink::new());
    let encryption =
        Arc::new(EncryptionService::new(&encryption_config()).expect("encryption service"));

    let otp_store = Arc::new(InMemoryOtpStore::new());
    let attempt_store = Arc::new(InMemoryAttemptStore::new());
    let request_store = Arc::new(InMemoryUpdateRequestStore::new());
    let member_store = Arc::new(InMemoryMemberStore::new());

    let otp_cfg = otp_config();
    let otp = Arc::new(OtpService::new(
        otp_store.clone(),
        encryption.clone(),
        clock.clone(),
        &otp_cfg,
    ));
    let lockout = Arc::new(LockoutService::new(
        attempt_store.clone(),
        clock.clone(),
        &otp_cfg,
    ));
    let members = Arc::new(MemberService::new(
        member_store.clone(),
        encryption.clone(),
        clock.clone(),
    ));
    let requests = Arc::new(UpdateRequestService::new(
        request_store.clone(),
        members.clone(),
        encryption.clone(),
        email.clone(),
        audit.clone(),
        clock.clone(),
        ADMIN_EMAIL.to_string(),
    ));
    let profile = ProfileService::new(
        otp.clone(),
        lockout.clone(),
        members.clone(),
        requests.clone(),
        encryption.clone(),
        email.clone(),
    );

    TestHarness {
        clock,
        email,
        audit,
        encryption,
        otp_store,
        attempt_store,
        request_store,
        member_store,
        otp,
        lockout,
        members,
        requests,
        profile,
    }
}

/// Let fire-and-forget notification tasks run to completion. Tests run on
/// the single-threaded runtime, so a few yields are enough.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
