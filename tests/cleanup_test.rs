mod common;

use chrono::Duration;
use member_service::models::OtpPurpose;
use member_service::services::CleanupService;
use member_service::store::{AttemptStore, OtpStore};
use member_service::utils::hashing::sha256_hex;

#[tokio::test]
async fn test_sweep_removes_expired_otps() {
    let h = common::harness();
    let cleanup = CleanupService::new(h.otp_store.clone(), h.attempt_store.clone(), h.clock.clone());

    let old = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(11));
    let fresh = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();

    cleanup.run_once().await.unwrap();

    assert!(h.otp_store.find_by_id(&old.otp.id).await.unwrap().is_none());
    assert!(h
        .otp_store
        .find_by_id(&fresh.otp.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_sweep_removes_stale_attempt_counters() {
    let h = common::harness();
    let cleanup = CleanupService::new(h.otp_store.clone(), h.attempt_store.clone(), h.clock.clone());

    let idle = sha256_hex("idle@example.com").unwrap();
    let active = sha256_hex("active@example.com").unwrap();

    h.lockout
        .record_failure(&idle, OtpPurpose::EmailChange)
        .await
        .unwrap();

    // A week of silence later, the idle counter is garbage; the one touched
    // today survives.
    h.clock.advance(Duration::days(8));
    h.lockout
        .record_failure(&active, OtpPurpose::EmailChange)
        .await
        .unwrap();

    cleanup.run_once().await.unwrap();

    assert!(h
        .attempt_store
        .find(&idle, OtpPurpose::EmailChange)
        .await
        .unwrap()
        .is_none());
    assert!(h
        .attempt_store
        .find(&active, OtpPurpose::EmailChange)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_sweep_on_empty_stores_is_a_noop() {
    let h = common::harness();
    let cleanup = CleanupService::new(h.otp_store.clone(), h.attempt_store.clone(), h.clock.clone());
    cleanup.run_once().await.unwrap();
}
