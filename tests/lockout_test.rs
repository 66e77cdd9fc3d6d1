mod common;

use chrono::Duration;
use member_service::models::OtpPurpose;
use member_service::services::ServiceError;
use member_service::store::AttemptStore;
use member_service::utils::hashing::sha256_hex;

fn key() -> String {
    sha256_hex("member@example.com").unwrap()
}

#[tokio::test]
async fn test_lockout_triggers_at_threshold() {
    let h = common::harness();
    let hash = key();

    for _ in 0..2 {
        h.lockout
            .record_failure(&hash, OtpPurpose::EmailChange)
            .await
            .unwrap();
        h.lockout.check(&hash, OtpPurpose::EmailChange).await.unwrap();
    }

    // Third failure crosses the threshold.
    let attempt = h
        .lockout
        .record_failure(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap();
    assert_eq!(attempt.failed_attempts, 3);
    assert!(attempt.lockout_until.is_some());

    let err = h
        .lockout
        .check(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::LockedOut { retry_after_minutes } if retry_after_minutes > 0));
}

#[tokio::test]
async fn test_lockout_expires_after_window() {
    let h = common::harness();
    let hash = key();

    for _ in 0..3 {
        h.lockout
            .record_failure(&hash, OtpPurpose::EmailChange)
            .await
            .unwrap();
    }
    assert!(h
        .lockout
        .is_locked_out(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap());

    h.clock.advance(Duration::minutes(16));

    assert!(!h
        .lockout
        .is_locked_out(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap());
    // The check also resets the stale counter, so failures start from a
    // clean slate.
    h.lockout.check(&hash, OtpPurpose::EmailChange).await.unwrap();
    let attempt = h
        .lockout
        .record_failure(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap();
    assert_eq!(attempt.failed_attempts, 1);
    assert!(attempt.lockout_until.is_none());
}

#[tokio::test]
async fn test_success_resets_counter() {
    let h = common::harness();
    let hash = key();

    for _ in 0..2 {
        h.lockout
            .record_failure(&hash, OtpPurpose::EmailChange)
            .await
            .unwrap();
    }
    h.lockout
        .record_success(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap();

    // Two more failures stay below the threshold of three.
    for _ in 0..2 {
        h.lockout
            .record_failure(&hash, OtpPurpose::EmailChange)
            .await
            .unwrap();
    }
    assert!(!h
        .lockout
        .is_locked_out(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_never_lose_increments() {
    let h = common::harness();
    let hash_a = sha256_hex("a@example.com").unwrap();
    let hash_b = sha256_hex("b@example.com").unwrap();

    // 16 failures per key, racing from parallel workers. The per-key
    // atomic mutation must count every one.
    let mut handles = Vec::new();
    for i in 0..32 {
        let lockout = h.lockout.clone();
        let hash = if i % 2 == 0 {
            hash_a.clone()
        } else {
            hash_b.clone()
        };
        handles.push(tokio::spawn(async move {
            lockout
                .record_failure(&hash, OtpPurpose::EmailChange)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let a = h
        .attempt_store
        .find(&hash_a, OtpPurpose::EmailChange)
        .await
        .unwrap()
        .unwrap();
    let b = h
        .attempt_store
        .find(&hash_b, OtpPurpose::EmailChange)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.failed_attempts, 16);
    assert_eq!(b.failed_attempts, 16);
    assert!(a.lockout_until.is_some());
    assert!(b.lockout_until.is_some());
}

#[tokio::test]
async fn test_pairs_are_independent() {
    let h = common::harness();
    let hash = key();
    let other = sha256_hex("other@example.com").unwrap();

    for _ in 0..3 {
        h.lockout
            .record_failure(&hash, OtpPurpose::EmailChange)
            .await
            .unwrap();
    }

    assert!(h
        .lockout
        .is_locked_out(&hash, OtpPurpose::EmailChange)
        .await
        .unwrap());
    // Different identifier and different purpose are both unaffected.
    assert!(!h
        .lockout
        .is_locked_out(&other, OtpPurpose::EmailChange)
        .await
        .unwrap());
    assert!(!h
        .lockout
        .is_locked_out(&hash, OtpPurpose::Login)
        .await
        .unwrap());
}
