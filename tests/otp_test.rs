mod common;

use chrono::Duration;
use member_service::models::OtpPurpose;
use member_service::services::ServiceError;

#[tokio::test]
async fn test_issued_code_verifies_once() {
    let h = common::harness();

    let issued = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();
    assert_eq!(issued.code.len(), 6);

    let first = h
        .otp
        .verify("member@example.com", &issued.code, OtpPurpose::Login)
        .await
        .unwrap();
    assert!(first);

    // Single-use: the same code is dead after one successful verification.
    let second = h
        .otp
        .verify("member@example.com", &issued.code, OtpPurpose::Login)
        .await
        .unwrap();
    assert!(!second);
}

#[tokio::test]
async fn test_new_code_invalidates_previous() {
    let h = common::harness();

    let first = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();
    let second = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();

    assert!(!h
        .otp
        .verify("member@example.com", &first.code, OtpPurpose::Login)
        .await
        .unwrap());
    assert!(h
        .otp
        .verify("member@example.com", &second.code, OtpPurpose::Login)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let h = common::harness();

    let issued = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(11));

    assert!(!h
        .otp
        .verify("member@example.com", &issued.code, OtpPurpose::Login)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_code_is_scoped_to_purpose() {
    let h = common::harness();

    let issued = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();

    assert!(!h
        .otp
        .verify("member@example.com", &issued.code, OtpPurpose::EmailChange)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_issuance_rate_limit_and_window_expiry() {
    let h = common::harness();

    for _ in 0..3 {
        h.otp
            .issue("member@example.com", OtpPurpose::Login)
            .await
            .unwrap();
    }

    let err = h
        .otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RateLimitExceeded {
            max: 3,
            window_minutes: 15
        }
    ));

    // Another identifier is unaffected.
    h.otp
        .issue("other@example.com", OtpPurpose::Login)
        .await
        .unwrap();

    // The window slides: once the earlier issuances age out, issuance
    // resumes.
    h.clock.advance(Duration::minutes(16));
    h.otp
        .issue("member@example.com", OtpPurpose::Login)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_verify_with_no_outstanding_code() {
    let h = common::harness();

    assert!(!h
        .otp
        .verify("member@example.com", "123456", OtpPurpose::Login)
        .await
        .unwrap());
}
