mod common;

use member_service::models::{AuditAction, ProfileField, RequestStatus};
use member_service::services::{FieldUpdate, ServiceError};
use member_service::utils::hashing::sha256_hex;

/// The full self-service email change: OTP to the new address, verified
/// submission, admin approval, hash and ciphertext rotated, notifications
/// and audit trail emitted.
#[tokio::test]
async fn test_email_change_end_to_end() {
    let h = common::harness();
    let member = h
        .members
        .create_member("Jane Doe", "old@example.com", None)
        .await
        .unwrap();

    h.profile
        .request_email_change_otp("new@example.com")
        .await
        .unwrap();
    common::settle().await;

    let sent = h.email.sent();
    let otp_mail = sent
        .iter()
        .find(|m| m.kind == "email_change_otp")
        .expect("OTP email not sent");
    assert_eq!(otp_mail.to, "new@example.com");
    let code = otp_mail.detail.clone();

    let created = h
        .profile
        .update_fields(
            &member.id,
            vec![FieldUpdate {
                field: ProfileField::Email,
                value: "new@example.com".to_string(),
                otp_code: Some(code),
            }],
            &member.id,
            false,
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert!(created[0].otp_verified);
    assert!(created[0].otp_id.is_some());

    // Nothing applied until review.
    let profile = h.profile.get_profile(&member.id).await.unwrap();
    assert_eq!(profile.email, "old@example.com");

    let view = h.requests.approve(&created[0].id, "admin-1").await.unwrap();
    assert_eq!(view.status, RequestStatus::Approved);
    assert_eq!(view.old_value, "old@example.com");
    assert_eq!(view.new_value, "new@example.com");
    common::settle().await;

    let updated = h.members.get_member(&member.id).await.unwrap();
    assert_eq!(updated.email_hash, sha256_hex("new@example.com").unwrap());
    assert!(h
        .members
        .find_by_email("new@example.com")
        .await
        .unwrap()
        .is_some());
    assert!(h
        .members
        .find_by_email("old@example.com")
        .await
        .unwrap()
        .is_none());

    // The old address is told about the change.
    let sent = h.email.sent();
    let confirmation = sent
        .iter()
        .find(|m| m.kind == "email_change_confirmation")
        .expect("confirmation not sent");
    assert_eq!(confirmation.to, "old@example.com");
    assert_eq!(confirmation.detail, "new@example.com");

    let actions: Vec<AuditAction> = h.audit.events().iter().map(|e| e.action).collect();
    assert!(actions.contains(&AuditAction::RequestApproved));
    assert!(actions.contains(&AuditAction::MemberUpdated));
}

#[tokio::test]
async fn test_email_change_without_otp_is_rejected() {
    let h = common::harness();
    let member = h
        .members
        .create_member("Jane Doe", "old@example.com", None)
        .await
        .unwrap();

    let err = h
        .profile
        .update_fields(
            &member.id,
            vec![FieldUpdate {
                field: ProfileField::Email,
                value: "new@example.com".to_string(),
                otp_code: None,
            }],
            &member.id,
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OtpRequired));
}

#[tokio::test]
async fn test_wrong_code_fails_then_locks_out() {
    let h = common::harness();

    h.profile
        .request_email_change_otp("new@example.com")
        .await
        .unwrap();

    for _ in 0..2 {
        let err = h
            .profile
            .verify_email_change_otp("new@example.com", "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOtp));
    }

    // The failure that crosses the threshold reports the lockout, not a
    // plain mismatch.
    let err = h
        .profile
        .verify_email_change_otp("new@example.com", "000000")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::LockedOut { .. }));

    // Even the right code is refused while locked out.
    let err = h
        .profile
        .verify_email_change_otp("new@example.com", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::LockedOut { .. }));
}

#[tokio::test]
async fn test_otp_not_sent_to_address_already_in_use() {
    let h = common::harness();
    h.members
        .create_member("Jane Doe", "taken@example.com", None)
        .await
        .unwrap();

    let err = h
        .profile
        .request_email_change_otp("taken@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn test_admin_email_change_applies_immediately() {
    let h = common::harness();
    let member = h
        .members
        .create_member("Jane Doe", "old@example.com", None)
        .await
        .unwrap();

    h.profile
        .request_email_change_otp("new@example.com")
        .await
        .unwrap();
    common::settle().await;
    let code = h
        .email
        .sent()
        .iter()
        .find(|m| m.kind == "email_change_otp")
        .map(|m| m.detail.clone())
        .unwrap();

    let created = h
        .profile
        .update_fields(
            &member.id,
            vec![FieldUpdate {
                field: ProfileField::Email,
                value: "new@example.com".to_string(),
                otp_code: Some(code),
            }],
            "admin-1",
            true,
        )
        .await
        .unwrap();
    assert!(created.is_empty());

    let profile = h.profile.get_profile(&member.id).await.unwrap();
    assert_eq!(profile.email, "new@example.com");
}
