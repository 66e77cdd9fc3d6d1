//! Profile update facade.
//!
//! Front door for self-service profile edits: routes each field change to
//! the right path (direct write for privileged actors, pending request
//! otherwise), and runs the OTP challenge for email changes with lockout
//! bookkeeping wrapped around verification.

use std::sync::Arc;

use crate::models::{Otp, OtpPurpose, ProfileField, UpdateRequest};
use crate::services::{
    EmailNotifier, EncryptionService, LockoutService, MemberProfile, MemberService, OtpService,
    ServiceError, UpdateRequestService,
};

/// One requested field change. `otp_code` is only consulted for fields
/// that demand a verified code.
#[derive(Debug, Clone)]
pub struct FieldUpdate {
    pub field: ProfileField,
    pub value: String,
    pub otp_code: Option<String>,
}

#[derive(Clone)]
pub struct ProfileService {
    otp: Arc<OtpService>,
    lockout: Arc<LockoutService>,
    members: Arc<MemberService>,
    requests: Arc<UpdateRequestService>,
    encryption: Arc<EncryptionService>,
    notifier: Arc<dyn EmailNotifier>,
}

impl ProfileService {
    pub fn new(
        otp: Arc<OtpService>,
        lockout: Arc<LockoutService>,
        members: Arc<MemberService>,
        requests: Arc<UpdateRequestService>,
        encryption: Arc<EncryptionService>,
        notifier: Arc<dyn EmailNotifier>,
    ) -> Self {
        Self {
            otp,
            lockout,
            members,
            requests,
            encryption,
            notifier,
        }
    }

    pub async fn get_profile(&self, subject_id: &str) -> Result<MemberProfile, ServiceError> {
        let member = self.members.get_member(subject_id).await?;
        self.members.profile(&member)
    }

    /// Start an email change: issue a code to the *new* address so the
    /// member proves control of it before anything else happens. Delivery
    /// is fire-and-forget; the OTP id is returned for correlation.
    pub async fn request_email_change_otp(&self, new_email: &str) -> Result<String, ServiceError> {
        if new_email.is_empty() {
            return Err(ServiceError::InvalidState("email is required".to_string()));
        }
        if self.members.find_by_email(new_email).await?.is_some() {
            return Err(ServiceError::InvalidState(
                "email is already in use".to_string(),
            ));
        }

        let issued = self.otp.issue(new_email, OtpPurpose::EmailChange).await?;

        let notifier = self.notifier.clone();
        let (to, code) = (new_email.to_string(), issued.code.clone());
        tokio::spawn(async move {
            if let Err(e) = notifier.send_email_change_otp(&to, &code).await {
                tracing::error!(error = %e, "Failed to send email change OTP");
            }
        });

        Ok(issued.otp.id)
    }

    /// Verify an email-change code with lockout bookkeeping: a success
    /// resets the failure counter, a failure bumps it, and the failure that
    /// crosses the threshold surfaces as [`ServiceError::LockedOut`] rather
    /// than [`ServiceError::InvalidOtp`].
    pub async fn verify_email_change_otp(
        &self,
        new_email: &str,
        code: &str,
    ) -> Result<Otp, ServiceError> {
        let email_hash = self
            .encryption
            .hash(new_email)
            .ok_or_else(|| ServiceError::InvalidState("email is required".to_string()))?;

        self.lockout
            .check(&email_hash, OtpPurpose::EmailChange)
            .await?;

        match self
            .otp
            .verify_and_take(new_email, code, OtpPurpose::EmailChange)
            .await?
        {
            Some(otp) => {
                self.lockout
                    .record_success(&email_hash, OtpPurpose::EmailChange)
                    .await?;
                Ok(otp)
            }
            None => {
                self.lockout
                    .record_failure(&email_hash, OtpPurpose::EmailChange)
                    .await?;
                // Re-check so the failure that started the lockout reports
                // the lockout, not a plain mismatch.
                self.lockout
                    .check(&email_hash, OtpPurpose::EmailChange)
                    .await?;
                Err(ServiceError::InvalidOtp)
            }
        }
    }

    /// Apply a batch of field changes for one member.
    ///
    /// Privileged actors write directly; everyone else gets pending
    /// requests. Email changes demand a verified OTP on either path, and a
    /// phone change travelling with an ISD code change fans out as a pair
    /// of requests. Returns the pending requests created (empty on the
    /// direct path).
    pub async fn update_fields(
        &self,
        subject_id: &str,
        updates: Vec<FieldUpdate>,
        actor_id: &str,
        is_admin: bool,
    ) -> Result<Vec<UpdateRequest>, ServiceError> {
        for update in &updates {
            if update.value.is_empty() {
                return Err(ServiceError::InvalidState(format!(
                    "{} must not be empty",
                    update.field.as_str()
                )));
            }
        }

        // On the request path, an ISD code riding along with a phone change
        // is folded into the phone request pair instead of being processed
        // on its own. The direct path writes each field as-is.
        let isd_companion = (!is_admin
            && updates.iter().any(|u| u.field == ProfileField::PhoneNumber))
        .then(|| {
            updates
                .iter()
                .find(|u| u.field == ProfileField::IsdCode)
                .map(|u| u.value.clone())
        })
        .flatten();

        let mut created = Vec::new();
        for update in updates {
            if update.field == ProfileField::IsdCode && isd_companion.is_some() {
                continue;
            }

            match update.field {
                ProfileField::Email => {
                    let code = update.otp_code.as_deref().ok_or(ServiceError::OtpRequired)?;
                    let proof = self.verify_email_change_otp(&update.value, code).await?;
                    if is_admin {
                        self.requests
                            .apply_direct(subject_id, ProfileField::Email, &update.value, actor_id)
                            .await?;
                    } else {
                        created.push(
                            self.requests
                                .create_email_change_request(subject_id, &update.value, &proof)
                                .await?,
                        );
                    }
                }
                ProfileField::PhoneNumber if !is_admin => {
                    created.push(
                        self.requests
                            .create_phone_change_request(
                                subject_id,
                                &update.value,
                                isd_companion.as_deref(),
                            )
                            .await?,
                    );
                }
                field if is_admin => {
                    self.requests
                        .apply_direct(subject_id, field, &update.value, actor_id)
                        .await?;
                }
                field => {
                    created.push(
                        self.requests
                            .create_update_request(subject_id, field, &update.value)
                            .await?,
                    );
                }
            }
        }

        Ok(created)
    }
}
