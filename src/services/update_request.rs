//! Profile-change workflow.
//!
//! Non-privileged changes become PENDING update requests reviewed by an
//! admin; privileged changes apply immediately. Both paths converge on
//! [`MemberService::apply_field_update`], so re-encryption, re-hashing, and
//! audit emission are identical whether a change is deferred or direct.
//!
//! State machine: PENDING -> APPROVED | REJECTED (terminal, written once).
//! Revocation removes the PENDING record instead of writing a status; the
//! audit stream keeps the trace.

use std::sync::Arc;

use crate::models::{
    AuditAction, AuditEvent, Member, Otp, OtpPurpose, ProfileField, RequestStatus, RequestType,
    UpdateRequest, UpdateRequestView,
};
use crate::services::{AuditSink, EmailNotifier, EncryptionService, MemberService, ServiceError};
use crate::store::UpdateRequestStore;
use crate::utils::Clock;

#[derive(Clone)]
pub struct UpdateRequestService {
    requests: Arc<dyn UpdateRequestStore>,
    members: Arc<MemberService>,
    encryption: Arc<EncryptionService>,
    notifier: Arc<dyn EmailNotifier>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    admin_email: String,
}

impl UpdateRequestService {
    pub fn new(
        requests: Arc<dyn UpdateRequestStore>,
        members: Arc<MemberService>,
        encryption: Arc<EncryptionService>,
        notifier: Arc<dyn EmailNotifier>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        admin_email: String,
    ) -> Self {
        Self {
            requests,
            members,
            encryption,
            notifier,
            audit,
            clock,
            admin_email,
        }
    }

    /// Submit a pending request for a field that does not demand OTP proof.
    pub async fn create_update_request(
        &self,
        subject_id: &str,
        field: ProfileField,
        new_value: &str,
    ) -> Result<UpdateRequest, ServiceError> {
        if field.requires_otp() {
            return Err(ServiceError::OtpRequired);
        }

        let member = self.members.get_member(subject_id).await?;
        // An unset optional field proposes a first-time set; the old value
        // is recorded as empty.
        let old_value = self.members.field_value(&member, field)?.unwrap_or_default();

        let request = self
            .persist_pending(subject_id, RequestType::ProfileUpdate, field, &old_value, new_value)
            .await?;
        self.notify_admin(&member.name, field);
        Ok(request)
    }

    /// Submit a pending email change. `otp_proof` must be the consumed OTP
    /// record that verified control of the *new* address.
    pub async fn create_email_change_request(
        &self,
        subject_id: &str,
        new_email: &str,
        otp_proof: &Otp,
    ) -> Result<UpdateRequest, ServiceError> {
        let new_email_hash = self
            .encryption
            .hash(new_email)
            .ok_or_else(|| ServiceError::InvalidState("email is required".to_string()))?;
        // The proof must be a consumed EMAIL_CHANGE code for the new address.
        if otp_proof.purpose != OtpPurpose::EmailChange
            || !otp_proof.used
            || otp_proof.email_hash != new_email_hash
        {
            return Err(ServiceError::InvalidOtp);
        }

        let member = self.members.get_member(subject_id).await?;
        let old_email = self
            .members
            .field_value(&member, ProfileField::Email)?
            .unwrap_or_default();

        let mut request = UpdateRequest::new(
            subject_id.to_string(),
            RequestType::EmailChange,
            ProfileField::Email,
            self.encryption.encrypt(&old_email)?,
            self.encryption.encrypt(new_email)?,
            self.clock.now(),
        );
        request.otp_verified = true;
        request.otp_id = Some(otp_proof.id.clone());

        self.requests.insert(request.clone()).await?;
        tracing::info!(request_id = %request.id, subject_id = %subject_id, "Email change request created");

        self.notify_admin(&member.name, ProfileField::Email);
        Ok(request)
    }

    /// Submit a phone change, fanning out an accompanying ISD-code request
    /// when the code changes too. Returns the phone request.
    pub async fn create_phone_change_request(
        &self,
        subject_id: &str,
        new_phone: &str,
        new_isd_code: Option<&str>,
    ) -> Result<UpdateRequest, ServiceError> {
        let member = self.members.get_member(subject_id).await?;
        let old_phone = self
            .members
            .field_value(&member, ProfileField::PhoneNumber)?
            .unwrap_or_default();
        let old_isd = self
            .members
            .field_value(&member, ProfileField::IsdCode)?
            .unwrap_or_default();

        let request = self
            .persist_pending(
                subject_id,
                RequestType::ProfileUpdate,
                ProfileField::PhoneNumber,
                &old_phone,
                new_phone,
            )
            .await?;

        if let Some(isd) = new_isd_code {
            if !isd.is_empty() && isd != old_isd {
                self.persist_pending(
                    subject_id,
                    RequestType::ProfileUpdate,
                    ProfileField::IsdCode,
                    &old_isd,
                    isd,
                )
                .await?;
            }
        }

        self.notify_admin(&member.name, ProfileField::PhoneNumber);
        Ok(request)
    }

    /// Apply the change, mark APPROVED, notify, audit. PENDING only.
    pub async fn approve(
        &self,
        request_id: &str,
        reviewer_id: &str,
    ) -> Result<UpdateRequestView, ServiceError> {
        let mut request = self.get_pending(request_id).await?;

        let new_value = self.encryption.decrypt(&request.new_value_encrypted)?;
        let old_value = self.encryption.decrypt(&request.old_value_encrypted)?;

        let member = self
            .apply_change(&request.subject_id, request.field, &new_value, reviewer_id, &old_value)
            .await?;

        request.status = RequestStatus::Approved;
        request.reviewed_by = Some(reviewer_id.to_string());
        request.reviewed_at = Some(self.clock.now());
        // The conditional write loses to a concurrent reviewer; only the
        // winner notifies and audits.
        if !self.requests.save_if_pending(request.clone()).await? {
            return Err(ServiceError::InvalidState(
                "request was already reviewed".to_string(),
            ));
        }

        tracing::info!(
            request_id = %request.id,
            reviewer_id = %reviewer_id,
            field = request.field.as_str(),
            "Update request approved"
        );

        self.notify_subject_reviewed(&member, &request, None);
        self.emit_audit(AuditEvent::new(
            "UpdateRequest",
            request.id.clone(),
            AuditAction::RequestApproved,
            format!("field={}", request.field.as_str()),
            reviewer_id,
            self.clock.now(),
        ));

        self.to_view(&request)
    }

    /// Mark REJECTED with a reason, notify, audit. PENDING only.
    pub async fn reject(
        &self,
        request_id: &str,
        reviewer_id: &str,
        reason: &str,
    ) -> Result<UpdateRequestView, ServiceError> {
        let mut request = self.get_pending(request_id).await?;

        request.status = RequestStatus::Rejected;
        request.reviewed_by = Some(reviewer_id.to_string());
        request.reviewed_at = Some(self.clock.now());
        request.rejection_reason = Some(reason.to_string());
        if !self.requests.save_if_pending(request.clone()).await? {
            return Err(ServiceError::InvalidState(
                "request was already reviewed".to_string(),
            ));
        }

        tracing::info!(
            request_id = %request.id,
            reviewer_id = %reviewer_id,
            field = request.field.as_str(),
            "Update request rejected"
        );

        let member = self.members.get_member(&request.subject_id).await?;
        self.notify_subject_reviewed(&member, &request, Some(reason.to_string()));
        self.emit_audit(AuditEvent::new(
            "UpdateRequest",
            request.id.clone(),
            AuditAction::RequestRejected,
            format!("field={}; reason={}", request.field.as_str(), reason),
            reviewer_id,
            self.clock.now(),
        ));

        self.to_view(&request)
    }

    /// Remove a PENDING request. Only its original requester may revoke.
    pub async fn revoke(&self, request_id: &str, requester_id: &str) -> Result<(), ServiceError> {
        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("UpdateRequest", request_id))?;

        if request.requested_by != requester_id {
            return Err(ServiceError::Forbidden(
                "You can only revoke your own update requests".to_string(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(ServiceError::InvalidState(
                "Only pending requests can be revoked".to_string(),
            ));
        }

        // A concurrent revoke may have removed the record already.
        if !self.requests.delete(request_id).await? {
            return Err(ServiceError::not_found("UpdateRequest", request_id));
        }
        tracing::info!(request_id = %request_id, "Update request revoked");

        self.emit_audit(AuditEvent::new(
            "UpdateRequest",
            request_id,
            AuditAction::RequestRevoked,
            format!("field={}", request.field.as_str()),
            requester_id,
            self.clock.now(),
        ));
        Ok(())
    }

    /// Privileged shortcut: apply immediately through the same
    /// cipher/hash/audit path `approve` uses, skipping PENDING entirely.
    pub async fn apply_direct(
        &self,
        subject_id: &str,
        field: ProfileField,
        new_value: &str,
        actor_id: &str,
    ) -> Result<Member, ServiceError> {
        let member = self.members.get_member(subject_id).await?;
        let old_value = self
            .members
            .field_value(&member, field)?
            .unwrap_or_default();
        self.apply_change(subject_id, field, new_value, actor_id, &old_value)
            .await
    }

    /// Pending requests for review, values decrypted for the response only.
    pub async fn list_pending(&self) -> Result<Vec<UpdateRequestView>, ServiceError> {
        self.requests
            .list_by_status(RequestStatus::Pending)
            .await?
            .iter()
            .map(|request| self.to_view(request))
            .collect()
    }

    /// One subject's requests, newest first.
    pub async fn list_for_subject(
        &self,
        subject_id: &str,
    ) -> Result<Vec<UpdateRequestView>, ServiceError> {
        self.requests
            .list_by_subject(subject_id)
            .await?
            .iter()
            .map(|request| self.to_view(request))
            .collect()
    }

    async fn get_pending(&self, request_id: &str) -> Result<UpdateRequest, ServiceError> {
        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("UpdateRequest", request_id))?;
        if request.status != RequestStatus::Pending {
            return Err(ServiceError::InvalidState(format!(
                "request is already {}",
                request.status.as_str()
            )));
        }
        Ok(request)
    }

    /// The shared change path: member write (re-encrypt + re-hash inside)
    /// plus the change audit event; email changes also notify the old
    /// address.
    async fn apply_change(
        &self,
        subject_id: &str,
        field: ProfileField,
        new_value: &str,
        actor_id: &str,
        old_value: &str,
    ) -> Result<Member, ServiceError> {
        let member = self
            .members
            .apply_field_update(subject_id, field, new_value)
            .await?;

        if field == ProfileField::Email && !old_value.is_empty() {
            let notifier = self.notifier.clone();
            let (old_email, new_email) = (old_value.to_string(), new_value.to_string());
            tokio::spawn(async move {
                if let Err(e) = notifier
                    .send_email_change_confirmation(&old_email, &new_email)
                    .await
                {
                    tracing::error!(error = %e, "Failed to send email change confirmation");
                }
            });
        }

        self.emit_audit(AuditEvent::new(
            "Member",
            subject_id,
            AuditAction::MemberUpdated,
            format!("field={}", field.as_str()),
            actor_id,
            self.clock.now(),
        ));

        Ok(member)
    }

    async fn persist_pending(
        &self,
        subject_id: &str,
        request_type: RequestType,
        field: ProfileField,
        old_value: &str,
        new_value: &str,
    ) -> Result<UpdateRequest, ServiceError> {
        let request = UpdateRequest::new(
            subject_id.to_string(),
            request_type,
            field,
            self.encryption.encrypt(old_value)?,
            self.encryption.encrypt(new_value)?,
            self.clock.now(),
        );
        self.requests.insert(request.clone()).await?;
        tracing::info!(
            request_id = %request.id,
            subject_id = %subject_id,
            field = field.as_str(),
            "Update request created"
        );
        Ok(request)
    }

    fn notify_admin(&self, member_name: &str, field: ProfileField) {
        let notifier = self.notifier.clone();
        let admin_email = self.admin_email.clone();
        let member_name = member_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_update_request_notification(&admin_email, &member_name, field.as_str())
                .await
            {
                tracing::error!(error = %e, "Failed to notify admin of pending request");
            }
        });
    }

    /// Approval/rejection outcome mail to the subject, fire-and-forget.
    fn notify_subject_reviewed(
        &self,
        member: &Member,
        request: &UpdateRequest,
        rejection_reason: Option<String>,
    ) {
        let email = match self.encryption.decrypt(&member.email_encrypted) {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(error = %e, "Cannot decrypt subject email for notification");
                return;
            }
        };

        let notifier = self.notifier.clone();
        let name = member.name.clone();
        let field = request.field;
        tokio::spawn(async move {
            let result = match rejection_reason {
                None => {
                    notifier
                        .send_update_request_approval(&email, &name, field.as_str())
                        .await
                }
                Some(reason) => {
                    notifier
                        .send_update_request_rejection(&email, &name, field.as_str(), &reason)
                        .await
                }
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to send review outcome notification");
            }
        });
    }

    fn emit_audit(&self, event: AuditEvent) {
        let audit = self.audit.clone();
        tokio::spawn(async move {
            audit.record(event).await;
        });
    }

    fn to_view(&self, request: &UpdateRequest) -> Result<UpdateRequestView, ServiceError> {
        Ok(UpdateRequestView {
            id: request.id.clone(),
            subject_id: request.subject_id.clone(),
            request_type: request.request_type,
            field: request.field,
            old_value: self.encryption.decrypt(&request.old_value_encrypted)?,
            new_value: self.encryption.decrypt(&request.new_value_encrypted)?,
            status: request.status,
            requested_at: request.requested_at,
            reviewed_at: request.reviewed_at,
            reviewed_by: request.reviewed_by.clone(),
            rejection_reason: request.rejection_reason.clone(),
        })
    }
}
