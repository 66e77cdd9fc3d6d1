//! Email notification collaborator.
//!
//! The workflow treats delivery as fire-and-forget: a failed send is logged
//! by this layer and never aborts the state transition that triggered it.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::services::ServiceError;

#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send_email_change_otp(&self, to_email: &str, code: &str) -> Result<(), ServiceError>;

    async fn send_update_request_notification(
        &self,
        admin_email: &str,
        member_name: &str,
        field_name: &str,
    ) -> Result<(), ServiceError>;

    async fn send_update_request_approval(
        &self,
        to_email: &str,
        member_name: &str,
        field_name: &str,
    ) -> Result<(), ServiceError>;

    async fn send_update_request_rejection(
        &self,
        to_email: &str,
        member_name: &str,
        field_name: &str,
        reason: &str,
    ) -> Result<(), ServiceError>;

    async fn send_email_change_confirmation(
        &self,
        old_email: &str,
        new_email: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let creds = Credentials::new(config.user.clone(), config.app_password.clone());

        let mailer = SmtpTransport::relay("smtp.gmail.com")
            .map_err(|e| ServiceError::Email(e.to_string()))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!("Email service initialized with SMTP relay");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
        })
    }

    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| ServiceError::Email(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| ServiceError::Email(e.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| ServiceError::Email(e.to_string()))?;

        // Blocking SMTP send stays off the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Email(e.to_string()))?;

        match result {
            Ok(_) => {
                tracing::info!(subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, subject = %subject, "Failed to send email");
                Err(ServiceError::Email(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailNotifier for SmtpEmailService {
    async fn send_email_change_otp(&self, to_email: &str, code: &str) -> Result<(), ServiceError> {
        let body = format!(
            "Your verification code for changing your email address is: {}\n\n\
             This code expires in 10 minutes. If you didn't request this change, \
             please ignore this email.",
            code
        );
        self.send(to_email, "Email Change Verification Code", &body)
            .await
    }

    async fn send_update_request_notification(
        &self,
        admin_email: &str,
        member_name: &str,
        field_name: &str,
    ) -> Result<(), ServiceError> {
        let body = format!(
            "{} has requested an update to their {}.\n\n\
             Please review the pending request in the admin console.",
            member_name, field_name
        );
        self.send(admin_email, "New Profile Update Request", &body)
            .await
    }

    async fn send_update_request_approval(
        &self,
        to_email: &str,
        member_name: &str,
        field_name: &str,
    ) -> Result<(), ServiceError> {
        let body = format!(
            "Hi {},\n\nYour request to update your {} has been approved.",
            member_name, field_name
        );
        self.send(to_email, "Profile Update Approved", &body).await
    }

    async fn send_update_request_rejection(
        &self,
        to_email: &str,
        member_name: &str,
        field_name: &str,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let body = format!(
            "Hi {},\n\nYour request to update your {} was rejected.\n\nReason: {}",
            member_name, field_name, reason
        );
        self.send(to_email, "Profile Update Rejected", &body).await
    }

    async fn send_email_change_confirmation(
        &self,
        old_email: &str,
        new_email: &str,
    ) -> Result<(), ServiceError> {
        let body = format!(
            "The email address on your account was changed to {}.\n\n\
             If you did not make this change, contact support immediately.",
            new_email
        );
        // Notify the old address; the new one proved itself via OTP.
        self.send(old_email, "Your Email Address Was Changed", &body)
            .await
    }
}

/// Recording mock for tests. Captures `(recipient, subject-tag)` pairs.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub kind: &'static str,
    pub detail: String,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("mock mutex poisoned").clone()
    }

    fn record(&self, to: &str, kind: &'static str, detail: impl Into<String>) {
        self.sent.lock().expect("mock mutex poisoned").push(SentEmail {
            to: to.to_string(),
            kind,
            detail: detail.into(),
        });
    }
}

#[async_trait]
impl EmailNotifier for MockEmailService {
    async fn send_email_change_otp(&self, to_email: &str, code: &str) -> Result<(), ServiceError> {
        self.record(to_email, "email_change_otp", code);
        Ok(())
    }

    async fn send_update_request_notification(
        &self,
        admin_email: &str,
        _member_name: &str,
        field_name: &str,
    ) -> Result<(), ServiceError> {
        self.record(admin_email, "update_request_notification", field_name);
        Ok(())
    }

    async fn send_update_request_approval(
        &self,
        to_email: &str,
        _member_name: &str,
        field_name: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, "update_request_approval", field_name);
        Ok(())
    }

    async fn send_update_request_rejection(
        &self,
        to_email: &str,
        _member_name: &str,
        field_name: &str,
        reason: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, "update_request_rejection", format!("{}: {}", field_name, reason));
        Ok(())
    }

    async fn send_email_change_confirmation(
        &self,
        old_email: &str,
        new_email: &str,
    ) -> Result<(), ServiceError> {
        self.record(old_email, "email_change_confirmation", new_email);
        Ok(())
    }
}
