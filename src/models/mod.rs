//! Persisted entities for the member core.

mod audit_event;
mod member;
mod otp;
mod otp_attempt;
mod update_request;

pub use audit_event::{AuditAction, AuditEvent};
pub use member::Member;
pub use otp::{IssuedOtp, Otp, OtpPurpose};
pub use otp_attempt::OtpVerificationAttempt;
pub use update_request::{
    ProfileField, RequestStatus, RequestType, UpdateRequest, UpdateRequestView,
};
