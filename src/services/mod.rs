//! Service layer.
//!
//! Construction order mirrors the dependency graph: `EncryptionService`
//! first, then the OTP/lockout pair, then `MemberService`, then the
//! workflow and the `ProfileService` facade on top. Collaborators with
//! side effects (email, audit) sit behind traits so tests swap in
//! recording mocks.

pub mod audit;
pub mod cleanup;
pub mod email;
pub mod encryption;
pub mod error;
pub mod lockout;
pub mod member;
pub mod otp;
pub mod profile;
pub mod update_request;

pub use audit::{AuditSink, MockAuditSink, TracingAuditSink};
pub use cleanup::CleanupService;
pub use email::{EmailNotifier, MockEmailService, SentEmail, SmtpEmailService};
pub use encryption::EncryptionService;
pub use error::ServiceError;
pub use lockout::LockoutService;
pub use member::{MemberProfile, MemberService};
pub use otp::OtpService;
pub use profile::{FieldUpdate, ProfileService};
pub use update_request::UpdateRequestService;
