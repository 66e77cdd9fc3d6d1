//! Member-management core library.
//!
//! Implements the PII protection and identity-verification layer of the
//! member backend:
//!
//! - versioned, reversible encryption of personally identifying fields with
//!   key-rotation support ([`services::EncryptionService`])
//! - deterministic SHA-256 hashing for uniqueness checks and lookups that
//!   never touch plaintext storage ([`utils::hashing`])
//! - one-time-password lifecycle with sliding-window rate limiting
//!   ([`services::OtpService`]) and failed-attempt lockout
//!   ([`services::LockoutService`])
//! - the profile-change approval workflow gating sensitive field updates
//!   behind OTP verification and admin review
//!   ([`services::UpdateRequestService`], [`services::ProfileService`])
//!
//! HTTP routing, persistence drivers, and email transport live outside this
//! crate; they plug in through the traits in [`store`] and the
//! [`services::EmailNotifier`] / [`services::AuditSink`] collaborators.

pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
