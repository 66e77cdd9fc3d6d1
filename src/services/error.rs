use thiserror::Error;

/// Error taxonomy for the member core.
///
/// Cryptographic and state-machine failures propagate to the caller, who
/// owns the HTTP-equivalent mapping. Notification and audit failures never
/// surface here; those collaborators log and swallow their own errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Cipher failure on write. Never downgraded to returning plaintext.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(anyhow::Error),

    /// Cipher failure on read. Never downgraded to returning garbage.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(anyhow::Error),

    /// Ciphertext references a key generation that is neither current nor
    /// retained as legacy.
    #[error("Cannot decrypt: unknown key version {0}")]
    UnknownKeyVersion(String),

    #[error("Maximum OTP attempts ({max}) exceeded within {window_minutes} minutes. Please try again later.")]
    RateLimitExceeded { max: u32, window_minutes: i64 },

    #[error("OTP is required for email changes")]
    OtpRequired,

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("Too many failed OTP verification attempts. Please try again after {retry_after_minutes} minutes.")]
    LockedOut { retry_after_minutes: i64 },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Store error: {0}")]
    Store(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),
}

impl ServiceError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            resource,
            id: id.into(),
        }
    }
}
