use serde::Deserialize;
use std::env;

use crate::services::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct MemberConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub encryption: EncryptionConfig,
    pub otp: OtpConfig,
    pub admin: AdminConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

/// Key material for the field cipher.
///
/// Exactly one key generation is current; any number of retired generations
/// stay in `legacy_keys` for decrypt-only support. Rotation is: pick a new
/// version id and passphrase, move the old current pair into
/// `ENCRYPTION_LEGACY_KEYS`, deploy.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    pub password: String,
    pub key_version: String,
    /// `(version, passphrase)` pairs, parsed from a comma-separated
    /// `version:passphrase` list.
    pub legacy_keys: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// Max OTP issuances per (identifier, purpose) inside the rate window.
    pub max_attempts_per_window: u32,
    pub rate_limit_window_minutes: i64,
    /// Failed verifications before the pair is locked out.
    pub max_failed_verification_attempts: u32,
    pub lockout_duration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Recipient for new-pending-request notifications.
    pub notification_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub user: String,
    pub app_password: String,
}

impl MemberConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| ServiceError::Config(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = MemberConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("member-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            encryption: EncryptionConfig {
                password: get_env(
                    "ENCRYPTION_PASSWORD",
                    Some("default-secret-key-change-in-production"),
                    is_prod,
                )?,
                key_version: get_env("ENCRYPTION_KEY_VERSION", Some("1"), is_prod)?,
                legacy_keys: parse_legacy_keys(&get_env("ENCRYPTION_LEGACY_KEYS", Some(""), false)?),
            },
            otp: OtpConfig {
                max_attempts_per_window: parse_env(
                    "OTP_MAX_ATTEMPTS_PER_WINDOW",
                    Some("5"),
                    is_prod,
                )?,
                rate_limit_window_minutes: parse_env(
                    "OTP_RATE_LIMIT_WINDOW_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                max_failed_verification_attempts: parse_env(
                    "OTP_MAX_FAILED_VERIFICATION_ATTEMPTS",
                    Some("5"),
                    is_prod,
                )?,
                lockout_duration_minutes: parse_env(
                    "OTP_LOCKOUT_DURATION_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
            },
            admin: AdminConfig {
                notification_email: get_env("ADMIN_NOTIFICATION_EMAIL", None, is_prod)?,
            },
            smtp: SmtpConfig {
                user: get_env("SMTP_USER", None, is_prod)?,
                app_password: get_env("SMTP_APP_PASSWORD", None, is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.encryption.key_version.is_empty() {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "ENCRYPTION_KEY_VERSION must not be empty"
            )));
        }

        // The current generation must never shadow a retired one.
        if self
            .encryption
            .legacy_keys
            .iter()
            .any(|(version, _)| *version == self.encryption.key_version)
        {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "ENCRYPTION_LEGACY_KEYS contains the current key version '{}'",
                self.encryption.key_version
            )));
        }

        if self.otp.max_attempts_per_window == 0 {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "OTP_MAX_ATTEMPTS_PER_WINDOW must be greater than 0"
            )));
        }

        if self.otp.rate_limit_window_minutes <= 0 {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "OTP_RATE_LIMIT_WINDOW_MINUTES must be positive"
            )));
        }

        if self.otp.max_failed_verification_attempts == 0 {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "OTP_MAX_FAILED_VERIFICATION_ATTEMPTS must be greater than 0"
            )));
        }

        if self.otp.lockout_duration_minutes <= 0 {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "OTP_LOCKOUT_DURATION_MINUTES must be positive"
            )));
        }

        if self.environment == Environment::Prod
            && self.encryption.password == "default-secret-key-change-in-production"
        {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "ENCRYPTION_PASSWORD must be set explicitly in production"
            )));
        }

        Ok(())
    }
}

/// Parse `"1:old-pass,2:older-pass"` into `(version, passphrase)` pairs.
/// Malformed entries are skipped with a warning rather than failing startup.
fn parse_legacy_keys(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let mut parts = entry.trim().splitn(2, ':');
            match (parts.next(), parts.next()) {
                (Some(version), Some(password)) if !version.trim().is_empty() => {
                    Some((version.trim().to_string(), password.trim().to_string()))
                }
                _ => {
                    tracing::warn!(entry = %entry.trim(), "Skipping malformed legacy key entry");
                    None
                }
            }
        })
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ServiceError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ServiceError::Config(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ServiceError::Config(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<T, ServiceError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| ServiceError::Config(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_keys() {
        let keys = parse_legacy_keys("1:old-secret, 2:even-older");
        assert_eq!(
            keys,
            vec![
                ("1".to_string(), "old-secret".to_string()),
                ("2".to_string(), "even-older".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_legacy_keys_empty() {
        assert!(parse_legacy_keys("").is_empty());
    }

    #[test]
    fn test_parse_legacy_keys_skips_malformed() {
        let keys = parse_legacy_keys("no-colon-here,3:good");
        assert_eq!(keys, vec![("3".to_string(), "good".to_string())]);
    }

    #[test]
    fn test_passphrase_may_contain_colons() {
        let keys = parse_legacy_keys("1:pass:with:colons");
        assert_eq!(keys, vec![("1".to_string(), "pass:with:colons".to_string())]);
    }
}
