//! Member record access and the single write path for field changes.
//!
//! Every write of a protected field goes through [`MemberService::apply_field_update`]
//! so the invariants hold no matter who initiates the change: the value is
//! re-encrypted under the current key generation and its lookup hash is
//! recomputed, keeping the unique indexes correct. Writes also opportunistically
//! refresh any field still encrypted under a legacy key generation.

use std::sync::Arc;

use crate::models::{Member, ProfileField};
use crate::services::{EncryptionService, ServiceError};
use crate::store::MemberStore;
use crate::utils::Clock;

/// Decrypted member profile for presentation. Never persisted.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub isd_code: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Clone)]
pub struct MemberService {
    members: Arc<dyn MemberStore>,
    encryption: Arc<EncryptionService>,
    clock: Arc<dyn Clock>,
}

impl MemberService {
    pub fn new(
        members: Arc<dyn MemberStore>,
        encryption: Arc<EncryptionService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            members,
            encryption,
            clock,
        }
    }

    /// Register a member, encrypting and hashing the PII columns.
    pub async fn create_member(
        &self,
        name: &str,
        email: &str,
        phone_number: Option<&str>,
    ) -> Result<Member, ServiceError> {
        let email_encrypted = self.encryption.encrypt(email)?;
        let email_hash = self
            .encryption
            .hash(email)
            .ok_or_else(|| ServiceError::InvalidState("email is required".to_string()))?;

        let mut member = Member::new(
            name.to_string(),
            email_encrypted,
            email_hash,
            self.clock.now(),
        );
        if let Some(phone) = phone_number {
            member.phone_encrypted = Some(self.encryption.encrypt(phone)?);
            member.phone_hash = self.encryption.hash(phone);
        }

        self.members.insert(member.clone()).await?;
        tracing::info!(member_id = %member.id, "Member created");
        Ok(member)
    }

    pub async fn get_member(&self, id: &str) -> Result<Member, ServiceError> {
        self.members
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Member", id))
    }

    /// O(1) existence/lookup by the deterministic email hash, no decryption.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Member>, ServiceError> {
        let Some(email_hash) = self.encryption.hash(email) else {
            return Ok(None);
        };
        self.members.find_by_email_hash(&email_hash).await
    }

    /// Decrypted view of one member.
    pub fn profile(&self, member: &Member) -> Result<MemberProfile, ServiceError> {
        Ok(MemberProfile {
            id: member.id.clone(),
            name: member.name.clone(),
            email: self.encryption.decrypt(&member.email_encrypted)?,
            phone_number: member
                .phone_encrypted
                .as_deref()
                .map(|enc| self.encryption.decrypt(enc))
                .transpose()?,
            isd_code: member.isd_code.clone(),
            date_of_birth: member.date_of_birth.clone(),
            address: member.address.clone(),
            city: member.city.clone(),
            country: member.country.clone(),
        })
    }

    /// Current plaintext value of a field, decrypting protected ones.
    /// `None` when the optional field was never set.
    pub fn field_value(
        &self,
        member: &Member,
        field: ProfileField,
    ) -> Result<Option<String>, ServiceError> {
        Ok(match field {
            ProfileField::Name => Some(member.name.clone()),
            ProfileField::Email => Some(self.encryption.decrypt(&member.email_encrypted)?),
            ProfileField::PhoneNumber => member
                .phone_encrypted
                .as_deref()
                .map(|enc| self.encryption.decrypt(enc))
                .transpose()?,
            ProfileField::IsdCode => member.isd_code.clone(),
            ProfileField::DateOfBirth => member.date_of_birth.clone(),
            ProfileField::Address => member.address.clone(),
            ProfileField::City => member.city.clone(),
            ProfileField::Country => member.country.clone(),
        })
    }

    /// Apply one field change and persist.
    ///
    /// Protected fields get a fresh ciphertext and recomputed hash; the
    /// store's unique indexes are the final backstop against duplicates.
    pub async fn apply_field_update(
        &self,
        subject_id: &str,
        field: ProfileField,
        new_value: &str,
    ) -> Result<Member, ServiceError> {
        let mut member = self.get_member(subject_id).await?;

        match field {
            ProfileField::Name => member.name = new_value.to_string(),
            ProfileField::Email => {
                member.email_encrypted = self.encryption.encrypt(new_value)?;
                member.email_hash = self
                    .encryption
                    .hash(new_value)
                    .ok_or_else(|| ServiceError::InvalidState("email is required".to_string()))?;
            }
            ProfileField::PhoneNumber => {
                member.phone_encrypted = Some(self.encryption.encrypt(new_value)?);
                member.phone_hash = self.encryption.hash(new_value);
            }
            ProfileField::IsdCode => member.isd_code = Some(new_value.to_string()),
            ProfileField::DateOfBirth => member.date_of_birth = Some(new_value.to_string()),
            ProfileField::Address => member.address = Some(new_value.to_string()),
            ProfileField::City => member.city = Some(new_value.to_string()),
            ProfileField::Country => member.country = Some(new_value.to_string()),
        }

        self.refresh_legacy_ciphertexts(&mut member)?;
        member.updated_at = self.clock.now();
        self.members.save(member.clone()).await?;

        tracing::info!(member_id = %member.id, field = field.as_str(), "Member field updated");
        Ok(member)
    }

    /// Lazy re-encryption: any field still under a legacy key generation is
    /// rewritten under the current one while we hold the record for a write
    /// anyway. Hashes are untouched; they do not rotate.
    fn refresh_legacy_ciphertexts(&self, member: &mut Member) -> Result<(), ServiceError> {
        if !self.encryption.is_current(&member.email_encrypted) {
            let plaintext = self.encryption.decrypt(&member.email_encrypted)?;
            member.email_encrypted = self.encryption.encrypt(&plaintext)?;
        }
        if let Some(enc) = member.phone_encrypted.as_deref() {
            if !self.encryption.is_current(enc) {
                let plaintext = self.encryption.decrypt(enc)?;
                member.phone_encrypted = Some(self.encryption.encrypt(&plaintext)?);
            }
        }
        Ok(())
    }
}
