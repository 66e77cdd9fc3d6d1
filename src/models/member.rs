//! Member record.
//!
//! Email and phone number are stored twice: as versioned ciphertext for
//! reversibility and as a deterministic hash for unique indexes and O(1)
//! lookups. Plaintext of either never reaches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub email_encrypted: String,
    pub email_hash: String,
    pub phone_encrypted: Option<String>,
    pub phone_hash: Option<String>,
    pub isd_code: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn new(
        name: String,
        email_encrypted: String,
        email_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email_encrypted,
            email_hash,
            phone_encrypted: None,
            phone_hash: None,
            isd_code: None,
            date_of_birth: None,
            address: None,
            city: None,
            country: None,
            created_at: now,
            updated_at: now,
        }
    }
}
