//! Client records, profile sections, and the derived eligibility fields.
//!
//! `account_status` and `can_apply_for_loan` are never stored independently of
//! their inputs: every profile or verification mutation recomputes them from
//! the authoritative sections, so they cannot drift.

use crate::core::{CoreError, Result};
use crate::store::{EntityStore, StorageBackend};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const COLLECTION: &str = "clients";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Unverified,
    Pending,
    Verified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Incomplete,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalDetails {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub nationality: String,
    pub occupation: String,
    pub monthly_income: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street_address: String,
    pub suburb: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub residence_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub id: String,
    pub file_name: String,
    pub url: String,
    pub document_type: String,
    pub uploaded_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Documents {
    #[serde(default)]
    pub national_id: Option<UploadedDocument>,
    #[serde(default)]
    pub proof_of_residence: Option<UploadedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextOfKin {
    pub full_name: String,
    pub relationship: String,
    pub phone_number: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile: String,
    pub pin_hash: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub personal_details: Option<PersonalDetails>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub documents: Option<Documents>,
    #[serde(default)]
    pub next_of_kin: Option<NextOfKin>,
    pub client_type: String,
    pub verification_status: VerificationStatus,
    pub can_apply_for_loan: bool,
    pub account_status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Check a candidate PIN against the stored digest.
    pub fn verify_pin(&self, pin: &str) -> bool {
        hash_pin(pin) == self.pin_hash
    }

    fn has_identity_documents(&self) -> bool {
        self.documents
            .as_ref()
            .is_some_and(|d| d.national_id.is_some() && d.proof_of_residence.is_some())
    }

    /// Recompute both derived fields from the authoritative sections.
    fn recompute_derived(&mut self) {
        self.account_status = if self.personal_details.is_some()
            && self.address.is_some()
            && self.has_identity_documents()
            && self.next_of_kin.is_some()
        {
            AccountStatus::Complete
        } else {
            AccountStatus::Incomplete
        };

        // Next of kin is not required for eligibility, only for completeness.
        self.can_apply_for_loan = self.personal_details.is_some()
            && self.address.is_some()
            && self.has_identity_documents()
            && self.verification_status == VerificationStatus::Verified;
    }
}

/// Partial profile update; `None` fields leave the current section untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub personal_details: Option<PersonalDetails>,
    pub address: Option<Address>,
    pub profile_picture: Option<String>,
    pub documents: Option<Documents>,
    pub next_of_kin: Option<NextOfKin>,
}

fn default_next_id() -> u64 {
    1
}

/// Aggregate document for the client collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBook {
    #[serde(default)]
    pub clients: HashMap<String, Client>,
    #[serde(default = "default_next_id")]
    pub next_id: u64,
}

impl Default for ClientBook {
    fn default() -> Self {
        Self {
            clients: HashMap::new(),
            next_id: 1,
        }
    }
}

/// Typed view over the client aggregate document.
pub struct ClientCollection {
    store: EntityStore<ClientBook>,
}

impl ClientCollection {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            store: EntityStore::new(backend),
        }
    }

    pub async fn create(
        &self,
        first_name: &str,
        last_name: &str,
        mobile: &str,
        pin: &str,
    ) -> Result<Client> {
        let now = Utc::now();
        let pin_hash = hash_pin(pin);
        self.store
            .update(move |book| {
                let id = book.next_id.to_string();
                book.next_id += 1;
                let client = Client {
                    id: id.clone(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    mobile: mobile.to_string(),
                    pin_hash,
                    profile_picture: None,
                    personal_details: None,
                    address: None,
                    documents: None,
                    next_of_kin: None,
                    client_type: "PRIVATE_SECTOR_EMPLOYEE".to_string(),
                    verification_status: VerificationStatus::Unverified,
                    can_apply_for_loan: false,
                    account_status: AccountStatus::Incomplete,
                    created_at: now,
                    updated_at: now,
                };
                book.clients.insert(id, client.clone());
                client
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Client>> {
        Ok(self.store.read().await?.clients.get(id).cloned())
    }

    /// Linear scan; fine at mock scale.
    pub async fn find_by_mobile(&self, mobile: &str) -> Result<Option<Client>> {
        let book = self.store.read().await?;
        Ok(book.clients.values().find(|c| c.mobile == mobile).cloned())
    }

    /// Apply a partial profile update and recompute the derived fields.
    pub async fn update_profile(&self, client_id: &str, patch: ProfileUpdate) -> Result<Client> {
        self.store
            .update(move |book| {
                let Some(client) = book.clients.get_mut(client_id) else {
                    return Err(CoreError::RecordNotFound(
                        COLLECTION.to_string(),
                        client_id.to_string(),
                    ));
                };

                if let Some(personal_details) = patch.personal_details {
                    client.personal_details = Some(personal_details);
                }
                if let Some(address) = patch.address {
                    client.address = Some(address);
                }
                if let Some(picture) = patch.profile_picture {
                    client.profile_picture = Some(picture);
                }
                if let Some(documents) = patch.documents {
                    client.documents = Some(documents);
                }
                if let Some(next_of_kin) = patch.next_of_kin {
                    client.next_of_kin = Some(next_of_kin);
                }

                client.recompute_derived();
                client.updated_at = Utc::now();
                Ok(client.clone())
            })
            .await?
    }

    /// Verification transitions also feed `can_apply_for_loan`, so the derived
    /// fields are recomputed here too.
    pub async fn set_verification_status(
        &self,
        client_id: &str,
        status: VerificationStatus,
    ) -> Result<Client> {
        self.store
            .update(move |book| {
                let Some(client) = book.clients.get_mut(client_id) else {
                    return Err(CoreError::RecordNotFound(
                        COLLECTION.to_string(),
                        client_id.to_string(),
                    ));
                };
                client.verification_status = status;
                client.recompute_derived();
                client.updated_at = Utc::now();
                Ok(client.clone())
            })
            .await?
    }
}

fn hash_pin(pin: &str) -> String {
    let digest = Sha256::digest(pin.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
