//! Revoked-token bookkeeping: a blacklist of token ids plus a device index so
//! a device logout can revoke every token it ever registered. Blacklist
//! entries are never removed within process lifetime.

use crate::core::Result;
use crate::store::{EntityStore, StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenBook {
    #[serde(default)]
    pub blacklisted_tokens: HashSet<String>,
    #[serde(default)]
    pub device_tokens: HashMap<String, HashSet<String>>,
}

pub struct TokenCollection {
    store: EntityStore<TokenBook>,
}

impl TokenCollection {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            store: EntityStore::new(backend),
        }
    }

    pub async fn register_device_token(&self, device_id: &str, token_id: &str) -> Result<()> {
        self.store
            .update(move |book| {
                book.device_tokens
                    .entry(device_id.to_string())
                    .or_default()
                    .insert(token_id.to_string());
            })
            .await
    }

    /// Revoke one token, detaching it from its device if known.
    pub async fn blacklist_token(&self, token_id: &str, device_id: Option<&str>) -> Result<()> {
        self.store
            .update(move |book| {
                book.blacklisted_tokens.insert(token_id.to_string());
                if let Some(device_id) = device_id {
                    if let Some(tokens) = book.device_tokens.get_mut(device_id) {
                        tokens.remove(token_id);
                    }
                }
            })
            .await
    }

    /// Revoke every token registered to a device and drop its index entry.
    pub async fn blacklist_device_tokens(&self, device_id: &str) -> Result<usize> {
        self.store
            .update(move |book| {
                let tokens = book.device_tokens.remove(device_id).unwrap_or_default();
                let revoked = tokens.len();
                book.blacklisted_tokens.extend(tokens);
                revoked
            })
            .await
    }

    pub async fn is_blacklisted(&self, token_id: &str) -> Result<bool> {
        Ok(self
            .store
            .read()
            .await?
            .blacklisted_tokens
            .contains(token_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn collection() -> TokenCollection {
        TokenCollection::new(MemoryBackend::new("tokens"))
    }

    #[tokio::test]
    async fn test_blacklist_single_token() {
        let tokens = collection();
        tokens.register_device_token("dev-1", "tok-a").await.unwrap();
        assert!(!tokens.is_blacklisted("tok-a").await.unwrap());

        tokens.blacklist_token("tok-a", Some("dev-1")).await.unwrap();
        assert!(tokens.is_blacklisted("tok-a").await.unwrap());

        // A later device-wide revocation finds nothing left to revoke.
        assert_eq!(tokens.blacklist_device_tokens("dev-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blacklist_whole_device() {
        let tokens = collection();
        tokens.register_device_token("dev-1", "tok-a").await.unwrap();
        tokens.register_device_token("dev-1", "tok-b").await.unwrap();
        tokens.register_device_token("dev-2", "tok-c").await.unwrap();

        assert_eq!(tokens.blacklist_device_tokens("dev-1").await.unwrap(), 2);
        assert!(tokens.is_blacklisted("tok-a").await.unwrap());
        assert!(tokens.is_blacklisted("tok-b").await.unwrap());
        assert!(!tokens.is_blacklisted("tok-c").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_device_revokes_nothing() {
        let tokens = collection();
        assert_eq!(tokens.blacklist_device_tokens("ghost").await.unwrap(), 0);
    }
}
